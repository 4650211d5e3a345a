use std::collections::BTreeMap;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::error::{Result, StreamError};
use crate::types::ConsumedMessage;

/// Minimum delay between connect attempts (seconds).
const BACKOFF_BASE_SECS: u64 = 2;
/// Maximum delay between connect attempts (seconds).
const BACKOFF_MAX_SECS: u64 = 60;
/// Attempts before giving up on initial connection.
const MAX_CONNECT_ATTEMPTS: u32 = 10;

/// Redis Streams-backed job bus. One connection (redis's own
/// `ConnectionManager` already reconnects transparently on drop) shared by
/// the dispatcher, worker, and scheduler.
pub struct StreamBus {
    conn: ConnectionManager,
}

impl StreamBus {
    /// Connect with exponential backoff + jitter
    /// (here: 2s → 4s → … capped at 60s, 10 attempts).
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(StreamError::Redis)?;
        let mut delay = BACKOFF_BASE_SECS;

        for attempt in 1..=MAX_CONNECT_ATTEMPTS {
            match client.get_connection_manager().await {
                Ok(conn) => {
                    info!(attempt, "connected to redis stream bus");
                    return Ok(Self { conn });
                }
                Err(e) if attempt == MAX_CONNECT_ATTEMPTS => {
                    return Err(StreamError::ConnectionFailed(e.to_string()));
                }
                Err(e) => {
                    let jittered = delay + jitter_secs(delay);
                    warn!(attempt, max = MAX_CONNECT_ATTEMPTS, error = %e, retry_after_secs = jittered, "redis connect failed, retrying");
                    sleep(Duration::from_secs(jittered)).await;
                    delay = (delay * 2).min(BACKOFF_MAX_SECS);
                }
            }
        }
        unreachable!("backoff loop exited without returning")
    }

    /// Create the consumer group for a stream, with `MKSTREAM` so the
    /// stream itself is created if absent. "Already exists" is not an
    /// error.
    pub async fn create_group(&mut self, stream: &str, group: &str) -> Result<()> {
        let result: redis::RedisResult<()> = self
            .conn
            .xgroup_create_mkstream(stream, group, "$")
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    /// Idempotently ensure every stream/group pair from
    /// `bearmemori_core::streams::ALL_STREAMS` exists.
    pub async fn ensure_all_groups(&mut self) -> Result<()> {
        for (stream, group) in bearmemori_core::streams::ALL_STREAMS {
            self.create_group(stream, group).await?;
        }
        Ok(())
    }

    /// Publish a flat string-valued payload to `stream`. Returns the
    /// redis-assigned entry id.
    pub async fn publish(&mut self, stream: &str, fields: &BTreeMap<String, String>) -> Result<String> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (k, v) in fields {
            cmd.arg(k).arg(v);
        }
        let id: String = cmd.query_async(&mut self.conn).await.map_err(StreamError::Redis)?;
        Ok(id)
    }

    /// Read up to `count` new messages for `consumer` in `group`, blocking
    /// up to `block_ms` if none are immediately available.
    pub async fn consume(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: usize,
    ) -> Result<Vec<ConsumedMessage>> {
        let opts = redis::streams::StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block_ms);

        let reply: redis::streams::StreamReadReply = self
            .conn
            .xread_options(&[stream], &[">"], &opts)
            .await
            .map_err(StreamError::Redis)?;

        let mut out = Vec::new();
        for stream_key in reply.keys {
            for entry in stream_key.ids {
                let mut fields = BTreeMap::new();
                for (k, v) in entry.map {
                    if let redis::Value::BulkString(bytes) = v {
                        let s = String::from_utf8(bytes)
                            .map_err(|e| StreamError::Malformed(e.to_string()))?;
                        fields.insert(k, s);
                    }
                }
                out.push(ConsumedMessage { id: entry.id, stream: stream_key.key.clone(), fields });
            }
        }
        Ok(out)
    }

    /// Reclaim pending entries idle for at least `min_idle_ms` back to
    /// `consumer` via `XAUTOCLAIM`. This is what lets an `unavailable`
    /// failure left unacked come back around for another attempt without
    /// the worker ever re-publishing it itself.
    pub async fn reclaim_idle(&mut self, stream: &str, group: &str, consumer: &str, min_idle_ms: usize, count: usize) -> Result<Vec<ConsumedMessage>> {
        let reply: redis::Value = redis::cmd("XAUTOCLAIM")
            .arg(stream)
            .arg(group)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut self.conn)
            .await
            .map_err(StreamError::Redis)?;

        let top = as_array(&reply);
        let entries = top.get(1).map(as_array).unwrap_or_default();

        let mut out = Vec::new();
        for entry in entries {
            let pair = as_array(&entry);
            let (Some(id_value), Some(fields_value)) = (pair.first(), pair.get(1)) else { continue };
            let Some(id) = as_bulk_string(id_value) else { continue };

            let mut fields = BTreeMap::new();
            let raw_fields = as_array(fields_value);
            let mut iter = raw_fields.into_iter();
            while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                if let (Some(k), Some(v)) = (as_bulk_string(&k), as_bulk_string(&v)) {
                    fields.insert(k, v);
                }
            }
            out.push(ConsumedMessage { id, stream: stream.to_string(), fields });
        }
        Ok(out)
    }

    pub async fn ack(&mut self, stream: &str, group: &str, message_id: &str) -> Result<()> {
        let _: i64 = self
            .conn
            .xack(stream, group, &[message_id])
            .await
            .map_err(StreamError::Redis)?;
        Ok(())
    }
}

fn as_array(value: &redis::Value) -> Vec<redis::Value> {
    match value {
        redis::Value::Array(items) | redis::Value::Set(items) => items.clone(),
        _ => Vec::new(),
    }
}

fn as_bulk_string(value: &redis::Value) -> Option<String> {
    match value {
        redis::Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
        redis::Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

fn jitter_secs(base_secs: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let max_jitter = ((base_secs as f64) * 0.10) as u64;
    if max_jitter == 0 {
        0
    } else {
        (nanos as u64) % max_jitter
    }
}
