use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{error, info, warn};

use bearmemori_core::JobType;
use bearmemori_store::Store;
use bearmemori_streams::StreamBus;

use crate::error::HandlerError;
use crate::handlers::{self, HandlerOutput};
use crate::llm::LlmClient;
use crate::retry::{self, RetryDecision};
use crate::user_lock::UserLocks;

/// Messages older than this (by their job's original `created_at`) are
/// treated as no longer worth acting on — acked so they stop cluttering the
/// stream, but the job row is left `queued` rather than rewritten, since
/// nothing actually ran.
const STALE_AFTER_SECS: i64 = 5 * 60;

/// Idle threshold before an unacked (`unavailable`) delivery is reclaimed
/// for another attempt.
const RECLAIM_IDLE_MS: usize = 60_000;

pub struct WorkerConfig {
    pub redis_url: String,
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub consumer_name: String,
    pub block_ms: usize,
}

pub struct Worker {
    store: Arc<Store>,
    llm: LlmClient,
    user_locks: UserLocks,
    attempts: DashMap<String, u32>,
}

impl Worker {
    pub fn new(store: Arc<Store>, llm: LlmClient) -> Self {
        Self { store, llm, user_locks: UserLocks::new(), attempts: DashMap::new() }
    }

    /// Spawn one consumer task per LLM job stream; each connects its own
    /// `StreamBus` so a slow `consume` block on one stream never head-of-line
    /// blocks another.
    pub async fn run(self: Arc<Self>, config: WorkerConfig, shutdown: watch::Receiver<bool>) {
        let job_streams: Vec<(&'static str, &'static str)> = bearmemori_core::streams::ALL_STREAMS
            .iter()
            .filter(|(_, group)| *group == bearmemori_core::streams::GROUP_LLM_WORKER)
            .copied()
            .collect();

        let mut handles = Vec::new();
        for (stream, group) in job_streams {
            let worker = self.clone();
            let config_url = config.redis_url.clone();
            let consumer = config.consumer_name.clone();
            let block_ms = config.block_ms;
            let mut shutdown = shutdown.clone();

            handles.push(tokio::spawn(async move {
                let mut bus = match StreamBus::connect(&config_url).await {
                    Ok(bus) => bus,
                    Err(e) => {
                        error!(stream, error = %e, "worker could not connect to redis; stream task exiting");
                        return;
                    }
                };
                if let Err(e) = bus.create_group(stream, group).await {
                    error!(stream, error = %e, "could not ensure consumer group");
                    return;
                }

                loop {
                    if *shutdown.borrow() {
                        info!(stream, "worker stream task shutting down");
                        return;
                    }

                    let reclaimed = bus.reclaim_idle(stream, group, &consumer, RECLAIM_IDLE_MS, 10).await.unwrap_or_default();
                    let fresh = if reclaimed.is_empty() {
                        tokio::select! {
                            res = bus.consume(stream, group, &consumer, 10, block_ms) => res.unwrap_or_default(),
                            _ = shutdown.changed() => Vec::new(),
                        }
                    } else {
                        Vec::new()
                    };

                    for message in reclaimed.into_iter().chain(fresh) {
                        worker.process(&mut bus, stream, group, &message).await;
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn process(&self, bus: &mut StreamBus, stream: &str, group: &str, message: &bearmemori_streams::ConsumedMessage) {
        let job_id = match message.field("job_id") {
            Ok(v) => v.to_string(),
            Err(e) => {
                warn!(%stream, error = %e, "message missing job_id, acking and dropping");
                let _ = bus.ack(stream, group, &message.id).await;
                return;
            }
        };

        let created_at = message.field("created_at").ok().and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|d| d.with_timezone(&Utc));
        let now = Utc::now();
        if let Some(created_at) = created_at {
            if (now - created_at).num_seconds() > STALE_AFTER_SECS {
                info!(job_id, "message stale, acking without processing");
                let _ = bus.ack(stream, group, &message.id).await;
                return;
            }
        }

        let user_id: Option<i64> = message.field("user_id").ok().and_then(|s| s.parse().ok());
        let job_type: Option<JobType> = message.field("job_type").ok().and_then(|s| s.parse().ok());
        let payload: Option<serde_json::Value> = message.field("payload").ok().and_then(|s| serde_json::from_str(s).ok());

        let (Some(job_type), Some(payload)) = (job_type, payload) else {
            warn!(job_id, "unparseable job envelope, marking failed and acking");
            let _ = self.store.with_conn(|conn| bearmemori_store::jobs::mark_failed(conn, &job_id, "unparseable job envelope"));
            let _ = bus.ack(stream, group, &message.id).await;
            return;
        };

        let _guard = match user_id {
            Some(uid) => Some(self.user_locks.acquire(uid).await),
            None => None,
        };

        let _ = self.store.with_conn(|conn| bearmemori_store::jobs::mark_processing(conn, &job_id));

        let enqueued_at = created_at.unwrap_or(now);
        let attempt_key = format!("{stream}:{}", message.id);
        let mut attempt = {
            let mut entry = self.attempts.entry(attempt_key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        loop {
            match self.dispatch(job_type, user_id, &payload).await {
                Ok(output) => {
                    let _ = self.store.with_conn(|conn| bearmemori_store::jobs::mark_completed(conn, &job_id, &output.job_result));
                    if let Some(notification) = output.notification {
                        self.publish_notification(bus, user_id, &notification).await;
                    }
                    let _ = bus.ack(stream, group, &message.id).await;
                    self.attempts.remove(&attempt_key);
                    return;
                }
                Err(err) => match retry::classify(err.family(), attempt, enqueued_at, Utc::now()) {
                    RetryDecision::RetryAfter { delay_secs } => {
                        warn!(job_id, attempt, delay_secs, error = %err, "retrying in-process");
                        tokio::time::sleep(std::time::Duration::from_secs(delay_secs as u64)).await;
                        attempt += 1;
                        self.attempts.insert(attempt_key.clone(), attempt);
                    }
                    RetryDecision::RetryOnRedelivery => {
                        warn!(job_id, attempt, error = %err, "llm unavailable, leaving unacked for redelivery");
                        self.publish_notification(
                            bus,
                            user_id,
                            &handlers::Notification { message_type: "llm_failure", content: serde_json::json!({"job_id": job_id, "reason": err.to_string()}) },
                        )
                        .await;
                        return;
                    }
                    RetryDecision::GiveUp => {
                        self.fail_job(&job_id, &err, attempt);
                        self.publish_notification(
                            bus,
                            user_id,
                            &handlers::Notification { message_type: "llm_expiry", content: serde_json::json!({"job_id": job_id}) },
                        )
                        .await;
                        let _ = bus.ack(stream, group, &message.id).await;
                        self.attempts.remove(&attempt_key);
                        return;
                    }
                },
            }
        }
    }

    fn fail_job(&self, job_id: &str, err: &HandlerError, attempts: u32) {
        error!(job_id, attempts, error = %err, "job failed permanently");
        let _ = self.store.with_conn(|conn| bearmemori_store::jobs::mark_failed(conn, job_id, &err.to_string()));
        let _ = self.store.with_conn(|conn| {
            bearmemori_store::audit::append(
                conn,
                "llm_job",
                job_id,
                "failed",
                &bearmemori_core::Actor::LlmWorker,
                Some(&serde_json::json!({"error_kind": format!("{:?}", err.family()), "message": err.to_string(), "attempts": attempts})),
            )
        });
    }

    async fn dispatch(&self, job_type: JobType, user_id: Option<i64>, payload: &serde_json::Value) -> Result<HandlerOutput, HandlerError> {
        match job_type {
            JobType::ImageTag => handlers::image_tag(&self.llm, &self.store, user_id, payload).await,
            JobType::IntentClassify => handlers::intent_classify(&self.llm, &self.store, user_id, payload).await,
            JobType::Followup => handlers::followup(&self.llm, &self.store, user_id, payload).await,
            JobType::TaskMatch => handlers::task_match(&self.llm, &self.store, user_id, payload).await,
            JobType::EmailExtract => handlers::email_extract(&self.llm, &self.store, user_id, payload).await,
        }
    }

    async fn publish_notification(&self, bus: &mut StreamBus, user_id: Option<i64>, notification: &handlers::Notification) {
        let envelope = serde_json::json!({
            "user_id": user_id,
            "message_type": notification.message_type,
            "content": notification.content,
        });
        let Ok(fields) = bearmemori_streams::fields_from_json(&envelope) else {
            warn!("could not flatten notification envelope");
            return;
        };
        if let Err(e) = bus.publish(bearmemori_core::streams::STREAM_NOTIFY_TELEGRAM, &fields).await {
            warn!(error = %e, "failed to publish notification");
        }
    }
}
