pub mod error;

use std::sync::Arc;

use tracing::warn;

use bearmemori_core::JobType;
use bearmemori_store::Store;
use bearmemori_streams::{fields_from_json, StreamBus};

pub use error::{DispatchError, Result};

/// Enqueues LLM jobs: write the row, then publish to the matching stream
///. Grounded on the write-then-publish shape the reference
/// system's scheduler/memory crates already apply for their own
/// insert-then-side-effect operations — the insert commits regardless of
/// whether the publish succeeds, because the worker's own stream
/// redelivery (not a dispatcher retry) is what makes the job eventually
/// run.
pub struct Dispatcher {
    store: Arc<Store>,
    bus: tokio::sync::Mutex<StreamBus>,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, bus: StreamBus) -> Self {
        Self { store, bus: tokio::sync::Mutex::new(bus) }
    }

    /// Insert an `LLMJob` row and publish it to its stream. Returns the
    /// job id either way — if publish fails, the row is left `queued` and
    /// a warning is logged; no retry loop lives here.
    pub async fn enqueue(&self, job_type: JobType, payload: serde_json::Value, user_id: Option<i64>) -> Result<String> {
        let job = self
            .store
            .with_conn(|conn| bearmemori_store::jobs::create(conn, job_type, &payload, user_id))?;

        let message = serde_json::json!({
            "job_id": job.id,
            "job_type": job_type.as_str(),
            "user_id": user_id.map(|id| id.to_string()),
            "payload": payload.to_string(),
            "created_at": job.created_at,
        });

        let fields = fields_from_json(&message)
            .map_err(|e| DispatchError::Validation(e.to_string()))?;

        let mut bus = self.bus.lock().await;
        if let Err(e) = bus.publish(job_type.stream(), &fields).await {
            warn!(job_id = %job.id, job_type = %job_type, error = %e, "failed to publish job; row stays queued for redelivery");
        }

        Ok(job.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_message_shape_is_flattenable() {
        let payload = serde_json::json!({"memory_id": "m1", "image_ref": "f1"});
        let message = serde_json::json!({
            "job_id": "j1",
            "job_type": "image_tag",
            "user_id": Some("42".to_string()),
            "payload": payload.to_string(),
            "created_at": "2026-01-01T00:00:00.000Z",
        });
        let fields = fields_from_json(&message).unwrap();
        assert_eq!(fields.get("job_id").unwrap(), "j1");
        assert_eq!(fields.get("job_type").unwrap(), "image_tag");
    }
}
