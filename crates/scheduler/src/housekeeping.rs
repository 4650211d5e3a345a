use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use bearmemori_core::now_iso;
use bearmemori_store::Store;
use bearmemori_streams::{fields_from_json, StreamBus};

use crate::error::Result;

pub struct HousekeepingConfig {
    pub interval_seconds: u64,
    pub suggested_tag_ttl_days: i64,
    pub event_requeue_hours: i64,
}

/// A `tokio::time::interval` tick loop running four fixed housekeeping
/// tasks per tick, selected against a shutdown watch. Each task is its own
/// `Result`-returning function so one's failure is logged without blocking
/// the others.
pub struct HousekeepingEngine {
    store: Arc<Store>,
    bus: tokio::sync::Mutex<StreamBus>,
    config: HousekeepingConfig,
}

impl HousekeepingEngine {
    pub fn new(store: Arc<Store>, bus: StreamBus, config: HousekeepingConfig) -> Self {
        Self { store, bus: tokio::sync::Mutex::new(bus), config }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("housekeeping engine started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.config.interval_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("housekeeping engine shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Fixed order: reminders, pending-memory expiry, suggested-tag expiry,
    /// stale-event re-prompt.
    async fn tick(&self) {
        if let Err(e) = self.fire_due_reminders().await {
            error!(error = %e, "housekeeping: fire_due_reminders failed");
        }
        if let Err(e) = self.expire_pending_memories().await {
            error!(error = %e, "housekeeping: expire_pending_memories failed");
        }
        if let Err(e) = self.expire_suggested_tags().await {
            error!(error = %e, "housekeeping: expire_suggested_tags failed");
        }
        if let Err(e) = self.reprompt_stale_events().await {
            error!(error = %e, "housekeeping: reprompt_stale_events failed");
        }
    }

    async fn fire_due_reminders(&self) -> Result<()> {
        let now = now_iso();
        let due = self.store.with_conn(|conn| bearmemori_store::reminders::list_due(conn, &now))?;
        for reminder in due {
            self.store.with_conn(|conn| bearmemori_store::reminders::mark_fired(conn, &reminder.id))?;
            self.publish_notification(
                reminder.owner_user_id,
                "reminder",
                serde_json::json!({ "reminder_id": reminder.id, "text": reminder.text, "fire_at": reminder.fire_at }),
            )
            .await;
        }
        Ok(())
    }

    async fn expire_pending_memories(&self) -> Result<()> {
        let now = now_iso();
        let expired = self.store.with_conn(|conn| bearmemori_store::memories::list_expired_pending(conn, &now))?;
        for memory in expired {
            let media_local_path = self.store.with_conn(|conn| {
                bearmemori_store::memories::delete(conn, &memory.id, &bearmemori_core::Actor::System, "expired")
            })?;
            if let Some(path) = media_local_path {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path, error = %e, "could not remove expired memory's media file");
                }
            }
        }
        Ok(())
    }

    async fn expire_suggested_tags(&self) -> Result<()> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(self.config.suggested_tag_ttl_days))
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let stale = self.store.with_conn(|conn| bearmemori_store::memories::list_suggested_tags_older_than(conn, &cutoff))?;
        for (memory_id, tag) in stale {
            self.store.with_conn(|conn| bearmemori_store::memories::purge_suggested_tag(conn, &memory_id, &tag))?;
        }
        Ok(())
    }

    async fn reprompt_stale_events(&self) -> Result<()> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::hours(self.config.event_requeue_hours))
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let stale = self.store.with_conn(|conn| bearmemori_store::events::list_stale_pending(conn, &cutoff))?;
        for event in stale {
            self.store.with_conn(|conn| bearmemori_store::events::reset_pending_since(conn, &event.id))?;
            self.publish_notification(
                event.owner_user_id,
                "event_confirmation",
                serde_json::json!({ "event_id": event.id, "description": event.description, "reprompt": true }),
            )
            .await;
        }
        Ok(())
    }

    async fn publish_notification(&self, user_id: i64, message_type: &str, content: serde_json::Value) {
        let envelope = serde_json::json!({ "user_id": user_id, "message_type": message_type, "content": content });
        let Ok(fields) = fields_from_json(&envelope) else {
            warn!("housekeeping: could not flatten notification envelope");
            return;
        };
        let mut bus = self.bus.lock().await;
        if let Err(e) = bus.publish(bearmemori_core::streams::STREAM_NOTIFY_TELEGRAM, &fields).await {
            warn!(error = %e, "housekeeping: failed to publish notification");
        }
    }
}
