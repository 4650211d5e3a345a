mod email_extract;
mod followup;
mod image_tag;
mod intent_classify;
mod task_match;

pub use email_extract::handle as email_extract;
pub use followup::handle as followup;
pub use image_tag::handle as image_tag;
pub use intent_classify::handle as intent_classify;
pub use task_match::handle as task_match;

/// A handler's success: the JSON the job row is completed with, plus the
/// `notify:telegram` payload to publish (`None` suppresses notification,
/// e.g. `task_match` below the confidence threshold).
pub struct HandlerOutput {
    pub job_result: serde_json::Value,
    pub notification: Option<Notification>,
}

pub struct Notification {
    pub message_type: &'static str,
    pub content: serde_json::Value,
}
