//! Stream and consumer-group names, shared verbatim by the dispatcher, the
//! worker, and the scheduler so none of them have to agree on string
//! literals independently.

/// One entry per `job_type` → its dedicated Redis stream.
pub const STREAM_IMAGE_TAG: &str = "llm:image_tag";
pub const STREAM_INTENT: &str = "llm:intent";
pub const STREAM_FOLLOWUP: &str = "llm:followup";
pub const STREAM_TASK_MATCH: &str = "llm:task_match";
pub const STREAM_EMAIL_EXTRACT: &str = "llm:email_extract";

/// Outbound notifications consumed by the gateway (out of scope here).
pub const STREAM_NOTIFY_TELEGRAM: &str = "notify:telegram";

pub const GROUP_LLM_WORKER: &str = "llm-worker";
pub const GROUP_TELEGRAM: &str = "telegram";

/// All streams the worker/dispatcher know about, with their consumer group.
pub const ALL_STREAMS: &[(&str, &str)] = &[
    (STREAM_IMAGE_TAG, GROUP_LLM_WORKER),
    (STREAM_INTENT, GROUP_LLM_WORKER),
    (STREAM_FOLLOWUP, GROUP_LLM_WORKER),
    (STREAM_TASK_MATCH, GROUP_LLM_WORKER),
    (STREAM_EMAIL_EXTRACT, GROUP_LLM_WORKER),
    (STREAM_NOTIFY_TELEGRAM, GROUP_TELEGRAM),
];

/// Valid `LLMJob.job_type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ImageTag,
    IntentClassify,
    Followup,
    TaskMatch,
    EmailExtract,
}

impl JobType {
    /// The stream this job type is dispatched to.
    pub fn stream(&self) -> &'static str {
        match self {
            JobType::ImageTag => STREAM_IMAGE_TAG,
            JobType::IntentClassify => STREAM_INTENT,
            JobType::Followup => STREAM_FOLLOWUP,
            JobType::TaskMatch => STREAM_TASK_MATCH,
            JobType::EmailExtract => STREAM_EMAIL_EXTRACT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ImageTag => "image_tag",
            JobType::IntentClassify => "intent_classify",
            JobType::Followup => "followup",
            JobType::TaskMatch => "task_match",
            JobType::EmailExtract => "email_extract",
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "image_tag" => Ok(JobType::ImageTag),
            "intent_classify" => Ok(JobType::IntentClassify),
            "followup" => Ok(JobType::Followup),
            "task_match" => Ok(JobType::TaskMatch),
            "email_extract" => Ok(JobType::EmailExtract),
            other => Err(format!("unknown job_type: {other}")),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
