use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Top-level config (`bearmemori.toml` + `BEARMEMORI_*` env overrides),
/// loaded by merging a TOML file with environment overrides via figment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BearMemoriConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_image_storage_path")]
    pub image_storage_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            image_storage_path: default_image_storage_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_unavailable_horizon_days")]
    pub unavailable_horizon_days: i64,
    #[serde(default = "default_message_stale_seconds")]
    pub message_stale_seconds: i64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            vision_model: default_vision_model(),
            text_model: default_text_model(),
            max_retries: default_max_retries(),
            unavailable_horizon_days: default_unavailable_horizon_days(),
            message_stale_seconds: default_message_stale_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_interval_seconds")]
    pub interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_scheduler_interval_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_memory_pending_ttl_days")]
    pub memory_pending_ttl_days: i64,
    #[serde(default = "default_suggested_tag_ttl_days")]
    pub suggested_tag_ttl_days: i64,
    #[serde(default = "default_event_requeue_hours")]
    pub event_requeue_hours: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            memory_pending_ttl_days: default_memory_pending_ttl_days(),
            suggested_tag_ttl_days: default_suggested_tag_ttl_days(),
            event_requeue_hours: default_event_requeue_hours(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.bearmemori/bearmemori.db")
}
fn default_image_storage_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.bearmemori/images")
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_vision_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_text_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_unavailable_horizon_days() -> i64 {
    14
}
fn default_message_stale_seconds() -> i64 {
    300
}
fn default_scheduler_interval_seconds() -> u64 {
    30
}
fn default_memory_pending_ttl_days() -> i64 {
    7
}
fn default_suggested_tag_ttl_days() -> i64 {
    7
}
fn default_event_requeue_hours() -> i64 {
    24
}

impl BearMemoriConfig {
    /// Load config from a TOML file with `BEARMEMORI_*` env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. `BEARMEMORI_CONFIG` env var
    ///   3. `~/.bearmemori/bearmemori.toml`
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("BEARMEMORI_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: BearMemoriConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("BEARMEMORI_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.bearmemori/bearmemori.toml")
}
