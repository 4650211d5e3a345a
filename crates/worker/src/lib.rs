pub mod error;
pub mod handlers;
pub mod llm;
pub mod retry;
pub mod user_lock;
pub mod worker;

pub use error::{HandlerError, Result};
pub use llm::LlmClient;
pub use worker::{Worker, WorkerConfig};
