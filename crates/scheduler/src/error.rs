use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("store error: {0}")]
    Store(#[from] bearmemori_store::StoreError),

    #[error("stream error: {0}")]
    Stream(#[from] bearmemori_streams::StreamError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
