pub mod bus;
pub mod error;
pub mod types;

pub use bus::StreamBus;
pub use error::{Result, StreamError};
pub use types::{fields_from_json, ConsumedMessage};
