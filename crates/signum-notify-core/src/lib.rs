pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod notifier;
pub mod pool;
pub mod service;
pub mod types;
pub mod watermark;

#[cfg(test)]
mod test_util;

pub use client::SignumClient;
pub use config::Config;
pub use error::{ApiError, CoreError};
pub use notifier::{Notifier, NotifierEvent};
pub use service::{Service, ShutdownSignal};
pub use watermark::{MemoryWatermarkStore, SqliteWatermarkStore, WatermarkStore};
