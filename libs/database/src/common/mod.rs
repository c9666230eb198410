//! Helpers shared by the storage backends

pub mod retry;

pub use retry::{RetryConfig, retry, retry_if, retry_with_backoff};
