//! Per-URL download worker
//!
//! A [`Fetcher`] takes a [`DownloadTask`], performs GET attempts through an
//! [`ImageSource`], retries transient failures with a fixed delay, and saves
//! the body through the task's image store.

pub mod http;
pub mod retry;
pub mod runner;

pub use http::{DownloadError, FetchedImage, HttpClient, HttpConfig, ImageSource};
pub use retry::{AttemptError, Disposition, FailureReason, RetryDecision, RetryPolicy, classify};
pub use runner::{DownloadTask, Fetcher, OutcomeResult, UrlOutcome};

use crate::config::DownloadConfig;

impl From<&DownloadConfig> for RetryPolicy {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            delay: config.retry_delay(),
        }
    }
}
