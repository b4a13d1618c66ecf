//! Failure classification and the fixed-delay retry policy

use super::http::DownloadError;
use crate::storage::StorageError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Anything that can end a single fetch attempt
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Whether another attempt can help
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Transient,
    Fatal,
}

/// Every network-side failure, including non-2xx statuses, is worth another
/// attempt. Oversized bodies and local filesystem problems are not.
pub fn classify(error: &AttemptError) -> Disposition {
    match error {
        AttemptError::Download(
            DownloadError::Timeout
            | DownloadError::Transport(_)
            | DownloadError::Status { .. }
            | DownloadError::Body(_)
            | DownloadError::Unexpected(_),
        ) => Disposition::Transient,
        AttemptError::Download(DownloadError::TooLarge { .. } | DownloadError::InvalidRequest(_)) => {
            Disposition::Fatal
        }
        AttemptError::Storage(_) => Disposition::Fatal,
    }
}

/// Terminal cause recorded for a URL that could not be saved
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("timed out")]
    Timeout,

    #[error("bad status: HTTP {code}")]
    BadStatus { code: u16 },

    #[error("image too large: {message}")]
    TooLarge { message: String },

    #[error("filesystem error: {message}")]
    Filesystem { message: String },

    #[error("unexpected error: {message}")]
    Unexpected { message: String },
}

impl From<&AttemptError> for FailureReason {
    fn from(error: &AttemptError) -> Self {
        match error {
            AttemptError::Download(e) => match e {
                DownloadError::Timeout => FailureReason::Timeout,
                DownloadError::Transport(message) | DownloadError::Body(message) => {
                    FailureReason::Network {
                        message: message.clone(),
                    }
                }
                DownloadError::Status { code, .. } => FailureReason::BadStatus { code: *code },
                DownloadError::TooLarge { .. } => FailureReason::TooLarge {
                    message: e.to_string(),
                },
                DownloadError::InvalidRequest(message) | DownloadError::Unexpected(message) => {
                    FailureReason::Unexpected {
                        message: message.clone(),
                    }
                }
            },
            AttemptError::Storage(e) => FailureReason::Filesystem {
                message: e.to_string(),
            },
        }
    }
}

/// Decision returned by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Stop,
    RetryAfter(Duration),
}

/// Fixed number of attempts with a fixed pause between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// `attempt` is 1-based and counts the attempt that just failed
    pub fn decide(&self, attempt: u32, disposition: Disposition) -> RetryDecision {
        if disposition == Disposition::Fatal || attempt >= self.max_attempts {
            return RetryDecision::Stop;
        }
        RetryDecision::RetryAfter(self.delay)
    }
}
