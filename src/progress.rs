//! Progress events delivered to the presentation layer
//!
//! Every event renders as one human-readable status line through `Display`.

use crate::humanize::ByteSize;
use crate::worker::FailureReason;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    DirectoryReady {
        path: PathBuf,
        created: bool,
    },
    Rejected {
        raw: String,
        reason: String,
    },
    AttemptStarted {
        url: String,
        attempt: u32,
        max_attempts: u32,
    },
    AttemptFailed {
        url: String,
        attempt: u32,
        max_attempts: u32,
        error: String,
        /// `None` when no further attempt follows
        retry_in: Option<Duration>,
    },
    Saved {
        url: String,
        path: PathBuf,
        bytes: u64,
    },
    Failed {
        url: String,
        attempts: u32,
        reason: FailureReason,
    },
    Summary {
        succeeded: usize,
        failed: usize,
    },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::DirectoryReady { path, created: true } => {
                write!(f, "Created directory {}", path.display())
            }
            ProgressEvent::DirectoryReady { path, created: false } => {
                write!(f, "Saving to {}", path.display())
            }
            ProgressEvent::Rejected { raw, reason } => {
                write!(f, "Skipping invalid URL {}: {}", raw, reason)
            }
            ProgressEvent::AttemptStarted {
                url,
                attempt,
                max_attempts,
            } => write!(f, "Downloading {} (attempt {}/{})", url, attempt, max_attempts),
            ProgressEvent::AttemptFailed {
                url,
                attempt,
                max_attempts,
                error,
                retry_in,
            } => {
                write!(
                    f,
                    "Attempt {}/{} for {} failed: {}",
                    attempt, max_attempts, url, error
                )?;
                if let Some(delay) = retry_in {
                    write!(f, "; retrying in {:.1}s", delay.as_secs_f64())?;
                }
                Ok(())
            }
            ProgressEvent::Saved { url, path, bytes } => write!(
                f,
                "Downloaded {} -> {} ({})",
                url,
                path.display(),
                ByteSize(*bytes)
            ),
            ProgressEvent::Failed {
                url,
                attempts,
                reason,
            } => write!(
                f,
                "Failed to download {} after {} attempt(s): {}",
                url, attempts, reason
            ),
            ProgressEvent::Summary { succeeded, failed } => {
                write!(f, "{} successful, {} failed", succeeded, failed)
            }
        }
    }
}

/// Receiver of progress events; called concurrently from download tasks
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Forwards events over a channel; a closed receiver drops them
impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}

/// Adapts a closure into a sink
pub struct FnSink<F>(pub F);

impl<F> ProgressSink for FnSink<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        (self.0)(event)
    }
}

/// Writes every event to the `tracing` log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: ProgressEvent) {
        match &event {
            ProgressEvent::AttemptFailed { .. } | ProgressEvent::Failed { .. } => {
                tracing::warn!("{}", event)
            }
            ProgressEvent::AttemptStarted { .. } => tracing::debug!("{}", event),
            _ => tracing::info!("{}", event),
        }
    }
}
