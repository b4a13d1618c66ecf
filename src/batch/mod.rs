//! Batch orchestration
//!
//! A [`Downloader`] owns the pieces that outlive a single batch (HTTP source,
//! naming counter, retry policy, metrics). Each batch:
//! 1. Ensures the destination directory exists (fatal if it cannot)
//! 2. Spawns one task per URL on a `JoinSet`, with no concurrency cap
//! 3. Collects outcomes in completion order; a panicking task only fails
//!    its own URL
//! 4. Emits the summary and returns a [`BatchResult`]
//!
//! [`Downloader::submit`] runs the same flow in the background and hands
//! back a [`BatchHandle`] for progress events and the final result.

mod result;

pub use result::BatchResult;

use crate::config::Config;
use crate::extract::CandidateUrl;
use crate::observability::Metrics;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::storage::{ImageStore, NamingCounter, StorageError};
use crate::worker::{
    DownloadError, DownloadTask, FailureReason, Fetcher, HttpClient, HttpConfig, ImageSource,
    RetryPolicy, UrlOutcome,
};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("cannot prepare download directory: {0}")]
    Directory(#[source] StorageError),

    #[error("batch task aborted: {0}")]
    Aborted(String),
}

pub struct Downloader {
    source: Arc<dyn ImageSource>,
    counter: Arc<NamingCounter>,
    policy: RetryPolicy,
    prefix: String,
    metrics: Arc<Metrics>,
}

impl Downloader {
    pub fn new(
        source: Arc<dyn ImageSource>,
        counter: Arc<NamingCounter>,
        policy: RetryPolicy,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            source,
            counter,
            policy,
            prefix: prefix.into(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Build an HTTP-backed downloader from configuration
    pub fn from_config(config: &Config) -> Result<Self, DownloadError> {
        let client = HttpClient::new(HttpConfig::from(&config.download))?;
        Ok(Self::new(
            Arc::new(client),
            Arc::new(NamingCounter::new(config.output.start_index)),
            RetryPolicy::from(&config.download),
            config.output.filename_prefix.clone(),
        ))
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn counter(&self) -> &Arc<NamingCounter> {
        &self.counter
    }

    /// Download every URL into `directory` and wait for all of them
    ///
    /// # Errors
    ///
    /// Only when the directory cannot be created; no request is made then.
    /// Per-URL failures are reported in the result.
    pub async fn run_batch(
        &self,
        urls: Vec<CandidateUrl>,
        directory: &Path,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<BatchResult, BatchError> {
        let batch_id = Uuid::now_v7();
        let started_at = Utc::now();
        let store = ImageStore::new(directory, self.prefix.clone(), self.counter.clone());

        let created = store.ensure_directory().await.map_err(|e| {
            error!(%batch_id, error = %e, "Cannot prepare download directory");
            BatchError::Directory(e)
        })?;
        sink.emit(ProgressEvent::DirectoryReady {
            path: directory.to_path_buf(),
            created,
        });

        info!(%batch_id, urls = urls.len(), directory = %directory.display(), "Starting batch");

        let fetcher = Arc::new(Fetcher::new(
            self.source.clone(),
            self.policy,
            self.metrics.clone(),
            sink.clone(),
        ));

        let mut tasks = JoinSet::new();
        let mut urls_by_task = HashMap::new();
        for url in urls {
            let fetcher = fetcher.clone();
            let raw = url.as_str().to_string();
            let task = DownloadTask {
                url,
                store: store.clone(),
            };
            let handle = tasks.spawn(async move { fetcher.run(task).await });
            urls_by_task.insert(handle.id(), raw);
        }

        let mut outcomes = Vec::with_capacity(urls_by_task.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            let outcome = match joined {
                Ok((_, outcome)) => outcome,
                Err(join_error) => {
                    let url = urls_by_task.remove(&join_error.id()).unwrap_or_default();
                    error!(%batch_id, url = %url, error = %join_error, "Download task died");
                    let reason = FailureReason::Unexpected {
                        message: join_error.to_string(),
                    };
                    self.metrics.image_failed();
                    sink.emit(ProgressEvent::Failed {
                        url: url.clone(),
                        attempts: 0,
                        reason: reason.clone(),
                    });
                    UrlOutcome::failed(url, 0, reason)
                }
            };
            outcomes.push(outcome);
        }

        let result =
            BatchResult::from_outcomes(batch_id, directory.to_path_buf(), outcomes, started_at);

        sink.emit(ProgressEvent::Summary {
            succeeded: result.succeeded,
            failed: result.failed,
        });
        info!(
            %batch_id,
            total = result.total,
            succeeded = result.succeeded,
            failed = result.failed,
            "Batch finished"
        );
        debug!(%batch_id, metrics = ?self.metrics.snapshot(), "Downloader metrics");

        Ok(result)
    }

    /// Start a batch in the background and return immediately
    pub fn submit(self: &Arc<Self>, urls: Vec<CandidateUrl>, directory: PathBuf) -> BatchHandle {
        let (tx, events) = mpsc::unbounded_channel();
        let downloader = Arc::clone(self);

        let task =
            tokio::spawn(async move { downloader.run_batch(urls, &directory, Arc::new(tx)).await });

        BatchHandle { events, task }
    }
}

/// Handle to a batch started with [`Downloader::submit`]
pub struct BatchHandle {
    events: mpsc::UnboundedReceiver<ProgressEvent>,
    task: JoinHandle<Result<BatchResult, BatchError>>,
}

impl BatchHandle {
    /// Next progress event; `None` once the batch has finished and every
    /// event was delivered
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Wait for the final result, discarding undelivered events
    pub async fn wait(self) -> Result<BatchResult, BatchError> {
        self.task
            .await
            .map_err(|e| BatchError::Aborted(e.to_string()))?
    }
}
