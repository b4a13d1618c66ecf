//! Task runner - fetches one URL with retries and saves the image

use super::http::ImageSource;
use super::retry::{AttemptError, FailureReason, RetryDecision, RetryPolicy, classify};
use crate::extract::CandidateUrl;
use crate::observability::Metrics;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::storage::{ImageStore, SavedImage, resolve_extension};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// One URL bound to the store its image goes into
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: CandidateUrl,
    pub store: ImageStore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeResult {
    Saved { path: PathBuf, bytes: u64 },
    Failed { reason: FailureReason },
}

/// Final state of one URL
#[derive(Debug, Clone, Serialize)]
pub struct UrlOutcome {
    pub url: String,
    pub attempts: u32,
    #[serde(flatten)]
    pub result: OutcomeResult,
    pub finished_at: DateTime<Utc>,
}

impl UrlOutcome {
    pub fn saved(url: impl Into<String>, attempts: u32, image: SavedImage) -> Self {
        Self {
            url: url.into(),
            attempts,
            result: OutcomeResult::Saved {
                path: image.path,
                bytes: image.bytes,
            },
            finished_at: Utc::now(),
        }
    }

    pub fn failed(url: impl Into<String>, attempts: u32, reason: FailureReason) -> Self {
        Self {
            url: url.into(),
            attempts,
            result: OutcomeResult::Failed { reason },
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, OutcomeResult::Saved { .. })
    }
}

/// Shared pieces every download task needs
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn ImageSource>,
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
    sink: Arc<dyn ProgressSink>,
}

impl Fetcher {
    pub fn new(
        source: Arc<dyn ImageSource>,
        policy: RetryPolicy,
        metrics: Arc<Metrics>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            source,
            policy,
            metrics,
            sink,
        }
    }

    /// Run attempts until the image is saved or the policy gives up
    ///
    /// Never returns an error: every failure ends up in the outcome.
    pub async fn run(&self, task: DownloadTask) -> UrlOutcome {
        let url = task.url.as_str().to_string();
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.metrics.attempt_started();
            self.sink.emit(ProgressEvent::AttemptStarted {
                url: url.clone(),
                attempt,
                max_attempts,
            });

            let error = match self.attempt(&task).await {
                Ok(image) => {
                    info!(
                        url = %url,
                        attempt,
                        path = %image.path.display(),
                        size = image.bytes,
                        "Image saved"
                    );
                    self.metrics.image_saved(image.bytes);
                    self.sink.emit(ProgressEvent::Saved {
                        url: url.clone(),
                        path: image.path.clone(),
                        bytes: image.bytes,
                    });
                    return UrlOutcome::saved(url, attempt, image);
                }
                Err(e) => e,
            };

            let decision = self.policy.decide(attempt, classify(&error));
            let retry_in = match decision {
                RetryDecision::RetryAfter(delay) => Some(delay),
                RetryDecision::Stop => None,
            };

            warn!(
                url = %url,
                attempt,
                error = %error,
                retrying = retry_in.is_some(),
                "Attempt failed"
            );
            self.sink.emit(ProgressEvent::AttemptFailed {
                url: url.clone(),
                attempt,
                max_attempts,
                error: error.to_string(),
                retry_in,
            });

            match retry_in {
                Some(delay) => {
                    self.metrics.retry_scheduled();
                    tokio::time::sleep(delay).await;
                }
                None => {
                    let reason = FailureReason::from(&error);
                    self.metrics.image_failed();
                    self.sink.emit(ProgressEvent::Failed {
                        url: url.clone(),
                        attempts: attempt,
                        reason: reason.clone(),
                    });
                    return UrlOutcome::failed(url, attempt, reason);
                }
            }
        }
    }

    /// One GET; the file is only created once the whole body is in memory
    async fn attempt(&self, task: &DownloadTask) -> Result<SavedImage, AttemptError> {
        let image = self.source.fetch_once(task.url.url()).await?;
        let extension = resolve_extension(task.url.url(), &image.meta);
        let saved = task.store.save(&image.body, &extension).await?;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::FnSink;
    use crate::storage::{NamingCounter, ResponseMeta};
    use crate::worker::http::{DownloadError, FetchedImage};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::Instant;
    use url::Url;

    /// Fails the first `failures` calls, then serves a PNG
    struct FlakySource {
        failures: u32,
        calls: AtomicU32,
        call_times: Mutex<Vec<Instant>>,
    }

    impl FlakySource {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                call_times: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ImageSource for FlakySource {
        async fn fetch_once(&self, _url: &Url) -> crate::worker::http::Result<FetchedImage> {
            self.call_times.lock().unwrap().push(Instant::now());
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(DownloadError::Status {
                    code: 503,
                    reason: "Service Unavailable".to_string(),
                });
            }
            Ok(FetchedImage {
                body: Bytes::from_static(b"\x89PNG"),
                meta: ResponseMeta {
                    content_type: Some("image/png".to_string()),
                    content_disposition: None,
                },
            })
        }
    }

    struct OversizedSource;

    #[async_trait]
    impl ImageSource for OversizedSource {
        async fn fetch_once(&self, _url: &Url) -> crate::worker::http::Result<FetchedImage> {
            Err(DownloadError::TooLarge {
                size: 100,
                limit: crate::humanize::ByteSize(10),
            })
        }
    }

    struct Harness {
        _dir: TempDir,
        store: ImageStore,
        events: Arc<Mutex<Vec<ProgressEvent>>>,
        metrics: Arc<Metrics>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store = ImageStore::new(dir.path(), "image_", Arc::new(NamingCounter::default()));
            Self {
                _dir: dir,
                store,
                events: Arc::new(Mutex::new(Vec::new())),
                metrics: Arc::new(Metrics::new()),
            }
        }

        fn fetcher(&self, source: Arc<dyn ImageSource>) -> Fetcher {
            let events = self.events.clone();
            let sink = FnSink(move |event: ProgressEvent| events.lock().unwrap().push(event));
            Fetcher::new(source, RetryPolicy::default(), self.metrics.clone(), Arc::new(sink))
        }

        fn task(&self, url: &str) -> DownloadTask {
            DownloadTask {
                url: CandidateUrl::parse(url).unwrap(),
                store: self.store.clone(),
            }
        }

        fn files(&self) -> usize {
            std::fs::read_dir(self.store.directory()).unwrap().count()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let harness = Harness::new();
        let source = Arc::new(FlakySource::new(2));
        let fetcher = harness.fetcher(source.clone());

        let outcome = fetcher.run(harness.task("https://x.test/photo")).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(harness.files(), 1);
        assert_eq!(
            outcome.result,
            OutcomeResult::Saved {
                path: harness.store.directory().join("image_1.png"),
                bytes: 4,
            }
        );

        let times = source.call_times.lock().unwrap();
        assert_eq!(times[1] - times[0], Duration::from_secs(2));
        assert_eq!(times[2] - times[1], Duration::from_secs(2));

        let snapshot = harness.metrics.snapshot();
        assert_eq!(snapshot.attempts, 3);
        assert_eq!(snapshot.retries, 2);
        assert_eq!(snapshot.images_saved, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let harness = Harness::new();
        let source = Arc::new(FlakySource::new(u32::MAX));
        let fetcher = harness.fetcher(source.clone());

        let outcome = fetcher.run(harness.task("https://x.test/a.png")).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(harness.files(), 0);
        assert_eq!(
            outcome.result,
            OutcomeResult::Failed {
                reason: FailureReason::BadStatus { code: 503 }
            }
        );
        assert_eq!(harness.metrics.snapshot().images_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let harness = Harness::new();
        let fetcher = harness.fetcher(Arc::new(OversizedSource));

        let outcome = fetcher.run(harness.task("https://x.test/huge.png")).await;

        assert_eq!(outcome.attempts, 1);
        assert!(matches!(
            outcome.result,
            OutcomeResult::Failed {
                reason: FailureReason::TooLarge { .. }
            }
        ));
        assert_eq!(harness.files(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_events_per_attempt() {
        let harness = Harness::new();
        let fetcher = harness.fetcher(Arc::new(FlakySource::new(1)));

        fetcher.run(harness.task("https://x.test/a.gif")).await;

        let events = harness.events.lock().unwrap();
        let lines: Vec<String> = events.iter().map(|e| e.to_string()).collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Downloading https://x.test/a.gif (attempt 1/3)");
        assert!(lines[1].starts_with("Attempt 1/3 for https://x.test/a.gif failed"));
        assert!(lines[1].ends_with("retrying in 2.0s"));
        assert_eq!(lines[2], "Downloading https://x.test/a.gif (attempt 2/3)");
        assert!(lines[3].starts_with("Downloaded https://x.test/a.gif -> "));
        assert!(lines[3].contains("image_1.gif"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_failure_is_reported_as_filesystem() {
        let harness = Harness::new();
        let missing = harness.store.directory().join("missing");
        let task = DownloadTask {
            url: CandidateUrl::parse("https://x.test/a.png").unwrap(),
            store: ImageStore::new(&missing, "image_", Arc::new(NamingCounter::default())),
        };
        let fetcher = harness.fetcher(Arc::new(FlakySource::new(0)));

        let outcome = fetcher.run(task).await;

        assert_eq!(outcome.attempts, 1);
        assert!(matches!(
            outcome.result,
            OutcomeResult::Failed {
                reason: FailureReason::Filesystem { .. }
            }
        ));
    }
}
