use crate::worker::{OutcomeResult, UrlOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Aggregate of one batch, outcomes in completion order
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub directory: PathBuf,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<UrlOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchResult {
    pub(super) fn from_outcomes(
        batch_id: Uuid,
        directory: PathBuf,
        outcomes: Vec<UrlOutcome>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            batch_id,
            directory,
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            outcomes,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// `"<succeeded> successful, <failed> failed"`
    pub fn summary_line(&self) -> String {
        format!("{} successful, {} failed", self.succeeded, self.failed)
    }

    pub fn saved_paths(&self) -> impl Iterator<Item = &Path> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            OutcomeResult::Saved { path, .. } => Some(path.as_path()),
            OutcomeResult::Failed { .. } => None,
        })
    }
}
