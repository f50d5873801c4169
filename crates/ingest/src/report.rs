//! Run reports: written at the end of a run, read back at the start of
//! the next one to bias scheduling order.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use epiwatch_series::store::write_atomic;

use crate::error::JobError;
use crate::job::{JobOutcome, JobReport};

/// Longest-job-first ordering only kicks in for job lists at least this
/// large; tiny runs aren't worth reordering.
const MIN_JOBS_FOR_ORDERING: usize = 10;

/// Outcome of one orchestrator run over a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub domain: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub jobs: Vec<JobReport>,
}

impl RunReport {
    pub fn successes(&self) -> usize {
        self.count(JobOutcome::Success)
    }

    pub fn failures(&self) -> usize {
        self.count(JobOutcome::Failure)
    }

    pub fn skipped(&self) -> usize {
        self.count(JobOutcome::Skipped)
    }

    fn count(&self, outcome: JobOutcome) -> usize {
        self.jobs.iter().filter(|j| j.outcome == outcome).count()
    }

    /// Job ids of final failures (after the retry pass).
    pub fn failed_job_ids(&self) -> Vec<&str> {
        self.jobs
            .iter()
            .filter(|j| j.outcome == JobOutcome::Failure)
            .map(|j| j.job_id.as_str())
            .collect()
    }

    /// Recorded durations keyed by job id.
    pub fn durations(&self) -> HashMap<String, f64> {
        self.jobs
            .iter()
            .filter_map(|j| j.duration_seconds.map(|d| (j.job_id.clone(), d)))
            .collect()
    }

    /// Atomic whole-file write, same discipline as series files.
    pub fn save(&self, path: &Path) -> Result<(), JobError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_atomic(path, &serde_json::to_vec_pretty(self)?)?;
        info!(path = %path.display(), jobs = self.jobs.len(), "run report written");
        Ok(())
    }

    /// Load the previous run's report; `None` if there has been no run.
    pub fn load(path: &Path) -> Result<Option<Self>, JobError> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

/// Reorder work items so the slowest jobs from the previous run start
/// first under the bounded pool. Jobs without history keep their
/// configured order at the tail; short lists are left untouched.
///
/// A greedy longest-job-first hint, not a guaranteed optimization.
pub fn order_by_previous_durations<T>(
    items: Vec<T>,
    job_id: impl Fn(&T) -> String,
    previous: Option<&RunReport>,
) -> Vec<T> {
    let Some(previous) = previous else {
        return items;
    };
    if items.len() < MIN_JOBS_FOR_ORDERING {
        return items;
    }

    let durations = previous.durations();
    let (mut known, unknown): (Vec<T>, Vec<T>) = items
        .into_iter()
        .partition(|item| durations.contains_key(&job_id(item)));
    known.sort_by(|a, b| {
        let da = durations[&job_id(a)];
        let db = durations[&job_id(b)];
        db.partial_cmp(&da).unwrap_or(std::cmp::Ordering::Equal)
    });
    known.extend(unknown);
    known
}
