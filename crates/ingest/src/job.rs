//! Job identity, lifecycle states, and per-job reports.

use serde::{Deserialize, Serialize};

/// Lifecycle of a job. `Success`, `Failure`, and `Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
}

/// Terminal outcome of a job, recorded in the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    Success,
    Failure,
    Skipped,
}

impl From<JobOutcome> for JobStatus {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Success => JobStatus::Success,
            JobOutcome::Failure => JobStatus::Failure,
            JobOutcome::Skipped => JobStatus::Skipped,
        }
    }
}

/// One unit of work: fetch, repair, and merge a single (location, domain).
/// Created at run start, folded into the [`crate::RunReport`] at run end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub location: String,
    pub domain: String,
    pub status: JobStatus,
}

impl Job {
    pub fn new(id: impl Into<String>, location: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
            domain: domain.into(),
            status: JobStatus::Pending,
        }
    }

    /// `Pending → Running`.
    pub fn start(&mut self) {
        debug_assert_eq!(self.status, JobStatus::Pending);
        self.status = JobStatus::Running;
    }

    /// Transition into a terminal state.
    pub fn finish(&mut self, outcome: JobOutcome) {
        self.status = outcome.into();
    }
}

/// One row of the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    /// Wall-clock seconds; `None` for skipped jobs.
    pub duration_seconds: Option<f64>,
    pub outcome: JobOutcome,
    /// Captured error context. Retained for audit even when a retry later
    /// succeeded.
    pub error_text: Option<String>,
}

impl JobReport {
    pub fn skipped(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            duration_seconds: None,
            outcome: JobOutcome::Skipped,
            error_text: None,
        }
    }

    pub fn success(job_id: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            job_id: job_id.into(),
            duration_seconds: Some(duration_seconds),
            outcome: JobOutcome::Success,
            error_text: None,
        }
    }

    pub fn failure(job_id: impl Into<String>, duration_seconds: f64, error: String) -> Self {
        Self {
            job_id: job_id.into(),
            duration_seconds: Some(duration_seconds),
            outcome: JobOutcome::Failure,
            error_text: Some(truncate_error(&error)),
        }
    }
}

/// Error context is kept readable in reports: first line, bounded length.
pub(crate) fn truncate_error(error: &str) -> String {
    const MAX: usize = 500;
    let first_line = error.lines().next().unwrap_or("");
    if first_line.len() <= MAX {
        first_line.to_string()
    } else {
        let cut = first_line
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}…", &first_line[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_reaches_terminal_state() {
        let mut job = Job::new("vaccinations/utopia", "Utopia", "vaccinations");
        assert_eq!(job.status, JobStatus::Pending);
        job.start();
        assert_eq!(job.status, JobStatus::Running);
        job.finish(JobOutcome::Success);
        assert_eq!(job.status, JobStatus::Success);
    }

    #[test]
    fn skip_is_terminal_without_running() {
        let mut job = Job::new("vaccinations/utopia", "Utopia", "vaccinations");
        job.finish(JobOutcome::Skipped);
        assert_eq!(job.status, JobStatus::Skipped);
    }

    #[test]
    fn failure_report_truncates_error_context() {
        let long = format!("boom: {}\nsecond line is dropped", "x".repeat(600));
        let report = JobReport::failure("testing/utopia", 1.5, long);
        let text = report.error_text.unwrap();
        assert!(text.starts_with("boom:"));
        assert!(text.len() <= 510);
        assert!(!text.contains("second line"));
    }

    #[test]
    fn outcome_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobOutcome::Failure).unwrap(), "\"failure\"");
        let parsed: JobOutcome = serde_json::from_str("\"skipped\"").unwrap();
        assert_eq!(parsed, JobOutcome::Skipped);
    }
}
