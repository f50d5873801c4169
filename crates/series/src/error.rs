use chrono::NaiveDate;
use thiserror::Error;

use epiwatch_core::ModelError;

/// Errors raised by the repair, merge, and store layers. All of them are
/// per-location: the owning job fails, siblings are unaffected.
#[derive(Debug, Error)]
pub enum SeriesError {
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Too many monotonicity violations for one location. Usually signals
    /// a structural source change (schema or units), not a transient
    /// fault.
    #[error(
        "repair aborted for {location}: {} rows removed exceeds max {max_removed_rows} (dates: {removed_dates:?})",
        .removed_dates.len()
    )]
    RepairAborted {
        location: String,
        removed_dates: Vec<NaiveDate>,
        max_removed_rows: usize,
    },

    /// New data leaves a gap after the persisted history; merging would
    /// corrupt subsequent rolling-window computation.
    #[error("continuity gap for {location}: new data starts {next}, expected {expected} (last persisted {last})")]
    ContinuityGap {
        location: String,
        last: NaiveDate,
        next: NaiveDate,
        expected: NaiveDate,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
