use thiserror::Error;

use epiwatch_core::FetchError;
use epiwatch_series::SeriesError;

/// Errors raised inside one job's Adapter → Repair → Merge pipeline.
///
/// All of them are caught at the job boundary and folded into a `Failure`
/// report; none escape to sibling jobs or abort the pool.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error("job panicked: {0}")]
    Panic(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
