use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Assembly failures. All of these are fatal to the whole assembly; the
/// dataset is never partially published.
#[derive(Debug, Error)]
pub enum AssemblerError {
    #[error("reference table not found at {0}")]
    MissingReference(PathBuf),

    #[error("duplicate reference row for location {0}")]
    DuplicateReference(String),

    /// A location showed up in a domain series without a reference row,
    /// most often a renamed or newly introduced place name that would
    /// corrupt every downstream join.
    #[error("unmapped locations in domain {domain}: {}", .locations.join(", "))]
    UnmappedLocation { domain: String, locations: Vec<String> },

    /// One domain contributed the same (location, date) twice: an
    /// accidental one-to-many join.
    #[error("domain {domain} contributed duplicate key ({location}, {date})")]
    CardinalityViolation {
        domain: String,
        location: String,
        date: NaiveDate,
    },

    #[error("duplicate (location, date) in assembled output: ({location}, {date})")]
    DuplicateKey { location: String, date: NaiveDate },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
