//! The adapter contract: the only interface the core consumes from
//! source-specific scraping code.
//!
//! A location's behavior is data (URL, cadence, column renames) plus a
//! small fetch function, never a subtype per location. Each source is
//! described by a [`SourceSpec`] instance; the scraping side implements
//! [`Adapter`] for however it obtains rows.

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Cadence, Observation};

/// Adapter-level fetch failure. Recoverable: the owning job is marked
/// failed and retried once, siblings are unaffected.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(String),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("source returned no rows")]
    Empty,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fetches and parses one source into normalized observations.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// The static description of the source this adapter reads.
    fn spec(&self) -> &SourceSpec;

    /// Fetch all currently available rows for the source's location.
    ///
    /// Batch sources return full history; incremental sources return only
    /// the newest rows. Either way the orchestrator merges the result into
    /// the canonical series.
    async fn fetch(&self) -> Result<Vec<Observation>, FetchError>;
}

// ── Source description ───────────────────────────────────────────────

/// Per-source configuration: one instance per (location, domain).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub location: String,
    pub domain: String,

    /// Endpoint for HTTP-backed adapters; file-backed adapters ignore it.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub cadence: Cadence,

    /// Batch sources re-publish full history every day; incremental ones
    /// append. Drives the `batch`/`incremental` location classes.
    #[serde(default)]
    pub batch: bool,

    /// Raw column name -> canonical metric name.
    #[serde(default)]
    pub rename_columns: IndexMap<String, String>,
}

impl SourceSpec {
    /// Stable job identifier, `domain/location` in normalized form.
    pub fn job_id(&self) -> String {
        format!("{}/{}", self.domain, normalize_location(&self.location))
    }
}

/// Canonical key form for a location name: trimmed, lowercased, spaces and
/// dashes collapsed to underscores ("South Korea" -> "south_korea").
pub fn normalize_location(name: &str) -> String {
    name.trim().replace(['-', ' '], "_").to_lowercase()
}

// ── Domain description ───────────────────────────────────────────────

/// A rolling-window derivation attached to a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RollingSpec {
    /// Trailing sum of one metric, e.g. 7-day total doses.
    Sum {
        metric: String,
        output: String,
        #[serde(default = "default_window")]
        window: usize,
    },
    /// Ratio of two trailing sums, e.g. 7-day positive rate.
    Ratio {
        numerator: String,
        denominator: String,
        output: String,
        #[serde(default = "default_window")]
        window: usize,
        #[serde(default = "default_decimals")]
        decimals: u32,
    },
}

fn default_window() -> usize {
    7
}

fn default_decimals() -> u32 {
    3
}

/// Per-domain processing configuration shared by every source in the
/// domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSpec {
    /// Metrics expected to be non-decreasing over time; repaired under the
    /// bounded-correction policy.
    #[serde(default)]
    pub cumulative_metrics: Vec<String>,

    /// Abort repair when more rows than this would be discarded.
    #[serde(default = "default_max_removed_rows")]
    pub max_removed_rows: usize,

    #[serde(default)]
    pub rolling: Vec<RollingSpec>,
}

impl Default for DomainSpec {
    fn default() -> Self {
        Self {
            cumulative_metrics: Vec::new(),
            max_removed_rows: default_max_removed_rows(),
            rolling: Vec::new(),
        }
    }
}

fn default_max_removed_rows() -> usize {
    10
}
