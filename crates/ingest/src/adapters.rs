//! Bundled adapter implementations.
//!
//! Real source-specific scrapers live outside the core and only have to
//! satisfy the [`Adapter`] contract. These two cover the common cases: a
//! drop directory of pre-normalized rows written by external tooling, and
//! a generic JSON table endpoint.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use epiwatch_core::{Adapter, FetchError, MetricValue, Observation, SourceSpec};

// ── Drop-file adapter ────────────────────────────────────────────────

/// Reads pre-normalized observations from a local JSON file, the handoff
/// point for scrapers that run out-of-process.
pub struct DropFileAdapter {
    spec: SourceSpec,
    path: PathBuf,
}

impl DropFileAdapter {
    pub fn new(spec: SourceSpec, path: impl Into<PathBuf>) -> Self {
        Self { spec, path: path.into() }
    }
}

#[async_trait]
impl Adapter for DropFileAdapter {
    fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    async fn fetch(&self) -> Result<Vec<Observation>, FetchError> {
        let bytes = std::fs::read(&self.path)?;
        let rows: Vec<Observation> = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Parse(e.to_string()))?;
        debug!(location = %self.spec.location, rows = rows.len(), "drop file read");
        Ok(rows)
    }
}

// ── HTTP table adapter ───────────────────────────────────────────────

/// Fetches a JSON array of row objects from the source URL.
///
/// Each row object needs a `date` field (ISO `YYYY-MM-DD`); every other
/// numeric field becomes a metric (integers keep count semantics). Nulls
/// and non-numeric fields are ignored, so "no data" stays absent rather
/// than turning into 0.
pub struct HttpTableAdapter {
    spec: SourceSpec,
    client: Client,
}

impl HttpTableAdapter {
    pub fn new(spec: SourceSpec, timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(Self { spec, client })
    }
}

#[async_trait]
impl Adapter for HttpTableAdapter {
    fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    async fn fetch(&self) -> Result<Vec<Observation>, FetchError> {
        let url = self
            .spec
            .url
            .as_deref()
            .ok_or_else(|| FetchError::Parse("source url not configured".into()))?;

        let body: Value = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let rows = parse_rows(&body, &self.spec.location, url)?;
        if rows.is_empty() {
            return Err(FetchError::Empty);
        }
        debug!(location = %self.spec.location, rows = rows.len(), "table fetched");
        Ok(rows)
    }
}

/// Turn a JSON array of row objects into observations.
fn parse_rows(body: &Value, location: &str, source_url: &str) -> Result<Vec<Observation>, FetchError> {
    let array = body
        .as_array()
        .ok_or_else(|| FetchError::Parse("expected a JSON array of rows".into()))?;

    let mut rows = Vec::with_capacity(array.len());
    for entry in array {
        let object = entry
            .as_object()
            .ok_or_else(|| FetchError::Parse("row is not an object".into()))?;
        let date = object
            .get("date")
            .and_then(Value::as_str)
            .ok_or_else(|| FetchError::Parse("row is missing a date".into()))?;
        let date: NaiveDate = date
            .parse()
            .map_err(|_| FetchError::Parse(format!("bad date: {date}")))?;

        let mut row = Observation::new(location, date, source_url);
        for (key, value) in object {
            if key == "date" {
                continue;
            }
            if let Some(n) = value.as_i64() {
                row.metrics.insert(key.clone(), MetricValue::Count(n));
            } else if let Some(r) = value.as_f64() {
                row.metrics.insert(key.clone(), MetricValue::Rate(r));
            }
        }
        rows.push(row);
    }
    Ok(rows)
}
