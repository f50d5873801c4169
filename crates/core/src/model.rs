//! Shared data model: metric values, observations, per-location series.

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by data-model constructors.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("duplicate date {date} in series for {location}")]
    DuplicateDate { location: String, date: NaiveDate },

    #[error("observation for {found} mixed into series for {expected}")]
    LocationMismatch { expected: String, found: String },
}

// ── Metric values ────────────────────────────────────────────────────

/// A single metric value.
///
/// Absolute counts keep integer semantics; ratios are fixed-precision
/// floats. "No data" is the *absence* of the metric key in an
/// [`Observation`], never a zero; an explicit `Count(0)` means a source
/// genuinely reported zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Count(i64),
    Rate(f64),
}

impl MetricValue {
    /// Numeric view for comparisons and arithmetic.
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Count(n) => *n as f64,
            MetricValue::Rate(r) => *r,
        }
    }
}

impl From<i64> for MetricValue {
    fn from(n: i64) -> Self {
        MetricValue::Count(n)
    }
}

impl From<f64> for MetricValue {
    fn from(r: f64) -> Self {
        MetricValue::Rate(r)
    }
}

// ── Observation ──────────────────────────────────────────────────────

/// One normalized data point for a location on a date.
///
/// Produced by an [`crate::Adapter`]; immutable once created. Metric order
/// is preserved so serialized rows keep stable columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub location: String,
    pub date: NaiveDate,
    pub metrics: IndexMap<String, MetricValue>,
    pub source_url: String,
}

impl Observation {
    pub fn new(location: impl Into<String>, date: NaiveDate, source_url: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            date,
            metrics: IndexMap::new(),
            source_url: source_url.into(),
        }
    }

    /// Builder-style metric insertion.
    pub fn with_metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(name.into(), value.into());
        self
    }

    pub fn metric(&self, name: &str) -> Option<MetricValue> {
        self.metrics.get(name).copied()
    }
}

// ── Cadence ──────────────────────────────────────────────────────────

/// Expected reporting interval of a source, used by the merge continuity
/// check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    #[default]
    Daily,
    Weekly,
}

impl Cadence {
    pub fn interval_days(&self) -> i64 {
        match self {
            Cadence::Daily => 1,
            Cadence::Weekly => 7,
        }
    }
}

// ── Series ───────────────────────────────────────────────────────────

/// Ordered observations for one (location, domain): sorted ascending by
/// date, unique dates. The constructor enforces both invariants; every
/// engine function preserves them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub location: String,
    rows: Vec<Observation>,
}

impl Series {
    /// Build a series from unordered rows. Sorts ascending by date and
    /// rejects duplicate dates or rows for a different location.
    pub fn from_rows(
        location: impl Into<String>,
        mut rows: Vec<Observation>,
    ) -> Result<Self, ModelError> {
        let location = location.into();
        for row in &rows {
            if row.location != location {
                return Err(ModelError::LocationMismatch {
                    expected: location,
                    found: row.location.clone(),
                });
            }
        }
        rows.sort_by_key(|r| r.date);
        for pair in rows.windows(2) {
            if pair[0].date == pair[1].date {
                return Err(ModelError::DuplicateDate {
                    location,
                    date: pair[0].date,
                });
            }
        }
        Ok(Self { location, rows })
    }

    /// Empty series for a location (first run, nothing persisted yet).
    pub fn empty(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Observation> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.iter().map(|r| r.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn obs(date: &str, total: i64) -> Observation {
        Observation::new("Utopia", d(date), "https://example.org")
            .with_metric("total_vaccinations", total)
    }

    #[test]
    fn from_rows_sorts_ascending() {
        let series = Series::from_rows(
            "Utopia",
            vec![obs("2024-01-03", 3), obs("2024-01-01", 1), obs("2024-01-02", 2)],
        )
        .unwrap();
        let dates: Vec<_> = series.dates().collect();
        assert_eq!(dates, vec![d("2024-01-01"), d("2024-01-02"), d("2024-01-03")]);
    }

    #[test]
    fn from_rows_rejects_duplicate_date() {
        let err = Series::from_rows("Utopia", vec![obs("2024-01-01", 1), obs("2024-01-01", 2)])
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateDate { .. }));
    }

    #[test]
    fn from_rows_rejects_foreign_location() {
        let mut foreign = obs("2024-01-01", 1);
        foreign.location = "Ruritania".into();
        let err = Series::from_rows("Utopia", vec![foreign]).unwrap_err();
        assert!(matches!(err, ModelError::LocationMismatch { .. }));
    }

    #[test]
    fn absent_metric_is_none_not_zero() {
        let row = obs("2024-01-01", 5);
        assert_eq!(row.metric("total_vaccinations"), Some(MetricValue::Count(5)));
        assert_eq!(row.metric("people_vaccinated"), None);
    }

    #[test]
    fn metric_value_roundtrips_untagged() {
        let count: MetricValue = serde_json::from_str("42").unwrap();
        assert_eq!(count, MetricValue::Count(42));
        let rate: MetricValue = serde_json::from_str("0.125").unwrap();
        assert_eq!(rate, MetricValue::Rate(0.125));
        assert_eq!(serde_json::to_string(&count).unwrap(), "42");
    }

    #[test]
    fn cadence_intervals() {
        assert_eq!(Cadence::Daily.interval_days(), 1);
        assert_eq!(Cadence::Weekly.interval_days(), 7);
    }
}
