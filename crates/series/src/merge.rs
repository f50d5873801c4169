//! Merge freshly fetched data into the persisted canonical series.

use epiwatch_core::{Cadence, Series};

use crate::error::SeriesError;

/// Attach `incoming` to the persisted history for the same location.
///
/// Persisted rows dated before the incoming minimum are kept; rows on or
/// after it are discarded; new data takes precedence for any overlap.
/// The result has exactly `|dates(history) ∪ dates(incoming)|` rows.
///
/// When the incoming data starts *after* the persisted history, the gap
/// must be exactly one reporting interval; anything else is a
/// [`SeriesError::ContinuityGap`]. Overlapping starts are the precedence
/// case above and are accepted. The very first run for a location
/// (`persisted = None`) skips the check.
pub fn merge(
    persisted: Option<&Series>,
    incoming: Series,
    cadence: Cadence,
) -> Result<Series, SeriesError> {
    let Some(history) = persisted else {
        return Ok(incoming);
    };

    let Some(min_date) = incoming.first_date() else {
        // Nothing fetched; canonical history stands.
        return Ok(history.clone());
    };
    if let Some(last) = history.last_date() {
        if min_date > last {
            let expected = last + chrono::Duration::days(cadence.interval_days());
            if min_date != expected {
                return Err(SeriesError::ContinuityGap {
                    location: incoming.location.clone(),
                    last,
                    next: min_date,
                    expected,
                });
            }
        }
    }

    let location = incoming.location.clone();
    let rows = history
        .rows()
        .iter()
        .filter(|r| r.date < min_date)
        .cloned()
        .chain(incoming.into_rows())
        .collect();
    Ok(Series::from_rows(location, rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use epiwatch_core::{MetricValue, Observation};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn series(points: &[(&str, i64)]) -> Series {
        let rows = points
            .iter()
            .map(|(date, value)| {
                Observation::new("Utopia", d(date), "https://example.org")
                    .with_metric("total_vaccinations", *value)
            })
            .collect();
        Series::from_rows("Utopia", rows).unwrap()
    }

    #[test]
    fn overlap_takes_incoming_values() {
        let history = series(&[("2024-01-01", 100), ("2024-01-02", 110)]);
        let incoming = series(&[("2024-01-02", 112), ("2024-01-03", 120)]);
        let merged = merge(Some(&history), incoming, Cadence::Daily).unwrap();

        let got: Vec<_> = merged
            .rows()
            .iter()
            .map(|r| (r.date, r.metric("total_vaccinations").unwrap()))
            .collect();
        assert_eq!(
            got,
            vec![
                (d("2024-01-01"), MetricValue::Count(100)),
                (d("2024-01-02"), MetricValue::Count(112)),
                (d("2024-01-03"), MetricValue::Count(120)),
            ]
        );
    }

    #[test]
    fn row_count_is_union_of_dates() {
        let history = series(&[("2024-01-01", 1), ("2024-01-02", 2), ("2024-01-03", 3)]);
        let incoming = series(&[("2024-01-03", 30), ("2024-01-04", 40)]);
        let merged = merge(Some(&history), incoming, Cadence::Daily).unwrap();
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn gap_raises_continuity_error() {
        let history = series(&[("2024-01-04", 4), ("2024-01-05", 5)]);
        let incoming = series(&[("2024-01-10", 10)]);
        let err = merge(Some(&history), incoming, Cadence::Daily).unwrap_err();
        match err {
            SeriesError::ContinuityGap { last, next, expected, .. } => {
                assert_eq!(last, d("2024-01-05"));
                assert_eq!(next, d("2024-01-10"));
                assert_eq!(expected, d("2024-01-06"));
            }
            other => panic!("expected ContinuityGap, got {other:?}"),
        }
    }

    #[test]
    fn next_interval_start_is_continuous() {
        let history = series(&[("2024-01-05", 5)]);
        let incoming = series(&[("2024-01-06", 6)]);
        let merged = merge(Some(&history), incoming, Cadence::Daily).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn weekly_cadence_allows_seven_day_step() {
        let history = series(&[("2024-01-01", 1)]);
        let incoming = series(&[("2024-01-08", 2)]);
        let merged = merge(Some(&history), incoming, Cadence::Weekly).unwrap();
        assert_eq!(merged.len(), 2);

        let history = series(&[("2024-01-01", 1)]);
        let misaligned = series(&[("2024-01-04", 2)]);
        assert!(merge(Some(&history), misaligned, Cadence::Weekly).is_err());
    }

    #[test]
    fn first_run_skips_continuity_check() {
        let incoming = series(&[("2024-03-01", 7)]);
        let merged = merge(None, incoming, Cadence::Daily).unwrap();
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn empty_incoming_keeps_history() {
        let history = series(&[("2024-01-01", 1)]);
        let merged = merge(Some(&history), Series::empty("Utopia"), Cadence::Daily).unwrap();
        assert_eq!(merged, history);
    }
}
