//! Rolling-window derivations: trailing sums and ratios.
//!
//! Windows are row-based: a window of 7 covers the current row and the six
//! before it. A window with fewer rows, or with any absent value inside
//! it, contributes no output: explicit absence, never a zero and never a
//! partial sum.

use epiwatch_core::{MetricValue, Series};

use crate::error::SeriesError;
use crate::repair::round_to;

/// Trailing window over one metric. `None` when the window is short or has
/// a gap; `(sum, all_counts)` otherwise.
fn window_sum(series: &Series, metric: &str, end: usize, window: usize) -> Option<(f64, bool)> {
    if end + 1 < window {
        return None;
    }
    let mut sum = 0.0;
    let mut all_counts = true;
    for row in &series.rows()[end + 1 - window..=end] {
        match row.metric(metric)? {
            MetricValue::Count(n) => sum += n as f64,
            MetricValue::Rate(r) => {
                sum += r;
                all_counts = false;
            }
        }
    }
    Some((sum, all_counts))
}

/// Add a trailing sum of `metric` as `output` (e.g. 7-day total doses).
///
/// Sums of counts stay counts; anything else becomes a rate.
pub fn rolling_sum(
    series: Series,
    metric: &str,
    output: &str,
    window: usize,
) -> Result<Series, SeriesError> {
    let mut out: Vec<Option<MetricValue>> = Vec::with_capacity(series.len());
    for i in 0..series.len() {
        out.push(window_sum(&series, metric, i, window).map(|(sum, all_counts)| {
            if all_counts {
                MetricValue::Count(sum as i64)
            } else {
                MetricValue::Rate(sum)
            }
        }));
    }
    attach(series, output, out)
}

/// Add the ratio of two trailing sums as `output`, rounded to `decimals`
/// (e.g. the 7-day positive rate: positives over tests).
///
/// A short window, a gap in either metric, or a zero denominator all
/// produce absence rather than a wrong ratio.
pub fn rolling_ratio(
    series: Series,
    numerator: &str,
    denominator: &str,
    output: &str,
    window: usize,
    decimals: u32,
) -> Result<Series, SeriesError> {
    let mut out: Vec<Option<MetricValue>> = Vec::with_capacity(series.len());
    for i in 0..series.len() {
        let value = match (
            window_sum(&series, numerator, i, window),
            window_sum(&series, denominator, i, window),
        ) {
            (Some((num, _)), Some((den, _))) if den != 0.0 => {
                Some(MetricValue::Rate(round_to(num / den, decimals)))
            }
            _ => None,
        };
        out.push(value);
    }
    attach(series, output, out)
}

fn attach(
    series: Series,
    output: &str,
    values: Vec<Option<MetricValue>>,
) -> Result<Series, SeriesError> {
    let location = series.location.clone();
    let rows = series
        .into_rows()
        .into_iter()
        .zip(values)
        .map(|(mut row, value)| {
            if let Some(value) = value {
                row.metrics.insert(output.to_string(), value);
            }
            row
        })
        .collect();
    Ok(Series::from_rows(location, rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use epiwatch_core::Observation;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn series(points: &[(u32, Option<i64>, Option<i64>)]) -> Series {
        let rows = points
            .iter()
            .map(|(day, positives, tests)| {
                let mut row = Observation::new("Utopia", d(*day), "https://example.org");
                if let Some(p) = positives {
                    row = row.with_metric("positives", *p);
                }
                if let Some(t) = tests {
                    row = row.with_metric("tests", *t);
                }
                row
            })
            .collect();
        Series::from_rows("Utopia", rows).unwrap()
    }

    #[test]
    fn short_windows_produce_absence() {
        let input = series(&[(1, Some(1), Some(10)), (2, Some(1), Some(10)), (3, Some(1), Some(10))]);
        let out = rolling_sum(input, "tests", "tests_7d", 7).unwrap();
        assert!(out.rows().iter().all(|r| r.metric("tests_7d").is_none()));
    }

    #[test]
    fn full_window_sums_counts() {
        let points: Vec<_> = (1..=8).map(|day| (day, Some(2_i64), Some(10_i64))).collect();
        let out = rolling_sum(series(&points), "tests", "tests_7d", 7).unwrap();
        assert_eq!(out.rows()[5].metric("tests_7d"), None);
        assert_eq!(out.rows()[6].metric("tests_7d"), Some(MetricValue::Count(70)));
        assert_eq!(out.rows()[7].metric("tests_7d"), Some(MetricValue::Count(70)));
    }

    #[test]
    fn ratio_rounds_to_decimals() {
        let points: Vec<_> = (1..=7).map(|day| (day, Some(1_i64), Some(3_i64))).collect();
        let out = rolling_ratio(series(&points), "positives", "tests", "positive_rate", 7, 3)
            .unwrap();
        assert_eq!(
            out.rows()[6].metric("positive_rate"),
            Some(MetricValue::Rate(0.333))
        );
    }

    #[test]
    fn gap_inside_window_produces_absence() {
        let mut points: Vec<_> = (1..=8).map(|day| (day, Some(1_i64), Some(10_i64))).collect();
        points[3].2 = None; // day 4 has no test count
        let out = rolling_ratio(series(&points), "positives", "tests", "positive_rate", 7, 3)
            .unwrap();
        // Windows ending on days 7..=8 include day 4.
        assert_eq!(out.rows()[6].metric("positive_rate"), None);
        assert_eq!(out.rows()[7].metric("positive_rate"), None);
    }

    #[test]
    fn zero_denominator_produces_absence() {
        let points: Vec<_> = (1..=7).map(|day| (day, Some(0_i64), Some(0_i64))).collect();
        let out = rolling_ratio(series(&points), "positives", "tests", "positive_rate", 7, 3)
            .unwrap();
        assert_eq!(out.rows()[6].metric("positive_rate"), None);
    }

    #[test]
    fn existing_metrics_are_untouched() {
        let points: Vec<_> = (1..=7).map(|day| (day, Some(1_i64), Some(10_i64))).collect();
        let out = rolling_ratio(series(&points), "positives", "tests", "positive_rate", 7, 3)
            .unwrap();
        assert_eq!(out.rows()[0].metric("positives"), Some(MetricValue::Count(1)));
        assert_eq!(out.rows()[6].metric("tests"), Some(MetricValue::Count(10)));
    }
}
