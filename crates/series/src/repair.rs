//! Monotonic repair of cumulative metrics under a bounded-correction
//! policy.

use tracing::debug;

use epiwatch_core::Series;

use crate::error::SeriesError;

/// Force cumulative metrics to be non-decreasing in date order.
///
/// Scans ascending and keeps a running anchor per metric: any observation
/// whose value for some cumulative metric falls below the last retained
/// value is discarded whole-row. Absent values carry the last known value
/// forward and are never grounds for removal on their own. The output is a
/// subsequence of the input, and repairing it again is a no-op.
///
/// If more than `max_removed_rows` rows would be discarded, the repair is
/// aborted with [`SeriesError::RepairAborted`] carrying the discarded
/// dates, the guard against a source changing schema or units without
/// warning.
pub fn repair_monotonic(
    series: Series,
    cumulative_metrics: &[String],
    max_removed_rows: usize,
) -> Result<Series, SeriesError> {
    if cumulative_metrics.is_empty() {
        return Ok(series);
    }

    let location = series.location.clone();
    let mut anchors: Vec<Option<f64>> = vec![None; cumulative_metrics.len()];
    let mut kept = Vec::with_capacity(series.len());
    let mut removed_dates = Vec::new();

    for row in series.into_rows() {
        let dips = cumulative_metrics.iter().zip(anchors.iter()).any(|(metric, anchor)| {
            match (row.metric(metric), anchor) {
                (Some(value), Some(anchor)) => value.as_f64() < *anchor,
                _ => false,
            }
        });

        if dips {
            removed_dates.push(row.date);
            continue;
        }

        for (metric, anchor) in cumulative_metrics.iter().zip(anchors.iter_mut()) {
            if let Some(value) = row.metric(metric) {
                *anchor = Some(value.as_f64());
            }
        }
        kept.push(row);
    }

    if removed_dates.len() > max_removed_rows {
        return Err(SeriesError::RepairAborted {
            location,
            removed_dates,
            max_removed_rows,
        });
    }

    if !removed_dates.is_empty() {
        debug!(
            location = %location,
            removed = removed_dates.len(),
            "dropped non-monotonic rows"
        );
    }

    // Kept rows are a subsequence of an already valid series.
    Ok(Series::from_rows(location, kept)?)
}

/// Round to a fixed number of decimals.
pub(crate) fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
