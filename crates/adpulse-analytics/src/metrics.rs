use adpulse_core::{AggregateMetrics, DatasetRow, Totals};

/// Aggregate ROAS, CTR, CPC and conversion rate over `rows`.
///
/// Ratios are taken over summed totals, never averaged per row, so a handful
/// of tiny rows cannot skew the result.
#[must_use]
pub fn compute_metrics(rows: &[DatasetRow]) -> AggregateMetrics {
    AggregateMetrics::from_totals(&Totals::from_rows(rows))
}

/// `|a - b| / |b|`, or `|a|` when `b` is zero.
#[must_use]
pub fn relative_error(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        a.abs()
    } else {
        ((a - b) / b).abs()
    }
}
