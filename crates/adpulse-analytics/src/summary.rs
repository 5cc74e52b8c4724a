use std::collections::BTreeSet;

use adpulse_core::{DatasetSummary, DateRange, Totals};

use crate::ingest::Dataset;
use crate::segmentation::compute_segmentation;
use crate::trend::{compute_trends, TrendSettings};

/// Fold a cleaned dataset into the run's immutable summary.
#[must_use]
pub fn build_summary(dataset: &Dataset, settings: &TrendSettings) -> DatasetSummary {
    let rows = &dataset.rows;
    let totals = Totals::from_rows(rows);

    let date_range = match (rows.iter().map(|r| r.date).min(), rows.iter().map(|r| r.date).max()) {
        (Some(start), Some(end)) => Some(DateRange { start, end }),
        _ => None,
    };
    let campaigns_count = rows
        .iter()
        .map(|r| r.campaign_name.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    let summary = DatasetSummary {
        total_rows: rows.len(),
        date_range,
        total_spend: totals.spend,
        total_revenue: totals.revenue,
        campaigns_count,
        metrics: adpulse_core::AggregateMetrics::from_totals(&totals),
        trends: compute_trends(rows, settings),
        segmentation: compute_segmentation(rows),
        data_quality: dataset.quality.clone(),
    };

    tracing::info!(
        total_rows = summary.total_rows,
        campaigns = summary.campaigns_count,
        total_spend = summary.total_spend,
        overall_roas = ?summary.metrics.overall_roas,
        overall_ctr = ?summary.metrics.overall_ctr,
        "dataset summary built"
    );
    summary
}
