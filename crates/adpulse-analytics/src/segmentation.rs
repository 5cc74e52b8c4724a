//! Per-dimension breakdowns.

use std::collections::BTreeMap;

use adpulse_core::{DatasetRow, Dimension, SegmentMetrics, Totals};
use rayon::prelude::*;

/// Group `rows` by `dimension` and compute metrics per group.
///
/// Sorted by spend descending; equal spend falls back to segment name.
#[must_use]
pub fn segment_by(rows: &[DatasetRow], dimension: Dimension) -> Vec<SegmentMetrics> {
    let mut groups: BTreeMap<&str, Totals> = BTreeMap::new();
    for row in rows {
        groups.entry(dimension.value_of(row)).or_default().add(row);
    }

    let mut segments: Vec<SegmentMetrics> = groups
        .into_iter()
        .map(|(name, totals)| SegmentMetrics::from_totals(name.to_string(), totals))
        .collect();
    segments.sort_by(|a, b| {
        b.totals
            .spend
            .total_cmp(&a.totals.spend)
            .then_with(|| a.segment.cmp(&b.segment))
    });
    segments
}

/// Breakdowns for all four dimensions, aggregated in parallel.
#[must_use]
pub fn compute_segmentation(rows: &[DatasetRow]) -> BTreeMap<String, Vec<SegmentMetrics>> {
    Dimension::ALL
        .par_iter()
        .map(|&dim| (dim.as_str().to_string(), segment_by(rows, dim)))
        .collect()
}
