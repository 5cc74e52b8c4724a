//! Week-over-week and month-over-month movement of the tracked metrics.

use std::collections::BTreeMap;

use adpulse_core::{AnalysisConfig, DatasetRow, DateRange, Metric, Totals, Trend, TrendDirection};
use chrono::{Days, NaiveDate};

pub const WEEK_DAYS: u64 = 7;
pub const MONTH_DAYS: u64 = 28;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendSettings {
    /// Minimum rows on each side of a comparison.
    pub min_data_points: usize,
    /// Percentage band treated as stable, e.g. `5.0` for ±5 %.
    pub stable_threshold_pct: f64,
}

impl TrendSettings {
    #[must_use]
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            min_data_points: config.agents.min_data_points,
            stable_threshold_pct: config.trend_threshold_pct(),
        }
    }
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

/// Latest date present in `rows`.
#[must_use]
pub fn latest_date(rows: &[DatasetRow]) -> Option<NaiveDate> {
    rows.iter().map(|r| r.date).max()
}

/// `(recent, prior)` inclusive windows of `days` days ending at `anchor`.
#[must_use]
pub fn window_bounds(anchor: NaiveDate, days: u64) -> (DateRange, DateRange) {
    let back = |n: u64| anchor.checked_sub_days(Days::new(n)).unwrap_or(NaiveDate::MIN);
    let recent = DateRange {
        start: back(days - 1),
        end: anchor,
    };
    let prior = DateRange {
        start: back(2 * days - 1),
        end: back(days),
    };
    (recent, prior)
}

/// Totals for two adjacent windows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowComparison {
    pub recent: Totals,
    pub prior: Totals,
}

impl WindowComparison {
    #[must_use]
    pub fn collect(rows: &[DatasetRow], anchor: NaiveDate, days: u64) -> Self {
        Self::collect_where(rows, anchor, days, |_| true)
    }

    /// Like [`WindowComparison::collect`], restricted to rows matching `keep`.
    #[must_use]
    pub fn collect_where<F>(rows: &[DatasetRow], anchor: NaiveDate, days: u64, keep: F) -> Self
    where
        F: Fn(&DatasetRow) -> bool,
    {
        let (recent_range, prior_range) = window_bounds(anchor, days);
        let mut out = Self::default();
        for row in rows.iter().filter(|r| keep(r)) {
            if recent_range.contains(row.date) {
                out.recent.add(row);
            } else if prior_range.contains(row.date) {
                out.prior.add(row);
            }
        }
        out
    }

    /// Percent change of `metric` between the windows, or `None` when either
    /// side is too thin or the prior value is zero or undefined.
    #[must_use]
    pub fn change(&self, metric: Metric, min_data_points: usize) -> Option<f64> {
        if self.recent.rows < min_data_points || self.prior.rows < min_data_points {
            return None;
        }
        percent_change(
            metric.from_totals(&self.recent)?,
            metric.from_totals(&self.prior)?,
        )
    }
}

/// `(recent - prior) / prior * 100`; `None` when `prior` is zero.
#[must_use]
pub fn percent_change(recent: f64, prior: f64) -> Option<f64> {
    if prior == 0.0 {
        return None;
    }
    let change = (recent - prior) / prior * 100.0;
    change.is_finite().then_some(change)
}

/// Classify a signed percentage against a symmetric stable band.
#[must_use]
pub fn classify_change(change: f64, threshold_pct: f64) -> TrendDirection {
    if change > threshold_pct {
        TrendDirection::Increasing
    } else if change < -threshold_pct {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    }
}

/// Trend of one metric. The direction follows MoM when available, else WoW.
#[must_use]
pub fn compute_trend(rows: &[DatasetRow], metric: Metric, settings: &TrendSettings) -> Trend {
    let Some(anchor) = latest_date(rows) else {
        return Trend {
            direction: TrendDirection::Stable,
            week_over_week_change: None,
            month_over_month_change: None,
        };
    };

    let min = settings.min_data_points;
    let wow = WindowComparison::collect(rows, anchor, WEEK_DAYS).change(metric, min);
    let mom = WindowComparison::collect(rows, anchor, MONTH_DAYS).change(metric, min);

    let direction = mom.or(wow).map_or(TrendDirection::Stable, |c| {
        classify_change(c, settings.stable_threshold_pct)
    });

    Trend {
        direction,
        week_over_week_change: wow,
        month_over_month_change: mom,
    }
}

/// Trends for every tracked metric, keyed by metric name.
#[must_use]
pub fn compute_trends(rows: &[DatasetRow], settings: &TrendSettings) -> BTreeMap<String, Trend> {
    let trends: BTreeMap<String, Trend> = Metric::ALL
        .iter()
        .map(|&m| (m.as_str().to_string(), compute_trend(rows, m, settings)))
        .collect();
    for (metric, trend) in &trends {
        tracing::debug!(
            metric = %metric,
            direction = ?trend.direction,
            wow = ?trend.week_over_week_change,
            mom = ?trend.month_over_month_change,
            "trend computed"
        );
    }
    trends
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn row(day: u32, spend: f64, revenue: f64) -> DatasetRow {
        DatasetRow {
            campaign_name: "A".to_string(),
            date: date(day),
            spend,
            impressions: 1000,
            clicks: 20,
            purchases: 2,
            revenue,
            creative_type: "video".to_string(),
            audience_type: "broad".to_string(),
            platform: "facebook".to_string(),
            creative_message: None,
            country: None,
        }
    }

    fn settings(min_data_points: usize) -> TrendSettings {
        TrendSettings {
            min_data_points,
            stable_threshold_pct: 5.0,
        }
    }

    #[test]
    fn window_bounds_are_inclusive_and_adjacent() {
        let (recent, prior) = window_bounds(date(14), WEEK_DAYS);
        assert_eq!(recent.start, date(8));
        assert_eq!(recent.end, date(14));
        assert_eq!(prior.start, date(1));
        assert_eq!(prior.end, date(7));
    }

    #[test]
    fn classification_boundaries_are_strict() {
        assert_eq!(classify_change(5.0, 5.0), TrendDirection::Stable);
        assert_eq!(classify_change(-5.0, 5.0), TrendDirection::Stable);
        assert_eq!(classify_change(5.01, 5.0), TrendDirection::Increasing);
        assert_eq!(classify_change(-5.01, 5.0), TrendDirection::Decreasing);
    }

    #[test]
    fn percent_change_with_zero_prior_is_none() {
        assert_eq!(percent_change(3.0, 0.0), None);
        assert_eq!(percent_change(110.0, 100.0), Some(10.0));
    }

    #[test]
    fn week_over_week_drop_is_decreasing() {
        // Prior week ROAS 3.0, recent week ROAS 2.4: -20 %.
        let rows: Vec<DatasetRow> = (1..=14)
            .map(|d| if d <= 7 { row(d, 100.0, 300.0) } else { row(d, 100.0, 240.0) })
            .collect();
        let trend = compute_trend(&rows, Metric::Roas, &settings(7));
        let wow = trend.week_over_week_change.unwrap();
        assert!((wow + 20.0).abs() < 1e-9);
        assert_eq!(trend.month_over_month_change, None);
        assert_eq!(trend.direction, TrendDirection::Decreasing);
    }

    #[test]
    fn sparse_windows_are_skipped() {
        let rows: Vec<DatasetRow> = (1..=14).map(|d| row(d, 100.0, 300.0)).collect();
        let trend = compute_trend(&rows, Metric::Roas, &settings(10));
        assert_eq!(trend.week_over_week_change, None);
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn empty_rows_are_stable() {
        let trend = compute_trend(&[], Metric::Ctr, &settings(1));
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.week_over_week_change, None);
    }

    #[test]
    fn trends_cover_every_metric() {
        let rows: Vec<DatasetRow> = (1..=14).map(|d| row(d, 100.0, 300.0)).collect();
        let trends = compute_trends(&rows, &settings(7));
        assert_eq!(trends.len(), 4);
        assert_eq!(trends["ctr"].week_over_week_change, Some(0.0));
        assert_eq!(trends["ctr"].direction, TrendDirection::Stable);
    }

    proptest! {
        #[test]
        fn classification_is_symmetric_around_the_stable_band(
            change in -500.0_f64..500.0,
            threshold in 0.0_f64..50.0,
        ) {
            let up = classify_change(change, threshold);
            let down = classify_change(-change, threshold);
            match up {
                TrendDirection::Increasing => {
                    prop_assert!(change > threshold);
                    prop_assert_eq!(down, TrendDirection::Decreasing);
                }
                TrendDirection::Decreasing => {
                    prop_assert!(change < -threshold);
                    prop_assert_eq!(down, TrendDirection::Increasing);
                }
                TrendDirection::Stable => {
                    prop_assert!(change.abs() <= threshold);
                    prop_assert_eq!(down, TrendDirection::Stable);
                }
            }
        }
    }
}
