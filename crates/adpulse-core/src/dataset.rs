//! Campaign-day rows and the immutable dataset summary built from them.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Divide, reporting `None` instead of a non-finite value when `den` is zero.
#[must_use]
pub fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

/// One cleaned campaign-day record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub campaign_name: String,
    pub date: NaiveDate,
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub purchases: u64,
    pub revenue: f64,
    pub creative_type: String,
    pub audience_type: String,
    pub platform: String,
    pub creative_message: Option<String>,
    pub country: Option<String>,
}

impl DatasetRow {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ctr(&self) -> Option<f64> {
        ratio(self.clicks as f64, self.impressions as f64)
    }

    #[must_use]
    pub fn roas(&self) -> Option<f64> {
        ratio(self.revenue, self.spend)
    }
}

/// Categorical dimensions used for segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    CampaignName,
    CreativeType,
    AudienceType,
    Platform,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::CampaignName,
        Dimension::CreativeType,
        Dimension::AudienceType,
        Dimension::Platform,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::CampaignName => "campaign_name",
            Dimension::CreativeType => "creative_type",
            Dimension::AudienceType => "audience_type",
            Dimension::Platform => "platform",
        }
    }

    /// The row's value along this dimension.
    #[must_use]
    pub fn value_of(self, row: &DatasetRow) -> &str {
        match self {
            Dimension::CampaignName => &row.campaign_name,
            Dimension::CreativeType => &row.creative_type,
            Dimension::AudienceType => &row.audience_type,
            Dimension::Platform => &row.platform,
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ratio metrics tracked by the engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Roas,
    Ctr,
    Cpc,
    ConversionRate,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Roas, Metric::Ctr, Metric::Cpc, Metric::ConversionRate];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Roas => "roas",
            Metric::Ctr => "ctr",
            Metric::Cpc => "cpc",
            Metric::ConversionRate => "conversion_rate",
        }
    }

    /// Evaluate the metric over aggregated totals.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_totals(self, totals: &Totals) -> Option<f64> {
        match self {
            Metric::Roas => ratio(totals.revenue, totals.spend),
            Metric::Ctr => ratio(totals.clicks as f64, totals.impressions as f64),
            Metric::Cpc => ratio(totals.spend, totals.clicks as f64),
            Metric::ConversionRate => ratio(totals.purchases as f64, totals.clicks as f64),
        }
    }

    /// Evaluate the metric on a single row; `None` when its denominator is zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn for_row(self, row: &DatasetRow) -> Option<f64> {
        match self {
            Metric::Roas => row.roas(),
            Metric::Ctr => row.ctr(),
            Metric::Cpc => ratio(row.spend, row.clicks as f64),
            Metric::ConversionRate => ratio(row.purchases as f64, row.clicks as f64),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Additive totals over a set of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub rows: usize,
    pub spend: f64,
    pub revenue: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub purchases: u64,
}

impl Totals {
    pub fn add(&mut self, row: &DatasetRow) {
        self.rows += 1;
        self.spend += row.spend;
        self.revenue += row.revenue;
        self.impressions += row.impressions;
        self.clicks += row.clicks;
        self.purchases += row.purchases;
    }

    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a DatasetRow>,
    {
        let mut totals = Self::default();
        for row in rows {
            totals.add(row);
        }
        totals
    }
}

/// Aggregate ratio metrics; `None` where the denominator was zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub overall_roas: Option<f64>,
    pub overall_ctr: Option<f64>,
    pub avg_cpc: Option<f64>,
    pub conversion_rate: Option<f64>,
}

impl AggregateMetrics {
    #[must_use]
    pub fn from_totals(totals: &Totals) -> Self {
        Self {
            overall_roas: Metric::Roas.from_totals(totals),
            overall_ctr: Metric::Ctr.from_totals(totals),
            avg_cpc: Metric::Cpc.from_totals(totals),
            conversion_rate: Metric::ConversionRate.from_totals(totals),
        }
    }

    #[must_use]
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Roas => self.overall_roas,
            Metric::Ctr => self.overall_ctr,
            Metric::Cpc => self.avg_cpc,
            Metric::ConversionRate => self.conversion_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Period-over-period movement of one metric. Changes are signed percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub week_over_week_change: Option<f64>,
    pub month_over_month_change: Option<f64>,
}

/// Metrics for one group of a dimension breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetrics {
    pub segment: String,
    pub totals: Totals,
    pub roas: Option<f64>,
    pub ctr: Option<f64>,
    pub cpc: Option<f64>,
    pub conversion_rate: Option<f64>,
}

impl SegmentMetrics {
    #[must_use]
    pub fn from_totals(segment: String, totals: Totals) -> Self {
        let metrics = AggregateMetrics::from_totals(&totals);
        Self {
            segment,
            totals,
            roas: metrics.overall_roas,
            ctr: metrics.overall_ctr,
            cpc: metrics.avg_cpc,
            conversion_rate: metrics.conversion_rate,
        }
    }

    #[must_use]
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Roas => self.roas,
            Metric::Ctr => self.ctr,
            Metric::Cpc => self.cpc,
            Metric::ConversionRate => self.conversion_rate,
        }
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// A rejected raw value, kept as an example in the quality report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidValue {
    pub line: usize,
    pub value: String,
}

/// What the cleaning pass dropped or repaired.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub rows_read: usize,
    /// Rows excluded for an empty required value, per field.
    pub missing_values: BTreeMap<String, usize>,
    /// Total rows excluded for any reason.
    pub invalid_rows: usize,
    pub invalid_dates: usize,
    pub invalid_date_examples: Vec<InvalidValue>,
    pub non_numeric_values: BTreeMap<String, usize>,
    pub constraint_violations: usize,
    /// Rows whose supplied `ctr`/`roas` disagreed with the recomputed value.
    pub recomputed_derived: usize,
}

/// Immutable per-run snapshot produced by the metrics, trend and
/// segmentation engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_rows: usize,
    pub date_range: Option<DateRange>,
    pub total_spend: f64,
    pub total_revenue: f64,
    pub campaigns_count: usize,
    pub metrics: AggregateMetrics,
    /// Keyed by metric name (`roas`, `ctr`, ...).
    pub trends: BTreeMap<String, Trend>,
    /// Keyed by dimension name; each list sorted by spend descending.
    pub segmentation: BTreeMap<String, Vec<SegmentMetrics>>,
    pub data_quality: DataQuality,
}

impl DatasetSummary {
    #[must_use]
    pub fn trend(&self, metric: Metric) -> Option<&Trend> {
        self.trends.get(metric.as_str())
    }

    #[must_use]
    pub fn segments(&self, dimension: Dimension) -> &[SegmentMetrics] {
        self.segmentation
            .get(dimension.as_str())
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn segment(&self, dimension: Dimension, value: &str) -> Option<&SegmentMetrics> {
        self.segments(dimension).iter().find(|s| s.segment == value)
    }
}
