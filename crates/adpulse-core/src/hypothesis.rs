//! Candidate hypotheses and their validated form.

use serde::{Deserialize, Serialize};

use crate::dataset::{Dimension, Metric};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Creative,
    Audience,
    Platform,
    Budget,
    Seasonality,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Creative => write!(f, "creative"),
            Category::Audience => write!(f, "audience"),
            Category::Platform => write!(f, "platform"),
            Category::Budget => write!(f, "budget"),
            Category::Seasonality => write!(f, "seasonality"),
        }
    }
}

/// Which way the hypothesis claims the focus metric moved (or sits relative
/// to the rest of the population, for segment claims).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedDirection {
    Increase,
    #[default]
    Decrease,
}

impl ExpectedDirection {
    /// `+1.0` for increase, `-1.0` for decrease.
    #[must_use]
    pub fn sign(self) -> f64 {
        match self {
            ExpectedDirection::Increase => 1.0,
            ExpectedDirection::Decrease => -1.0,
        }
    }
}

/// A single group of one dimension, e.g. `creative_type = video`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRef {
    pub dimension: Dimension,
    pub value: String,
}

/// A candidate explanation received from the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    #[serde(rename = "hypothesis_id")]
    pub id: String,
    #[serde(rename = "hypothesis_text")]
    pub text: String,
    pub category: Category,
    /// Initial confidence in `[0, 1]`.
    #[serde(rename = "confidence_score")]
    pub confidence: f64,
    #[serde(default)]
    pub evidence_used: Vec<String>,
    #[serde(default)]
    pub focus_metric: Metric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<SegmentRef>,
    #[serde(default)]
    pub expected_direction: ExpectedDirection,
    #[serde(default)]
    pub supporting_observations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_approach: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceMetric {
    pub metric_name: String,
    pub value: f64,
    pub comparison_text: String,
}

/// Outcome of a two-sample significance test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Significance {
    pub test: String,
    pub p_value: f64,
    /// 95 % interval for the difference in means (sample minus reference).
    pub confidence_interval: [f64; 2],
    pub sample_size: usize,
    pub reference_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub metrics: Vec<EvidenceMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistical_significance: Option<Significance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Confirmed,
    Rejected,
    Inconclusive,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationStatus::Confirmed => write!(f, "confirmed"),
            ValidationStatus::Rejected => write!(f, "rejected"),
            ValidationStatus::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

/// A hypothesis after validation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedHypothesis {
    #[serde(flatten)]
    pub hypothesis: Hypothesis,
    pub evidence: Evidence,
    pub validation_status: ValidationStatus,
    pub adjusted_confidence_score: f64,
    pub validation_reasoning: String,
}

impl ValidatedHypothesis {
    #[must_use]
    pub fn has_significance(&self) -> bool {
        self.evidence.statistical_significance.is_some()
    }
}
