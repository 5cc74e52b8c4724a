use serde::{Deserialize, Serialize};

/// Columns every campaign-day CSV must carry unless the config narrows the list.
pub const REQUIRED_COLUMNS: [&str; 10] = [
    "campaign_name",
    "date",
    "spend",
    "impressions",
    "clicks",
    "purchases",
    "revenue",
    "creative_type",
    "audience_type",
    "platform",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'; expected text or json")),
        }
    }
}

/// Fractional thresholds, all in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    pub low_ctr: f64,
    pub high_confidence: f64,
    /// Relative change (e.g. `0.15` = 15 %) treated as a large effect.
    pub roas_change_significant: f64,
    /// Band around zero (e.g. `0.05` = ±5 %) classified as a stable trend.
    pub trend_stable_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_ctr: 0.01,
            high_confidence: 0.7,
            roas_change_significant: 0.15,
            trend_stable_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSettings {
    pub max_hypotheses: usize,
    /// Minimum rows on each side of a trend window or significance test.
    pub min_data_points: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_hypotheses: 5,
            min_data_points: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub backoff_multiplier: f64,
    pub base_delay_secs: f64,
    /// Wall-clock budget for one stage invocation, retries included.
    pub max_wall_clock_secs: Option<f64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_multiplier: 2.0,
            base_delay_secs: 1.0,
            max_wall_clock_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataQualitySettings {
    /// Largest tolerated fraction of rows dropped for missing values.
    pub max_missing_percentage: f64,
    pub required_fields: Vec<String>,
}

impl Default for DataQualitySettings {
    fn default() -> Self {
        Self {
            max_missing_percentage: 0.1,
            required_fields: REQUIRED_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}

/// Weights of the three confidence signals; must sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfidenceWeights {
    pub insight_confidence: f64,
    pub validation_strength: f64,
    pub segmentation_evidence: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            insight_confidence: 0.4,
            validation_strength: 0.4,
            segmentation_evidence: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Full configuration for one analysis run.
///
/// Every section falls back to its defaults when absent from the YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub thresholds: Thresholds,
    pub agents: AgentSettings,
    pub retry: RetrySettings,
    pub random_seed: u64,
    pub data_quality: DataQualitySettings,
    pub confidence_weights: ConfidenceWeights,
    pub logging: LoggingSettings,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            agents: AgentSettings::default(),
            retry: RetrySettings::default(),
            random_seed: 42,
            data_quality: DataQualitySettings::default(),
            confidence_weights: ConfidenceWeights::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AnalysisConfig {
    /// Stable-trend band expressed in percentage points.
    #[must_use]
    pub fn trend_threshold_pct(&self) -> f64 {
        self.thresholds.trend_stable_threshold * 100.0
    }
}
