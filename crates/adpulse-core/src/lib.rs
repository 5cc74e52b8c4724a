//! Shared configuration, error taxonomy and data model for adpulse.
//!
//! Every other crate in the workspace depends on this one; it carries no
//! analytics logic of its own.

pub mod app_config;
pub mod config;
pub mod dataset;
pub mod envelope;
pub mod error;
pub mod hypothesis;

pub use app_config::{
    AgentSettings, AnalysisConfig, ConfidenceWeights, DataQualitySettings, LogFormat,
    LoggingSettings, RetrySettings, Thresholds, REQUIRED_COLUMNS,
};
pub use config::{load_config, load_config_from_env, validate_config};
pub use dataset::{
    ratio, AggregateMetrics, DataQuality, DatasetRow, DatasetSummary, DateRange, Dimension,
    InvalidValue, Metric, SegmentMetrics, Totals, Trend, TrendDirection,
};
pub use envelope::{Envelope, ErrorInfo, StageStatus};
pub use error::{ConfigError, PipelineError};
pub use hypothesis::{
    Category, Evidence, EvidenceMetric, ExpectedDirection, Hypothesis, SegmentRef, Significance,
    ValidatedHypothesis, ValidationStatus,
};
