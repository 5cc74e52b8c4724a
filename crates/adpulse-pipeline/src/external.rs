//! Hypotheses supplied by an external generator as a JSON file.

use std::path::{Path, PathBuf};

use adpulse_core::{DatasetSummary, Hypothesis, PipelineError};
use adpulse_insights::HypothesisGenerator;
use serde_json::{json, Value};

use crate::schema::{check, hypothesis_list_shape};

/// Reads a JSON array of hypotheses written by another tool.
///
/// The file is read on every `generate` call so a retried stage sees the
/// latest content.
#[derive(Debug, Clone)]
pub struct JsonFileGenerator {
    path: PathBuf,
}

impl JsonFileGenerator {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl HypothesisGenerator for JsonFileGenerator {
    fn generate(&self, _summary: &DatasetSummary) -> Result<Vec<Hypothesis>, PipelineError> {
        let shown = self.path.display().to_string();
        let text =
            std::fs::read_to_string(&self.path).map_err(|e| PipelineError::io(&shown, e))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            PipelineError::validation(
                format!("Hypothesis file is not valid JSON: {e}"),
                json!({ "path": shown, "line": e.line(), "column": e.column() }),
            )
        })?;
        check(&value, &hypothesis_list_shape(), "external_hypotheses")?;
        let hypotheses: Vec<Hypothesis> = serde_json::from_value(value).map_err(|e| {
            PipelineError::validation(
                format!("Hypothesis file could not be decoded: {e}"),
                json!({ "path": shown }),
            )
        })?;
        tracing::info!(path = %shown, count = hypotheses.len(), "external hypotheses loaded");
        Ok(hypotheses)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use adpulse_core::{Category, ExpectedDirection, Metric};
    use tempfile::NamedTempFile;

    use super::*;

    /// Writes `body` to a temp file that is removed when the handle drops.
    fn write(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    fn empty_summary() -> DatasetSummary {
        DatasetSummary {
            total_rows: 0,
            date_range: None,
            total_spend: 0.0,
            total_revenue: 0.0,
            campaigns_count: 0,
            metrics: adpulse_core::AggregateMetrics::default(),
            trends: std::collections::BTreeMap::new(),
            segmentation: std::collections::BTreeMap::new(),
            data_quality: adpulse_core::DataQuality::default(),
        }
    }

    #[test]
    fn loads_a_valid_list_with_defaults() {
        let file = write(
            r#"[
                {"hypothesis_id": "h1", "hypothesis_text": "Video fatigue", "category": "creative",
                 "confidence_score": 0.7,
                 "segment": {"dimension": "creative_type", "value": "video"}},
                {"hypothesis_id": "h2", "hypothesis_text": "Budget shift", "category": "budget",
                 "confidence_score": 0.5, "focus_metric": "ctr", "expected_direction": "increase"},
                {"hypothesis_id": "h3", "hypothesis_text": "Seasonal dip", "category": "seasonality",
                 "confidence_score": 0.4}
            ]"#,
        );
        let hypotheses = JsonFileGenerator::new(file.path())
            .generate(&empty_summary())
            .unwrap();

        assert_eq!(hypotheses.len(), 3);
        assert_eq!(hypotheses[0].category, Category::Creative);
        assert_eq!(hypotheses[0].focus_metric, Metric::Roas);
        assert_eq!(hypotheses[0].expected_direction, ExpectedDirection::Decrease);
        assert_eq!(hypotheses[1].focus_metric, Metric::Ctr);
        assert!(hypotheses[2].evidence_used.is_empty());
    }

    #[test]
    fn short_list_is_a_validation_error() {
        let file = write(
            r#"[{"hypothesis_id": "h1", "hypothesis_text": "x", "category": "creative",
                 "confidence_score": 0.7}]"#,
        );
        let err = JsonFileGenerator::new(file.path())
            .generate(&empty_summary())
            .unwrap_err();
        assert_eq!(err.error_type(), "ValidationError");
        assert!(!err.is_retryable());
    }

    #[test]
    fn malformed_json_reports_position() {
        let file = write("[{");
        let err = JsonFileGenerator::new(file.path())
            .generate(&empty_summary())
            .unwrap_err();
        assert_eq!(err.error_type(), "ValidationError");
        assert_eq!(err.details()["line"], 1);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = JsonFileGenerator::new(Path::new("/nonexistent/hypotheses.json"))
            .generate(&empty_summary())
            .unwrap_err();
        assert_eq!(err.error_type(), "IOError");
    }
}
