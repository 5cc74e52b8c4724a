use std::path::Path;
use std::time::Duration;

use crate::app_config::{AnalysisConfig, LogFormat, REQUIRED_COLUMNS};
use crate::ConfigError;

/// Columns the metrics engine cannot work without, whatever the config says.
const CORE_COLUMNS: [&str; 6] = [
    "campaign_name",
    "date",
    "spend",
    "impressions",
    "clicks",
    "revenue",
];

/// Load analysis configuration from an optional YAML file plus environment overrides.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
/// When `path` is `None` the built-in defaults are used as the base.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed, an override is
/// malformed, or a value is out of range.
pub fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_config_from_env(path)
}

/// Load configuration using only the variables already in the process environment.
///
/// Unlike [`load_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` on unreadable/unparseable files, malformed
/// overrides, or out-of-range values.
pub fn load_config_from_env(path: Option<&Path>) -> Result<AnalysisConfig, ConfigError> {
    let yaml = match path {
        Some(p) => Some(
            std::fs::read_to_string(p).map_err(|e| ConfigError::FileIo {
                path: p.display().to_string(),
                source: e,
            })?,
        ),
        None => None,
    };
    build_config(yaml.as_deref(), |key| std::env::var(key))
}

/// Build configuration from YAML text and an env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_config<F>(yaml: Option<&str>, lookup: F) -> Result<AnalysisConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let mut config = match yaml {
        Some(text) if !text.trim().is_empty() => serde_yaml::from_str::<AnalysisConfig>(text)?,
        _ => AnalysisConfig::default(),
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    if let Ok(level) = lookup("ADPULSE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(raw) = lookup("ADPULSE_LOG_FORMAT") {
        config.logging.format = raw
            .parse::<LogFormat>()
            .map_err(|e| invalid("ADPULSE_LOG_FORMAT", e))?;
    }
    if let Ok(raw) = lookup("ADPULSE_RANDOM_SEED") {
        config.random_seed = raw
            .parse::<u64>()
            .map_err(|e| invalid("ADPULSE_RANDOM_SEED", e.to_string()))?;
    }
    if let Ok(raw) = lookup("ADPULSE_MAX_RETRIES") {
        config.retry.max_retries = raw
            .parse::<u32>()
            .map_err(|e| invalid("ADPULSE_MAX_RETRIES", e.to_string()))?;
    }

    validate_config(&config)?;
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

fn check_fraction(key: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a fraction in [0, 1]".to_string(),
        })
    }
}

/// Validate ranges and cross-field constraints.
///
/// Out-of-range values are rejected, never clamped.
///
/// # Errors
///
/// Returns [`ConfigError::OutOfRange`] or [`ConfigError::Validation`] naming
/// the first offending key.
pub fn validate_config(config: &AnalysisConfig) -> Result<(), ConfigError> {
    let t = &config.thresholds;
    check_fraction("thresholds.low_ctr", t.low_ctr)?;
    check_fraction("thresholds.high_confidence", t.high_confidence)?;
    check_fraction("thresholds.roas_change_significant", t.roas_change_significant)?;
    check_fraction("thresholds.trend_stable_threshold", t.trend_stable_threshold)?;
    check_fraction(
        "data_quality.max_missing_percentage",
        config.data_quality.max_missing_percentage,
    )?;

    if !(3..=5).contains(&config.agents.max_hypotheses) {
        return Err(ConfigError::OutOfRange {
            key: "agents.max_hypotheses".to_string(),
            value: config.agents.max_hypotheses.to_string(),
            expected: "an integer in [3, 5]".to_string(),
        });
    }
    if config.agents.min_data_points < 1 {
        return Err(ConfigError::OutOfRange {
            key: "agents.min_data_points".to_string(),
            value: config.agents.min_data_points.to_string(),
            expected: "a positive integer".to_string(),
        });
    }

    let r = &config.retry;
    if !r.backoff_multiplier.is_finite() || r.backoff_multiplier < 1.0 {
        return Err(ConfigError::OutOfRange {
            key: "retry.backoff_multiplier".to_string(),
            value: r.backoff_multiplier.to_string(),
            expected: ">= 1".to_string(),
        });
    }
    if Duration::try_from_secs_f64(r.base_delay_secs).is_err() {
        return Err(ConfigError::OutOfRange {
            key: "retry.base_delay_secs".to_string(),
            value: r.base_delay_secs.to_string(),
            expected: "a representable number of seconds >= 0".to_string(),
        });
    }
    if let Some(budget) = r.max_wall_clock_secs {
        if budget <= 0.0 || Duration::try_from_secs_f64(budget).is_err() {
            return Err(ConfigError::OutOfRange {
                key: "retry.max_wall_clock_secs".to_string(),
                value: budget.to_string(),
                expected: "a representable number of seconds > 0".to_string(),
            });
        }
    }

    let w = &config.confidence_weights;
    check_fraction("confidence_weights.insight_confidence", w.insight_confidence)?;
    check_fraction("confidence_weights.validation_strength", w.validation_strength)?;
    check_fraction(
        "confidence_weights.segmentation_evidence",
        w.segmentation_evidence,
    )?;
    let weight_sum = w.insight_confidence + w.validation_strength + w.segmentation_evidence;
    if !(0.99..=1.01).contains(&weight_sum) {
        return Err(ConfigError::Validation(format!(
            "confidence weights must sum to 1.0, got {weight_sum}"
        )));
    }

    validate_required_fields(&config.data_quality.required_fields)
}

fn validate_required_fields(fields: &[String]) -> Result<(), ConfigError> {
    for field in fields {
        if !REQUIRED_COLUMNS.contains(&field.as_str()) {
            return Err(ConfigError::Validation(format!(
                "unknown required field '{field}'"
            )));
        }
    }
    for core in CORE_COLUMNS {
        if !fields.iter().any(|f| f == core) {
            return Err(ConfigError::Validation(format!(
                "required_fields must include '{core}'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
