use std::collections::HashMap;
use std::env::VarError;

use super::*;

fn lookup_from_map<'a>(
    map: &'a HashMap<&'a str, &'a str>,
) -> impl Fn(&str) -> Result<String, VarError> + 'a {
    move |key| {
        map.get(key)
            .map(|v| (*v).to_string())
            .ok_or(VarError::NotPresent)
    }
}

fn empty_env<'a>() -> HashMap<&'a str, &'a str> {
    HashMap::new()
}

#[test]
fn build_config_without_file_uses_defaults() {
    let map = empty_env();
    let cfg = build_config(None, lookup_from_map(&map)).unwrap();
    assert_eq!(cfg, AnalysisConfig::default());
    assert!((cfg.thresholds.trend_stable_threshold - 0.05).abs() < f64::EPSILON);
    assert_eq!(cfg.agents.min_data_points, 10);
    assert_eq!(cfg.retry.max_retries, 3);
    assert!((cfg.retry.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    assert_eq!(cfg.random_seed, 42);
    assert_eq!(cfg.data_quality.required_fields.len(), 10);
}

#[test]
fn build_config_merges_partial_yaml_with_defaults() {
    let map = empty_env();
    let yaml = "thresholds:\n  trend_stable_threshold: 0.1\nretry:\n  max_retries: 5\n";
    let cfg = build_config(Some(yaml), lookup_from_map(&map)).unwrap();
    assert!((cfg.thresholds.trend_stable_threshold - 0.1).abs() < f64::EPSILON);
    assert!((cfg.thresholds.low_ctr - 0.01).abs() < f64::EPSILON);
    assert_eq!(cfg.retry.max_retries, 5);
    assert!((cfg.retry.base_delay_secs - 1.0).abs() < f64::EPSILON);
}

#[test]
fn blank_yaml_is_treated_as_defaults() {
    let map = empty_env();
    let cfg = build_config(Some("   \n"), lookup_from_map(&map)).unwrap();
    assert_eq!(cfg, AnalysisConfig::default());
}

#[test]
fn unknown_yaml_key_fails_to_parse() {
    let map = empty_env();
    let result = build_config(Some("thresholds:\n  bogus: 1\n"), lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::FileParse(_))),
        "expected FileParse, got: {result:?}"
    );
}

#[test]
fn threshold_above_one_is_out_of_range() {
    let map = empty_env();
    let yaml = "thresholds:\n  roas_change_significant: 1.5\n";
    let result = build_config(Some(yaml), lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::OutOfRange { ref key, .. }) if key == "thresholds.roas_change_significant"),
        "expected OutOfRange(roas_change_significant), got: {result:?}"
    );
}

#[test]
fn negative_threshold_is_out_of_range_not_clamped() {
    let map = empty_env();
    let yaml = "thresholds:\n  trend_stable_threshold: -0.05\n";
    let result = build_config(Some(yaml), lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::OutOfRange { ref key, .. }) if key == "thresholds.trend_stable_threshold"),
        "expected OutOfRange(trend_stable_threshold), got: {result:?}"
    );
}

#[test]
fn max_missing_percentage_out_of_range() {
    let map = empty_env();
    let yaml = "data_quality:\n  max_missing_percentage: 2.0\n";
    let result = build_config(Some(yaml), lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::OutOfRange { ref key, .. }) if key == "data_quality.max_missing_percentage"),
        "got: {result:?}"
    );
}

#[test]
fn backoff_multiplier_below_one_fails() {
    let map = empty_env();
    let yaml = "retry:\n  backoff_multiplier: 0.5\n";
    let result = build_config(Some(yaml), lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::OutOfRange { ref key, .. }) if key == "retry.backoff_multiplier"),
        "got: {result:?}"
    );
}

#[test]
fn unrepresentable_retry_delays_fail() {
    let map = empty_env();
    let yaml = "retry:\n  base_delay_secs: 1.0e+30\n";
    let result = build_config(Some(yaml), lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::OutOfRange { ref key, .. }) if key == "retry.base_delay_secs"),
        "got: {result:?}"
    );

    let yaml = "retry:\n  max_wall_clock_secs: 1.0e+30\n";
    let result = build_config(Some(yaml), lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::OutOfRange { ref key, .. }) if key == "retry.max_wall_clock_secs"),
        "got: {result:?}"
    );
}

#[test]
fn zero_min_data_points_fails() {
    let map = empty_env();
    let yaml = "agents:\n  min_data_points: 0\n";
    let result = build_config(Some(yaml), lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::OutOfRange { ref key, .. }) if key == "agents.min_data_points"),
        "got: {result:?}"
    );
}

#[test]
fn max_hypotheses_outside_generation_contract_fails() {
    let map = empty_env();
    let yaml = "agents:\n  max_hypotheses: 8\n";
    let result = build_config(Some(yaml), lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::OutOfRange { ref key, .. }) if key == "agents.max_hypotheses"),
        "got: {result:?}"
    );
}

#[test]
fn confidence_weights_must_sum_to_one() {
    let map = empty_env();
    let yaml = "confidence_weights:\n  insight_confidence: 0.5\n  validation_strength: 0.5\n  segmentation_evidence: 0.5\n";
    let result = build_config(Some(yaml), lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("sum to 1.0")),
        "got: {result:?}"
    );
}

#[test]
fn required_fields_must_keep_core_columns() {
    let map = empty_env();
    let yaml = "data_quality:\n  required_fields: [campaign_name, date, spend]\n";
    let result = build_config(Some(yaml), lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("impressions")),
        "got: {result:?}"
    );
}

#[test]
fn unknown_required_field_fails() {
    let map = empty_env();
    let yaml = "data_quality:\n  required_fields: [campaign_name, date, spend, impressions, clicks, revenue, weather]\n";
    let result = build_config(Some(yaml), lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("weather")),
        "got: {result:?}"
    );
}

#[test]
fn env_overrides_apply_after_file() {
    let mut map = empty_env();
    map.insert("ADPULSE_LOG_LEVEL", "debug");
    map.insert("ADPULSE_LOG_FORMAT", "json");
    map.insert("ADPULSE_RANDOM_SEED", "7");
    map.insert("ADPULSE_MAX_RETRIES", "1");
    let yaml = "random_seed: 99\n";
    let cfg = build_config(Some(yaml), lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.logging.format, LogFormat::Json);
    assert_eq!(cfg.random_seed, 7);
    assert_eq!(cfg.retry.max_retries, 1);
}

#[test]
fn invalid_log_format_override_fails() {
    let mut map = empty_env();
    map.insert("ADPULSE_LOG_FORMAT", "xml");
    let result = build_config(None, lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "ADPULSE_LOG_FORMAT"),
        "got: {result:?}"
    );
}

#[test]
fn invalid_seed_override_fails() {
    let mut map = empty_env();
    map.insert("ADPULSE_RANDOM_SEED", "not-a-number");
    let result = build_config(None, lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "ADPULSE_RANDOM_SEED"),
        "got: {result:?}"
    );
}

#[test]
fn missing_config_file_is_file_io_error() {
    let path = std::env::temp_dir().join("adpulse-config-does-not-exist.yaml");
    let result = load_config_from_env(Some(&path));
    assert!(
        matches!(result, Err(ConfigError::FileIo { .. })),
        "got: {result:?}"
    );
}
