//! The metadata + status wrapper every stage output travels in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    Failure,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub error_type: String,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub error_details: Value,
}

impl From<&PipelineError> for ErrorInfo {
    fn from(err: &PipelineError) -> Self {
        Self {
            error_type: err.error_type().to_string(),
            error_message: err.to_string(),
            error_details: err.details(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub agent_name: String,
    pub timestamp: DateTime<Utc>,
    pub execution_duration_ms: u64,
    pub status: StageStatus,
    /// Number of times the stage was invoked, retries included.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
}

impl<T> Envelope<T> {
    pub fn success(agent_name: &str, execution_duration_ms: u64, attempts: u32, payload: T) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            timestamp: Utc::now(),
            execution_duration_ms,
            status: StageStatus::Success,
            attempts,
            error: None,
            payload: Some(payload),
        }
    }

    pub fn failure(
        agent_name: &str,
        execution_duration_ms: u64,
        attempts: u32,
        err: &PipelineError,
    ) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            timestamp: Utc::now(),
            execution_duration_ms,
            status: StageStatus::Failure,
            attempts,
            error: Some(ErrorInfo::from(err)),
            payload: None,
        }
    }

    /// The same envelope with its payload dropped, for metadata-only logs.
    #[must_use]
    pub fn without_payload(&self) -> Envelope<()> {
        Envelope {
            agent_name: self.agent_name.clone(),
            timestamp: self.timestamp,
            execution_duration_ms: self.execution_duration_ms,
            status: self.status,
            attempts: self.attempts,
            error: self.error.clone(),
            payload: None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn failure_envelope_carries_error_type_and_details() {
        let err = PipelineError::validation(
            "Missing required fields in dataset",
            json!({ "missing_fields": ["spend"] }),
        );
        let env: Envelope<()> = Envelope::failure("metrics_engine", 12, 1, &err);
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["status"], "failure");
        assert_eq!(value["error"]["error_type"], "ValidationError");
        assert_eq!(value["error"]["error_details"]["missing_fields"][0], "spend");
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn success_envelope_round_trips() {
        let env = Envelope::success("trend_engine", 3, 2, vec![1_u32, 2, 3]);
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope<Vec<u32>> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
        assert!(back.is_success());
        assert_eq!(back.without_payload().payload, None);
    }
}
