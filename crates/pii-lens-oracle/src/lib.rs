//! Oracle collaborators: the PII-detection and schema-inference request/response contracts,
//! an HTTP client for a remote oracle, and a recorded oracle for offline scans.

mod http;
mod recorded;
mod schema;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use http::HttpOracle;
pub use recorded::RecordedOracle;
pub use schema::SchemaArtifact;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum OracleError {
    #[error("oracle transport failed: {0}")]
    Transport(String),
    #[error("oracle did not answer in time")]
    Timeout,
    #[error("oracle returned HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("oracle response is malformed: {0}")]
    MalformedResponse(String),
}

/// Which of the two oracle calls a failure belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OracleKind {
    PiiDetection,
    SchemaInference,
}

impl OracleKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PiiDetection => "pii_detection",
            Self::SchemaInference => "schema_inference",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectRequest {
    pub text: String,
    /// Ordered category identifiers the oracle should look for.
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OracleConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// External inference service. Implementations block; callers run them off the async runtime.
pub trait Oracle: Send + Sync + std::fmt::Debug {
    /// Ask for PII entities. The returned JSON is untrusted and may have any shape.
    ///
    /// # Errors
    /// Returns an [`OracleError`] when the call fails or the body is not JSON at all.
    fn detect_pii(&self, request: &DetectRequest) -> Result<Value, OracleError>;

    /// Ask for an inferred schema. Returns the `schema` string as sent by the oracle.
    ///
    /// # Errors
    /// Returns an [`OracleError`] when the call fails or carries no `schema` field.
    fn infer_schema(&self, request: &SchemaRequest) -> Result<String, OracleError>;
}

/// Pull the `schema` field out of a schema-inference response body.
///
/// # Errors
/// Returns [`OracleError::MalformedResponse`] when the body has no usable `schema` field.
pub fn schema_from_response(body: &Value) -> Result<String, OracleError> {
    match body.get("schema") {
        Some(Value::String(schema)) => Ok(schema.clone()),
        Some(structured @ (Value::Object(_) | Value::Array(_))) => Ok(structured.to_string()),
        _ => Err(OracleError::MalformedResponse(
            "schema-inference response has no `schema` field".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_field_is_extracted_as_string() {
        assert_eq!(
            schema_from_response(&json!({"schema": "{\"type\":\"object\"}"})),
            Ok("{\"type\":\"object\"}".to_string())
        );
        assert_eq!(
            schema_from_response(&json!({"schema": {"type": "object"}})),
            Ok("{\"type\":\"object\"}".to_string())
        );
        assert!(matches!(
            schema_from_response(&json!({"schemas": []})),
            Err(OracleError::MalformedResponse(_))
        ));
    }

    #[test]
    fn oracle_config_defaults_timeout() {
        let config: OracleConfig = serde_json::from_value(json!({"base_url": "http://oracle"}))
            .unwrap_or_else(|err| panic!("config should parse: {err}"));
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.api_key, None);
    }
}
