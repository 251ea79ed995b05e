use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use crate::{DetectRequest, Oracle, OracleError, SchemaRequest};

/// Replays captured oracle output. Used for offline scans and for tests that need to count
/// how often the oracle was consulted.
#[derive(Debug)]
pub struct RecordedOracle {
    detection: Result<Value, OracleError>,
    schema: Result<String, OracleError>,
    detect_calls: AtomicUsize,
    schema_calls: AtomicUsize,
}

impl RecordedOracle {
    #[must_use]
    pub fn new(detection: Value) -> Self {
        Self {
            detection: Ok(detection),
            schema: Err(OracleError::Transport(
                "no recorded schema-inference response".to_string(),
            )),
            detect_calls: AtomicUsize::new(0),
            schema_calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn failing(error: OracleError) -> Self {
        Self { detection: Err(error), ..Self::new(Value::Null) }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Ok(schema.into());
        self
    }

    #[must_use]
    pub fn with_schema_error(mut self, error: OracleError) -> Self {
        self.schema = Err(error);
        self
    }

    /// Calls made to either endpoint so far.
    #[must_use]
    pub fn invocations(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst) + self.schema_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn schema_calls(&self) -> usize {
        self.schema_calls.load(Ordering::SeqCst)
    }
}

impl Oracle for RecordedOracle {
    fn detect_pii(&self, _request: &DetectRequest) -> Result<Value, OracleError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        self.detection.clone()
    }

    fn infer_schema(&self, _request: &SchemaRequest) -> Result<String, OracleError> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        self.schema.clone()
    }
}
