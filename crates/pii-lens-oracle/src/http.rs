use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::{
    schema_from_response, DetectRequest, Oracle, OracleConfig, OracleError, SchemaRequest,
};

const DETECT_PATH: &str = "v1/pii/detect";
const SCHEMA_PATH: &str = "v1/schema/infer";
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Oracle reached over HTTP. Prompt construction and retries live on the far side.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    agent: ureq::Agent,
    base_url: String,
    api_key: Option<String>,
}

impl HttpOracle {
    #[must_use]
    pub fn new(config: &OracleConfig) -> Self {
        let agent =
            ureq::AgentBuilder::new().timeout(Duration::from_millis(config.timeout_ms)).build();
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn post<T>(&self, path: &str, body: &T) -> Result<Value, OracleError>
    where
        T: Serialize,
    {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self.agent.post(&url).set("accept", "application/json");
        if let Some(api_key) = &self.api_key {
            request = request.set("authorization", &format!("Bearer {api_key}"));
        }

        let response = request.send_json(body).map_err(OracleError::from)?;
        let text = response
            .into_string()
            .map_err(|err| OracleError::Transport(format!("failed to read response body: {err}")))?;
        serde_json::from_str(&text).map_err(|err| {
            OracleError::MalformedResponse(format!("response body is not JSON: {err}"))
        })
    }
}

impl Oracle for HttpOracle {
    fn detect_pii(&self, request: &DetectRequest) -> Result<Value, OracleError> {
        tracing::debug!(
            chars = request.text.chars().count(),
            categories = request.categories.len(),
            "calling pii-detection oracle"
        );
        self.post(DETECT_PATH, request)
    }

    fn infer_schema(&self, request: &SchemaRequest) -> Result<String, OracleError> {
        tracing::debug!(chars = request.text.chars().count(), "calling schema-inference oracle");
        let body = self.post(SCHEMA_PATH, request)?;
        schema_from_response(&body)
    }
}

impl From<ureq::Error> for OracleError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                Self::Status { code, body: body.chars().take(MAX_ERROR_BODY_CHARS).collect() }
            }
            ureq::Error::Transport(transport) => {
                let timed_out = std::error::Error::source(&transport)
                    .and_then(|source| source.downcast_ref::<std::io::Error>())
                    .is_some_and(|io| {
                        matches!(
                            io.kind(),
                            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                        )
                    });
                if timed_out {
                    Self::Timeout
                } else {
                    Self::Transport(transport.to_string())
                }
            }
        }
    }
}
