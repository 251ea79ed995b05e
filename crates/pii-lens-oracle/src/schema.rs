use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema-inference output. Not reconciled by the engine; carried through for download.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "format", content = "schema", rename_all = "snake_case")]
pub enum SchemaArtifact {
    Parsed(Value),
    /// The oracle's string did not parse as JSON and is passed through unchanged.
    Raw(String),
}

impl SchemaArtifact {
    #[must_use]
    pub fn from_oracle(schema: String) -> Self {
        match serde_json::from_str(&schema) {
            Ok(value) => Self::Parsed(value),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "schema-inference output is not JSON; passing it through raw"
                );
                Self::Raw(schema)
            }
        }
    }

    #[must_use]
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }

    /// 2-space indented JSON for parsed schemas; raw strings come back unchanged.
    #[must_use]
    pub fn pretty(&self) -> String {
        match self {
            Self::Parsed(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            Self::Raw(raw) => raw.clone(),
        }
    }
}
