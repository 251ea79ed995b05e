mod config;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use pii_lens_core::{
    candidates_from_response, Category, CategoryId, Engine, KernelError, RenderSegment,
    ScanResult, SourceDocument, ValidatedSpan,
};
use pii_lens_oracle::{
    DetectRequest, Oracle, OracleError, OracleKind, SchemaArtifact, SchemaRequest,
    DEFAULT_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use ulid::Ulid;

pub use config::{ScanConfig, DEFAULT_MAX_INPUT_CHARS};

pub const API_CONTRACT_VERSION: &str = "api.v1";

const NO_CATEGORIES_NOTICE: &str = "no categories selected; nothing was scanned";

/// Input refused before any oracle is consulted.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum PreflightRejection {
    #[error("input text is empty")]
    EmptyInput,
    #[error("input text has {chars} characters; the limit is {max}")]
    InputTooLarge { chars: usize, max: usize },
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl PreflightRejection {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::InputTooLarge { .. } => "input_too_large",
            Self::UnknownCategory(_) => "unknown_category",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl From<KernelError> for PreflightRejection {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::UnknownCategory(label) => Self::UnknownCategory(label),
            KernelError::Validation(message) => Self::InvalidRequest(message),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Preflight(#[from] PreflightRejection),
    #[error("{} oracle failed: {source}", .oracle.as_str())]
    Oracle {
        oracle: OracleKind,
        #[source]
        source: OracleError,
    },
    #[error("oracle task did not complete: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanRequest {
    pub text: String,
    /// `None` scans for the whole catalog; an empty list scans for nothing.
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default = "default_include_schema")]
    pub include_schema: bool,
}

fn default_include_schema() -> bool {
    true
}

impl ScanRequest {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), categories: None, include_schema: true }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResponse {
    pub scan_id: Ulid,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub document_sha256: String,
    /// Requested categories in catalog order.
    pub requested_categories: Vec<CategoryId>,
    pub result: ScanResult,
    pub segments: Vec<RenderSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub text: String,
    pub spans: Vec<ValidatedSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileResponse {
    pub document_sha256: String,
    pub segments: Vec<RenderSegment>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NormalizedLabel {
    pub label: String,
    pub category: Category,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CatalogView {
    pub categories: Vec<CategoryId>,
    pub corrections: BTreeMap<String, String>,
    pub fuzzy_padding: usize,
    pub max_input_chars: usize,
}

/// Scan facade shared by the service and the CLI. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ScanApi {
    engine: Arc<Engine>,
    oracle: Arc<dyn Oracle>,
    max_input_chars: usize,
    oracle_timeout: Duration,
}

impl ScanApi {
    #[must_use]
    pub fn new(engine: Engine, oracle: Arc<dyn Oracle>) -> Self {
        Self {
            engine: Arc::new(engine),
            oracle,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            oracle_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// # Errors
    /// Returns [`KernelError::Validation`] when the configured catalog is invalid.
    pub fn from_config(config: &ScanConfig, oracle: Arc<dyn Oracle>) -> Result<Self, KernelError> {
        let mut api =
            Self::new(config.engine()?, oracle).with_max_input_chars(config.max_input_chars);
        if let Some(oracle_config) = &config.oracle {
            api = api.with_oracle_timeout(Duration::from_millis(oracle_config.timeout_ms));
        }
        Ok(api)
    }

    #[must_use]
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    #[must_use]
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[must_use]
    pub fn catalog(&self) -> CatalogView {
        CatalogView {
            categories: self.engine.catalog().categories().to_vec(),
            corrections: self
                .engine
                .normalizer()
                .corrections()
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            fuzzy_padding: self.engine.fuzzy_padding(),
            max_input_chars: self.max_input_chars,
        }
    }

    #[must_use]
    pub fn normalize_labels<S>(&self, labels: &[S]) -> Vec<NormalizedLabel>
    where
        S: AsRef<str>,
    {
        labels
            .iter()
            .map(|label| NormalizedLabel {
                label: label.as_ref().to_string(),
                category: self.engine.normalizer().normalize(label.as_ref()),
            })
            .collect()
    }

    /// Check the request without consulting any oracle and resolve the requested categories.
    ///
    /// # Errors
    /// Returns a [`PreflightRejection`] for empty or oversized text and unknown categories.
    pub fn preflight(
        &self,
        request: &ScanRequest,
    ) -> Result<BTreeSet<CategoryId>, PreflightRejection> {
        if request.text.trim().is_empty() {
            return Err(PreflightRejection::EmptyInput);
        }
        let chars = request.text.chars().count();
        if chars > self.max_input_chars {
            return Err(PreflightRejection::InputTooLarge { chars, max: self.max_input_chars });
        }
        Ok(self.engine.resolve_requested(request.categories.as_deref())?)
    }

    /// Run one scan: preflight, oracle calls, validation, aggregation and reconciliation.
    ///
    /// PII detection and schema inference run concurrently, each under its own timeout.
    /// Either failing fails the scan; no partial result is returned.
    ///
    /// # Errors
    /// Returns [`ScanError::Preflight`] before any oracle call, or [`ScanError::Oracle`] when an
    /// oracle call fails or times out.
    pub async fn scan(&self, request: ScanRequest) -> Result<ScanResponse, ScanError> {
        let requested = self.preflight(&request)?;
        let requested_categories = self
            .engine
            .catalog()
            .categories()
            .iter()
            .filter(|id| requested.contains(*id))
            .cloned()
            .collect::<Vec<_>>();
        let include_schema = request.include_schema;
        let doc = SourceDocument::new(request.text);

        if requested.is_empty() {
            tracing::info!("no categories selected; skipping oracle calls");
            return Ok(self.response(
                &doc,
                requested_categories,
                ScanResult::empty(),
                None,
                Some(NO_CATEGORIES_NOTICE.to_string()),
            ));
        }

        let detect_request = DetectRequest {
            text: doc.text().to_string(),
            categories: requested_categories.iter().map(|id| id.as_str().to_string()).collect(),
        };
        let detection = {
            let oracle = Arc::clone(&self.oracle);
            self.call_oracle(OracleKind::PiiDetection, move || oracle.detect_pii(&detect_request))
        };
        let schema = async {
            if !include_schema {
                return Ok(None);
            }
            let oracle = Arc::clone(&self.oracle);
            let schema_request = SchemaRequest { text: doc.text().to_string() };
            self.call_oracle(OracleKind::SchemaInference, move || {
                oracle.infer_schema(&schema_request)
            })
            .await
            .map(Some)
        };
        let (detection, schema) = tokio::try_join!(detection, schema)?;

        let candidates = candidates_from_response(&detection);
        let report = self.engine.scan(&doc, &candidates, &requested);
        tracing::info!(
            candidates = report.diagnostics.candidates,
            accepted = report.diagnostics.accepted,
            fuzzy_recovered = report.diagnostics.fuzzy_recovered,
            rejected = report.diagnostics.rejected_total(),
            "scan validated oracle candidates"
        );

        Ok(self.response(
            &doc,
            requested_categories,
            report.result,
            schema.map(SchemaArtifact::from_oracle),
            None,
        ))
    }

    /// Rebuild render segments from previously validated spans.
    #[must_use]
    pub fn reconcile_text(&self, request: &ReconcileRequest) -> ReconcileResponse {
        let doc = SourceDocument::new(request.text.as_str());
        let mut spans = request.spans.clone();
        pii_lens_core::sort_spans(&mut spans);
        ReconcileResponse {
            document_sha256: sha256_hex(doc.text().as_bytes()),
            segments: pii_lens_core::reconcile(&spans, &doc),
        }
    }

    async fn call_oracle<T, F>(&self, oracle: OracleKind, call: F) -> Result<T, ScanError>
    where
        F: FnOnce() -> Result<T, OracleError> + Send + 'static,
        T: Send + 'static,
    {
        let task = tokio::task::spawn_blocking(call);
        match tokio::time::timeout(self.oracle_timeout, task).await {
            Ok(Ok(result)) => result.map_err(|source| {
                tracing::warn!(oracle = oracle.as_str(), error = %source, "oracle call failed");
                ScanError::Oracle { oracle, source }
            }),
            Ok(Err(join)) => Err(ScanError::Task(format!("{}: {join}", oracle.as_str()))),
            Err(_) => {
                tracing::warn!(
                    oracle = oracle.as_str(),
                    timeout_ms = u64::try_from(self.oracle_timeout.as_millis()).unwrap_or(u64::MAX),
                    "oracle call timed out"
                );
                Err(ScanError::Oracle { oracle, source: OracleError::Timeout })
            }
        }
    }

    fn response(
        &self,
        doc: &SourceDocument,
        requested_categories: Vec<CategoryId>,
        result: ScanResult,
        schema: Option<SchemaArtifact>,
        notice: Option<String>,
    ) -> ScanResponse {
        let segments = self.engine.render(&result, doc);
        ScanResponse {
            scan_id: Ulid::new(),
            generated_at: OffsetDateTime::now_utc(),
            document_sha256: sha256_hex(doc.text().as_bytes()),
            requested_categories,
            result,
            segments,
            schema,
            notice,
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}
