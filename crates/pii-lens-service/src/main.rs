use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use pii_lens_api::{
    CatalogView, NormalizedLabel, ReconcileRequest, ReconcileResponse, ScanApi, ScanConfig,
    ScanError, ScanRequest, ScanResponse, API_CONTRACT_VERSION,
};
use pii_lens_oracle::{HttpOracle, OracleConfig, DEFAULT_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

#[derive(Debug, Clone)]
struct ServiceState {
    api: ScanApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

#[derive(Debug, Clone, Deserialize)]
struct NormalizeRequest {
    labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Parser)]
#[command(name = "pii-lens-service")]
#[command(about = "Local HTTP service for PII span extraction")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:4010")]
    bind: SocketAddr,
    /// YAML scan configuration.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `oracle.base_url` from the config file.
    #[arg(long)]
    oracle_url: Option<String>,
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<ScanError> for ServiceError {
    fn from(err: ScanError) -> Self {
        let (status, code) = match &err {
            ScanError::Preflight(rejection) => (StatusCode::BAD_REQUEST, Some(rejection.code())),
            ScanError::Oracle { .. } => (StatusCode::BAD_GATEWAY, Some("oracle_failure")),
            ScanError::Task(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        ServiceError {
            status,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: err.to_string(),
            code,
        }
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/openapi", get(openapi))
        .route("/v1/catalog", get(catalog))
        .route("/v1/normalize", post(normalize))
        .route("/v1/scan", post(scan))
        .route("/v1/reconcile", post(reconcile))
        .with_state(state)
}

fn build_api(args: &Args) -> Result<ScanApi> {
    let config = match &args.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };
    let mut oracle_config = match (&args.oracle_url, &config.oracle) {
        (Some(base_url), configured) => OracleConfig {
            base_url: base_url.clone(),
            timeout_ms: configured.as_ref().map_or(DEFAULT_TIMEOUT_MS, |c| c.timeout_ms),
            api_key: configured.as_ref().and_then(|c| c.api_key.clone()),
        },
        (None, Some(configured)) => configured.clone(),
        (None, None) => {
            return Err(anyhow!("no oracle configured; pass --oracle-url or set oracle.base_url"))
        }
    };
    if let Some(timeout_ms) = args.timeout_ms {
        oracle_config.timeout_ms = timeout_ms;
    }

    let oracle = Arc::new(HttpOracle::new(&oracle_config));
    let api = ScanApi::from_config(&config, oracle)
        .context("invalid scan configuration")?
        .with_oracle_timeout(Duration::from_millis(oracle_config.timeout_ms));
    tracing::info!(
        oracle = %oracle_config.base_url,
        timeout_ms = oracle_config.timeout_ms,
        categories = api.engine().catalog().len(),
        "scan api configured"
    );
    Ok(api)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let state = ServiceState { api: build_api(&args)? };
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(bind = %args.bind, "pii-lens service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok" }))
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn catalog(State(state): State<ServiceState>) -> Json<ServiceEnvelope<CatalogView>> {
    Json(envelope(state.api.catalog()))
}

async fn normalize(
    State(state): State<ServiceState>,
    Json(request): Json<NormalizeRequest>,
) -> Json<ServiceEnvelope<Vec<NormalizedLabel>>> {
    Json(envelope(state.api.normalize_labels(&request.labels)))
}

async fn scan(
    State(state): State<ServiceState>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ServiceEnvelope<ScanResponse>>, ServiceError> {
    let response = state.api.scan(request).await.map_err(|err| {
        tracing::warn!(error = %err, "scan failed");
        ServiceError::from(err)
    })?;
    Ok(Json(envelope(response)))
}

async fn reconcile(
    State(state): State<ServiceState>,
    Json(request): Json<ReconcileRequest>,
) -> Json<ServiceEnvelope<ReconcileResponse>> {
    Json(envelope(state.api.reconcile_text(&request)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use http::Request;
    use pii_lens_core::Engine;
    use pii_lens_oracle::{OracleError, RecordedOracle};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    // `\n` is two literal characters; the recorded offsets depend on it.
    const CSV: &str = r"name,email\nAlice,alice@web.com";

    fn recorded_csv_oracle() -> Arc<RecordedOracle> {
        Arc::new(
            RecordedOracle::new(json!({
                "entities": [
                    {"category": "PERSON_NAME", "value": "Alice", "start": 12, "end": 17},
                    {"category": "emails", "value": "alice@web.com", "start": 18, "end": 31}
                ]
            }))
            .with_schema(r#"{"type":"array"}"#),
        )
    }

    fn router_with(oracle: &Arc<RecordedOracle>) -> Router {
        let shared: Arc<dyn pii_lens_oracle::Oracle> = Arc::clone(oracle) as _;
        app(ServiceState { api: ScanApi::new(Engine::default(), shared) })
    }

    async fn response_json(response: Response) -> Value {
        let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("failed to read response body: {err}"),
        };
        let body = match String::from_utf8(bytes.to_vec()) {
            Ok(body) => body,
            Err(err) => panic!("response body is not UTF-8: {err}"),
        };
        match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(err) => panic!("response body is not JSON: {err}; body={body}"),
        }
    }

    async fn send(router: Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().uri(uri).method(method);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(axum::body::Body::from(body.to_string())),
            None => builder.body(axum::body::Body::empty()),
        }
        .unwrap_or_else(|err| panic!("failed to build request: {err}"));

        match router.oneshot(request).await {
            Ok(response) => response,
            Err(err) => panic!("router request failed: {err}"),
        }
    }

    // Test IDs: TSVC-001
    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let response = send(router_with(&recorded_csv_oracle()), "GET", "/v1/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let value = response_json(response).await;
        assert_eq!(
            value.get("service_contract_version").and_then(Value::as_str),
            Some(SERVICE_CONTRACT_VERSION)
        );
        assert_eq!(value["data"]["status"], json!("ok"));
    }

    // Test IDs: TSVC-002
    #[tokio::test]
    async fn openapi_endpoint_returns_versioned_artifact() {
        let response = send(router_with(&recorded_csv_oracle()), "GET", "/v1/openapi", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("failed to read response body: {err}"),
        };
        let body = String::from_utf8_lossy(&bytes);
        assert!(body.contains("openapi: 3.1.0"));
        assert!(body.contains("version: service.v1"));
        assert!(body.contains("/v1/scan"));
        assert!(body.contains("/v1/reconcile"));
    }

    // Test IDs: TSVC-003
    #[tokio::test]
    async fn scan_normalizes_sloppy_labels_and_wraps_result() {
        let oracle = recorded_csv_oracle();
        let response = send(
            router_with(&oracle),
            "POST",
            "/v1/scan",
            Some(json!({"text": CSV, "categories": ["NAME", "EMAIL"]})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let value = response_json(response).await;
        assert_eq!(value["api_contract_version"], json!(API_CONTRACT_VERSION));
        assert_eq!(value["data"]["result"]["category_counts"], json!({"NAME": 1, "EMAIL": 1}));
        assert_eq!(
            value["data"]["segments"],
            json!([
                {"kind": "plain", "text": r"name,email\n"},
                {"kind": "annotated", "text": "Alice", "category": "NAME"},
                {"kind": "plain", "text": ","},
                {"kind": "annotated", "text": "alice@web.com", "category": "EMAIL"}
            ])
        );
        assert_eq!(
            value["data"]["schema"],
            json!({"format": "parsed", "schema": {"type": "array"}})
        );
        assert_eq!(oracle.invocations(), 2);
    }

    #[tokio::test]
    async fn empty_category_list_skips_the_oracle() {
        let oracle = recorded_csv_oracle();
        let response = send(
            router_with(&oracle),
            "POST",
            "/v1/scan",
            Some(json!({"text": CSV, "categories": []})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let value = response_json(response).await;
        assert_eq!(value["data"]["result"]["spans"], json!([]));
        assert!(value["data"]["notice"].is_string());
        assert_eq!(oracle.invocations(), 0);
    }

    // Test IDs: TSVC-004
    #[tokio::test]
    async fn preflight_rejection_is_bad_request() {
        let oracle = recorded_csv_oracle();
        let response = send(
            router_with(&oracle),
            "POST",
            "/v1/scan",
            Some(json!({"text": CSV, "categories": ["shoe size"]})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let value = response_json(response).await;
        assert_eq!(value["code"], json!("unknown_category"));
        assert!(value["error"].as_str().is_some_and(|error| error.contains("shoe size")));
        assert_eq!(oracle.invocations(), 0);
    }

    #[tokio::test]
    async fn oracle_failure_is_bad_gateway() {
        let oracle = Arc::new(RecordedOracle::failing(OracleError::Timeout));
        let response = send(
            router_with(&oracle),
            "POST",
            "/v1/scan",
            Some(json!({"text": CSV, "include_schema": false})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let value = response_json(response).await;
        assert_eq!(value["code"], json!("oracle_failure"));
        assert!(value.get("data").is_none());
    }

    #[tokio::test]
    async fn catalog_and_normalize_endpoints() {
        let oracle = recorded_csv_oracle();

        let catalog =
            response_json(send(router_with(&oracle), "GET", "/v1/catalog", None).await).await;
        assert_eq!(catalog["data"]["categories"][0], json!("NAME"));
        assert_eq!(catalog["data"]["fuzzy_padding"], json!(2));

        let normalized = response_json(
            send(
                router_with(&oracle),
                "POST",
                "/v1/normalize",
                Some(json!({"labels": ["PII_EMAIL", "mystery"]})),
            )
            .await,
        )
        .await;
        assert_eq!(
            normalized["data"],
            json!([
                {"label": "PII_EMAIL", "category": {"kind": "known", "label": "EMAIL"}},
                {"label": "mystery", "category": {"kind": "unrecognized", "label": "mystery"}}
            ])
        );
    }

    #[tokio::test]
    async fn reconcile_endpoint_partitions_text() {
        let response = send(
            router_with(&recorded_csv_oracle()),
            "POST",
            "/v1/reconcile",
            Some(json!({
                "text": "HelloWorld!!",
                "spans": [
                    {"category": "ADDRESS", "value": "loWor", "start": 3, "end": 8,
                     "confidence": "low", "match_kind": "exact"},
                    {"category": "NAME", "value": "Hello", "start": 0, "end": 5,
                     "confidence": "high", "match_kind": "exact"}
                ]
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let value = response_json(response).await;
        assert_eq!(
            value["data"]["segments"],
            json!([
                {"kind": "annotated", "text": "Hello", "category": "NAME"},
                {"kind": "plain", "text": "World!!"}
            ])
        );
    }
}
