use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use pii_lens_api::{ReconcileRequest, ScanApi, ScanConfig, ScanRequest};
use pii_lens_core::ValidatedSpan;
use pii_lens_oracle::{HttpOracle, Oracle, OracleConfig, RecordedOracle};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "pii-lens")]
#[command(about = "Validate and reconcile oracle-proposed PII spans")]
struct Cli {
    /// YAML scan configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the active catalog and correction table.
    Catalog,
    /// Map free-form labels onto the catalog.
    Normalize {
        #[arg(required = true)]
        labels: Vec<String>,
    },
    Scan(ScanArgs),
    /// Rebuild render segments from validated spans or a saved scan.
    Reconcile(ReconcileArgs),
}

#[derive(Debug, Args)]
struct ScanArgs {
    #[arg(long)]
    input: PathBuf,
    /// Recorded PII-detection response to replay instead of calling an oracle.
    #[arg(long, required_unless_present = "oracle_url", conflicts_with = "oracle_url")]
    oracle_response: Option<PathBuf>,
    /// Recorded schema-inference response body; replayed alongside `--oracle-response`.
    #[arg(long, requires = "oracle_response")]
    schema_response: Option<PathBuf>,
    #[arg(long)]
    oracle_url: Option<String>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Category to scan for; repeat for more. Defaults to the whole catalog.
    #[arg(long = "category")]
    categories: Vec<String>,
    /// Scan for nothing. No oracle is consulted.
    #[arg(long, conflicts_with = "categories")]
    no_categories: bool,
    #[arg(long)]
    no_schema: bool,
    /// Also write the inferred schema, pretty-printed, to this file.
    #[arg(long, conflicts_with = "no_schema")]
    schema_out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ReconcileArgs {
    #[arg(long)]
    input: PathBuf,
    /// JSON array of validated spans, or the output of `pii-lens scan`.
    #[arg(long)]
    spans: PathBuf,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };
    match cli.command {
        Command::Catalog => run_catalog(&config),
        Command::Normalize { labels } => run_normalize(&config, &labels),
        Command::Scan(args) => run_scan(&config, &args),
        Command::Reconcile(args) => run_reconcile(&config, &args),
    }
}

// Catalog, normalize and reconcile never consult the oracle.
fn offline_api(config: &ScanConfig) -> Result<ScanApi> {
    let oracle: Arc<dyn Oracle> = Arc::new(RecordedOracle::new(Value::Null));
    ScanApi::from_config(config, oracle).context("invalid scan configuration")
}

fn run_catalog(config: &ScanConfig) -> Result<()> {
    let api = offline_api(config)?;
    emit_json(serde_json::to_value(api.catalog())?)
}

fn run_normalize(config: &ScanConfig, labels: &[String]) -> Result<()> {
    let api = offline_api(config)?;
    emit_json(serde_json::json!({ "labels": api.normalize_labels(labels) }))
}

fn run_scan(config: &ScanConfig, args: &ScanArgs) -> Result<()> {
    let text = read_text_file(&args.input)?;
    let (oracle, schema_available): (Arc<dyn Oracle>, bool) =
        match (&args.oracle_response, &args.oracle_url) {
            (Some(path), _) => {
                let mut recorded = RecordedOracle::new(read_json_file(path)?);
                if let Some(schema_path) = &args.schema_response {
                    let body = read_json_file(schema_path)?;
                    let schema = pii_lens_oracle::schema_from_response(&body).with_context(|| {
                        format!("unusable schema response {}", schema_path.display())
                    })?;
                    recorded = recorded.with_schema(schema);
                }
                (Arc::new(recorded), args.schema_response.is_some())
            }
            (None, Some(base_url)) => {
                let oracle_config = OracleConfig {
                    base_url: base_url.clone(),
                    timeout_ms: args.timeout_ms.unwrap_or_else(|| {
                        config
                            .oracle
                            .as_ref()
                            .map_or(pii_lens_oracle::DEFAULT_TIMEOUT_MS, |c| c.timeout_ms)
                    }),
                    api_key: config.oracle.as_ref().and_then(|c| c.api_key.clone()),
                };
                (Arc::new(HttpOracle::new(&oracle_config)), true)
            }
            (None, None) => return Err(anyhow!("pass --oracle-response or --oracle-url")),
        };

    let mut api = ScanApi::from_config(config, oracle).context("invalid scan configuration")?;
    if let Some(timeout_ms) = args.timeout_ms {
        api = api.with_oracle_timeout(Duration::from_millis(timeout_ms));
    }

    let categories = if args.no_categories {
        Some(Vec::new())
    } else if args.categories.is_empty() {
        None
    } else {
        Some(args.categories.clone())
    };
    let include_schema = schema_available && !args.no_schema;
    if let (Some(path), false) = (&args.schema_out, include_schema) {
        return Err(anyhow!(
            "--schema-out {} needs a schema source: pass --schema-response or use --oracle-url",
            path.display()
        ));
    }
    let request = ScanRequest { text, categories, include_schema };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let response = runtime.block_on(api.scan(request))?;
    if let Some(path) = &args.schema_out {
        let schema = response.schema.as_ref().ok_or_else(|| {
            anyhow!("no schema was inferred for this scan; {} was not written", path.display())
        })?;
        fs::write(path, schema.pretty())
            .with_context(|| format!("failed to write schema file {}", path.display()))?;
    }
    emit_json(serde_json::to_value(&response)?)
}

fn run_reconcile(config: &ScanConfig, args: &ReconcileArgs) -> Result<()> {
    let api = offline_api(config)?;
    let text = read_text_file(&args.input)?;
    let spans = spans_from_json(read_json_file(&args.spans)?)
        .with_context(|| format!("no spans found in {}", args.spans.display()))?;
    let response = api.reconcile_text(&ReconcileRequest { text, spans });
    emit_json(serde_json::to_value(&response)?)
}

fn spans_from_json(value: Value) -> Result<Vec<ValidatedSpan>> {
    let spans = value.pointer("/result/spans").cloned().unwrap_or(value);
    Ok(serde_json::from_value(spans)?)
}

fn read_text_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))
}

fn read_json_file(path: &Path) -> Result<Value> {
    let body = read_text_file(path)?;
    serde_json::from_str(&body).with_context(|| format!("{} is not valid JSON", path.display()))
}
