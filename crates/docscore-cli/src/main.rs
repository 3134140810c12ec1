//! docscore CLI - evaluate generated documents from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Evaluate one document (or a JSON array of documents)
//! docscore evaluate response.json --pretty
//! docscore evaluate batch.json --config docscore.yaml --citations citations.json
//!
//! # Replay canned judgments instead of calling a service
//! docscore evaluate response.json --provider fixture --provider-config fixtures.json
//!
//! # Check the envelope schema and block validation only
//! docscore validate response.json
//!
//! # Print the default configuration
//! docscore config > docscore.yaml
//! ```
//!
//! Reports go to stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use docscore_core::{schema, Document};
use docscore_runtime::{OrchestratorBuilder, RuntimeConfig, StaticCitationSource};

/// Score generated documents for relevance, coherence, bias and accuracy.
#[derive(Parser)]
#[command(name = "docscore", version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Cmd {
    /// Evaluate a document, or a JSON array of documents
    Evaluate {
        file: PathBuf,

        /// Runtime configuration (YAML or JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Scoring provider, overriding the configured one
        #[arg(long)]
        provider: Option<String>,

        /// JSON file with provider settings
        #[arg(long)]
        provider_config: Option<PathBuf>,

        /// JSON file of external citations keyed by block id
        #[arg(long)]
        citations: Option<PathBuf>,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },
    /// Validate a document without scoring it
    Validate { file: PathBuf },
    /// Print the default runtime configuration as YAML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Cmd::Evaluate {
            file,
            config,
            provider,
            provider_config,
            citations,
            pretty,
        } => {
            let config = load_config(config.as_deref(), provider, provider_config.as_deref())?;
            let output = evaluate(&file, config, citations.as_deref()).await?;
            print_json(&output, pretty)?;
        }
        Cmd::Validate { file } => {
            let input = read_json(&file)?;
            let summary = validate_input(&input).with_context(|| format!("failed to ingest {}", file.display()))?;
            print_json(&summary, true)?;
        }
        Cmd::Config => {
            print!("{}", RuntimeConfig::default().to_yaml()?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>, provider: Option<String>, settings: Option<&Path>) -> Result<RuntimeConfig> {
    let mut config = match path {
        Some(path) => RuntimeConfig::from_file(path).with_context(|| format!("failed to load {}", path.display()))?,
        None => RuntimeConfig::default(),
    };

    if let Some(name) = provider {
        config.provider.name = name;
    }
    if let Some(path) = settings {
        let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        config.provider.settings =
            serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))?;
    }
    Ok(config)
}

async fn evaluate(file: &Path, config: RuntimeConfig, citations: Option<&Path>) -> Result<Value> {
    let mut builder = OrchestratorBuilder::new().config(config);
    if let Some(path) = citations {
        let source = StaticCitationSource::from_json_file(path)
            .with_context(|| format!("failed to load citations from {}", path.display()))?;
        builder = builder.citation_source(Arc::new(source));
    }
    let orchestrator = builder.build()?;

    match read_json(file)? {
        Value::Array(documents) => {
            let total = documents.len();
            let results = orchestrator.evaluate_batch(documents).await;
            let aborted = results.iter().filter(|r| r.is_err()).count();
            tracing::info!(total, aborted, "batch evaluated");

            results
                .into_iter()
                .map(|result| match result {
                    Ok(run) => serde_json::to_value(run).map_err(anyhow::Error::from),
                    Err(abort) => Ok(json!({ "error": abort.to_string() })),
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        single => {
            let run = orchestrator
                .evaluate_document(&single)
                .await
                .with_context(|| format!("failed to evaluate {}", file.display()))?;
            Ok(serde_json::to_value(run)?)
        }
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Schema violations are reported, not raised; a valid envelope is ingested
/// and its blocks summarised.
fn validate_input(input: &Value) -> Result<Value> {
    if !schema::is_valid_document(input) {
        let errors = schema::validate_document_schema(input).err().unwrap_or_default();
        return Ok(json!({
            "schema_valid": false,
            "schema_errors": errors,
        }));
    }

    let document = Document::ingest(input)?;
    let mut summary = validation_summary(&document);
    summary["schema_valid"] = json!(true);
    Ok(summary)
}

fn validation_summary(document: &Document) -> Value {
    let accepted: Vec<Value> = document
        .blocks
        .iter()
        .map(|b| {
            json!({
                "id": b.id,
                "position": b.position,
                "type": b.block.kind().as_str(),
                "citations": b.citations,
            })
        })
        .collect();

    let rejected: Vec<Value> = document
        .rejected
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "position": r.position,
                "type": r.kind.map(|k| k.as_str()),
                "error": r.error.to_string(),
            })
        })
        .collect();

    json!({
        "query": document.query,
        "accepted": accepted,
        "rejected": rejected,
    })
}

fn print_json(value: &Value, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reports_schema_errors() {
        let summary = validate_input(&json!({"query": "q", "blocks": {"0": {}}})).unwrap();
        assert_eq!(summary["schema_valid"], json!(false));
        assert!(!summary["schema_errors"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_validate_summarises_blocks() {
        let summary = validate_input(&json!({
            "query": "Compare string theories",
            "blocks": [
                {"id": "intro", "type": "paragraph", "text": "Theories differ."},
                {"id": "dims", "type": "table", "rows": [["Theory", "Dimensions"], ["Superstring"]]}
            ]
        }))
        .unwrap();
        assert_eq!(summary["schema_valid"], json!(true));
        assert_eq!(summary["accepted"][0]["id"], json!("intro"));
        assert_eq!(summary["rejected"][0]["id"], json!("dims"));
    }
}
