//! Marginalia command line runner.
//!
//! Usage:
//!   marginalia --document paper.json
//!   marginalia --document paper.json --config marginalia.toml --document-id doc_42
//!
//! The document file holds either `{"sections": [...]}` or a bare array of
//! sections. The pipeline output is printed to stdout as JSON.
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` - completion provider key
//! - `RUST_LOG` - log filter (default: info,marginalia_pipeline=debug)

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use marginalia_common::Section;
use marginalia_pipeline::{MarginaliaConfig, Pipeline};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "marginalia", about = "Generate annotated discussion threads for a document")]
struct Args {
    /// Sectioned document as JSON
    #[arg(short, long)]
    document: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Defaults to the document file stem
    #[arg(long)]
    document_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentFile {
    Wrapped { sections: Vec<Section> },
    Bare(Vec<Section>),
}

impl DocumentFile {
    fn into_sections(self) -> Vec<Section> {
        match self {
            DocumentFile::Wrapped { sections } | DocumentFile::Bare(sections) => sections,
        }
    }
}

fn load_sections(path: &Path) -> anyhow::Result<Vec<Section>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document '{}'", path.display()))?;
    let document: DocumentFile = serde_json::from_str(&content)
        .with_context(|| format!("Document '{}' is not a section list", path.display()))?;
    Ok(document.into_sections())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,marginalia_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => MarginaliaConfig::from_file(path)?,
        None => MarginaliaConfig::default(),
    };

    let sections = load_sections(&args.document)?;
    let document_id = args.document_id.clone().unwrap_or_else(|| {
        args.document
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    });

    info!(
        document_id = %document_id,
        provider = %config.llm.provider,
        model = %config.llm.model,
        "Running pipeline"
    );

    let pipeline = Pipeline::from_config(&config)?;
    let output = pipeline
        .run_tracked(&document_id, &sections, &config.generation)
        .await?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
