//! `predserve-load`: write one generation of prediction results into a fresh index.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use predserve::{index_name_from_template, read_records, run_load, LoadConfig};

/// Load precomputed prediction records into a new timestamped index
#[derive(Parser, Debug, Clone)]
#[command(name = "predserve-load")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
struct LoadArgs {
    /// YAML run configuration
    #[arg(short, long, env = "PREDSERVE_CONFIG")]
    config: Option<PathBuf>,

    /// JSON-lines file of prediction records (overrides `input` in the config)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Exact index name; defaults to the configured template stamped with the current time
    #[arg(long, env = "PRED_INDEX_NAME")]
    index_name: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = LoadArgs::parse();

    let config = match &args.config {
        Some(path) => LoadConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => LoadConfig::default(),
    }
    .with_env_overrides(|key| std::env::var(key).ok())?;

    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_target(false)
        .init();

    let input = args
        .input
        .or_else(|| config.input.clone())
        .context("no input file given; pass --input or set `input` in the config")?;

    let index_name = args
        .index_name
        .unwrap_or_else(|| index_name_from_template(&config.index_template, chrono::Local::now()));

    let records = read_records(&input)?;
    tracing::info!(
        input = %input.display(),
        records = records.len(),
        index = %index_name,
        "starting load"
    );

    let backend = config.backend_config().build()?;
    let summary = run_load(backend.as_ref(), &records, &index_name, &config).await?;

    tracing::info!("index name: {}", summary.index_name());
    tracing::info!(
        "total records {} / target {}",
        summary.success_count(),
        summary.target_count()
    );
    Ok(())
}
