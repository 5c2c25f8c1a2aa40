//! Batch loader for precomputed prediction results.
//!
//! This crate stitches the index stages together so one call takes a result
//! set from the model's output to a freshly provisioned index: wait for the
//! backend, size the index from a sample record, replace any index of the
//! same name and bulk-load every record.

pub mod config;

pub use config::{ConfigLoadError, LoadConfig};
pub use index::{
    await_ready, bulk_load, bulk_load_report, index_name_from_template, provision_index,
    BackendConfig, BulkOptions, BulkReport, IndexDescriptor, IndexError, PredictionRecord,
    ReadinessConfig, SearchBackend,
};

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Errors that stop a load run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigLoadError),

    #[error("failed to read predictions from {source_name}: {reason}")]
    Input { source_name: String, reason: String },

    #[error("no prediction records to load")]
    NoRecords,

    #[error("backend is not ready after {0} attempts")]
    BackendNotReady(u32),

    #[error("failed to create index {0}")]
    Provision(String),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// What a load run produced.
#[derive(Debug, Clone)]
pub struct LoadSummary {
    pub descriptor: IndexDescriptor,
    pub report: BulkReport,
}

impl LoadSummary {
    pub fn index_name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn success_count(&self) -> usize {
        self.report.success_count()
    }

    /// Number of records the run was asked to write.
    pub fn target_count(&self) -> usize {
        self.report.attempted
    }
}

/// Read prediction records from a JSON-lines file.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<PredictionRecord>, PipelineError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| PipelineError::Input {
        source_name: path.display().to_string(),
        reason: err.to_string(),
    })?;
    read_records_from(BufReader::new(file), &path.display().to_string())
}

/// Read prediction records, one JSON object per line. Blank lines are skipped.
pub fn read_records_from<R: BufRead>(
    reader: R,
    source_name: &str,
) -> Result<Vec<PredictionRecord>, PipelineError> {
    let input_error = |reason: String| PipelineError::Input {
        source_name: source_name.to_string(),
        reason,
    };

    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| input_error(err.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str::<PredictionRecord>(&line)
            .map_err(|err| input_error(format!("line {}: {err}", line_no + 1)))?;
        records.push(record);
    }
    Ok(records)
}

/// Run one generation: readiness gate, provisioning, bulk load.
///
/// The index layout is taken from the first record; every other record is
/// checked against it during the load. Partial write failures do not fail
/// the run unless `config.bulk.max_failure_ratio` is exceeded.
pub async fn run_load(
    backend: &dyn SearchBackend,
    records: &[PredictionRecord],
    index_name: &str,
    config: &LoadConfig,
) -> Result<LoadSummary, PipelineError> {
    let sample = records.first().ok_or(PipelineError::NoRecords)?;

    if !await_ready(backend, &config.readiness).await {
        tracing::error!("backend is not ready, exiting");
        return Err(PipelineError::BackendNotReady(config.readiness.max_attempts));
    }

    let descriptor = IndexDescriptor::from_sample(index_name, sample);
    if !provision_index(backend, &descriptor).await {
        tracing::error!(index = %index_name, "failed to create index, exiting");
        return Err(PipelineError::Provision(index_name.to_string()));
    }

    let report = bulk_load_report(backend, records, &descriptor, &config.bulk).await;
    if let Some(max_ratio) = config.bulk.max_failure_ratio {
        report.enforce_threshold(max_ratio)?;
    }

    let summary = LoadSummary { descriptor, report };
    tracing::info!(
        index = %summary.index_name(),
        total = summary.success_count(),
        target = summary.target_count(),
        "load finished"
    );
    Ok(summary)
}
