// Batch driver
// Visits every entity selector, builds one report per recording found
// and writes the execution manifest at the end

use chrono::Local;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::bids::{enumerate_entities, EntityError, EntitySelector};
use crate::config::{ConfigError, QualityConfig};
use crate::nirs::{LoadError, RecordingLoader};
use crate::pipeline::manifest::{hash_file, manifest_path, ExecutionManifest, ManifestError};
use crate::report::{build_report, ReportError};

/// Any failure that aborts a batch run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Entity enumeration failed: {0}")]
    Entity(#[from] EntityError),

    #[error("Failed to load recording: {0}")]
    Load(#[from] LoadError),

    #[error("Report generation failed: {0}")]
    Report(#[from] ReportError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of visiting one selector
#[derive(Debug)]
pub enum SelectorOutcome {
    /// No input file; not an error
    Skipped { reason: String },

    /// Report written; the input hash goes into the manifest
    Processed {
        input: PathBuf,
        output: PathBuf,
        sha256: String,
    },

    Failed(PipelineError),
}

/// What a completed batch produced
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub processed: Vec<PathBuf>,
    pub skipped: Vec<EntitySelector>,
    pub manifest: PathBuf,
}

/// Load, report on and save one selector's recording
pub fn process_selector<L: RecordingLoader>(
    selector: &EntitySelector,
    config: &QualityConfig,
    loader: &L,
) -> SelectorOutcome {
    let input = selector.input_path(config.input_root());
    if !input.is_file() {
        log::info!("    No file exists: {}", input.display());
        return SelectorOutcome::Skipped {
            reason: format!("{} does not exist", input.display()),
        };
    }

    log::info!("    Found file: {}", input.display());
    match report_on(selector, &input, config, loader) {
        Ok((output, sha256)) => SelectorOutcome::Processed {
            input,
            output,
            sha256,
        },
        Err(e) => SelectorOutcome::Failed(e),
    }
}

fn report_on<L: RecordingLoader>(
    selector: &EntitySelector,
    input: &std::path::Path,
    config: &QualityConfig,
    loader: &L,
) -> Result<(PathBuf, String), PipelineError> {
    let sha256 = hash_file(input)?;

    let output = selector.report_path(config.output_root());
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    let recording = loader.load(input)?;
    log::debug!(
        "Loaded {} channels, {} samples at {} Hz",
        recording.n_channels(),
        recording.n_times(),
        recording.sfreq
    );

    let sidecar = config
        .annotate_channels
        .then(|| selector.channels_path(config.input_root()));
    let (_, report) = build_report(recording, &selector.basename(), config, sidecar.as_deref())?;
    report.save(&output)?;
    log::info!("    Report written: {}", output.display());

    Ok((output, sha256))
}

/// Process every selector in order. The first failure aborts the run
/// and no manifest is written for it.
pub fn run_batch<L: RecordingLoader>(
    config: &QualityConfig,
    loader: &L,
) -> Result<BatchSummary, PipelineError> {
    let start = Local::now();
    config.validate()?;

    fs::create_dir_all(config.output_root())?;

    let labels = enumerate_entities(config)?;
    let mut manifest = ExecutionManifest::new(start, config.clone());
    let mut summary = BatchSummary::default();

    for selector in labels.selectors() {
        log::info!("Processing: {}", selector);
        match process_selector(&selector, config, loader) {
            SelectorOutcome::Skipped { reason } => {
                log::debug!("Skipped {}: {}", selector, reason);
                summary.skipped.push(selector);
            }
            SelectorOutcome::Processed {
                input,
                output,
                sha256,
            } => {
                manifest.record(selector.basename(), &input, sha256);
                summary.processed.push(output);
            }
            SelectorOutcome::Failed(e) => {
                log::error!("Failed on {}: {}", selector, e);
                return Err(e);
            }
        }
    }

    manifest.finish(Local::now());
    let path = manifest.write(&manifest_path(config, &start))?;
    log::info!("Execution manifest written: {}", path.display());

    summary.manifest = path;
    Ok(summary)
}
