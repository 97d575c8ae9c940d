// fnirs-qr - Quality reports for BIDS fNIRS datasets
// Module declarations

pub mod bids;
pub mod cli;
pub mod config;
pub mod nirs;
pub mod pipeline;
pub mod report;

pub use config::QualityConfig;
pub use nirs::{RecordingLoader, SnirfLoader};
pub use pipeline::{run_batch, BatchSummary, PipelineError};

/// Generate reports for every recording selected by `config`
pub fn run<L: RecordingLoader>(config: &QualityConfig, loader: &L) -> Result<BatchSummary, PipelineError> {
    log::info!("fnirs-qr {} starting", env!("CARGO_PKG_VERSION"));
    log::info!("    Input dataset: {}", config.input_root().display());
    log::info!("    Output location: {}", config.output_root().display());

    let summary = run_batch(config, loader)?;

    log::info!(
        "Finished: {} reports written, {} selectors without input",
        summary.processed.len(),
        summary.skipped.len()
    );
    Ok(summary)
}
