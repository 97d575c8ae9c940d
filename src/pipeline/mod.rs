// Pipeline execution module
// Batch driver over entity selectors and the execution manifest

pub mod batch;
pub mod manifest;

pub use batch::{process_selector, run_batch, BatchSummary, PipelineError, SelectorOutcome};
pub use manifest::{hash_file, manifest_path, read_manifest, ExecutionManifest, ManifestEntry, ManifestError};
