// Run configuration
// Explicit settings threaded through enumeration, the driver and the
// report builder

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_INPUT_DATASETS: &str = "/bids_dataset";
pub const DEFAULT_OUTPUT_LOCATION: &str = "/bids_dataset/derivatives/fnirs-apps-quality-reports";

/// Directory under the dataset root that receives execution manifests
pub const EXECUTION_DIR: &str = "execution";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive number of seconds, got {value}")]
    InvalidTimeWindow { name: &'static str, value: f64 },

    #[error("{name} must be finite, got {value}")]
    NonFiniteThreshold { name: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Root of the BIDS dataset
    pub input_datasets: PathBuf,

    /// Root under which reports are written
    pub output_location: PathBuf,

    /// Explicit labels; `None` means scan the dataset
    pub subject_labels: Option<Vec<String>>,
    pub session_labels: Option<Vec<String>>,
    pub task_labels: Option<Vec<String>>,
    pub run_labels: Option<Vec<String>>,

    /// Channels with whole-recording SCI below this are marked bad
    pub sci_threshold: f64,

    /// Threshold drawn on the peak-power map
    pub pp_threshold: f64,

    /// Window length for windowed SCI, seconds
    pub sci_time_window: f64,

    /// Window length for peak power, seconds
    pub pp_time_window: f64,

    /// Write SCI scores back into channels.tsv sidecars
    pub annotate_channels: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        QualityConfig {
            input_datasets: PathBuf::from(DEFAULT_INPUT_DATASETS),
            output_location: PathBuf::from(DEFAULT_OUTPUT_LOCATION),
            subject_labels: None,
            session_labels: None,
            task_labels: None,
            run_labels: None,
            sci_threshold: 0.0,
            pp_threshold: 0.0,
            sci_time_window: 60.0,
            pp_time_window: 10.0,
            annotate_channels: false,
        }
    }
}

impl QualityConfig {
    /// Default settings for the given dataset and output roots
    pub fn new(input_datasets: impl Into<PathBuf>, output_location: impl Into<PathBuf>) -> Self {
        QualityConfig {
            input_datasets: input_datasets.into(),
            output_location: output_location.into(),
            ..QualityConfig::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("sci_time_window", self.sci_time_window),
            ("pp_time_window", self.pp_time_window),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidTimeWindow { name, value });
            }
        }
        for (name, value) in [
            ("sci_threshold", self.sci_threshold),
            ("pp_threshold", self.pp_threshold),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFiniteThreshold { name, value });
            }
        }
        Ok(())
    }

    /// Directory receiving execution manifests
    pub fn manifest_dir(&self) -> PathBuf {
        self.input_datasets.join(EXECUTION_DIR)
    }

    pub fn input_root(&self) -> &Path {
        &self.input_datasets
    }

    pub fn output_root(&self) -> &Path {
        &self.output_location
    }
}
