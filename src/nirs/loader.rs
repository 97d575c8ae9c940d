// Recording loader abstraction
// The batch driver reads recordings through this seam so tests can
// supply synthetic data

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::nirs::recording::{NirsError, Recording};

/// Errors that can occur while loading a recording from disk
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "snirf")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error("Malformed SNIRF file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Unsupported SNIRF content in {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    #[error("Invalid recording: {0}")]
    Recording(#[from] NirsError),

    #[error("Cannot read {0}: built without SNIRF support (enable the `snirf` feature)")]
    SnirfDisabled(PathBuf),
}

/// Source of recordings for the report pipeline
pub trait RecordingLoader {
    fn load(&self, path: &Path) -> Result<Recording, LoadError>;
}

/// Reads SNIRF (HDF5) files
#[derive(Debug, Clone, Copy, Default)]
pub struct SnirfLoader;

impl RecordingLoader for SnirfLoader {
    fn load(&self, path: &Path) -> Result<Recording, LoadError> {
        log::debug!("Reading SNIRF file {}", path.display());
        crate::nirs::snirf::read_snirf(path)
    }
}
