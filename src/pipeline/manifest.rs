// Execution manifest
// JSON record of one invocation: timing, arguments and the hash of
// every input file that was processed

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::QualityConfig;

/// Errors that can occur while hashing inputs or writing the manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// One processed input file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: PathBuf,

    /// SHA-256 of the file contents, lowercase hex
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionManifest {
    pub tool: String,
    pub version: String,

    /// RFC 3339 timestamps
    pub start_time: String,
    pub end_time: Option<String>,

    /// Resolved run configuration
    pub arguments: QualityConfig,

    /// Keyed by the recording's BIDS basename
    pub files: BTreeMap<String, ManifestEntry>,
}

impl ExecutionManifest {
    pub fn new(start: DateTime<Local>, arguments: QualityConfig) -> Self {
        ExecutionManifest {
            tool: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: start.to_rfc3339(),
            end_time: None,
            arguments,
            files: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, key: impl Into<String>, path: &Path, sha256: String) {
        self.files.insert(
            key.into(),
            ManifestEntry {
                path: path.to_path_buf(),
                sha256,
            },
        );
    }

    pub fn finish(&mut self, end: DateTime<Local>) {
        self.end_time = Some(end.to_rfc3339());
    }

    /// Write pretty JSON, creating the parent directory. An existing
    /// manifest is never replaced: a run that starts in the same second
    /// as an earlier one gets a numbered name. Returns the path written.
    pub fn write(&self, path: &Path) -> Result<PathBuf, ManifestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;

        let mut candidate = path.to_path_buf();
        let mut n = 0;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(mut file) => {
                    file.write_all(json.as_bytes())?;
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    n += 1;
                    candidate = numbered(path, n);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// `<stem>-<n>.json` next to `path`
fn numbered(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}-{}.json", stem, n))
}

/// Manifest location for a run started at `start`
pub fn manifest_path(config: &QualityConfig, start: &DateTime<Local>) -> PathBuf {
    config.manifest_dir().join(format!(
        "{}-quality-reports.json",
        start.format("%Y-%m-%d-%H-%M-%S")
    ))
}

/// Stream a file through SHA-256
pub fn hash_file(path: &Path) -> Result<String, ManifestError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Read a manifest back from disk
pub fn read_manifest(path: &Path) -> Result<ExecutionManifest, ManifestError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
