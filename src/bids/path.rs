// BIDS path construction
// Maps an entity selector onto input, output and sidecar file paths

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Datatype directory holding fNIRS files
pub const DATATYPE: &str = "nirs";

/// Suffix and extension of input recordings
pub const NIRS_SUFFIX: &str = "nirs";
pub const SNIRF_EXTENSION: &str = ".snirf";

/// Suffix and extension of generated reports
pub const REPORT_SUFFIX: &str = "qualityReport";
pub const REPORT_EXTENSION: &str = ".html";

/// Suffix and extension of the channel description sidecar
pub const CHANNELS_SUFFIX: &str = "channels";
pub const TSV_EXTENSION: &str = ".tsv";

/// One (subject, session, task, run) combination. `None` stands for a
/// dataset without that entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntitySelector {
    pub subject: String,
    pub session: Option<String>,
    pub task: String,
    pub run: Option<String>,
}

impl EntitySelector {
    pub fn new(
        subject: impl Into<String>,
        session: Option<String>,
        task: impl Into<String>,
        run: Option<String>,
    ) -> Self {
        EntitySelector {
            subject: subject.into(),
            session,
            task: task.into(),
            run,
        }
    }

    /// Entity chain without suffix, e.g. "sub-01_ses-01_task-rest_run-01"
    pub fn basename(&self) -> String {
        let mut name = format!("sub-{}", self.subject);
        if let Some(session) = &self.session {
            name.push_str(&format!("_ses-{}", session));
        }
        name.push_str(&format!("_task-{}", self.task));
        if let Some(run) = &self.run {
            name.push_str(&format!("_run-{}", run));
        }
        name
    }

    /// Directory relative to a dataset root, e.g. "sub-01/ses-01/nirs"
    pub fn relative_dir(&self) -> PathBuf {
        let mut dir = PathBuf::from(format!("sub-{}", self.subject));
        if let Some(session) = &self.session {
            dir.push(format!("ses-{}", session));
        }
        dir.push(DATATYPE);
        dir
    }

    /// Path of a file with the given suffix and extension under `root`
    pub fn file_path(&self, root: &Path, suffix: &str, extension: &str) -> PathBuf {
        root.join(self.relative_dir())
            .join(format!("{}_{}{}", self.basename(), suffix, extension))
    }

    /// Expected location of the recording in the input dataset
    pub fn input_path(&self, root: &Path) -> PathBuf {
        self.file_path(root, NIRS_SUFFIX, SNIRF_EXTENSION)
    }

    /// Location of the quality report under the output root
    pub fn report_path(&self, root: &Path) -> PathBuf {
        self.file_path(root, REPORT_SUFFIX, REPORT_EXTENSION)
    }

    /// Location of the channels.tsv sidecar in the input dataset
    pub fn channels_path(&self, root: &Path) -> PathBuf {
        self.file_path(root, CHANNELS_SUFFIX, TSV_EXTENSION)
    }
}

impl fmt::Display for EntitySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.subject)?;
        match &self.session {
            Some(session) => write!(f, "/ses-{}", session)?,
            None => write!(f, "/ses-None")?,
        }
        write!(f, "/task-{}", self.task)?;
        if let Some(run) = &self.run {
            write!(f, "/run-{}", run)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_with_session() {
        let selector = EntitySelector::new("01", Some("01".to_string()), "rest", None);

        assert_eq!(selector.basename(), "sub-01_ses-01_task-rest");
        assert_eq!(
            selector.input_path(Path::new("/data")),
            PathBuf::from("/data/sub-01/ses-01/nirs/sub-01_ses-01_task-rest_nirs.snirf")
        );
        assert_eq!(
            selector.report_path(Path::new("/out")),
            PathBuf::from("/out/sub-01/ses-01/nirs/sub-01_ses-01_task-rest_qualityReport.html")
        );
    }

    #[test]
    fn test_paths_without_session_with_run() {
        let selector = EntitySelector::new("02", None, "tapping", Some("03".to_string()));

        assert_eq!(
            selector.input_path(Path::new("/data")),
            PathBuf::from("/data/sub-02/nirs/sub-02_task-tapping_run-03_nirs.snirf")
        );
        assert_eq!(
            selector.channels_path(Path::new("/data")),
            PathBuf::from("/data/sub-02/nirs/sub-02_task-tapping_run-03_channels.tsv")
        );
    }

    #[test]
    fn test_display_for_logs() {
        let selector = EntitySelector::new("01", None, "rest", Some("1".to_string()));
        assert_eq!(selector.to_string(), "sub-01/ses-None/task-rest/run-1");
    }
}
