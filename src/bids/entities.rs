// Entity enumeration
// Discovers subject/session/task/run labels from arguments or by
// scanning the dataset tree

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::bids::path::{EntitySelector, NIRS_SUFFIX, SNIRF_EXTENSION};
use crate::config::QualityConfig;

/// Directories never scanned for labels
const IGNORED_DIRS: [&str; 3] = ["derivatives", "sourcedata", "code"];

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("Dataset root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to walk dataset: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Distinct entity values found in a dataset, sorted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetScan {
    pub subjects: BTreeSet<String>,
    pub sessions: BTreeSet<String>,
    pub tasks: BTreeSet<String>,
    pub runs: BTreeSet<String>,
}

/// Labels to visit for each dimension. A `None` session or run is the
/// placeholder for datasets without that entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityLabels {
    pub subjects: Vec<String>,
    pub sessions: Vec<Option<String>>,
    pub tasks: Vec<String>,
    pub runs: Vec<Option<String>>,
}

impl EntityLabels {
    /// Cross product in visiting order: subject, task, session, run
    pub fn selectors(&self) -> Vec<EntitySelector> {
        let mut selectors = Vec::new();
        for subject in &self.subjects {
            for task in &self.tasks {
                for session in &self.sessions {
                    for run in &self.runs {
                        selectors.push(EntitySelector::new(
                            subject.clone(),
                            session.clone(),
                            task.clone(),
                            run.clone(),
                        ));
                    }
                }
            }
        }
        selectors
    }
}

fn is_ignored(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || IGNORED_DIRS.iter().any(|dir| name == *dir)
}

/// Split a BIDS filename into its `key-value` entities
pub fn parse_entities(file_name: &str) -> Vec<(String, String)> {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    stem.split('_')
        .filter_map(|part| {
            let (key, value) = part.split_once('-')?;
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Collect labels from `sub-*` directories and `*_nirs.snirf` filenames
pub fn scan_dataset(root: &Path) -> Result<DatasetScan, EntityError> {
    if !root.is_dir() {
        return Err(EntityError::RootNotFound(root.to_path_buf()));
    }

    let mut scan = DatasetScan::default();

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(label) = name.to_string_lossy().strip_prefix("sub-") {
            if !label.is_empty() {
                scan.subjects.insert(label.to_string());
            }
        }
    }

    let recording_tail = format!("_{}{}", NIRS_SUFFIX, SNIRF_EXTENSION);
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_ignored(e));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if !file_name.ends_with(&recording_tail) {
            continue;
        }

        for (key, value) in parse_entities(&file_name) {
            match key.as_str() {
                "ses" => {
                    scan.sessions.insert(value);
                }
                "task" => {
                    scan.tasks.insert(value);
                }
                "run" => {
                    scan.runs.insert(value);
                }
                _ => {}
            }
        }
    }

    Ok(scan)
}

/// Resolve the labels to visit, preferring explicit arguments
pub fn enumerate_entities(config: &QualityConfig) -> Result<EntityLabels, EntityError> {
    let needs_scan = config.subject_labels.is_none()
        || config.session_labels.is_none()
        || config.task_labels.is_none()
        || config.run_labels.is_none();
    let scan = if needs_scan {
        scan_dataset(config.input_root())?
    } else {
        DatasetScan::default()
    };

    log::info!("Extracting subject metadata.");
    let subjects = resolve("Subject", &config.subject_labels, &scan.subjects);
    log::info!("        Subjects: {:?}", subjects);

    log::info!("Extracting session metadata.");
    let sessions = with_placeholder(resolve("Session", &config.session_labels, &scan.sessions));
    log::info!("        Sessions: {:?}", sessions);

    log::info!("Extracting tasks metadata.");
    let tasks = resolve("Task", &config.task_labels, &scan.tasks);
    log::info!("        Tasks: {:?}", tasks);

    log::info!("Extracting run metadata.");
    let runs = with_placeholder(resolve("Run", &config.run_labels, &scan.runs));
    log::info!("        Runs: {:?}", runs);

    Ok(EntityLabels {
        subjects,
        sessions,
        tasks,
        runs,
    })
}

fn resolve(kind: &str, explicit: &Option<Vec<String>>, scanned: &BTreeSet<String>) -> Vec<String> {
    match explicit {
        Some(labels) => {
            log::info!("    {} data provided as input argument.", kind);
            labels.clone()
        }
        None => {
            log::info!("    {} data will be extracted from data.", kind);
            scanned.iter().cloned().collect()
        }
    }
}

fn with_placeholder(labels: Vec<String>) -> Vec<Option<String>> {
    if labels.is_empty() {
        vec![None]
    } else {
        labels.into_iter().map(Some).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_parse_entities() {
        let entities = parse_entities("sub-01_ses-02_task-finger-tapping_run-3_nirs.snirf");
        assert_eq!(
            entities,
            vec![
                ("sub".to_string(), "01".to_string()),
                ("ses".to_string(), "02".to_string()),
                ("task".to_string(), "finger-tapping".to_string()),
                ("run".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn test_single_recording_dataset() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "sub-01/ses-01/nirs/sub-01_ses-01_task-rest_nirs.snirf");

        let config = QualityConfig::new(temp_dir.path(), temp_dir.path().join("out"));
        let labels = enumerate_entities(&config).unwrap();

        assert_eq!(labels.subjects, vec!["01"]);
        assert_eq!(labels.sessions, vec![Some("01".to_string())]);
        assert_eq!(labels.tasks, vec!["rest"]);
        assert_eq!(labels.runs, vec![None]);
        assert_eq!(labels.selectors().len(), 1);
    }

    #[test]
    fn test_no_sessions_gives_placeholder() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "sub-01/nirs/sub-01_task-rest_nirs.snirf");
        touch(temp_dir.path(), "sub-02/nirs/sub-02_task-motor_run-1_nirs.snirf");

        let config = QualityConfig::new(temp_dir.path(), temp_dir.path().join("out"));
        let labels = enumerate_entities(&config).unwrap();

        assert_eq!(labels.subjects, vec!["01", "02"]);
        assert_eq!(labels.sessions, vec![None]);
        assert_eq!(labels.tasks, vec!["motor", "rest"]);
        assert_eq!(labels.runs, vec![Some("1".to_string())]);
    }

    #[test]
    fn test_ignored_directories_not_scanned() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "sub-01/nirs/sub-01_task-rest_nirs.snirf");
        touch(
            temp_dir.path(),
            "derivatives/other/sub-01/nirs/sub-01_task-hidden_nirs.snirf",
        );
        touch(temp_dir.path(), "sub-01/nirs/sub-01_task-ignored_events.tsv");

        let scan = scan_dataset(temp_dir.path()).unwrap();

        assert_eq!(scan.tasks.into_iter().collect::<Vec<_>>(), vec!["rest"]);
    }

    #[test]
    fn test_explicit_labels_used_verbatim() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "sub-01/nirs/sub-01_task-rest_nirs.snirf");

        let config = QualityConfig {
            subject_labels: Some(vec!["09".to_string(), "03".to_string()]),
            task_labels: Some(vec!["rest".to_string()]),
            ..QualityConfig::new(temp_dir.path(), temp_dir.path().join("out"))
        };
        let labels = enumerate_entities(&config).unwrap();

        assert_eq!(labels.subjects, vec!["09", "03"]);
        assert_eq!(labels.tasks, vec!["rest"]);
    }

    #[test]
    fn test_all_explicit_skips_scan() {
        let config = QualityConfig {
            subject_labels: Some(vec!["01".to_string()]),
            session_labels: Some(vec![]),
            task_labels: Some(vec!["rest".to_string()]),
            run_labels: Some(vec!["1".to_string(), "2".to_string()]),
            ..QualityConfig::new("/does/not/exist", "/out")
        };
        let labels = enumerate_entities(&config).unwrap();

        assert_eq!(labels.sessions, vec![None]);
        assert_eq!(labels.selectors().len(), 2);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let config = QualityConfig::new("/does/not/exist", "/out");
        assert!(matches!(
            enumerate_entities(&config),
            Err(EntityError::RootNotFound(_))
        ));
    }

    #[test]
    fn test_selector_order_is_subject_task_session_run() {
        let labels = EntityLabels {
            subjects: vec!["01".to_string(), "02".to_string()],
            sessions: vec![Some("a".to_string()), Some("b".to_string())],
            tasks: vec!["rest".to_string()],
            runs: vec![None],
        };

        let order: Vec<String> = labels.selectors().iter().map(|s| s.basename()).collect();

        assert_eq!(
            order,
            vec![
                "sub-01_ses-a_task-rest",
                "sub-01_ses-b_task-rest",
                "sub-02_ses-a_task-rest",
                "sub-02_ses-b_task-rest",
            ]
        );
    }
}
