// Command-line arguments
// Parsed with clap and converted into a QualityConfig

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::config::{QualityConfig, DEFAULT_INPUT_DATASETS, DEFAULT_OUTPUT_LOCATION};

/// Quality reports for BIDS-formatted fNIRS datasets
#[derive(Parser, Debug)]
#[command(name = "fnirs-qr", version, about, disable_version_flag = true)]
pub struct Args {
    /// The directory with the input dataset formatted according to the BIDS standard
    #[arg(long, value_name = "PATH", env = "FNIRS_QR_INPUT_DATASETS", default_value = DEFAULT_INPUT_DATASETS)]
    pub input_datasets: PathBuf,

    /// The directory where the output files should be stored
    #[arg(long, value_name = "PATH", env = "FNIRS_QR_OUTPUT_LOCATION", default_value = DEFAULT_OUTPUT_LOCATION)]
    pub output_location: PathBuf,

    /// Participant label(s) without the "sub-" prefix; all subjects when omitted
    #[arg(long, value_name = "LABEL", num_args = 1.., value_delimiter = ' ', env = "FNIRS_QR_SUBJECT_LABEL")]
    pub subject_label: Option<Vec<String>>,

    /// Session label(s) without the "ses-" prefix; all sessions when omitted
    #[arg(long, value_name = "LABEL", num_args = 1.., value_delimiter = ' ', env = "FNIRS_QR_SESSION_LABEL")]
    pub session_label: Option<Vec<String>>,

    /// Task label(s); all tasks when omitted
    #[arg(long, value_name = "LABEL", num_args = 1.., value_delimiter = ' ', env = "FNIRS_QR_TASK_LABEL")]
    pub task_label: Option<Vec<String>>,

    /// Run label(s); all runs when omitted
    #[arg(long, value_name = "LABEL", num_args = 1.., value_delimiter = ' ', env = "FNIRS_QR_RUN_LABEL")]
    pub run_label: Option<Vec<String>>,

    /// Scalp coupling index below which a channel is marked as bad
    #[arg(long, value_name = "FLOAT", env = "FNIRS_QR_SCI_THRESHOLD", default_value_t = 0.0)]
    pub sci_threshold: f64,

    /// Peak power below which a channel window is flagged
    #[arg(long, value_name = "FLOAT", env = "FNIRS_QR_PP_THRESHOLD", default_value_t = 0.0)]
    pub pp_threshold: f64,

    /// Window length in seconds for the windowed scalp coupling index
    #[arg(long, value_name = "SECS", env = "FNIRS_QR_SCI_TIME_WINDOW", default_value_t = 60.0)]
    pub sci_time_window: f64,

    /// Window length in seconds for peak power
    #[arg(long, value_name = "SECS", env = "FNIRS_QR_PP_TIME_WINDOW", default_value_t = 10.0)]
    pub pp_time_window: f64,

    /// Write SCI scores and channel status into the channels.tsv sidecars
    #[arg(long, env = "FNIRS_QR_ANNOTATE_CHANNELS")]
    pub annotate_channels: bool,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

impl From<Args> for QualityConfig {
    fn from(args: Args) -> Self {
        QualityConfig {
            input_datasets: args.input_datasets,
            output_location: args.output_location,
            subject_labels: args.subject_label,
            session_labels: args.session_label,
            task_labels: args.task_label,
            run_labels: args.run_label,
            sci_threshold: args.sci_threshold,
            pp_threshold: args.pp_threshold,
            sci_time_window: args.sci_time_window,
            pp_time_window: args.pp_time_window,
            annotate_channels: args.annotate_channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_config_defaults() {
        let args = Args::try_parse_from(["fnirs-qr"]).unwrap();
        let config = QualityConfig::from(args);
        assert_eq!(config, QualityConfig::default());
    }

    #[test]
    fn test_space_separated_labels() {
        let args = Args::try_parse_from([
            "fnirs-qr",
            "--input-datasets",
            "/data",
            "--subject-label",
            "01",
            "02",
            "--task-label",
            "rest",
            "--sci-threshold",
            "0.7",
        ])
        .unwrap();
        let config = QualityConfig::from(args);

        assert_eq!(config.input_datasets, PathBuf::from("/data"));
        assert_eq!(
            config.subject_labels,
            Some(vec!["01".to_string(), "02".to_string()])
        );
        assert_eq!(config.task_labels, Some(vec!["rest".to_string()]));
        assert!(config.session_labels.is_none());
        assert_eq!(config.sci_threshold, 0.7);
    }

    #[test]
    fn test_version_flag_exits_early() {
        let err = Args::try_parse_from(["fnirs-qr", "-v"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_rejects_non_numeric_threshold() {
        assert!(Args::try_parse_from(["fnirs-qr", "--pp-threshold", "high"]).is_err());
    }
}
