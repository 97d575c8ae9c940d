// In-memory fNIRS recording
// Channel waveforms, sampling info, annotations and the bad-channel list

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or processing a recording
#[derive(Debug, Error)]
pub enum NirsError {
    #[error("Recording has {channels} channels but {rows} data rows")]
    ChannelCountMismatch { channels: usize, rows: usize },

    #[error("Channel {0} has a different number of samples than channel 0")]
    RaggedData(String),

    #[error("Recording contains no samples")]
    EmptyRecording,

    #[error("Recording has no positive intensity samples")]
    NoPositiveIntensity,

    #[error("Invalid sampling rate: {0}")]
    InvalidSamplingRate(f64),

    #[error("Channels are not arranged in source-detector pairs: {0}")]
    UnpairedChannels(String),

    #[error("Expected {expected:?} data but recording holds {found:?}")]
    WrongUnit {
        expected: SignalUnit,
        found: SignalUnit,
    },

    #[error("Invalid filter band: {0}")]
    InvalidBand(String),

    #[error("Low-pass cutoff {lowpass} Hz leaves no room for a quality band above {l_freq} Hz")]
    LowpassBelowBand { lowpass: f64, l_freq: f64 },

    #[error("Invalid time window: {0} s")]
    InvalidTimeWindow(f64),

    #[error("FFT failed: {0}")]
    Fft(String),
}

/// Physical unit of the channel data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalUnit {
    /// Raw continuous-wave light intensity
    Intensity,
    /// Optical density, -ln(I / mean(I))
    OpticalDensity,
}

/// One measurement channel: a source-detector pair at one wavelength
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Display name, e.g. "S1_D2 760"
    pub name: String,

    /// 1-based source index
    pub source: usize,

    /// 1-based detector index
    pub detector: usize,

    /// Wavelength in nm
    pub wavelength: f64,
}

impl Channel {
    pub fn new(source: usize, detector: usize, wavelength: f64) -> Self {
        Channel {
            name: format!("S{}_D{} {}", source, detector, wavelength.round() as i64),
            source,
            detector,
            wavelength,
        }
    }

    /// Name of the optode pair without the wavelength, e.g. "S1_D2"
    pub fn pair_name(&self) -> String {
        format!("S{}_D{}", self.source, self.detector)
    }
}

/// A time-stamped annotation from the recording's stimulus stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Onset in seconds from the first sample
    pub onset: f64,

    /// Duration in seconds
    pub duration: f64,

    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectInfo {
    /// Subject identifier stored in the file (may differ from the BIDS label)
    pub id: Option<String>,

    pub first_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Recording {
    pub channels: Vec<Channel>,

    /// Channel-major samples: data[channel][sample]
    pub data: Vec<Vec<f64>>,

    /// Sampling rate in Hz
    pub sfreq: f64,

    /// Low-pass cutoff of the acquisition in Hz (Nyquist unless known)
    pub lowpass: f64,

    pub unit: SignalUnit,

    pub annotations: Vec<Annotation>,

    /// Channels marked bad. Written by the whole-recording SCI step,
    /// read by the montage step.
    pub bads: Vec<String>,

    pub subject: SubjectInfo,

    /// Source optode positions in metres (x, y, z)
    pub source_positions: Vec<[f64; 3]>,

    /// Detector optode positions in metres (x, y, z)
    pub detector_positions: Vec<[f64; 3]>,
}

impl Recording {
    /// Build an intensity recording, ordering channels so every
    /// source-detector pair occupies two adjacent slots
    pub fn new(
        channels: Vec<Channel>,
        data: Vec<Vec<f64>>,
        sfreq: f64,
    ) -> Result<Self, NirsError> {
        if channels.len() != data.len() {
            return Err(NirsError::ChannelCountMismatch {
                channels: channels.len(),
                rows: data.len(),
            });
        }
        if !sfreq.is_finite() || sfreq <= 0.0 {
            return Err(NirsError::InvalidSamplingRate(sfreq));
        }

        let n_times = data.first().map(|row| row.len()).unwrap_or(0);
        if n_times == 0 {
            return Err(NirsError::EmptyRecording);
        }
        if let Some(idx) = data.iter().position(|row| row.len() != n_times) {
            return Err(NirsError::RaggedData(channels[idx].name.clone()));
        }

        let mut paired: Vec<(Channel, Vec<f64>)> = channels.into_iter().zip(data).collect();
        paired.sort_by(|(a, _), (b, _)| {
            (a.source, a.detector)
                .cmp(&(b.source, b.detector))
                .then(a.wavelength.total_cmp(&b.wavelength))
        });
        let (channels, data): (Vec<_>, Vec<_>) = paired.into_iter().unzip();

        Ok(Recording {
            channels,
            data,
            sfreq,
            lowpass: sfreq / 2.0,
            unit: SignalUnit::Intensity,
            annotations: Vec::new(),
            bads: Vec::new(),
            subject: SubjectInfo::default(),
            source_positions: Vec::new(),
            detector_positions: Vec::new(),
        })
    }

    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn with_subject(mut self, subject: SubjectInfo) -> Self {
        self.subject = subject;
        self
    }

    pub fn with_positions(mut self, sources: Vec<[f64; 3]>, detectors: Vec<[f64; 3]>) -> Self {
        self.source_positions = sources;
        self.detector_positions = detectors;
        self
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn n_times(&self) -> usize {
        self.data.first().map(|row| row.len()).unwrap_or(0)
    }

    pub fn duration_secs(&self) -> f64 {
        self.n_times() as f64 / self.sfreq
    }

    /// Time of each sample in seconds
    pub fn times(&self) -> Vec<f64> {
        (0..self.n_times()).map(|i| i as f64 / self.sfreq).collect()
    }

    pub fn ch_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn is_bad(&self, name: &str) -> bool {
        self.bads.iter().any(|b| b == name)
    }

    /// Label used to prefix figure captions
    pub fn caption_label(&self) -> String {
        self.subject
            .first_name
            .clone()
            .or_else(|| self.subject.id.clone())
            .unwrap_or_else(|| "recording".to_string())
    }

    /// Fail unless the recording holds data in the given unit
    pub fn require_unit(&self, expected: SignalUnit) -> Result<(), NirsError> {
        if self.unit != expected {
            return Err(NirsError::WrongUnit {
                expected,
                found: self.unit,
            });
        }
        Ok(())
    }

    /// Verify channels come in adjacent (lower, higher wavelength) pairs
    /// sharing a source and detector
    pub fn check_pairs(&self) -> Result<(), NirsError> {
        if self.channels.len() % 2 != 0 {
            return Err(NirsError::UnpairedChannels(format!(
                "odd channel count {}",
                self.channels.len()
            )));
        }

        for pair in self.channels.chunks(2) {
            let (first, second) = (&pair[0], &pair[1]);
            if first.source != second.source
                || first.detector != second.detector
                || first.wavelength == second.wavelength
            {
                return Err(NirsError::UnpairedChannels(format!(
                    "{} / {}",
                    first.name, second.name
                )));
            }
        }

        Ok(())
    }

    /// Midpoint between a channel's source and detector, when positions are known
    pub fn channel_position(&self, idx: usize) -> Option<[f64; 3]> {
        let channel = self.channels.get(idx)?;
        let src = self.source_positions.get(channel.source.checked_sub(1)?)?;
        let det = self.detector_positions.get(channel.detector.checked_sub(1)?)?;
        Some([
            (src[0] + det[0]) / 2.0,
            (src[1] + det[1]) / 2.0,
            (src[2] + det[2]) / 2.0,
        ])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two-pair recording with a cardiac-like oscillation in phase on
    /// pair 1 and in anti-phase on pair 2
    pub(crate) fn synthetic_recording(seconds: f64, sfreq: f64) -> Recording {
        let n = (seconds * sfreq) as usize;
        let heart = |i: usize| (2.0 * std::f64::consts::PI * 1.0 * i as f64 / sfreq).sin();
        let slow = |i: usize| (2.0 * std::f64::consts::PI * 0.05 * i as f64 / sfreq).sin();

        let channels = vec![
            Channel::new(1, 1, 760.0),
            Channel::new(1, 1, 850.0),
            Channel::new(2, 1, 760.0),
            Channel::new(2, 1, 850.0),
        ];
        let data = vec![
            (0..n).map(|i| 1.0 + 0.05 * heart(i) + 0.02 * slow(i)).collect(),
            (0..n).map(|i| 1.2 + 0.05 * heart(i)).collect(),
            (0..n).map(|i| 0.8 + 0.05 * heart(i)).collect(),
            (0..n).map(|i| 0.9 - 0.05 * heart(i)).collect(),
        ];

        Recording::new(channels, data, sfreq)
            .unwrap()
            .with_subject(SubjectInfo {
                id: Some("01".to_string()),
                first_name: None,
            })
            .with_positions(
                vec![[0.0, 0.03, 0.0], [0.03, 0.03, 0.0]],
                vec![[0.015, 0.0, 0.0]],
            )
    }

    #[test]
    fn test_channels_are_sorted_into_pairs() {
        let channels = vec![
            Channel::new(2, 1, 850.0),
            Channel::new(1, 1, 850.0),
            Channel::new(2, 1, 760.0),
            Channel::new(1, 1, 760.0),
        ];
        let data = vec![vec![4.0], vec![2.0], vec![3.0], vec![1.0]];

        let recording = Recording::new(channels, data, 10.0).unwrap();

        assert_eq!(
            recording.ch_names(),
            vec!["S1_D1 760", "S1_D1 850", "S2_D1 760", "S2_D1 850"]
        );
        assert_eq!(recording.data, vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]]);
        assert!(recording.check_pairs().is_ok());
        assert_eq!(recording.lowpass, 5.0);
    }

    #[test]
    fn test_rejects_mismatched_rows() {
        let result = Recording::new(vec![Channel::new(1, 1, 760.0)], vec![], 10.0);
        assert!(matches!(result, Err(NirsError::ChannelCountMismatch { .. })));

        let result = Recording::new(
            vec![Channel::new(1, 1, 760.0), Channel::new(1, 1, 850.0)],
            vec![vec![1.0, 2.0], vec![1.0]],
            10.0,
        );
        assert!(matches!(result, Err(NirsError::RaggedData(_))));
    }

    #[test]
    fn test_rejects_bad_sampling_rate() {
        let result = Recording::new(vec![Channel::new(1, 1, 760.0)], vec![vec![1.0]], 0.0);
        assert!(matches!(result, Err(NirsError::InvalidSamplingRate(_))));
    }

    #[test]
    fn test_unpaired_channels_detected() {
        let recording = Recording::new(
            vec![Channel::new(1, 1, 760.0), Channel::new(1, 2, 850.0)],
            vec![vec![1.0], vec![1.0]],
            10.0,
        )
        .unwrap();

        assert!(matches!(
            recording.check_pairs(),
            Err(NirsError::UnpairedChannels(_))
        ));
    }

    #[test]
    fn test_channel_position_midpoint() {
        let recording = synthetic_recording(1.0, 10.0);
        let pos = recording.channel_position(0).unwrap();
        assert!((pos[0] - 0.0075).abs() < 1e-12);
        assert!((pos[1] - 0.015).abs() < 1e-12);
    }

    #[test]
    fn test_caption_label_falls_back_to_id() {
        let recording = synthetic_recording(1.0, 10.0);
        assert_eq!(recording.caption_label(), "01");
        assert!((recording.duration_secs() - 1.0).abs() < 1e-12);
    }
}
