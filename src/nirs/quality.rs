// Signal-quality metrics
// Scalp coupling index (whole recording and windowed) and peak power

use serde::{Deserialize, Serialize};

use crate::nirs::filter::{bandpass, QualityBand};
use crate::nirs::recording::{NirsError, Recording, SignalUnit};
use crate::nirs::spectrum::{convolve, periodogram};

/// Per-channel scores over consecutive time windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowedScores {
    /// scores[channel][window]
    pub scores: Vec<Vec<f64>>,

    /// (start, end) of each window in seconds
    pub windows: Vec<(f64, f64)>,
}

impl WindowedScores {
    pub fn n_windows(&self) -> usize {
        self.windows.len()
    }

    /// Fraction of (channel, window) cells at or above the threshold
    pub fn pass_fraction(&self, threshold: f64) -> f64 {
        let total = self.scores.iter().map(|row| row.len()).sum::<usize>();
        if total == 0 {
            return 0.0;
        }
        let passed = self
            .scores
            .iter()
            .flatten()
            .filter(|s| **s >= threshold)
            .count();
        passed as f64 / total as f64
    }
}

/// Pearson correlation, zero when undefined
fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let r = cov / (var_a * var_b).sqrt();
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

/// Sample ranges of consecutive non-overlapping windows. A trailing
/// partial window is dropped; a recording shorter than one window
/// yields a single window spanning it.
fn window_bounds(n_times: usize, sfreq: f64, time_window: f64) -> Result<Vec<(usize, usize)>, NirsError> {
    if !time_window.is_finite() || time_window <= 0.0 {
        return Err(NirsError::InvalidTimeWindow(time_window));
    }
    let window_samples = ((time_window * sfreq).round() as usize).max(1);
    let n_windows = n_times / window_samples;
    if n_windows == 0 {
        return Ok(vec![(0, n_times)]);
    }
    Ok((0..n_windows)
        .map(|w| (w * window_samples, (w + 1) * window_samples))
        .collect())
}

fn prepare(recording: &Recording, band: &QualityBand) -> Result<Vec<Vec<f64>>, NirsError> {
    recording.require_unit(SignalUnit::OpticalDensity)?;
    recording.check_pairs()?;
    bandpass(&recording.data, band, recording.sfreq)
}

/// Scalp coupling index of each channel over the whole recording.
/// Both wavelengths of a pair receive the pair's score.
pub fn scalp_coupling_index(recording: &Recording, band: &QualityBand) -> Result<Vec<f64>, NirsError> {
    let filtered = prepare(recording, band)?;

    let mut sci = vec![0.0; filtered.len()];
    for ii in (0..filtered.len()).step_by(2) {
        let r = correlation(&filtered[ii], &filtered[ii + 1]);
        sci[ii] = r;
        sci[ii + 1] = r;
    }
    Ok(sci)
}

/// Scalp coupling index computed per time window
pub fn scalp_coupling_index_windowed(
    recording: &Recording,
    band: &QualityBand,
    time_window: f64,
) -> Result<WindowedScores, NirsError> {
    let filtered = prepare(recording, band)?;
    let bounds = window_bounds(recording.n_times(), recording.sfreq, time_window)?;

    let mut scores = vec![Vec::with_capacity(bounds.len()); filtered.len()];
    for &(start, end) in &bounds {
        for ii in (0..filtered.len()).step_by(2) {
            let r = correlation(&filtered[ii][start..end], &filtered[ii + 1][start..end]);
            scores[ii].push(r);
            scores[ii + 1].push(r);
        }
    }

    Ok(WindowedScores {
        scores,
        windows: to_seconds(&bounds, recording.sfreq),
    })
}

fn zscore(x: &[f64]) -> Option<Vec<f64>> {
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    let std = (x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    if std > 0.0 && std.is_finite() {
        Some(x.iter().map(|v| v / std).collect())
    } else {
        None
    }
}

/// Full cross-correlation of two equal-length signals, lags -(n-1)..=(n-1)
fn cross_correlate(a: &[f64], b: &[f64]) -> Result<Vec<f64>, NirsError> {
    let reversed: Vec<f64> = b.iter().rev().copied().collect();
    convolve(a, &reversed)
}

/// Peak of the periodogram of the normalised cross-correlation of a
/// pair's two wavelengths
fn pair_peak_power(a: &[f64], b: &[f64], sfreq: f64) -> Result<f64, NirsError> {
    let (za, zb) = match (zscore(a), zscore(b)) {
        (Some(za), Some(zb)) => (za, zb),
        _ => return Ok(0.0),
    };

    let len = a.len() as f64;
    let xcorr: Vec<f64> = cross_correlate(&za, &zb)?.into_iter().map(|c| c / len).collect();
    let pxx = periodogram(&xcorr, sfreq)?;

    Ok(pxx.into_iter().fold(0.0, f64::max))
}

/// Peak power computed per time window
pub fn peak_power(
    recording: &Recording,
    band: &QualityBand,
    time_window: f64,
) -> Result<WindowedScores, NirsError> {
    let filtered = prepare(recording, band)?;
    let bounds = window_bounds(recording.n_times(), recording.sfreq, time_window)?;

    let mut scores = vec![Vec::with_capacity(bounds.len()); filtered.len()];
    for &(start, end) in &bounds {
        for ii in (0..filtered.len()).step_by(2) {
            let power = pair_peak_power(
                &filtered[ii][start..end],
                &filtered[ii + 1][start..end],
                recording.sfreq,
            )?;
            scores[ii].push(power);
            scores[ii + 1].push(power);
        }
    }

    Ok(WindowedScores {
        scores,
        windows: to_seconds(&bounds, recording.sfreq),
    })
}

fn to_seconds(bounds: &[(usize, usize)], sfreq: f64) -> Vec<(f64, f64)> {
    bounds
        .iter()
        .map(|&(s, e)| (s as f64 / sfreq, e as f64 / sfreq))
        .collect()
}

/// Names of channels whose score is strictly below the threshold
pub fn channels_below(recording: &Recording, scores: &[f64], threshold: f64) -> Vec<String> {
    recording
        .channels
        .iter()
        .zip(scores)
        .filter(|(_, score)| **score < threshold)
        .map(|(channel, _)| channel.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nirs::optical_density::optical_density;
    use crate::nirs::recording::tests::synthetic_recording;

    fn od_recording(seconds: f64) -> Recording {
        optical_density(synthetic_recording(seconds, 10.0)).unwrap()
    }

    #[test]
    fn test_cross_correlation_lags() {
        let a = [1.0, 2.0, 3.0, 0.5];
        let b = [0.5, -1.0, 2.0, 1.0];
        let n = a.len() as isize;

        let xcorr = cross_correlate(&a, &b).unwrap();

        assert_eq!(xcorr.len(), 2 * a.len() - 1);
        for (k, lag) in (-(n - 1)..n).enumerate() {
            let direct: f64 = (0..n)
                .filter(|j| (0..n).contains(&(j + lag)))
                .map(|j| a[(j + lag) as usize] * b[j as usize])
                .sum();
            assert!((xcorr[k] - direct).abs() < 1e-9, "lag {}: {} vs {}", lag, xcorr[k], direct);
        }
        // zero lag is the plain dot product
        assert!((xcorr[a.len() - 1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_correlation_limits() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let c = [4.0, 3.0, 2.0, 1.0];
        assert!((correlation(&a, &b) - 1.0).abs() < 1e-12);
        assert!((correlation(&a, &c) + 1.0).abs() < 1e-12);
        assert_eq!(correlation(&a, &[1.0; 4]), 0.0);
    }

    #[test]
    fn test_sci_scores_pairs() {
        let recording = od_recording(60.0);
        let sci = scalp_coupling_index(&recording, &QualityBand::default()).unwrap();

        assert_eq!(sci.len(), 4);
        assert_eq!(sci[0], sci[1]);
        assert_eq!(sci[2], sci[3]);
        assert!(sci[0] > 0.9, "coupled pair scored {}", sci[0]);
        assert!(sci[2] < -0.9, "anti-phase pair scored {}", sci[2]);
    }

    #[test]
    fn test_sci_requires_optical_density() {
        let recording = synthetic_recording(10.0, 10.0);
        assert!(matches!(
            scalp_coupling_index(&recording, &QualityBand::default()),
            Err(NirsError::WrongUnit { .. })
        ));
    }

    #[test]
    fn test_windowed_sci_window_count() {
        let recording = od_recording(65.0);
        let scores = scalp_coupling_index_windowed(&recording, &QualityBand::default(), 10.0).unwrap();

        assert_eq!(scores.n_windows(), 6);
        assert_eq!(scores.windows[0], (0.0, 10.0));
        assert_eq!(scores.windows[5], (50.0, 60.0));
        assert!(scores.scores.iter().all(|row| row.len() == 6));
    }

    #[test]
    fn test_short_recording_gets_one_window() {
        let recording = od_recording(30.0);
        let scores = scalp_coupling_index_windowed(&recording, &QualityBand::default(), 60.0).unwrap();
        assert_eq!(scores.n_windows(), 1);
        assert_eq!(scores.windows[0], (0.0, 30.0));
    }

    #[test]
    fn test_invalid_time_window() {
        let recording = od_recording(10.0);
        assert!(matches!(
            peak_power(&recording, &QualityBand::default(), 0.0),
            Err(NirsError::InvalidTimeWindow(_))
        ));
    }

    #[test]
    fn test_peak_power_is_non_negative_and_paired() {
        let recording = od_recording(30.0);
        let scores = peak_power(&recording, &QualityBand::default(), 10.0).unwrap();

        assert_eq!(scores.n_windows(), 3);
        for window in 0..3 {
            assert_eq!(scores.scores[0][window], scores.scores[1][window]);
            assert!(scores.scores[0][window] > 0.0);
        }
    }

    #[test]
    fn test_peak_power_flat_pair_is_zero() {
        assert_eq!(pair_peak_power(&[1.0; 20], &[2.0; 20], 10.0).unwrap(), 0.0);
    }

    #[test]
    fn test_channels_below_is_strict() {
        let recording = od_recording(10.0);
        let scores = [0.5, 0.5, 0.8, 0.8];

        assert!(channels_below(&recording, &scores, 0.0).is_empty());
        assert!(channels_below(&recording, &scores, 0.5).is_empty());
        assert_eq!(
            channels_below(&recording, &scores, 0.6),
            vec!["S1_D1 760", "S1_D1 850"]
        );
    }

    #[test]
    fn test_pass_fraction() {
        let scores = WindowedScores {
            scores: vec![vec![0.1, 0.9], vec![0.5, 0.7]],
            windows: vec![(0.0, 1.0), (1.0, 2.0)],
        };
        assert!((scores.pass_fraction(0.5) - 0.75).abs() < 1e-12);
    }
}
