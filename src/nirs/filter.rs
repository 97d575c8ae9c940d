// FIR band-pass filtering
// Hamming-windowed sinc design applied zero-phase with reflected edges

use serde::{Deserialize, Serialize};

use crate::nirs::recording::NirsError;
use crate::nirs::spectrum::convolve;

/// Frequency band isolating the cardiac component used by the
/// coupling metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBand {
    /// Lower pass-band edge in Hz
    pub l_freq: f64,

    /// Upper pass-band edge in Hz
    pub h_freq: f64,

    /// Width of the lower transition band in Hz
    pub l_trans_bandwidth: f64,

    /// Width of the upper transition band in Hz
    pub h_trans_bandwidth: f64,
}

impl Default for QualityBand {
    fn default() -> Self {
        QualityBand {
            l_freq: 0.7,
            h_freq: 1.5,
            l_trans_bandwidth: 0.3,
            h_trans_bandwidth: 0.3,
        }
    }
}

impl QualityBand {
    /// Low-pass cutoff below which the default band no longer fits
    pub const ADAPT_BELOW_HZ: f64 = 1.5;

    /// Narrow transition band used for low-pass-limited recordings
    pub const NARROW_TRANS_BANDWIDTH: f64 = 0.1;

    /// Band for a recording with the given low-pass cutoff. At or below
    /// 1.5 Hz the upper edge moves under the cutoff and the transition
    /// band narrows. Fails when no band fits between `l_freq` and the
    /// cutoff.
    pub fn for_lowpass(lowpass: f64) -> Result<Self, NirsError> {
        let band = QualityBand::default();
        if lowpass > Self::ADAPT_BELOW_HZ {
            return Ok(band);
        }

        let h_trans_bandwidth = Self::NARROW_TRANS_BANDWIDTH;
        let h_freq = lowpass - h_trans_bandwidth;
        if h_freq <= band.l_freq {
            return Err(NirsError::LowpassBelowBand {
                lowpass,
                l_freq: band.l_freq,
            });
        }

        Ok(QualityBand {
            h_freq,
            h_trans_bandwidth,
            ..band
        })
    }

    pub fn with_h_trans_bandwidth(self, h_trans_bandwidth: f64) -> Self {
        QualityBand {
            h_trans_bandwidth,
            ..self
        }
    }

    /// Whether this band differs from the default one
    pub fn is_adapted(&self) -> bool {
        *self != QualityBand::default()
    }

    fn validate(&self, sfreq: f64) -> Result<(), NirsError> {
        let nyquist = sfreq / 2.0;
        if !(self.l_freq > 0.0 && self.h_freq > self.l_freq) {
            return Err(NirsError::InvalidBand(format!(
                "need 0 < l_freq < h_freq, got {} / {}",
                self.l_freq, self.h_freq
            )));
        }
        if self.h_freq >= nyquist {
            return Err(NirsError::InvalidBand(format!(
                "h_freq {} Hz must be below Nyquist {} Hz",
                self.h_freq, nyquist
            )));
        }
        if !(self.l_trans_bandwidth > 0.0 && self.h_trans_bandwidth > 0.0) {
            return Err(NirsError::InvalidBand(
                "transition bandwidths must be positive".to_string(),
            ));
        }
        if self.l_trans_bandwidth > self.l_freq {
            return Err(NirsError::InvalidBand(format!(
                "l_trans_bandwidth {} exceeds l_freq {}",
                self.l_trans_bandwidth, self.l_freq
            )));
        }
        Ok(())
    }
}

/// Filter length in taps: 3.3 / narrowest transition (s) samples, odd
fn filter_length(band: &QualityBand, sfreq: f64) -> usize {
    let min_trans = band.l_trans_bandwidth.min(band.h_trans_bandwidth);
    let n = (3.3 / min_trans * sfreq).ceil() as usize;
    let n = n.max(3);
    if n % 2 == 0 {
        n + 1
    } else {
        n
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

/// Design a linear-phase band-pass kernel with unit gain at the
/// centre of the pass band
pub fn design_bandpass(band: &QualityBand, sfreq: f64) -> Result<Vec<f64>, NirsError> {
    band.validate(sfreq)?;

    let nyquist = sfreq / 2.0;
    let n = filter_length(band, sfreq);
    let half = (n - 1) as f64 / 2.0;

    // cut-offs sit in the middle of each transition band, in cycles/sample
    let f1 = (band.l_freq - band.l_trans_bandwidth / 2.0) / sfreq;
    let f2 = (band.h_freq + band.h_trans_bandwidth / 2.0).min(nyquist) / sfreq;

    let mut kernel: Vec<f64> = (0..n)
        .map(|i| {
            let m = i as f64 - half;
            let ideal = 2.0 * f2 * sinc(2.0 * f2 * m) - 2.0 * f1 * sinc(2.0 * f1 * m);
            let window = 0.54 - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos();
            ideal * window
        })
        .collect();

    let centre = (f1 + f2) / 2.0;
    let gain: f64 = kernel
        .iter()
        .enumerate()
        .map(|(i, h)| h * (2.0 * std::f64::consts::PI * centre * (i as f64 - half)).cos())
        .sum();
    if gain.abs() > f64::EPSILON {
        for h in kernel.iter_mut() {
            *h /= gain;
        }
    }

    Ok(kernel)
}

/// Sample of the reflected signal at virtual index `i`; zero beyond
/// one reflection
fn reflected(samples: &[f64], i: isize) -> f64 {
    let n = samples.len() as isize;
    let idx = if i < 0 {
        -i
    } else if i >= n {
        2 * (n - 1) - i
    } else {
        i
    };
    if idx >= 0 && idx < n {
        samples[idx as usize]
    } else {
        0.0
    }
}

/// Apply a symmetric kernel without phase shift
pub fn apply_kernel(samples: &[f64], kernel: &[f64]) -> Result<Vec<f64>, NirsError> {
    if samples.is_empty() || kernel.is_empty() {
        return Ok(samples.to_vec());
    }
    let half = (kernel.len() / 2) as isize;
    let extended: Vec<f64> = (0..(samples.len() + kernel.len() - 1) as isize)
        .map(|j| reflected(samples, j - half))
        .collect();
    let reversed: Vec<f64> = kernel.iter().rev().copied().collect();

    let full = convolve(&extended, &reversed)?;
    let start = kernel.len() - 1;
    Ok(full[start..start + samples.len()].to_vec())
}

/// Band-pass every row of channel-major data
pub fn bandpass(
    data: &[Vec<f64>],
    band: &QualityBand,
    sfreq: f64,
) -> Result<Vec<Vec<f64>>, NirsError> {
    let kernel = design_bandpass(band, sfreq)?;
    data.iter().map(|row| apply_kernel(row, &kernel)).collect()
}
