// Spectral estimation
// Welch PSD and single-segment periodograms built on realfft

use realfft::RealFftPlanner;

use crate::nirs::recording::NirsError;

/// Longest Welch segment in samples
pub const WELCH_SEGMENT: usize = 256;

/// Power spectral density of every channel
#[derive(Debug, Clone)]
pub struct PowerSpectrum {
    /// Frequency of each bin in Hz
    pub freqs: Vec<f64>,

    /// Linear PSD per channel: psd[channel][bin]
    pub psd: Vec<Vec<f64>>,
}

impl PowerSpectrum {
    /// PSD in decibels (10 log10), with a floor to keep zeros finite
    pub fn to_db(&self) -> Vec<Vec<f64>> {
        self.psd
            .iter()
            .map(|row| row.iter().map(|p| 10.0 * p.max(1e-30).log10()).collect())
            .collect()
    }

    /// Mean and standard deviation across channels of the dB spectrum
    pub fn mean_and_std_db(&self) -> (Vec<f64>, Vec<f64>) {
        let db = self.to_db();
        let n_bins = self.freqs.len();
        let n_channels = db.len().max(1) as f64;

        let mut mean = vec![0.0; n_bins];
        for row in &db {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n_channels;
            }
        }

        let mut std = vec![0.0; n_bins];
        for row in &db {
            for ((s, v), m) in std.iter_mut().zip(row).zip(&mean) {
                *s += (v - m).powi(2) / n_channels;
            }
        }
        for s in std.iter_mut() {
            *s = s.sqrt();
        }

        (mean, std)
    }
}

/// Hamming window of length n
pub fn hamming(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => (0..n)
            .map(|i| {
                0.54 - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos()
            })
            .collect(),
    }
}

/// One-sided power spectral density of one segment: mean removed,
/// Hamming window applied, density scaling
fn segment_density(
    planner: &mut RealFftPlanner<f64>,
    segment: &[f64],
    window: &[f64],
    sfreq: f64,
) -> Result<Vec<f64>, NirsError> {
    let n = segment.len();
    let mean = segment.iter().sum::<f64>() / n as f64;

    let fft = planner.plan_fft_forward(n);
    let mut input: Vec<f64> = segment
        .iter()
        .zip(window)
        .map(|(x, w)| (x - mean) * w)
        .collect();
    let mut spectrum = fft.make_output_vec();

    fft.process(&mut input, &mut spectrum)
        .map_err(|e| NirsError::Fft(e.to_string()))?;

    let scale = 1.0 / (sfreq * window.iter().map(|w| w * w).sum::<f64>());
    let last = spectrum.len() - 1;
    Ok(spectrum
        .iter()
        .enumerate()
        .map(|(k, c)| {
            let p = c.norm_sqr() * scale;
            // one-sided: fold negative frequencies except DC and Nyquist
            if k == 0 || (n % 2 == 0 && k == last) {
                p
            } else {
                2.0 * p
            }
        })
        .collect())
}

fn bin_freqs(n: usize, sfreq: f64) -> Vec<f64> {
    (0..n / 2 + 1).map(|k| k as f64 * sfreq / n as f64).collect()
}

/// Full linear convolution, `a.len() + b.len() - 1` samples, computed
/// in the frequency domain
pub fn convolve(a: &[f64], b: &[f64]) -> Result<Vec<f64>, NirsError> {
    if a.is_empty() || b.is_empty() {
        return Ok(Vec::new());
    }
    let len = a.len() + b.len() - 1;
    let size = len.next_power_of_two();

    let mut planner = RealFftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let mut spectra = Vec::with_capacity(2);
    for signal in [a, b] {
        let mut input = forward.make_input_vec();
        input[..signal.len()].copy_from_slice(signal);
        let mut spectrum = forward.make_output_vec();
        forward
            .process(&mut input, &mut spectrum)
            .map_err(|e| NirsError::Fft(e.to_string()))?;
        spectra.push(spectrum);
    }

    let mut product: Vec<_> = spectra[0].iter().zip(&spectra[1]).map(|(x, y)| x * y).collect();
    // DC and Nyquist bins of a real signal are real
    let last = product.len() - 1;
    product[0].im = 0.0;
    product[last].im = 0.0;

    let mut output = inverse.make_output_vec();
    inverse
        .process(&mut product, &mut output)
        .map_err(|e| NirsError::Fft(e.to_string()))?;

    output.truncate(len);
    let scale = 1.0 / size as f64;
    Ok(output.into_iter().map(|v| v * scale).collect())
}

/// Welch PSD with Hamming windows and 50 % overlap
pub fn welch(data: &[Vec<f64>], sfreq: f64) -> Result<PowerSpectrum, NirsError> {
    let n_times = data.first().map(|row| row.len()).unwrap_or(0);
    if n_times == 0 {
        return Err(NirsError::EmptyRecording);
    }

    let nperseg = n_times.min(WELCH_SEGMENT);
    let step = (nperseg - nperseg / 2).max(1);
    let n_segments = (n_times - nperseg) / step + 1;
    let window = hamming(nperseg);
    let mut planner = RealFftPlanner::<f64>::new();

    let mut psd = Vec::with_capacity(data.len());
    for row in data {
        let mut acc = vec![0.0; nperseg / 2 + 1];
        for seg in 0..n_segments {
            let start = seg * step;
            let density = segment_density(&mut planner, &row[start..start + nperseg], &window, sfreq)?;
            for (a, d) in acc.iter_mut().zip(density) {
                *a += d;
            }
        }
        for a in acc.iter_mut() {
            *a /= n_segments as f64;
        }
        psd.push(acc);
    }

    Ok(PowerSpectrum {
        freqs: bin_freqs(nperseg, sfreq),
        psd,
    })
}

/// Hamming-windowed periodogram of a whole signal
pub fn periodogram(samples: &[f64], sfreq: f64) -> Result<Vec<f64>, NirsError> {
    if samples.is_empty() {
        return Err(NirsError::EmptyRecording);
    }
    let window = hamming(samples.len());
    let mut planner = RealFftPlanner::<f64>::new();
    segment_density(&mut planner, samples, &window, sfreq)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, sfreq: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sfreq).sin())
            .collect()
    }

    #[test]
    fn test_hamming_window_shape() {
        let w = hamming(101);
        assert!((w[0] - 0.08).abs() < 1e-12);
        assert!((w[50] - 1.0).abs() < 1e-12);
        assert!((w[100] - 0.08).abs() < 1e-12);
        assert_eq!(hamming(1), vec![1.0]);
    }

    #[test]
    fn test_welch_peak_at_tone_frequency() {
        let sfreq = 10.0;
        let data = vec![tone(2.0, sfreq, 2000)];

        let spectrum = welch(&data, sfreq).unwrap();

        assert_eq!(spectrum.freqs.len(), WELCH_SEGMENT / 2 + 1);
        let peak = spectrum.psd[0]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| spectrum.freqs[k])
            .unwrap();
        assert!((peak - 2.0).abs() < 0.05, "peak at {}", peak);
    }

    #[test]
    fn test_welch_short_signal_uses_single_segment() {
        let spectrum = welch(&[vec![1.0, 2.0, 3.0, 4.0]], 4.0).unwrap();
        assert_eq!(spectrum.freqs, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_mean_and_std_across_channels() {
        let spectrum = PowerSpectrum {
            freqs: vec![0.0, 1.0],
            psd: vec![vec![1.0, 10.0], vec![100.0, 10.0]],
        };

        let (mean, std) = spectrum.mean_and_std_db();

        assert!((mean[0] - 10.0).abs() < 1e-9);
        assert!((std[0] - 10.0).abs() < 1e-9);
        assert!((mean[1] - 10.0).abs() < 1e-9);
        assert!(std[1].abs() < 1e-9);
    }

    #[test]
    fn test_periodogram_of_constant_is_zero() {
        let pxx = periodogram(&[3.0; 16], 1.0).unwrap();
        assert!(pxx.iter().all(|p| p.abs() < 1e-20));
    }

    #[test]
    fn test_convolve_matches_direct_sum() {
        let a = [1.0, -2.0, 0.5, 3.0, 4.0];
        let b = [0.25, 0.5, -1.0];

        let fast = convolve(&a, &b).unwrap();

        assert_eq!(fast.len(), a.len() + b.len() - 1);
        for (k, value) in fast.iter().enumerate() {
            let direct: f64 = (0..b.len())
                .filter(|&j| k >= j && k - j < a.len())
                .map(|j| a[k - j] * b[j])
                .sum();
            assert!((value - direct).abs() < 1e-9, "index {}: {} vs {}", k, value, direct);
        }
    }

    #[test]
    fn test_convolve_empty_input() {
        assert!(convolve(&[], &[1.0]).unwrap().is_empty());
    }
}
