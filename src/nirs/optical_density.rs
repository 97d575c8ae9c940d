// Optical density conversion
// Converts raw light intensity to OD = -ln(I / mean(I)) per channel

use crate::nirs::recording::{NirsError, Recording, SignalUnit};

/// Convert an intensity recording to optical density in place.
/// Non-positive intensities are replaced by the smallest positive
/// magnitude in the recording before taking the log.
pub fn optical_density(mut recording: Recording) -> Result<Recording, NirsError> {
    recording.require_unit(SignalUnit::Intensity)?;

    let min_positive = recording
        .data
        .iter()
        .flatten()
        .map(|x| x.abs())
        .filter(|x| *x > 0.0 && x.is_finite())
        .fold(f64::INFINITY, f64::min);
    if !min_positive.is_finite() {
        return Err(NirsError::NoPositiveIntensity);
    }

    let mut clipped = 0usize;
    for row in recording.data.iter_mut() {
        for x in row.iter_mut() {
            let magnitude = x.abs();
            *x = if magnitude > 0.0 {
                magnitude
            } else {
                clipped += 1;
                min_positive
            };
        }

        let mean = row.iter().sum::<f64>() / row.len() as f64;
        for x in row.iter_mut() {
            *x = -(*x / mean).ln();
        }
    }

    if clipped > 0 {
        log::warn!(
            "{} non-positive intensity samples replaced by {:e}",
            clipped,
            min_positive
        );
    }

    recording.unit = SignalUnit::OpticalDensity;
    Ok(recording)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nirs::recording::tests::synthetic_recording;
    use crate::nirs::recording::Channel;

    #[test]
    fn test_constant_signal_has_zero_od() {
        let recording = Recording::new(
            vec![Channel::new(1, 1, 760.0), Channel::new(1, 1, 850.0)],
            vec![vec![2.0; 5], vec![0.5; 5]],
            10.0,
        )
        .unwrap();

        let od = optical_density(recording).unwrap();

        assert_eq!(od.unit, SignalUnit::OpticalDensity);
        for row in &od.data {
            for x in row {
                assert!(x.abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_od_sign_follows_intensity() {
        let recording = Recording::new(
            vec![Channel::new(1, 1, 760.0)],
            vec![vec![1.0, 2.0, 3.0]],
            10.0,
        )
        .unwrap();

        let od = optical_density(recording).unwrap();

        // mean is 2.0: brighter than average gives negative OD
        assert!((od.data[0][0] - (2.0f64).ln()).abs() < 1e-12);
        assert!(od.data[0][1].abs() < 1e-12);
        assert!(od.data[0][2] < 0.0);
    }

    #[test]
    fn test_non_positive_values_are_clipped() {
        let recording = Recording::new(
            vec![Channel::new(1, 1, 760.0)],
            vec![vec![0.0, -2.0, 4.0]],
            10.0,
        )
        .unwrap();

        let od = optical_density(recording).unwrap();

        assert!(od.data[0].iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_double_conversion_is_rejected() {
        let od = optical_density(synthetic_recording(2.0, 10.0)).unwrap();
        assert!(matches!(
            optical_density(od),
            Err(NirsError::WrongUnit { .. })
        ));
    }
}
