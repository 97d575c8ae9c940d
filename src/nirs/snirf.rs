// SNIRF reader
// Reads continuous-wave amplitude data, probe geometry, stimuli and
// subject metadata from the HDF5-based SNIRF format

use std::path::Path;

use crate::nirs::loader::LoadError;
use crate::nirs::recording::Recording;

#[cfg(feature = "snirf")]
pub use reader::read_snirf;

#[cfg(not(feature = "snirf"))]
pub fn read_snirf(path: &Path) -> Result<Recording, LoadError> {
    Err(LoadError::SnirfDisabled(path.to_path_buf()))
}

#[cfg(feature = "snirf")]
mod reader {
    use super::*;
    use hdf5::types::{FixedAscii, FixedUnicode, TypeDescriptor, VarLenAscii, VarLenUnicode};
    use hdf5::{Dataset, File, Group};

    use crate::nirs::recording::{Annotation, Channel, SubjectInfo};

    /// SNIRF dataType for continuous-wave amplitude
    const CW_AMPLITUDE: i64 = 1;

    fn malformed(path: &Path, reason: impl Into<String>) -> LoadError {
        LoadError::Malformed {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    fn unsupported(path: &Path, reason: impl Into<String>) -> LoadError {
        LoadError::Unsupported {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    fn read_string(dataset: &Dataset, path: &Path) -> Result<String, LoadError> {
        let text = match dataset.dtype()?.to_descriptor()? {
            TypeDescriptor::VarLenUnicode => dataset
                .read_raw::<VarLenUnicode>()?
                .first()
                .map(|s| s.as_str().to_string()),
            TypeDescriptor::VarLenAscii => dataset
                .read_raw::<VarLenAscii>()?
                .first()
                .map(|s| s.as_str().to_string()),
            TypeDescriptor::FixedAscii(_) => dataset
                .read_raw::<FixedAscii<256>>()?
                .first()
                .map(|s| s.as_str().to_string()),
            TypeDescriptor::FixedUnicode(_) => dataset
                .read_raw::<FixedUnicode<256>>()?
                .first()
                .map(|s| s.as_str().to_string()),
            other => {
                return Err(unsupported(path, format!("expected a string, found {:?}", other)))
            }
        };
        Ok(text
            .unwrap_or_default()
            .trim_end_matches('\0')
            .trim()
            .to_string())
    }

    fn read_optional_string(group: &Group, name: &str, path: &Path) -> Result<Option<String>, LoadError> {
        if !group.link_exists(name) {
            return Ok(None);
        }
        let value = read_string(&group.dataset(name)?, path)?;
        Ok(Some(value).filter(|v| !v.is_empty()))
    }

    fn read_index(group: &Group, name: &str, path: &Path) -> Result<usize, LoadError> {
        let values = group.dataset(name)?.read_raw::<f64>()?;
        let value = values
            .first()
            .copied()
            .ok_or_else(|| malformed(path, format!("{} is empty", name)))?;
        if value < 1.0 {
            return Err(malformed(path, format!("{} must be 1-based, got {}", name, value)));
        }
        Ok(value.round() as usize)
    }

    /// Members named `<prefix><n>`, in numeric order
    fn numbered_members(group: &Group, prefix: &str) -> Result<Vec<String>, LoadError> {
        let mut members: Vec<(usize, String)> = group
            .member_names()?
            .into_iter()
            .filter_map(|name| {
                let idx = name.strip_prefix(prefix)?.parse::<usize>().ok()?;
                Some((idx, name))
            })
            .collect();
        members.sort();
        Ok(members.into_iter().map(|(_, name)| name).collect())
    }

    fn length_scale(unit: Option<&str>) -> f64 {
        match unit.map(|u| u.to_ascii_lowercase()).as_deref() {
            Some("mm") => 1e-3,
            Some("cm") => 1e-2,
            _ => 1.0,
        }
    }

    fn read_positions(probe: &Group, kind: &str, scale: f64) -> Result<Vec<[f64; 3]>, LoadError> {
        for (suffix, dims) in [("Pos3D", 3usize), ("Pos2D", 2usize)] {
            let name = format!("{}{}", kind, suffix);
            if !probe.link_exists(&name) {
                continue;
            }
            let dataset = probe.dataset(&name)?;
            let cols = dataset.shape().get(1).copied().unwrap_or(dims);
            let values = dataset.read_raw::<f64>()?;
            if cols == 0 {
                return Ok(Vec::new());
            }
            return Ok(values
                .chunks(cols)
                .map(|row| {
                    let at = |i: usize| row.get(i).copied().unwrap_or(0.0) * scale;
                    [at(0), at(1), if cols > 2 { at(2) } else { 0.0 }]
                })
                .collect());
        }
        Ok(Vec::new())
    }

    fn sampling_rate(time: &[f64], n_times: usize, time_scale: f64, path: &Path) -> Result<f64, LoadError> {
        // a two-element time vector is [start, step]
        if time.len() == 2 && n_times != 2 {
            return Ok(1.0 / (time[1] * time_scale));
        }
        if time.len() != n_times || n_times < 2 {
            return Err(malformed(
                path,
                format!("time has {} entries for {} samples", time.len(), n_times),
            ));
        }
        let span = (time[n_times - 1] - time[0]) * time_scale;
        Ok((n_times - 1) as f64 / span)
    }

    fn read_stimuli(nirs: &Group, t0: f64, time_scale: f64, path: &Path) -> Result<Vec<Annotation>, LoadError> {
        let mut annotations = Vec::new();
        for name in numbered_members(nirs, "stim")? {
            let stim = nirs.group(&name)?;
            let label = read_optional_string(&stim, "name", path)?.unwrap_or_else(|| name.clone());
            if !stim.link_exists("data") {
                continue;
            }

            let dataset = stim.dataset("data")?;
            let shape = dataset.shape();
            let values = dataset.read_raw::<f64>()?;
            let cols = if shape.len() == 2 { shape[1] } else { values.len() };
            if cols < 2 {
                continue;
            }

            for row in values.chunks(cols) {
                annotations.push(Annotation {
                    onset: (row[0] - t0) * time_scale,
                    duration: row[1] * time_scale,
                    description: label.clone(),
                });
            }
        }
        annotations.sort_by(|a, b| a.onset.total_cmp(&b.onset));
        Ok(annotations)
    }

    /// Read the first data block of a SNIRF file
    pub fn read_snirf(path: &Path) -> Result<Recording, LoadError> {
        let file = File::open(path)?;
        let nirs = if file.link_exists("nirs") {
            file.group("nirs")?
        } else if file.link_exists("nirs1") {
            file.group("nirs1")?
        } else {
            return Err(malformed(path, "no /nirs group"));
        };

        let meta = nirs.group("metaDataTags")?;
        let subject_id = read_optional_string(&meta, "SubjectID", path)?;
        let length_unit = read_optional_string(&meta, "LengthUnit", path)?;
        let time_unit = read_optional_string(&meta, "TimeUnit", path)?;
        let time_scale = match time_unit.as_deref() {
            Some("ms") => 1e-3,
            _ => 1.0,
        };

        let data_group = nirs.group("data1")?;
        let measurements = numbered_members(&data_group, "measurementList")?;
        if measurements.is_empty() {
            return Err(unsupported(path, "no measurementList<n> groups in data1"));
        }
        let n_channels = measurements.len();

        let series = data_group.dataset("dataTimeSeries")?;
        let shape = series.shape();
        if shape.len() != 2 {
            return Err(malformed(path, format!("dataTimeSeries has shape {:?}", shape)));
        }
        let (n_times, transposed) = if shape[1] == n_channels {
            (shape[0], false)
        } else if shape[0] == n_channels {
            (shape[1], true)
        } else {
            return Err(malformed(
                path,
                format!("dataTimeSeries shape {:?} does not match {} channels", shape, n_channels),
            ));
        };
        let values = series.read_raw::<f64>()?;

        let mut data = vec![Vec::with_capacity(n_times); n_channels];
        for t in 0..n_times {
            for (c, row) in data.iter_mut().enumerate() {
                let idx = if transposed { c * n_times + t } else { t * n_channels + c };
                row.push(values[idx]);
            }
        }

        let time = data_group.dataset("time")?.read_raw::<f64>()?;
        let sfreq = sampling_rate(&time, n_times, time_scale, path)?;
        let t0 = time.first().copied().unwrap_or(0.0);

        let probe = nirs.group("probe")?;
        let wavelengths = probe.dataset("wavelengths")?.read_raw::<f64>()?;

        let mut channels = Vec::with_capacity(n_channels);
        for name in &measurements {
            let ml = data_group.group(name)?;
            let data_type = ml.dataset("dataType")?.read_raw::<i64>()?;
            if data_type.first().copied() != Some(CW_AMPLITUDE) {
                return Err(unsupported(
                    path,
                    format!("{} has dataType {:?}; only CW amplitude is supported", name, data_type),
                ));
            }
            let source = read_index(&ml, "sourceIndex", path)?;
            let detector = read_index(&ml, "detectorIndex", path)?;
            let wavelength_index = read_index(&ml, "wavelengthIndex", path)?;
            let wavelength = wavelengths
                .get(wavelength_index - 1)
                .copied()
                .ok_or_else(|| malformed(path, format!("{} wavelengthIndex out of range", name)))?;
            channels.push(Channel::new(source, detector, wavelength));
        }

        let scale = length_scale(length_unit.as_deref());
        let sources = read_positions(&probe, "source", scale)?;
        let detectors = read_positions(&probe, "detector", scale)?;
        let annotations = read_stimuli(&nirs, t0, time_scale, path)?;

        log::debug!(
            "Loaded {} channels x {} samples at {:.3} Hz, {} annotations",
            n_channels,
            n_times,
            sfreq,
            annotations.len()
        );

        Ok(Recording::new(channels, data, sfreq)?
            .with_annotations(annotations)
            .with_subject(SubjectInfo {
                id: subject_id,
                first_name: None,
            })
            .with_positions(sources, detectors))
    }

}
