// Quality report steps
// Eight fixed steps, each moving the recording and report through and
// appending one section

use std::collections::BTreeMap;
use std::path::Path;

use crate::bids::annotate_channels;
use crate::config::QualityConfig;
use crate::nirs::{
    channels_below, events_from_annotations, optical_density, peak_power, scalp_coupling_index,
    scalp_coupling_index_windowed, welch, EventSummary, PowerSpectrum, QualityBand, Recording,
    WindowedScores,
};
use crate::report::document::{Report, ReportError};
use crate::report::svg::{decimate, generate_palette, min_max, quality_color, Axes, Figure, Rect};

pub const RAW_WAVEFORM: &str = "Raw Waveform";
pub const TRIGGERS: &str = "Triggers";
pub const OPTICAL_DENSITY: &str = "Optical Density";
pub const OD_PSD: &str = "OD PSD";
pub const SCI_WINDOWED: &str = "SCI Windowed";
pub const PEAK_POWER: &str = "Peak Power";
pub const SCALP_COUPLING_INDEX: &str = "Scalp Coupling Index";
pub const MONTAGE: &str = "Montage";

/// Section names in the order the steps append them
pub const SECTION_ORDER: [&str; 8] = [
    RAW_WAVEFORM,
    TRIGGERS,
    OPTICAL_DENSITY,
    OD_PSD,
    SCI_WINDOWED,
    PEAK_POWER,
    SCALP_COUPLING_INDEX,
    MONTAGE,
];

const WIDTH: f64 = 1200.0;
const MAX_TRACE_POINTS: usize = 1500;
const HISTOGRAM_BINS: usize = 10;

const PASS_COLOR: &str = "#2e7d32";
const FAIL_COLOR: &str = "#c62828";
const NEUTRAL_COLOR: &str = "#9e9e9e";
const BAR_COLOR: &str = "#4a9eff";

type StepResult = Result<(Recording, Report), ReportError>;

fn caption(recording: &Recording, suffix: &str) -> String {
    format!("{}_{}", recording.caption_label(), suffix)
}

/// Every channel stacked vertically, each scaled to its own range
fn stacked_traces(recording: &Recording, title: &str) -> Figure {
    let n = recording.n_channels();
    let plot_height = (n as f64 * 22.0).max(200.0);
    let mut fig = Figure::new(WIDTH, plot_height + 110.0);
    fig.title(title);

    let axes = Axes::new(
        Rect::new(110.0, 50.0, WIDTH - 140.0, plot_height),
        (0.0, recording.duration_secs()),
        (-0.5, n as f64 - 0.5),
    );
    axes.frame_x(&mut fig, None, "Time (s)");

    let times = recording.times();
    let colors = generate_palette(n);
    let mut labels = Vec::with_capacity(n);

    for (idx, (channel, row)) in recording.channels.iter().zip(&recording.data).enumerate() {
        let offset = (n - 1 - idx) as f64;
        let (lo, hi) = min_max(row).unwrap_or((0.0, 0.0));
        let span = if hi > lo { hi - lo } else { 1.0 };
        let mid = (hi + lo) / 2.0;

        let ys: Vec<f64> = row.iter().map(|v| offset + (v - mid) / span * 0.8).collect();
        let (dx, dy) = decimate(&times, &ys, MAX_TRACE_POINTS);
        axes.line(&mut fig, &dx, &dy, &colors[idx], 1.0);
        labels.push((offset, channel.name.clone()));
    }
    axes.y_categories(&mut fig, &labels, 10.0);

    fig
}

fn trigger_figure(recording: &Recording, summary: &EventSummary) -> Figure {
    let n_ids = summary.event_ids.len();
    let plot_height = (n_ids.max(1) as f64 * 30.0).max(90.0);
    let mut fig = Figure::new(WIDTH, plot_height + 110.0);
    fig.title("Events");

    let axes = Axes::new(
        Rect::new(180.0, 50.0, WIDTH - 210.0, plot_height),
        (0.0, recording.duration_secs()),
        (0.5, n_ids.max(1) as f64 + 0.5),
    );
    axes.frame_x(&mut fig, None, "Time (s)");

    if summary.is_empty() {
        let r = axes.rect();
        fig.text(r.x + r.width / 2.0, r.y + r.height / 2.0, "No events found", 14.0, "middle");
        return fig;
    }

    let colors = generate_palette(n_ids);
    for event in &summary.events {
        let color = &colors[(event.id as usize - 1) % n_ids];
        axes.circle(
            &mut fig,
            event.sample as f64 / recording.sfreq,
            event.id as f64,
            4.0,
            color,
        );
    }

    let counts = summary.counts();
    let labels: Vec<(f64, String)> = summary
        .event_ids
        .iter()
        .map(|(description, id)| {
            let count = counts.get(id).copied().unwrap_or(0);
            (*id as f64, format!("{} ({})", description, count))
        })
        .collect();
    axes.y_categories(&mut fig, &labels, 11.0);

    fig
}

fn psd_figure(spectrum: &PowerSpectrum) -> Figure {
    let mut fig = Figure::new(WIDTH, 480.0);
    fig.title("Optical density PSD");

    let db = spectrum.to_db();
    let (mean, std) = spectrum.mean_and_std_db();
    let lower: Vec<f64> = mean.iter().zip(&std).map(|(m, s)| m - s).collect();
    let upper: Vec<f64> = mean.iter().zip(&std).map(|(m, s)| m + s).collect();

    let x_range = (0.0, spectrum.freqs.last().copied().unwrap_or(1.0));
    let y_range = min_max(db.iter().flatten().chain(&lower).chain(&upper)).unwrap_or((0.0, 1.0));

    let left = Axes::new(Rect::new(90.0, 60.0, 470.0, 340.0), x_range, y_range);
    let right = Axes::new(Rect::new(690.0, 60.0, 470.0, 340.0), x_range, y_range);

    let colors = generate_palette(db.len());
    for (row, color) in db.iter().zip(&colors) {
        left.line(&mut fig, &spectrum.freqs, row, color, 1.0);
    }
    left.frame(&mut fig, Some("Channels"), "Frequency (Hz)", "Power (dB)");

    right.fill_between(&mut fig, &spectrum.freqs, &lower, &upper, BAR_COLOR, 0.3);
    right.line(&mut fig, &spectrum.freqs, &mean, "#1a1a1a", 1.5);
    right.frame(&mut fig, Some("Average +- std"), "Frequency (Hz)", "Power (dB)");

    fig
}

/// Score heat map next to a pass/fail map at the threshold
fn quality_map(
    scores: &WindowedScores,
    names: &[String],
    threshold: f64,
    scale: (f64, f64),
    title: &str,
) -> Figure {
    let n = names.len();
    let plot_height = (n as f64 * 14.0).max(150.0);
    let mut fig = Figure::new(WIDTH, plot_height + 140.0);
    fig.title(title);

    let x_range = (0.0, scores.windows.last().map(|w| w.1).unwrap_or(1.0));
    let y_range = (-0.5, n as f64 - 0.5);
    let left = Axes::new(Rect::new(110.0, 60.0, 470.0, plot_height), x_range, y_range);
    let right = Axes::new(Rect::new(700.0, 60.0, 470.0, plot_height), x_range, y_range);

    let mut labels = Vec::with_capacity(n);
    for (idx, (name, row)) in names.iter().zip(&scores.scores).enumerate() {
        let y = (n - 1 - idx) as f64;
        for (score, (start, end)) in row.iter().zip(&scores.windows) {
            left.cell(&mut fig, *start, *end, y - 0.5, y + 0.5, &quality_color(*score, scale.0, scale.1));
            let verdict = if !score.is_finite() {
                NEUTRAL_COLOR
            } else if *score >= threshold {
                PASS_COLOR
            } else {
                FAIL_COLOR
            };
            right.cell(&mut fig, *start, *end, y - 0.5, y + 0.5, verdict);
        }
        labels.push((y, name.clone()));
    }

    left.frame_x(&mut fig, Some("Score"), "Time (s)");
    right.frame_x(&mut fig, Some(format!("Threshold {}", threshold).as_str()), "Time (s)");
    left.y_categories(&mut fig, &labels, 9.0);
    right.y_categories(&mut fig, &labels, 9.0);

    let r = left.rect();
    fig.text(
        r.x,
        r.y + r.height + 58.0,
        &format!("Colour scale: red {:.3} to green {:.3}", scale.0, scale.1),
        11.0,
        "start",
    );

    fig
}

fn sci_histogram(scores: &[f64], threshold: f64) -> Figure {
    let mut fig = Figure::new(800.0, 440.0);
    fig.title("Scalp coupling index");

    let finite: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
    let lo = finite.iter().copied().fold(0.0, f64::min);
    let hi = 1.0;
    let bin_width = (hi - lo) / HISTOGRAM_BINS as f64;

    let mut counts = [0usize; HISTOGRAM_BINS];
    for score in &finite {
        let bin = ((score - lo) / bin_width).floor().max(0.0) as usize;
        counts[bin.min(HISTOGRAM_BINS - 1)] += 1;
    }
    let max_count = counts.iter().copied().max().unwrap_or(0).max(1) as f64;

    let axes = Axes::new(
        Rect::new(90.0, 50.0, 670.0, 310.0),
        (lo, hi),
        (0.0, max_count * 1.1),
    );
    for (bin, count) in counts.iter().enumerate() {
        let start = lo + bin as f64 * bin_width;
        axes.cell(&mut fig, start, start + bin_width, 0.0, *count as f64, BAR_COLOR);
    }
    axes.vline(&mut fig, threshold, FAIL_COLOR, 3.0);
    axes.frame(&mut fig, None, "Scalp Coupling Index", "Count");

    fig
}

/// Top-down optode layout with one line per source-detector pair
fn montage_figure(recording: &Recording) -> Figure {
    let mut fig = Figure::new(700.0, 640.0);
    fig.title("Montage");

    let points: Vec<[f64; 3]> = recording
        .source_positions
        .iter()
        .chain(&recording.detector_positions)
        .copied()
        .collect();
    let xs: Vec<f64> = points.iter().map(|p| p[0]).collect();
    let ys: Vec<f64> = points.iter().map(|p| p[1]).collect();

    let (Some((x_lo, x_hi)), Some((y_lo, y_hi))) = (min_max(&xs), min_max(&ys)) else {
        fig.text(350.0, 320.0, "No optode positions available", 14.0, "middle");
        return fig;
    };

    let half = ((x_hi - x_lo).max(y_hi - y_lo) / 2.0 * 1.2).max(0.01);
    let (cx, cy) = ((x_hi + x_lo) / 2.0, (y_hi + y_lo) / 2.0);
    let axes = Axes::new(
        Rect::new(120.0, 50.0, 500.0, 500.0),
        (cx - half, cx + half),
        (cy - half, cy + half),
    );

    let mut pairs: BTreeMap<(usize, usize), bool> = BTreeMap::new();
    for channel in &recording.channels {
        let bad = recording.is_bad(&channel.name);
        *pairs.entry((channel.source, channel.detector)).or_insert(false) |= bad;
    }

    for (&(source, detector), &bad) in &pairs {
        let src = source.checked_sub(1).and_then(|i| recording.source_positions.get(i));
        let det = detector.checked_sub(1).and_then(|i| recording.detector_positions.get(i));
        if let (Some(src), Some(det)) = (src, det) {
            let (color, width) = if bad { (FAIL_COLOR, 2.5) } else { (NEUTRAL_COLOR, 1.5) };
            axes.segment(&mut fig, (src[0], src[1]), (det[0], det[1]), color, width);
        }
    }

    for (idx, pos) in recording.source_positions.iter().enumerate() {
        axes.circle(&mut fig, pos[0], pos[1], 6.0, "#d95f02");
        axes.label(&mut fig, pos[0], pos[1] + half * 0.04, &format!("S{}", idx + 1), 11.0);
    }
    for (idx, pos) in recording.detector_positions.iter().enumerate() {
        axes.circle(&mut fig, pos[0], pos[1], 6.0, "#1b9e77");
        axes.label(&mut fig, pos[0], pos[1] + half * 0.04, &format!("D{}", idx + 1), 11.0);
    }

    axes.frame(&mut fig, None, "x (m)", "y (m)");
    fig
}

/// Step 1: raw intensity waveforms
pub fn plot_raw(recording: Recording, mut report: Report) -> StepResult {
    log::debug!("Plotting raw waveform");
    let fig = stacked_traces(&recording, "Raw intensity");
    report.add_figure(
        &fig,
        RAW_WAVEFORM,
        caption(&recording, "raw"),
        Some("Plot of the raw signal".to_string()),
    );
    Ok((recording, report))
}

/// Step 2: event timeline built from annotations
pub fn summarise_triggers(recording: Recording, mut report: Report) -> StepResult {
    let summary = events_from_annotations(&recording);
    log::debug!(
        "Found {} events with {} distinct ids",
        summary.events.len(),
        summary.event_ids.len()
    );

    let fig = trigger_figure(&recording, &summary);
    report.add_figure(&fig, TRIGGERS, caption(&recording, "triggers"), None);
    Ok((recording, report))
}

/// Step 3: convert to optical density for every later step
pub fn convert_optical_density(recording: Recording, mut report: Report) -> StepResult {
    log::debug!("Converting to optical density");
    let recording = optical_density(recording)?;

    let fig = stacked_traces(&recording, "Optical density");
    report.add_figure(
        &fig,
        OPTICAL_DENSITY,
        caption(&recording, "od"),
        Some("Optical density of the raw signal".to_string()),
    );
    Ok((recording, report))
}

/// Step 4: per-channel and averaged Welch PSD of the OD signal
pub fn summarise_odpsd(recording: Recording, mut report: Report) -> StepResult {
    log::debug!("Estimating OD power spectrum");
    let spectrum = welch(&recording.data, recording.sfreq)?;

    let fig = psd_figure(&spectrum);
    report.add_figure(
        &fig,
        OD_PSD,
        caption(&recording, "psd"),
        Some("PSD of the optical density signal.".to_string()),
    );
    Ok((recording, report))
}

fn quality_band(recording: &Recording) -> Result<QualityBand, ReportError> {
    let band = QualityBand::for_lowpass(recording.lowpass).map_err(|source| ReportError::Band {
        recording: recording.caption_label(),
        source,
    })?;
    if band.is_adapted() {
        log::info!(
            "Low-pass cutoff {} Hz, filtering {}-{} Hz",
            recording.lowpass,
            band.l_freq,
            band.h_freq
        );
    }
    Ok(band)
}

/// Step 5: scalp coupling index per time window
pub fn summarise_sci_window(
    recording: Recording,
    mut report: Report,
    threshold: f64,
    time_window: f64,
) -> StepResult {
    let band = quality_band(&recording)?;
    let scores = scalp_coupling_index_windowed(&recording, &band, time_window)?;
    log::debug!(
        "Windowed SCI: {} windows, {:.0}% of cells pass",
        scores.n_windows(),
        scores.pass_fraction(threshold) * 100.0
    );

    let fig = quality_map(
        &scores,
        &recording.ch_names(),
        threshold,
        (0.0, 1.0),
        "Windowed scalp coupling index",
    );
    report.add_figure(
        &fig,
        SCI_WINDOWED,
        caption(&recording, "sciwin"),
        Some("Windowed SCI.".to_string()),
    );
    Ok((recording, report))
}

/// Step 6: peak power per time window
pub fn summarise_pp(
    recording: Recording,
    mut report: Report,
    threshold: f64,
    time_window: f64,
) -> StepResult {
    let band = quality_band(&recording)?;
    let scores = peak_power(&recording, &band, time_window)?;
    log::debug!(
        "Peak power: {} windows, {:.0}% of cells pass",
        scores.n_windows(),
        scores.pass_fraction(threshold) * 100.0
    );

    let top = min_max(scores.scores.iter().flatten())
        .map(|(_, hi)| hi)
        .unwrap_or(0.0)
        .max(threshold);
    let fig = quality_map(
        &scores,
        &recording.ch_names(),
        threshold,
        (0.0, top),
        "Windowed peak power",
    );
    report.add_figure(
        &fig,
        PEAK_POWER,
        caption(&recording, "pp"),
        Some("Windowed Peak Power.".to_string()),
    );
    Ok((recording, report))
}

/// Step 7: whole-recording SCI. Channels scoring below the threshold
/// become the recording's bad channels. With a sidecar path the scores
/// are also written to channels.tsv.
pub fn summarise_sci(
    mut recording: Recording,
    mut report: Report,
    threshold: f64,
    sidecar: Option<&Path>,
) -> StepResult {
    let band = quality_band(&recording)?.with_h_trans_bandwidth(QualityBand::NARROW_TRANS_BANDWIDTH);
    let sci = scalp_coupling_index(&recording, &band)?;
    recording.bads = channels_below(&recording, &sci, threshold);
    log::debug!("SCI marked {} of {} channels bad", recording.bads.len(), recording.n_channels());

    if let Some(path) = sidecar {
        if annotate_channels(path, &recording.ch_names(), &sci, threshold)? {
            log::info!("Wrote SCI to {:?}", path);
        } else {
            log::info!("No channels sidecar at {:?}, skipping annotation", path);
        }
    }

    let fig = sci_histogram(&sci, threshold);
    report.add_figure(
        &fig,
        SCALP_COUPLING_INDEX,
        caption(&recording, "SCI"),
        Some(format!(
            "Scalp coupling index with threshold at {}. Results in bad channels {:?}",
            threshold, recording.bads
        )),
    );
    Ok((recording, report))
}

/// Step 8: sensor layout with bad channels highlighted
pub fn summarise_montage(recording: Recording, mut report: Report) -> StepResult {
    let fig = montage_figure(&recording);
    report.add_figure(
        &fig,
        MONTAGE,
        caption(&recording, "montage"),
        Some(format!(
            "Montage of sensors. Bad channels are marked in red: {:?}",
            recording.bads
        )),
    );
    Ok((recording, report))
}

/// Run all steps in order on one recording
pub fn build_report(
    recording: Recording,
    title: &str,
    config: &QualityConfig,
    sidecar: Option<&Path>,
) -> StepResult {
    let report = Report::new(title);

    let (recording, report) = plot_raw(recording, report)?;
    let (recording, report) = summarise_triggers(recording, report)?;
    let (recording, report) = convert_optical_density(recording, report)?;
    let (recording, report) = summarise_odpsd(recording, report)?;
    let (recording, report) =
        summarise_sci_window(recording, report, config.sci_threshold, config.sci_time_window)?;
    let (recording, report) =
        summarise_pp(recording, report, config.pp_threshold, config.pp_time_window)?;
    let (recording, report) = summarise_sci(recording, report, config.sci_threshold, sidecar)?;
    summarise_montage(recording, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nirs::recording::tests::synthetic_recording;
    use crate::nirs::{Annotation, NirsError, SignalUnit};
    use std::fs;
    use tempfile::TempDir;

    fn config() -> QualityConfig {
        QualityConfig::new("/data", "/out")
    }

    #[test]
    fn test_report_has_every_section_in_order() {
        let recording = synthetic_recording(60.0, 10.0);

        let (recording, report) = build_report(recording, "sub-01", &config(), None).unwrap();

        assert_eq!(report.section_names(), SECTION_ORDER.to_vec());
        assert_eq!(recording.unit, SignalUnit::OpticalDensity);
        let captions: Vec<&str> = report.sections().iter().map(|s| s.caption.as_str()).collect();
        assert_eq!(
            captions,
            vec!["01_raw", "01_triggers", "01_od", "01_psd", "01_sciwin", "01_pp", "01_SCI", "01_montage"]
        );
    }

    #[test]
    fn test_low_sampling_rate_narrows_band() {
        // 3 Hz puts the low-pass cutoff on the default upper band edge
        let recording = synthetic_recording(120.0, 3.0);
        assert_eq!(recording.lowpass, 1.5);

        let (_, report) = build_report(recording, "sub-01", &config(), None).unwrap();

        assert_eq!(report.section_names(), SECTION_ORDER.to_vec());
    }

    #[test]
    fn test_sampling_rate_too_low_for_band() {
        let recording = synthetic_recording(120.0, 1.0);

        let err = build_report(recording, "sub-01", &config(), None).unwrap_err();

        match &err {
            ReportError::Band { recording, source } => {
                assert_eq!(recording, "01");
                assert!(matches!(source, NirsError::LowpassBelowBand { .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("01"));
    }

    #[test]
    fn test_zero_threshold_keeps_non_negative_channels() {
        let recording = synthetic_recording(60.0, 10.0);

        let (recording, report) = build_report(recording, "sub-01", &config(), None).unwrap();

        // pair 2 is in anti-phase, so only its channels score below zero
        assert_eq!(recording.bads, vec!["S2_D1 760", "S2_D1 850"]);
        let montage = &report.sections()[7];
        assert!(montage.comment.as_deref().unwrap_or_default().contains("S2_D1 760"));
    }

    #[test]
    fn test_threshold_above_every_score_marks_all() {
        let recording = optical_density(synthetic_recording(60.0, 10.0)).unwrap();

        let (recording, _) = summarise_sci(recording, Report::new("t"), 1.5, None).unwrap();

        assert_eq!(recording.bads.len(), 4);
    }

    #[test]
    fn test_second_od_conversion_fails() {
        let recording = optical_density(synthetic_recording(10.0, 10.0)).unwrap();

        let result = convert_optical_density(recording, Report::new("t"));

        assert!(matches!(
            result,
            Err(ReportError::Signal(NirsError::WrongUnit { .. }))
        ));
    }

    #[test]
    fn test_triggers_without_annotations() {
        let recording = synthetic_recording(10.0, 10.0);

        let (_, report) = summarise_triggers(recording, Report::new("t")).unwrap();

        assert_eq!(report.section_names(), vec![TRIGGERS]);
        assert!(report.sections()[0].svg.contains("No events found"));
    }

    #[test]
    fn test_triggers_label_counts() {
        let recording = synthetic_recording(10.0, 10.0).with_annotations(vec![
            Annotation {
                onset: 1.0,
                duration: 0.0,
                description: "tap".to_string(),
            },
            Annotation {
                onset: 3.0,
                duration: 0.0,
                description: "tap".to_string(),
            },
        ]);

        let (_, report) = summarise_triggers(recording, Report::new("t")).unwrap();

        assert!(report.sections()[0].svg.contains("tap (2)"));
    }

    #[test]
    fn test_sidecar_annotated_when_given() {
        let temp_dir = TempDir::new().unwrap();
        let sidecar = temp_dir.path().join("sub-01_task-rest_channels.tsv");
        fs::write(
            &sidecar,
            "name\ttype\nS1_D1 760\tNIRSCWAMPLITUDE\nS1_D1 850\tNIRSCWAMPLITUDE\nS2_D1 760\tNIRSCWAMPLITUDE\nS2_D1 850\tNIRSCWAMPLITUDE\n",
        )
        .unwrap();
        let recording = optical_density(synthetic_recording(60.0, 10.0)).unwrap();

        summarise_sci(recording, Report::new("t"), 0.5, Some(&sidecar)).unwrap();

        let contents = fs::read_to_string(&sidecar).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "name\ttype\tSCI\tstatus");
        assert!(lines[1].ends_with("\tgood"));
        assert!(lines[3].ends_with("\tbad"));
    }

    #[test]
    fn test_histogram_bins_cover_negative_scores() {
        let fig = sci_histogram(&[-0.9, -0.9, 0.95, 0.95], 0.0);
        let svg = fig.to_svg();
        assert_eq!(svg.matches(BAR_COLOR).count(), HISTOGRAM_BINS);
    }

    #[test]
    fn test_montage_without_positions() {
        let mut recording = synthetic_recording(1.0, 10.0);
        recording.source_positions.clear();
        recording.detector_positions.clear();

        let svg = montage_figure(&recording).to_svg();

        assert!(svg.contains("No optode positions available"));
    }
}
