// SVG figure primitives
// Minimal plotting surface used to render report figures inline

use palette::{Hsl, IntoColor, Srgb};
use std::fmt::Write;

pub const FONT: &str = "'Segoe UI', Tahoma, Geneva, Verdana, sans-serif";

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| hsl_hex((i as f32 / n as f32) * 360.0, 0.75, 0.45))
        .collect()
}

fn hsl_hex(hue: f32, saturation: f32, lightness: f32) -> String {
    let rgb: Srgb = Hsl::new(hue, saturation, lightness).into_color();
    format!(
        "#{:02x}{:02x}{:02x}",
        (rgb.red.clamp(0.0, 1.0) * 255.0) as u8,
        (rgb.green.clamp(0.0, 1.0) * 255.0) as u8,
        (rgb.blue.clamp(0.0, 1.0) * 255.0) as u8
    )
}

/// Red (low) to green (high) colour scale; NaN renders grey
pub fn quality_color(value: f64, lo: f64, hi: f64) -> String {
    if !value.is_finite() {
        return "#9e9e9e".to_string();
    }
    let t = if hi > lo {
        ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
    } else {
        0.5
    };
    hsl_hex(120.0 * t as f32, 0.7, 0.45)
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Round-number tick positions covering [lo, hi]
pub fn nice_ticks(lo: f64, hi: f64, max_ticks: usize) -> Vec<f64> {
    if !(lo.is_finite() && hi.is_finite()) || hi <= lo || max_ticks == 0 {
        return Vec::new();
    }
    let raw_step = (hi - lo) / max_ticks as f64;
    let magnitude = 10f64.powf(raw_step.log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| *s >= raw_step)
        .unwrap_or(10.0 * magnitude);

    let first = (lo / step).ceil() as i64;
    let last = (hi / step + 1e-9).floor() as i64;
    (first..=last).map(|k| k as f64 * step).collect()
}

pub fn format_tick(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.abs() >= 1e4 || value.abs() < 1e-2 {
        return format!("{:.1e}", value);
    }
    let text = format!("{:.3}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Finite minimum and maximum of a set of values
pub fn min_max<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<(f64, f64)> {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Reduce a trace to at most `max_points` points by keeping each
/// bucket's minimum and maximum
pub fn decimate(xs: &[f64], ys: &[f64], max_points: usize) -> (Vec<f64>, Vec<f64>) {
    let n = xs.len().min(ys.len());
    if n <= max_points || max_points < 2 {
        return (xs[..n].to_vec(), ys[..n].to_vec());
    }

    let buckets = max_points / 2;
    let bucket_size = n.div_ceil(buckets);
    let mut out_x = Vec::with_capacity(max_points);
    let mut out_y = Vec::with_capacity(max_points);

    for start in (0..n).step_by(bucket_size) {
        let end = (start + bucket_size).min(n);
        let mut lo = start;
        let mut hi = start;
        for i in start..end {
            if ys[i] < ys[lo] {
                lo = i;
            }
            if ys[i] > ys[hi] {
                hi = i;
            }
        }
        let ordered = if lo <= hi { [lo, hi] } else { [hi, lo] };
        for i in ordered {
            out_x.push(xs[i]);
            out_y.push(ys[i]);
        }
    }

    (out_x, out_y)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

/// An SVG canvas accumulating drawing elements
#[derive(Debug, Clone)]
pub struct Figure {
    width: f64,
    height: f64,
    elements: Vec<String>,
}

impl Figure {
    pub fn new(width: f64, height: f64) -> Self {
        Figure {
            width,
            height,
            elements: Vec::new(),
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn push(&mut self, element: String) {
        self.elements.push(element);
    }

    pub fn text(&mut self, x: f64, y: f64, text: &str, size: f64, anchor: &str) {
        self.push(format!(
            r#"<text x="{:.1}" y="{:.1}" font-size="{}" text-anchor="{}">{}</text>"#,
            x,
            y,
            size,
            anchor,
            escape(text)
        ));
    }

    /// Centered title across the top of the figure
    pub fn title(&mut self, text: &str) {
        let x = self.width / 2.0;
        self.push(format!(
            r#"<text x="{:.1}" y="22" font-size="16" font-weight="bold" text-anchor="middle">{}</text>"#,
            x,
            escape(text)
        ));
    }

    pub fn to_svg(&self) -> String {
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="{font}">"#,
            w = self.width,
            h = self.height,
            font = FONT
        );
        svg.push_str(r#"<rect width="100%" height="100%" fill="white"/>"#);
        for element in &self.elements {
            svg.push_str(element);
        }
        svg.push_str("</svg>");
        svg
    }
}

/// Data-to-pixel mapping for one plotting panel
#[derive(Debug, Clone, Copy)]
pub struct Axes {
    rect: Rect,
    x_range: (f64, f64),
    y_range: (f64, f64),
}

fn usable_range(range: (f64, f64)) -> (f64, f64) {
    let (lo, hi) = range;
    if !(lo.is_finite() && hi.is_finite()) {
        return (0.0, 1.0);
    }
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 0.5, lo + 0.5)
    }
}

impl Axes {
    pub fn new(rect: Rect, x_range: (f64, f64), y_range: (f64, f64)) -> Self {
        Axes {
            rect,
            x_range: usable_range(x_range),
            y_range: usable_range(y_range),
        }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn x(&self, value: f64) -> f64 {
        let (lo, hi) = self.x_range;
        self.rect.x + (value - lo) / (hi - lo) * self.rect.width
    }

    pub fn y(&self, value: f64) -> f64 {
        let (lo, hi) = self.y_range;
        self.rect.y + self.rect.height - (value - lo) / (hi - lo) * self.rect.height
    }

    /// Border, numeric ticks and axis labels
    pub fn frame(&self, fig: &mut Figure, title: Option<&str>, x_label: &str, y_label: &str) {
        self.frame_x(fig, title, x_label);

        for tick in nice_ticks(self.y_range.0, self.y_range.1, 6) {
            let py = self.y(tick);
            fig.push(format!(
                r##"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="#333"/>"##,
                self.rect.x - 4.0,
                py,
                self.rect.x,
                py
            ));
            fig.text(self.rect.x - 6.0, py + 4.0, &format_tick(tick), 11.0, "end");
        }
        self.y_label(fig, y_label);
    }

    /// Border, x ticks and labels; y axis left to the caller
    pub fn frame_x(&self, fig: &mut Figure, title: Option<&str>, x_label: &str) {
        let r = self.rect;
        fig.push(format!(
            r##"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="none" stroke="#333"/>"##,
            r.x, r.y, r.width, r.height
        ));

        for tick in nice_ticks(self.x_range.0, self.x_range.1, 8) {
            let px = self.x(tick);
            fig.push(format!(
                r##"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="#333"/>"##,
                px,
                r.y + r.height,
                px,
                r.y + r.height + 4.0
            ));
            fig.text(px, r.y + r.height + 16.0, &format_tick(tick), 11.0, "middle");
        }

        fig.text(r.x + r.width / 2.0, r.y + r.height + 34.0, x_label, 12.0, "middle");
        if let Some(title) = title {
            fig.text(r.x + r.width / 2.0, r.y - 8.0, title, 13.0, "middle");
        }
    }

    pub fn y_label(&self, fig: &mut Figure, label: &str) {
        let cx = self.rect.x - 48.0;
        let cy = self.rect.y + self.rect.height / 2.0;
        fig.push(format!(
            r#"<text x="{:.1}" y="{:.1}" font-size="12" text-anchor="middle" transform="rotate(-90 {:.1} {:.1})">{}</text>"#,
            cx,
            cy,
            cx,
            cy,
            escape(label)
        ));
    }

    /// Text labels at given y positions, for categorical axes
    pub fn y_categories(&self, fig: &mut Figure, labels: &[(f64, String)], size: f64) {
        for (value, label) in labels {
            fig.text(self.rect.x - 6.0, self.y(*value) + size / 3.0, label, size, "end");
        }
    }

    pub fn line(&self, fig: &mut Figure, xs: &[f64], ys: &[f64], color: &str, width: f64) {
        let mut points = String::new();
        for (x, y) in xs.iter().zip(ys) {
            if x.is_finite() && y.is_finite() {
                let _ = write!(points, "{:.1},{:.1} ", self.x(*x), self.y(*y));
            }
        }
        if points.is_empty() {
            return;
        }
        fig.push(format!(
            r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="{}" stroke-linejoin="round"/>"#,
            points.trim_end(),
            color,
            width
        ));
    }

    pub fn fill_between(&self, fig: &mut Figure, xs: &[f64], lo: &[f64], hi: &[f64], color: &str, opacity: f64) {
        let mut points = String::new();
        for (x, y) in xs.iter().zip(hi) {
            let _ = write!(points, "{:.1},{:.1} ", self.x(*x), self.y(*y));
        }
        for (x, y) in xs.iter().zip(lo).rev() {
            let _ = write!(points, "{:.1},{:.1} ", self.x(*x), self.y(*y));
        }
        fig.push(format!(
            r#"<polygon points="{}" fill="{}" fill-opacity="{}" stroke="none"/>"#,
            points.trim_end(),
            color,
            opacity
        ));
    }

    pub fn circle(&self, fig: &mut Figure, x: f64, y: f64, radius: f64, color: &str) {
        fig.push(format!(
            r#"<circle cx="{:.1}" cy="{:.1}" r="{}" fill="{}"/>"#,
            self.x(x),
            self.y(y),
            radius,
            color
        ));
    }

    /// Filled rectangle between two data-space corners
    pub fn cell(&self, fig: &mut Figure, x0: f64, x1: f64, y0: f64, y1: f64, fill: &str) {
        let (px0, px1) = (self.x(x0), self.x(x1));
        let (py0, py1) = (self.y(y0), self.y(y1));
        fig.push(format!(
            r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}" stroke="white" stroke-width="0.5"/>"#,
            px0.min(px1),
            py0.min(py1),
            (px1 - px0).abs(),
            (py1 - py0).abs(),
            fill
        ));
    }

    pub fn segment(&self, fig: &mut Figure, from: (f64, f64), to: (f64, f64), color: &str, width: f64) {
        fig.push(format!(
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}" stroke-width="{}"/>"#,
            self.x(from.0),
            self.y(from.1),
            self.x(to.0),
            self.y(to.1),
            color,
            width
        ));
    }

    /// Vertical line spanning the panel at data x
    pub fn vline(&self, fig: &mut Figure, x: f64, color: &str, width: f64) {
        let px = self.x(x);
        fig.push(format!(
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}" stroke-width="{}"/>"#,
            px,
            self.rect.y,
            px,
            self.rect.y + self.rect.height,
            color,
            width
        ));
    }

    pub fn label(&self, fig: &mut Figure, x: f64, y: f64, text: &str, size: f64) {
        fig.text(self.x(x), self.y(y), text, size, "middle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nice_ticks() {
        let ticks = nice_ticks(0.0, 1.0, 5);
        assert_eq!(ticks.len(), 6);
        assert_eq!(ticks[0], 0.0);
        assert!((ticks[5] - 1.0).abs() < 1e-12);
        assert_eq!(nice_ticks(0.0, 100.0, 4), vec![0.0, 50.0, 100.0]);
        assert!(nice_ticks(1.0, 1.0, 5).is_empty());
    }

    #[test]
    fn test_format_tick() {
        assert_eq!(format_tick(0.0), "0");
        assert_eq!(format_tick(0.5), "0.5");
        assert_eq!(format_tick(120.0), "120");
        assert_eq!(format_tick(0.001), "1.0e-3");
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }

    #[test]
    fn test_palette_is_distinct() {
        let colors = generate_palette(4);
        assert_eq!(colors.len(), 4);
        assert!(colors.iter().all(|c| c.starts_with('#') && c.len() == 7));
        assert_ne!(colors[0], colors[1]);
        assert!(generate_palette(0).is_empty());
    }

    #[test]
    fn test_quality_color_endpoints() {
        assert_ne!(quality_color(0.0, 0.0, 1.0), quality_color(1.0, 0.0, 1.0));
        assert_eq!(quality_color(f64::NAN, 0.0, 1.0), "#9e9e9e");
    }

    #[test]
    fn test_decimate_keeps_extremes() {
        let xs: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let mut ys = vec![0.0; 1000];
        ys[500] = 10.0;
        ys[250] = -10.0;

        let (dx, dy) = decimate(&xs, &ys, 100);

        assert!(dx.len() <= 100);
        assert!(dy.contains(&10.0));
        assert!(dy.contains(&-10.0));
    }

    #[test]
    fn test_axes_mapping_and_degenerate_range() {
        let axes = Axes::new(Rect::new(10.0, 10.0, 100.0, 50.0), (0.0, 10.0), (2.0, 2.0));
        assert_eq!(axes.x(0.0), 10.0);
        assert_eq!(axes.x(10.0), 110.0);
        assert_eq!(axes.y(2.0), 35.0);
    }

    #[test]
    fn test_figure_svg_wraps_elements() {
        let mut fig = Figure::new(200.0, 100.0);
        fig.title("A & B");
        let svg = fig.to_svg();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("A &amp; B"));
    }
}
