// Report document
// Append-only list of captioned figures serialized to one HTML file

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::nirs::NirsError;
use crate::report::svg::{escape, Figure};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Signal processing failed: {0}")]
    Signal(#[from] NirsError),

    #[error("No usable quality band for {recording}: {source}")]
    Band {
        recording: String,
        #[source]
        source: NirsError,
    },

    #[error("Channel sidecar update failed: {0}")]
    Channels(#[from] crate::bids::ChannelsError),
}

/// One captioned figure
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub caption: String,
    pub comment: Option<String>,

    /// Rendered inline SVG
    pub svg: String,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub title: String,
    sections: Vec<Section>,
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        Report {
            title: title.into(),
            sections: Vec::new(),
        }
    }

    /// Append a figure as a new section
    pub fn add_figure(
        &mut self,
        figure: &Figure,
        section: &str,
        caption: impl Into<String>,
        comment: Option<String>,
    ) {
        self.sections.push(Section {
            name: section.to_string(),
            caption: caption.into(),
            comment,
            svg: figure.to_svg(),
        });
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn to_html(&self) -> String {
        let generated = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

        let mut toc = String::new();
        for (idx, section) in self.sections.iter().enumerate() {
            let _ = write!(
                toc,
                r##"<li><a href="#section-{}">{}</a></li>"##,
                idx,
                escape(&section.name)
            );
        }

        let mut body = String::new();
        for (idx, section) in self.sections.iter().enumerate() {
            let comment = section
                .comment
                .as_deref()
                .map(|c| format!(r#"<p class="comment">{}</p>"#, escape(c)))
                .unwrap_or_default();
            let _ = write!(
                body,
                r#"
        <section class="report-section" id="section-{idx}" data-section="{name}">
            <h2>{name}</h2>
            <figure>
                {svg}
                <figcaption>{caption}</figcaption>
            </figure>
            {comment}
        </section>"#,
                idx = idx,
                name = escape(&section.name),
                svg = section.svg,
                caption = escape(&section.caption),
                comment = comment,
            );
        }

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        * {{
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }}
        body {{
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            background: #f5f5f5;
            color: #222;
        }}
        header {{
            background-color: #2a2a2a;
            color: #e0e0e0;
            padding: 20px;
            margin-bottom: 20px;
        }}
        h1 {{
            font-size: 26px;
            color: #4a9eff;
        }}
        .subtitle {{
            color: #888;
            font-size: 14px;
        }}
        nav, main {{
            max-width: 1280px;
            margin: 0 auto;
            padding: 0 20px;
        }}
        nav ol {{
            display: flex;
            flex-wrap: wrap;
            gap: 16px;
            list-style: none;
            margin-bottom: 20px;
        }}
        nav a {{
            color: #1a73e8;
            text-decoration: none;
        }}
        .report-section {{
            background: white;
            border: 1px solid #ddd;
            border-radius: 6px;
            padding: 20px;
            margin-bottom: 20px;
        }}
        .report-section h2 {{
            font-size: 20px;
            margin-bottom: 12px;
        }}
        figure svg {{
            max-width: 100%;
            height: auto;
        }}
        figcaption {{
            color: #666;
            font-size: 13px;
            margin-top: 6px;
        }}
        .comment {{
            margin-top: 10px;
        }}
    </style>
</head>
<body>
    <header>
        <h1>{title}</h1>
        <div class="subtitle">Generated {generated} by {tool} {version}</div>
    </header>
    <nav>
        <ol>{toc}</ol>
    </nav>
    <main>{body}
    </main>
</body>
</html>
"#,
            title = escape(&self.title),
            generated = generated,
            tool = env!("CARGO_PKG_NAME"),
            version = env!("CARGO_PKG_VERSION"),
            toc = toc,
            body = body,
        )
    }

    /// Write the HTML document, replacing any existing file
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        fs::write(path, self.to_html())?;
        log::debug!("Saved report with {} sections to {:?}", self.sections.len(), path);
        Ok(())
    }
}
