// channels.tsv sidecar annotation
// Writes whole-recording SCI scores and good/bad status next to the data

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0} has no \"name\" column")]
    MissingNameColumn(PathBuf),

    #[error("{path} line {line} has {fields} fields but the header has {columns}")]
    TooManyFields {
        path: PathBuf,
        line: u64,
        fields: usize,
        columns: usize,
    },
}

const SCI_COLUMN: &str = "SCI";
const STATUS_COLUMN: &str = "status";

fn column_index(headers: &mut Vec<String>, column: &str) -> usize {
    match headers.iter().position(|h| h == column) {
        Some(idx) => idx,
        None => {
            headers.push(column.to_string());
            headers.len() - 1
        }
    }
}

/// Add or replace the SCI and status columns of a channels.tsv file.
/// Rows are matched by channel name; unknown rows keep their values.
/// Returns false when the sidecar does not exist. A row wider than the
/// header is an error and leaves the file untouched.
pub fn annotate_channels(
    path: &Path,
    names: &[String],
    scores: &[f64],
    threshold: f64,
) -> Result<bool, ChannelsError> {
    if !path.exists() {
        return Ok(false);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)?;

    let mut headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let columns = headers.len();
    let name_idx = headers
        .iter()
        .position(|h| h == "name")
        .ok_or_else(|| ChannelsError::MissingNameColumn(path.to_path_buf()))?;
    let sci_idx = column_index(&mut headers, SCI_COLUMN);
    let status_idx = column_index(&mut headers, STATUS_COLUMN);

    let score_by_name: HashMap<&str, f64> = names
        .iter()
        .map(String::as_str)
        .zip(scores.iter().copied())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() > columns {
            return Err(ChannelsError::TooManyFields {
                path: path.to_path_buf(),
                line: record.position().map_or(0, |p| p.line()),
                fields: record.len(),
                columns,
            });
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len(), "n/a".to_string());

        let score = row
            .get(name_idx)
            .and_then(|n| score_by_name.get(n.as_str()).copied());
        if let Some(score) = score {
            row[sci_idx] = format!("{}", score);
            row[status_idx] = if score < threshold { "bad" } else { "good" }.to_string();
        }
        rows.push(row);
    }
    drop(reader);

    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    writer.write_record(&headers)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    Ok(true)
}
