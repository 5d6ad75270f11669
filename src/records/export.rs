use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use super::models::Entry;

pub const CSV_HEADER: [&str; 3] = ["Student ID", "Mark", "Timestamp"];

/// Render entries as comma-separated text. Fields are written verbatim, so a
/// delimiter inside a student id or timestamp is not escaped.
pub fn entries_to_csv(entries: &[Entry]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer
        .write_record(CSV_HEADER)
        .context("failed to write CSV header")?;

    for entry in entries {
        writer
            .write_record([
                entry.student_id.as_str(),
                entry.mark.to_string().as_str(),
                entry.timestamp.as_str(),
            ])
            .with_context(|| format!("failed to write CSV row for entry {}", entry.id))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow!("failed to flush CSV buffer: {}", err.error()))?;
    let mut text = String::from_utf8(bytes).context("CSV output is not valid UTF-8")?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

/// `marks-<ISO date>.csv`, dated in UTC.
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("marks-{}.csv", now.format("%Y-%m-%d"))
}

/// Write the CSV into `dir` and return the full path of the new file.
pub fn write_export(dir: &Path, csv: &str, now: DateTime<Utc>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;
    let path = dir.join(export_file_name(now));
    std::fs::write(&path, csv)
        .with_context(|| format!("failed to write export to {}", path.display()))?;
    Ok(path)
}
