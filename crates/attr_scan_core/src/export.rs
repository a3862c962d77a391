//! Result export.
//!
//! Serializes aggregated records either as CSV or as a JSON array of
//! `{"key": ..., "attributes": {...}}` objects. Exactly one format is written
//! per scan.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::outcome::ScanSummary;
use crate::record::Record;

#[path = "export/csv.rs"]
mod csv;
#[path = "export/json.rs"]
mod json;
#[path = "export/writer_utils.rs"]
mod writer_utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// Where the scan result goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout(OutputFormat),
    File { path: PathBuf, format: OutputFormat },
}

impl OutputTarget {
    pub fn format(&self) -> OutputFormat {
        match self {
            Self::Stdout(format) | Self::File { format, .. } => *format,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write CSV output: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("failed to serialize JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

/// An explicit format wins; otherwise a `.csv` path means CSV and anything
/// else, including standard output, means JSON.
pub fn resolve_output_format(explicit: Option<OutputFormat>, path: Option<&Path>) -> OutputFormat {
    if let Some(format) = explicit {
        return format;
    }

    let is_csv = path
        .and_then(Path::extension)
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("csv"));
    if is_csv {
        OutputFormat::Csv
    } else {
        OutputFormat::Json
    }
}

/// Writes records to any writer.
///
/// # Arguments
///
/// * `records` - Aggregated records, already in final order
/// * `format` - Output format
/// * `columns` - Optional attribute column filter, in output order
/// * `writer` - Destination
pub fn write_records<W: Write>(
    records: &[Record],
    format: OutputFormat,
    columns: Option<&[String]>,
    writer: W,
) -> Result<(), ExportError> {
    match format {
        OutputFormat::Csv => csv::write_csv(records, columns, writer),
        OutputFormat::Json => json::write_json(records, columns, writer),
    }
}

/// Writes records to a file, creating missing parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be created or serialization fails.
pub fn export_to_path(
    records: &[Record],
    format: OutputFormat,
    columns: Option<&[String]>,
    path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    let file = writer_utils::create_output_file(path)?;
    let mut writer = std::io::BufWriter::new(file);
    write_records(records, format, columns, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Writes the machine-readable run summary (per-partition outcomes,
/// failures, plan fingerprint) as pretty JSON.
pub fn export_summary_to_path(
    summary: &ScanSummary,
    path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    let file = writer_utils::create_output_file(path)?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
