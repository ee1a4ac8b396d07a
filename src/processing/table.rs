//! CSV input shared by the downloader and the matcher.

use std::path::Path;

use thiserror::Error;

use crate::domain::image::CsvRow;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV file {path} has no column '{column}' (found: {found:?})")]
    MissingColumn {
        path: String,
        column: String,
        found: Vec<String>,
    },
}

/// Reads every data row of a headed CSV file.
///
/// `required_column` must appear in the header. Rows that cannot be decoded
/// are logged and left out; short rows simply lack the trailing columns.
pub fn read_rows(path: &Path, required_column: &str) -> Result<Vec<CsvRow>, TableError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();

    if !headers.iter().any(|header| header == required_column) {
        return Err(TableError::MissingColumn {
            path: path.display().to_string(),
            column: required_column.to_string(),
            found: headers.iter().map(str::to_string).collect(),
        });
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        match record {
            Ok(record) => rows.push(
                headers
                    .iter()
                    .zip(record.iter())
                    .map(|(header, value)| (header.to_string(), value.to_string()))
                    .collect(),
            ),
            Err(e) => log::warn!("Skipping unreadable CSV row {}: {e}", i + 2),
        }
    }

    Ok(rows)
}
