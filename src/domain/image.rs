use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

/// A CSV data row keyed by column header.
pub type CsvRow = HashMap<String, String>;

/// Column holding the download URL of a reproduction.
pub const REPRODUCTION_URL_COLUMN: &str = "reproduction_url";
/// Column holding the local path of a reproduction.
pub const REPRODUCTION_PATH_COLUMN: &str = "reproduction.path";

/// An image to be matched, with the catalogue metadata from its CSV row.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryImage {
    pub path: PathBuf,
    pub object_number: String,
    pub dimensions: String,
    pub object_name: String,
}

impl QueryImage {
    /// Builds a query image from a CSV row. Returns `None` when the row has
    /// no reproduction path.
    pub fn from_row(row: &CsvRow) -> Option<Self> {
        let path = row
            .get(REPRODUCTION_PATH_COLUMN)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())?;
        let column = |name: &str| row.get(name).cloned().unwrap_or_default();

        Some(Self {
            path: PathBuf::from(path),
            object_number: column("object_number"),
            dimensions: column("dimensions"),
            object_name: column("object_name"),
        })
    }

    /// Catalogue number up to the first `-`, used to group report pages.
    pub fn object_number_base(&self) -> &str {
        self.object_number
            .split('-')
            .next()
            .unwrap_or(&self.object_number)
    }

    /// Human readable `"{object_name} ({dimensions})"` label.
    pub fn metadata_label(&self) -> String {
        format!("{} ({})", self.object_name, self.dimensions)
    }
}
