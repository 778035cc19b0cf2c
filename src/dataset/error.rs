use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("No file uploaded")]
    NoFile,

    #[error("unsupported upload format: {filename} (expected .csv or .xlsb)")]
    UnsupportedFormat { filename: String },

    #[error("Sheet \"{sheet}\" not found")]
    SheetNotFound { sheet: String },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::XlsbError),

    #[error("File not found")]
    NotFound { path: PathBuf },

    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl DatasetError {
    /// Errors the caller can fix by sending a different request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NoFile | Self::UnsupportedFormat { .. })
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::Csv(_) | Self::Spreadsheet(_) | Self::SheetNotFound { .. }
        )
    }
}

pub type Result<T, E = DatasetError> = std::result::Result<T, E>;

/// Builds a `map_err` adapter that tags an I/O failure with what was being
/// done and to which path.
pub(crate) fn io_err(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> DatasetError {
    let path = path.to_path_buf();
    move |source| DatasetError::Io {
        action,
        path,
        source,
    }
}
