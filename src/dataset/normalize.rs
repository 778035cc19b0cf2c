use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use calamine::{Data, Range, Reader, Xlsb, open_workbook};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::error::{DatasetError, Result, io_err};

/// Sheet a spreadsheet upload must carry.
pub const DATA_SHEET: &str = "DataSheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Csv,
    Xlsb,
}

impl UploadFormat {
    /// Accepts `.csv` and `.xlsb`, case-insensitively. Checked before any
    /// upload bytes are written.
    pub fn from_filename(filename: &str) -> Result<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        if ext.eq_ignore_ascii_case("csv") {
            Ok(Self::Csv)
        } else if ext.eq_ignore_ascii_case("xlsb") {
            Ok(Self::Xlsb)
        } else {
            Err(DatasetError::UnsupportedFormat {
                filename: filename.to_string(),
            })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsb => "xlsb",
        }
    }
}

/// An upload received into a temp file inside the data directory.
#[derive(Debug)]
pub struct Upload {
    pub original_name: String,
    pub format: UploadFormat,
    pub file: NamedTempFile,
}

/// Canonical CSV waiting in the data directory to replace the dataset.
/// Dropping it without `commit` deletes it.
#[derive(Debug)]
pub struct StagedDataset {
    file: NamedTempFile,
}

impl StagedDataset {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Moves the staged CSV onto `dest`. Same-volume moves are a single
    /// rename; across volumes the bytes are copied next to `dest`, verified,
    /// and renamed from there.
    pub fn commit(self, dest: &Path) -> Result<()> {
        match self.file.persist(dest) {
            Ok(_) => Ok(()),
            Err(err) if err.error.kind() == io::ErrorKind::CrossesDevices => {
                debug!(dest = %dest.display(), "staged dataset on another volume, copying");
                copy_then_rename(err.file.path(), dest)
            }
            Err(err) => Err(io_err("move dataset into", dest)(err.error)),
        }
    }
}

fn copy_then_rename(src: &Path, dest: &Path) -> Result<()> {
    let dir = dest
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut sibling = NamedTempFile::new_in(dir).map_err(io_err("stage dataset copy in", dir))?;
    let mut source = File::open(src).map_err(io_err("open staged dataset", src))?;
    let copied = io::copy(&mut source, sibling.as_file_mut()).map_err(io_err("copy dataset to", dir))?;
    sibling
        .as_file()
        .sync_all()
        .map_err(io_err("sync dataset copy", sibling.path()))?;

    let expected = source
        .metadata()
        .map_err(io_err("inspect staged dataset", src))?
        .len();
    if copied != expected {
        return Err(io_err("verify dataset copy", sibling.path())(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("copied {copied} of {expected} bytes"),
        )));
    }

    sibling
        .persist(dest)
        .map_err(|err| io_err("move dataset into", dest)(err.error))?;
    Ok(())
}

/// Turns an upload into canonical CSV staged beside the dataset. The upload's
/// temp file is gone when this returns, whatever the outcome.
pub fn normalize(upload: Upload, staging_dir: &Path) -> Result<StagedDataset> {
    match upload.format {
        UploadFormat::Csv => Ok(StagedDataset { file: upload.file }),
        UploadFormat::Xlsb => {
            let csv_bytes = spreadsheet_to_csv(upload.file.path())?;
            let mut staged = NamedTempFile::new_in(staging_dir)
                .map_err(io_err("stage dataset in", staging_dir))?;
            staged
                .write_all(&csv_bytes)
                .map_err(io_err("write staged dataset", staging_dir))?;
            staged
                .as_file()
                .sync_all()
                .map_err(io_err("sync staged dataset", staging_dir))?;

            let upload_path = upload.file.path().to_path_buf();
            if let Err(err) = upload.file.close() {
                warn!(path = %upload_path.display(), error = %err, "failed to remove spreadsheet upload");
            }
            Ok(StagedDataset { file: staged })
        }
    }
}

fn spreadsheet_to_csv(path: &Path) -> Result<Vec<u8>> {
    let mut workbook: Xlsb<_> = open_workbook(path)?;
    if !workbook.sheet_names().iter().any(|name| name == DATA_SHEET) {
        return Err(DatasetError::SheetNotFound {
            sheet: DATA_SHEET.to_string(),
        });
    }

    let range = workbook.worksheet_range(DATA_SHEET)?;
    range_to_csv(&range)
}

/// Writes a sheet as comma-separated text, dropping rows with no content.
pub fn range_to_csv(range: &Range<Data>) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    for row in range.rows() {
        if row.iter().all(|cell| cell_text(cell).is_empty()) {
            continue;
        }
        writer.write_record(row.iter().map(cell_text))?;
    }

    writer
        .into_inner()
        .map_err(|err| DatasetError::Csv(err.into_error().into()))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => text.clone(),
        Data::Int(value) => value.to_string(),
        Data::Float(value) => value.to_string(),
        Data::Bool(true) => "TRUE".to_string(),
        Data::Bool(false) => "FALSE".to_string(),
        Data::DateTime(value) => value.as_f64().to_string(),
        Data::Error(err) => err.to_string(),
    }
}

/// Removes a file if present; a missing file is not an error.
pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err("remove", path)(err)),
    }
}
