use std::fs::File;
use std::io::BufReader;
use std::sync::Mutex;

use chrono::Utc;
use tracing::{error, info, warn};

use super::error::{DatasetError, Result, io_err};
use super::metadata::MetadataStore;
use super::normalize::{Upload, normalize, remove_if_exists};
use super::paths::DataDir;
use super::rows::parse_rows;
use crate::model::MetadataRecord;

/// Receives uploads and commits them as the new dataset.
#[derive(Debug)]
pub struct Ingestor {
    data: DataDir,
    metadata: MetadataStore,
    commit_lock: Mutex<()>,
}

impl Ingestor {
    pub fn new(data: DataDir) -> Self {
        let metadata = MetadataStore::new(data.metadata_path());
        Self {
            data,
            metadata,
            commit_lock: Mutex::new(()),
        }
    }

    /// Normalizes the upload, counts its rows, swaps it in as the dataset and
    /// then records `{uploadedAt, count}`.
    ///
    /// Rows are counted on the staged CSV before the dataset is replaced, so a
    /// malformed upload leaves the previous dataset and metadata in place. If
    /// the metadata write fails the new dataset is removed again; a stamp is
    /// never published for a file whose count was not captured.
    pub fn ingest(&self, upload: Option<Upload>) -> Result<MetadataRecord> {
        let upload = upload.ok_or(DatasetError::NoFile)?;
        let original_name = upload.original_name.clone();
        let format = upload.format;

        info!(file = %original_name, format = format.as_str(), "ingesting upload");

        let staged = normalize(upload, self.data.root()).inspect_err(|err| {
            warn!(file = %original_name, error = %err, "normalization failed");
        })?;

        let staged_file =
            File::open(staged.path()).map_err(io_err("open staged dataset", staged.path()))?;
        let count = parse_rows(BufReader::new(staged_file))
            .inspect_err(|err| {
                warn!(file = %original_name, error = %err, "uploaded dataset is not valid CSV");
            })?
            .len();

        let dataset_path = self.data.dataset_path();
        let _guard = self
            .commit_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        staged.commit(&dataset_path)?;

        let record = MetadataStore::next_record(&self.metadata.load(), Utc::now(), count);
        if let Err(err) = self.metadata.commit(&record) {
            error!(error = %err, "metadata write failed, withdrawing dataset");
            if let Err(cleanup) = remove_if_exists(&dataset_path) {
                error!(error = %cleanup, "failed to withdraw dataset");
            }
            return Err(err);
        }

        info!(
            file = %original_name,
            uploaded_at = record.uploaded_at.as_deref().unwrap_or_default(),
            count = record.count,
            "dataset committed"
        );

        Ok(record)
    }
}
