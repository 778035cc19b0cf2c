use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use tracing::warn;

use super::error::{Result, io_err};
use crate::model::MetadataRecord;
use crate::util::utc_millis_string;

/// Reads and writes `metadata.json`.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current record, or `{null, 0}` when nothing was ever ingested or the
    /// file cannot be read back.
    pub fn load(&self) -> MetadataRecord {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(_) => return MetadataRecord::default(),
        };

        match serde_json::from_slice(&raw) {
            Ok(record) => record,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring unreadable metadata");
                MetadataRecord::default()
            }
        }
    }

    /// Builds the record for a commit happening now. The stamp always sorts
    /// after `previous` so a cache built from the prior dataset cannot match.
    pub fn next_record(previous: &MetadataRecord, now: DateTime<Utc>, count: usize) -> MetadataRecord {
        let mut stamp = now.trunc_subsecs(3);
        let prev = previous
            .uploaded_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc));
        if let Some(prev) = prev.filter(|prev| stamp <= *prev) {
            stamp = prev.trunc_subsecs(3) + Duration::milliseconds(1);
        }

        MetadataRecord {
            uploaded_at: Some(utc_millis_string(stamp)),
            count,
        }
    }

    /// Replaces the record via a sibling temp file and rename, so readers see
    /// either the old record or the new one.
    pub fn commit(&self, record: &MetadataRecord) -> Result<()> {
        let data = serde_json::to_vec(record)?;
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut staged =
            tempfile::NamedTempFile::new_in(dir).map_err(io_err("stage metadata in", dir))?;
        staged
            .write_all(&data)
            .map_err(io_err("write metadata", staged.path()))?;
        staged
            .as_file()
            .sync_all()
            .map_err(io_err("sync metadata", &self.path))?;
        staged
            .persist(&self.path)
            .map_err(|err| io_err("replace metadata", &self.path)(err.error))?;

        Ok(())
    }
}
