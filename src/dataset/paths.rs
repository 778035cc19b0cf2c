use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;

use super::error::{Result, io_err};

pub const DATASET_FILE: &str = "item_list.csv";
pub const METADATA_FILE: &str = "metadata.json";

/// Layout of the data directory: the canonical dataset, its metadata record,
/// and in-flight upload temp files, all on one volume.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(io_err("create data directory", &root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.root.join(DATASET_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Creates an empty temp file for an incoming upload, named
    /// `<epoch-millis><random>-<original name>`. The random part keeps
    /// same-millisecond uploads of one name apart. Dropping it removes it.
    pub fn create_upload_temp(&self, original_name: &str) -> Result<NamedTempFile> {
        let prefix = Utc::now().timestamp_millis().to_string();
        let suffix = format!("-{}", sanitize_file_name(original_name));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(&suffix).rand_bytes(4);
        builder
            .tempfile_in(&self.root)
            .map_err(io_err("create upload temp file in", &self.root))
    }
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.chars()
        .map(|ch| if ch.is_control() { '_' } else { ch })
        .collect()
}
