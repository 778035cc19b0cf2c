use std::fs::{self, File};
use std::io::BufReader;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::dataset::{DataDir, MetadataStore, parse_rows};
use crate::util::sha256_file;

pub fn run(args: StatusArgs) -> Result<()> {
    let data = DataDir::open(&args.data_dir)?;
    let metadata = MetadataStore::new(data.metadata_path());
    let dataset_path = data.dataset_path();

    info!(data_dir = %data.root().display(), "status requested");

    let record = metadata.load();
    if record.uploaded_at.is_some() {
        info!(
            path = %metadata.path().display(),
            uploaded_at = record.uploaded_at.as_deref().unwrap_or_default(),
            count = record.count,
            "loaded metadata"
        );
    } else {
        warn!(path = %metadata.path().display(), "no upload recorded");
    }

    if !dataset_path.exists() {
        warn!(path = %dataset_path.display(), "dataset file missing");
        return Ok(());
    }

    let size = fs::metadata(&dataset_path)
        .with_context(|| format!("failed to inspect {}", dataset_path.display()))?
        .len();
    let sha256 = sha256_file(&dataset_path)?;
    let file = File::open(&dataset_path)
        .with_context(|| format!("failed to open {}", dataset_path.display()))?;
    let rows = parse_rows(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", dataset_path.display()))?
        .len();

    info!(
        path = %dataset_path.display(),
        bytes = size,
        sha256 = %sha256,
        rows,
        "dataset status"
    );

    if rows != record.count {
        warn!(
            recorded = record.count,
            parsed = rows,
            "metadata count disagrees with dataset"
        );
    }

    Ok(())
}
