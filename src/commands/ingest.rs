use std::fs::File;
use std::io;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::IngestArgs;
use crate::dataset::{DataDir, Ingestor, Upload, UploadFormat};

pub fn run(args: IngestArgs) -> Result<()> {
    let original_name = args
        .file
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", args.file.display()))?;

    let format = UploadFormat::from_filename(&original_name)?;
    let data = DataDir::open(&args.data_dir)?;

    info!(
        source = %args.file.display(),
        data_dir = %data.root().display(),
        "staging local file"
    );

    let mut source = File::open(&args.file)
        .with_context(|| format!("failed to open {}", args.file.display()))?;
    let mut staged = data.create_upload_temp(&original_name)?;
    io::copy(&mut source, staged.as_file_mut())
        .with_context(|| format!("failed to stage {}", args.file.display()))?;

    let record = Ingestor::new(data).ingest(Some(Upload {
        original_name,
        format,
        file: staged,
    }))?;

    info!(
        uploaded_at = record.uploaded_at.as_deref().unwrap_or_default(),
        count = record.count,
        "ingest completed"
    );

    Ok(())
}
