use std::io;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::AppState;
use super::error::ApiError;
use crate::dataset::{DatasetError, MetadataStore, PageRequest, Upload, UploadFormat};
use crate::model::{ItemPage, MetadataRecord};

/// Multipart field carrying the uploaded file.
const UPLOAD_FIELD: &str = "csv";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsQuery {
    page: Option<String>,
    page_size: Option<String>,
    columns: Option<String>,
}

pub async fn metadata(State(state): State<AppState>) -> Result<Json<MetadataRecord>, ApiError> {
    let path = state.inner.data.metadata_path();
    let record = tokio::task::spawn_blocking(move || MetadataStore::new(path).load()).await?;
    Ok(Json(record))
}

pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<ItemPage>, ApiError> {
    let request = PageRequest::from_raw(
        query.page.as_deref(),
        query.page_size.as_deref(),
        query.columns.as_deref(),
    );

    let inner = Arc::clone(&state.inner);
    let page = tokio::task::spawn_blocking(move || inner.items.list_items(&request)).await??;
    Ok(Json(page))
}

pub async fn list_all_items(State(state): State<AppState>) -> Result<Response, ApiError> {
    let inner = Arc::clone(&state.inner);
    let rows = tokio::task::spawn_blocking(move || inner.items.list_all()).await??;
    Ok(Json(&*rows).into_response())
}

pub async fn download_dataset(State(state): State<AppState>) -> Result<Response, ApiError> {
    let path = state.inner.data.dataset_path();
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "dataset requested before any upload");
            return Err(DatasetError::NotFound { path }.into());
        }
        Err(source) => {
            return Err(DatasetError::Io {
                action: "read dataset",
                path,
                source,
            }
            .into());
        }
    };

    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], bytes).into_response())
}

/// Receives the `csv` field into a temp file in the data directory and runs
/// ingestion. The extension is checked before any bytes are written; the
/// temp file is removed on every failure path.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<MetadataRecord>, ApiError> {
    let mut upload = None;

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(original_name) = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(ToOwned::to_owned)
        else {
            continue;
        };

        let format = UploadFormat::from_filename(&original_name)?;
        let file = state.inner.data.create_upload_temp(&original_name)?;
        let temp_path = file.path().to_path_buf();
        let write_err = |source: io::Error| DatasetError::Io {
            action: "write upload",
            path: temp_path.clone(),
            source,
        };

        let handle = file.as_file().try_clone().map_err(write_err)?;
        let mut writer = tokio::fs::File::from_std(handle);
        let mut received = 0_usize;
        while let Some(chunk) = field.chunk().await? {
            received += chunk.len();
            writer.write_all(&chunk).await.map_err(write_err)?;
        }
        writer.flush().await.map_err(write_err)?;

        info!(file = %original_name, bytes = received, "upload received");
        upload = Some(Upload {
            original_name,
            format,
            file,
        });
        break;
    }

    let inner = Arc::clone(&state.inner);
    let record = tokio::task::spawn_blocking(move || inner.ingestor.ingest(upload)).await??;
    state.inner.cache.invalidate(record.uploaded_at.as_deref());

    Ok(Json(record))
}
