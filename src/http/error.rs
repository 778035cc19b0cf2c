use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{error, warn};

use crate::dataset::DatasetError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("invalid upload body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("background task failed: {0}")]
    Task(#[from] JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Dataset(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Dataset(DatasetError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Multipart(err) => err.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Dataset(err) if err.is_parse_error() => {
                warn!(error = %self, "rejected dataset content");
            }
            _ if status.is_server_error() => error!(error = %self, "request failed"),
            _ => warn!(status = status.as_u16(), error = %self, "request rejected"),
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
