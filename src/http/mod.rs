//! HTTP surface over the dataset pipeline.

mod error;
mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::dataset::{DataDir, Ingestor, ItemService, RowCache};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    data: DataDir,
    ingestor: Ingestor,
    cache: Arc<RowCache>,
    items: ItemService,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(data: DataDir, max_upload_bytes: usize) -> Self {
        let cache = Arc::new(RowCache::new(&data));
        let items = ItemService::new(Arc::clone(&cache));
        let ingestor = Ingestor::new(data.clone());
        Self {
            inner: Arc::new(AppStateInner {
                data,
                ingestor,
                cache,
                items,
                max_upload_bytes,
            }),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.inner.max_upload_bytes;

    Router::new()
        .route("/api/metadata", get(handlers::metadata))
        .route("/api/items", get(handlers::list_items))
        .route("/api/items/all", get(handlers::list_all_items))
        .route("/item_list.csv", get(handlers::download_dataset))
        .route("/upload", post(handlers::upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
