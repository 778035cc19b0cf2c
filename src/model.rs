use serde::{Deserialize, Serialize};

use crate::dataset::Row;

/// Descriptor of the last successful ingestion. `uploaded_at` doubles as the
/// row cache stamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub uploaded_at: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPage {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub rows: Vec<Row>,
}
