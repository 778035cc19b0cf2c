//! Upload, normalize, cache and serve the single tabular dataset kept in the
//! data directory.

mod cache;
mod error;
mod ingest;
mod metadata;
mod normalize;
mod paths;
mod retrieval;
mod rows;
#[cfg(test)]
mod tests;

pub use cache::RowCache;
pub use error::DatasetError;
pub use ingest::Ingestor;
pub use metadata::MetadataStore;
pub use normalize::{Upload, UploadFormat};
pub use paths::DataDir;
pub use retrieval::{ItemService, PageRequest};
pub use rows::{Row, parse_rows};
