pub mod ingest;
pub mod serve;
pub mod status;
