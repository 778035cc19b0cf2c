use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "itemlist",
    version,
    about = "Upload a CSV or XLSB item list and serve its rows over HTTP"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Serve(ServeArgs),
    Ingest(IngestArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 64 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// CSV or XLSB file to load as the new dataset.
    #[arg(long)]
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,
}
