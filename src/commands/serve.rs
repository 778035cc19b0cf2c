use std::net::SocketAddr;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::ServeArgs;
use crate::dataset::DataDir;
use crate::http::{AppState, build_router};

pub fn run(args: ServeArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(serve(args))
}

async fn serve(args: ServeArgs) -> Result<()> {
    let data = DataDir::open(&args.data_dir)?;
    let addr = SocketAddr::new(args.bind, args.port);

    let state = AppState::new(data, args.max_upload_bytes);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        addr = %addr,
        data_dir = %args.data_dir.display(),
        max_upload_bytes = args.max_upload_bytes,
        "item list server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")?;

    info!("item list server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
