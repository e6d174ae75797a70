use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use lendpool::engine::Engine;
use lendpool::{api, compactor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("LENDPOOL_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    lendpool::observability::init(metrics_port);

    let port = std::env::var("LENDPOOL_PORT").unwrap_or_else(|_| "8080".into());
    let bind = std::env::var("LENDPOOL_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("LENDPOOL_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let compact_threshold: u64 = std::env::var("LENDPOOL_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;
    let wal_path = PathBuf::from(&data_dir).join("lendpool.wal");

    let engine = Arc::new(Engine::new(wal_path)?);
    tokio::spawn(compactor::run_compactor(engine.clone(), compact_threshold));

    let app = api::router(engine);

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("lendpool listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  compact_threshold: {compact_threshold}");
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("lendpool stopped");
    Ok(())
}

/// Resolve on SIGTERM or ctrl-c; axum then stops accepting and drains
/// in-flight requests.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
