use std::sync::Arc;

use plainhttp::config::Config;
use plainhttp::fs::OsFs;
use plainhttp::server::{self, ServerContext};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    match &cfg.directory {
        Some(dir) => tracing::info!("Serving files from {}", dir.display()),
        None => tracing::info!("No directory configured, /files/ requests will return 404"),
    }

    let listener = server::bind(&cfg.listen_addr).await?;
    let ctx = Arc::new(ServerContext::new(cfg, OsFs));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    server::serve_until_shutdown(listener, ctx, shutdown_rx).await
}
