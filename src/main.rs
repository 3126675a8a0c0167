use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use teamchess_server::engine::{ArbiterFactory, StockfishFactory};
use teamchess_server::game::actor::{Coordinator, CoordinatorHandle};
use teamchess_server::{ws, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    dotenv::dotenv().ok();
    let config = ServerConfig::from_env();
    info!(?config, "starting teamchess server");

    let factory: Arc<dyn ArbiterFactory> = Arc::new(StockfishFactory::new(&config));
    let arbiter = factory
        .create()
        .await
        .context("failed to start the chess engine")?;

    let bind_addr = config.bind_addr.clone();
    let handle = Coordinator::spawn(config, arbiter, factory);

    let app = ws::router(handle.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(handle))
        .await
        .context("server error")?;

    Ok(())
}

/// Wait for Ctrl-C, then ask the coordinator to wind down (it terminates
/// the engine subprocess on its way out).
async fn shutdown_signal(handle: CoordinatorHandle) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    handle.shutdown();
}
