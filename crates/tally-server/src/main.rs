use anyhow::{Context, Result};
use tally_common::crypto;
use tally_common::supervisor::Supervisor;
use tally_server::app;
use tally_server::config::ServerConfig;
use tally_server::state::AppState;
use tally_server::storage::open_storage;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tally=info".parse()?))
        .init();

    let config_path = std::env::args().nth(1);
    let config = ServerConfig::resolve(config_path.as_deref())?;
    tracing::info!(
        address = %config.address,
        database = config.database_dsn.is_some(),
        store_interval_secs = config.store_interval_secs,
        restore = config.restore,
        signed = config.key.is_some(),
        encrypted = config.crypto_key.is_some(),
        "tally-server starting"
    );

    let private_key = config
        .crypto_key
        .as_ref()
        .map(crypto::private_key_from_file)
        .transpose()
        .context("failed to load private key")?;

    let mut supervisor = Supervisor::new();
    let storage = open_storage(&config, &mut supervisor).await?;

    let listener = tokio::net::TcpListener::bind(config.address.as_str())
        .await
        .with_context(|| format!("failed to bind {}", config.address))?;
    let addr = listener.local_addr()?;
    let state = AppState::new(storage, config, private_key);
    let app = app::build_http_app(state);

    tracing::info!(%addr, "HTTP server listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await;
    if let Err(e) = result {
        tracing::error!(error = %e, "HTTP server error");
    }

    supervisor.shutdown().await;
    tracing::info!("Stopped");
    Ok(())
}
