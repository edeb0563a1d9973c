use anyhow::{Context, Result};
use std::sync::Arc;
use tally_agent::config::AgentConfig;
use tally_agent::sender::{Encoder, Sender};
use tally_agent::transport::{outbound_ip, HttpTransport};
use tally_collector::poller::Poller;
use tally_common::crypto;
use tally_common::supervisor::Supervisor;
use tally_storage::memory::MemStorage;
use tally_storage::MetricsStorage;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tally=info".parse()?))
        .init();

    let config_path = std::env::args().nth(1);
    let config = AgentConfig::resolve(config_path.as_deref())?;
    tracing::info!(
        address = %config.address,
        poll_interval_secs = config.poll_interval_secs,
        report_interval_secs = config.report_interval_secs,
        rate_limit = config.rate_limit,
        signed = config.key.is_some(),
        encrypted = config.crypto_key.is_some(),
        "tally-agent starting"
    );

    let public_key = config
        .crypto_key
        .as_ref()
        .map(crypto::public_key_from_file)
        .transpose()
        .context("failed to load public key")?;

    let real_ip = outbound_ip(&config.address);
    if real_ip.is_none() {
        tracing::warn!(
            address = %config.address,
            "Could not determine outbound address, X-Real-IP disabled"
        );
    }

    let storage: Arc<dyn MetricsStorage> = Arc::new(MemStorage::new());
    let transport = Arc::new(HttpTransport::new(&config.address, real_ip));
    tracing::info!(url = transport.url(), real_ip = ?real_ip, "Reporting target");
    let poller = Poller::new(
        storage.clone(),
        tally_collector::default_collectors(),
        config.poll_interval(),
    );
    let sender = Sender::new(
        storage,
        transport,
        Encoder::new(config.key.as_deref(), public_key),
        config.rate_limit,
        config.report_interval(),
    );

    let mut supervisor = Supervisor::new();
    supervisor.spawn("poller", |stop| poller.run(stop));
    supervisor.spawn("sender", |stop| sender.run(stop));

    signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully");
    supervisor.shutdown().await;
    tracing::info!("Stopped");
    Ok(())
}
