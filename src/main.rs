//! FlashGate - A Redis-Compatible Command Gateway
//!
//! Entry point of the server binary. Parses flags, sets up logging, builds
//! the command service and accepts connections until Ctrl+C.

use clap::Parser;
use flashgate::config::ServerConfig;
use flashgate::connection::{handle_connection, ConnectionStats};
use flashgate::metrics::MetricEntity;
use flashgate::server::{RedisService, REDIS_TABLE_NAME};
use flashgate::storage::LocalCluster;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        version = flashgate::VERSION,
        masters = %config.master_addresses.join(","),
        client_timeout_ms = config.client_timeout_ms,
        "Starting FlashGate"
    );

    // Standalone mode: the backend lives in-process.
    let cluster = LocalCluster::with_table(REDIS_TABLE_NAME);
    let metrics = Arc::new(MetricEntity::new("redis_server"));

    // A bad command table must stop the server before it binds.
    let service = Arc::new(RedisService::new(
        config.service_config(),
        Arc::new(cluster),
        metrics,
    )?);
    info!(
        commands = service.registry().len(),
        "Command registry initialized"
    );

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    };

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&service), Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    for (name, snapshot) in service.metrics().snapshot() {
        if snapshot.count > 0 {
            info!(
                histogram = name,
                count = snapshot.count,
                mean_us = snapshot.mean_us(),
                max_us = snapshot.max_us,
                "Latency"
            );
        }
    }
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        failed = stats.commands_failed.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

/// Accepts connections and spawns one task per client.
async fn accept_loop(
    listener: TcpListener,
    service: Arc<RedisService>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let service = Arc::clone(&service);
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    handle_connection(stream, addr, service, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
