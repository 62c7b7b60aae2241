//! `settlementd`, the settlement daemon.
//!
//! Wires the settlement core to its in-tree backends (JSON-snapshot
//! store, in-process locks, environment key vault) and runs the two
//! background loops: the incoming-payment scan and the stuck
//! transaction sweep.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use settlement_core::config::{load_config, ObservabilityConfig};
use settlement_core::keys::EnvKeyVault;
use settlement_core::lifecycle::{signals, Shutdown};
use settlement_core::observability::logging;
use settlement_core::store::{LockService, MemoryLockService, MemoryStore, SettlementStore};
use settlement_core::{SettlementError, SettlementService};

#[derive(Parser, Debug)]
#[command(name = "settlementd", about = "Token-ledger settlement daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "settlement.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            // Logging is not up yet; this goes to stderr directly.
            eprintln!("settlementd: failed to load {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };

    logging::init(&config.observability);
    log_startup(&config.observability);

    let store = match &config.store.snapshot_path {
        Some(path) => Arc::new(MemoryStore::load_from_file(path)?),
        None => Arc::new(MemoryStore::new(None)),
    };
    let locks = Arc::new(MemoryLockService::new());
    let vault = Arc::new(EnvKeyVault::new());

    let service = Arc::new(SettlementService::new(
        &config,
        Arc::clone(&store) as Arc<dyn SettlementStore>,
        Arc::clone(&locks) as Arc<dyn LockService>,
        vault,
    )?);

    match service.verify_chain().await {
        Ok(()) => {
            tracing::info!(chain_id = config.chain.chain_id, "Chain verified");
        }
        Err(e @ SettlementError::ChainMismatch { .. }) => {
            tracing::error!(error = %e, "Refusing to start against the wrong chain");
            return Err(e.into());
        }
        Err(e) => {
            // Providers may be briefly unreachable at boot; failover
            // covers the loops once they come back.
            tracing::warn!(error = %e, "Chain verification deferred, providers unreachable");
        }
    }

    let shutdown = Arc::new(Shutdown::new());

    let sweep_task = {
        let service = Arc::clone(&service);
        let mut rx = shutdown.subscribe();
        let interval = Duration::from_secs(config.issuer.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = service.sweep_stuck().await {
                            tracing::warn!(error = %e, "Stuck sweep pass failed");
                        }
                    }
                    _ = rx.recv() => break,
                }
            }
        })
    };

    let scan_task = {
        let service = Arc::clone(&service);
        let mut rx = shutdown.subscribe();
        let interval = Duration::from_secs(config.scanner.interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => scan_pass(&service).await,
                    _ = rx.recv() => break,
                }
            }
        })
    };

    signals::listen(&shutdown).await;

    sweep_task.await?;
    scan_task.await?;

    if let Some(path) = &config.store.snapshot_path {
        store.save_to_file()?;
        tracing::info!(path = %path, "State snapshot saved");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// One scan pass over every watched (wallet, token) pair.
async fn scan_pass(service: &SettlementService) {
    for wallet in service.watched_wallets() {
        for token in service.scannable_tokens() {
            if let Err(e) = service.verify_incoming(wallet.address, &token.symbol).await {
                tracing::warn!(
                    wallet = %wallet.address,
                    token = %token.symbol,
                    error = %e,
                    "Scan pass failed"
                );
            }
        }
    }
}

fn log_startup(observability: &ObservabilityConfig) {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %observability.log_level,
        json = observability.log_json,
        "settlementd starting"
    );
}
