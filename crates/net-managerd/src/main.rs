//! Binary entry point: parse config, initialize logging, wire a
//! `NetworkManager` + `FilterScheduler` pair against a Postgres pool, and
//! drive the Periodic Reaper (spec.md §4.7) for the lifetime of the
//! process. HTTP/REST frontends and the RPC transport itself are Non-goals
//! (spec.md §1); this binary only stands up the core.

mod config_cli;
mod rpc_stub;

use std::sync::Arc;

use clap::Parser;
use net_manager::{AllowAllPolicy, NetworkManager, Reaper};
use net_rpc::OwnershipRouter;
use net_scheduler::{FilterScheduler, HostSource, StaticHostSource};
use sqlx::postgres::PgPoolOptions;

use config_cli::Cli;
use rpc_stub::{NeverStaleHeartbeat, UnconfiguredRpcClient, UnlimitedQuota};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let reaper_interval = cli.reaper_interval();
    let host = cli.host.clone();
    let scheduler_max_attempts = cli.scheduler_max_attempts;
    let database_url = cli.database_url.clone();
    let config = cli.into_config();
    config.validate().map_err(|reason| eyre::eyre!(reason))?;

    // `database_url` isn't part of `net_core::Config` (it's deployment
    // plumbing, not a network policy tunable), so it's read straight off
    // the CLI rather than threaded through the config record.
    let pool = PgPoolOptions::new().connect(&database_url).await?;
    let db: net_db::SafePgPool = pool.into();

    let router = OwnershipRouter::new(host.clone());
    let heartbeat = Arc::new(NeverStaleHeartbeat);
    let rpc = Arc::new(UnconfiguredRpcClient);
    let policy = Arc::new(AllowAllPolicy);
    let quota = Arc::new(UnlimitedQuota);

    let mut manager = NetworkManager::new(db.clone(), rpc, router, heartbeat, policy, config, quota);
    let claimed = manager.init_host(&host).await?;
    tracing::info!(host = %host, claimed, "network manager started");

    // A real deployment sources live host states from a capacity service;
    // that fan-out is external plumbing (spec.md §1), so the daemon starts
    // with an empty snapshot until one is wired in.
    let host_source: Arc<dyn HostSource> = Arc::new(StaticHostSource::new(Vec::new()));
    let _scheduler = FilterScheduler::new(host_source, scheduler_max_attempts);

    let reaper = Reaper::new(db, host, reaper_interval);
    reaper.run_forever(reaper_interval).await;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::prelude::*;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::Layer::default())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
