//! Run command - hosts the cache until interrupted

use std::path::PathBuf;

use clap::Args;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::infrastructure::logging;
use crate::infrastructure::scheduler::CacheScheduler;

/// Arguments for the run command
#[derive(Args, Clone)]
pub struct RunArgs {
    /// Snapshot file to restore from and write to (overrides config)
    #[arg(long)]
    pub snapshot_path: Option<PathBuf>,

    /// Start empty instead of restoring the last snapshot
    #[arg(long)]
    pub no_restore: bool,
}

/// Run the cache with its background jobs until Ctrl-C
pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut config = AppConfig::load().unwrap_or_default();
    if let Some(path) = args.snapshot_path {
        config.persistence.snapshot_path = path;
    }

    logging::init_logging(&config.logging);

    let cache = crate::create_cache(&config);

    if args.no_restore {
        info!("Skipping snapshot restore");
    } else {
        match cache.load_snapshot().await {
            Ok(report) => info!(
                restored = report.restored,
                skipped = report.skipped,
                "Snapshot loaded"
            ),
            Err(e) => warn!(error = %e, "Snapshot could not be loaded, starting empty"),
        }
    }

    let scheduler = CacheScheduler::start(cache.clone(), &config.scheduler);
    info!(
        capacity = config.cache.capacity,
        snapshot = %config.persistence.snapshot_path.display(),
        "Cache running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    scheduler.shutdown().await;

    let stats = cache.statistics();
    info!(
        items = stats.items,
        hits = stats.hits,
        similarity_hits = stats.similarity_hits,
        misses = stats.misses,
        evictions = stats.evictions,
        hit_rate = stats.hit_rate(),
        "Cache stopped"
    );

    Ok(())
}
