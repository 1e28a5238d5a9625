//! # Gatekeep Server Binary
//!
//! Main entrypoint for the gatekeep authorization engine.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use gatekeep_api::AppState;
use gatekeep_cache::{DecisionCache, MokaCache, RedisCache};
use gatekeep_config::{load_or_default, Config};
use gatekeep_core::{Checker, CheckerConfig};
use gatekeep_store::{BackendKind, StorageFactory, StoreConfig};

#[derive(Parser, Debug)]
#[command(name = "gatekeep")]
#[command(about = "Gatekeep relationship-based authorization engine", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "gatekeep.yaml")]
    config: String,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_or_default(&args.config);
    if let Some(port) = args.port {
        config.server.port = port;
    }

    gatekeep_observe::init_tracing(&config.observability.log_level)?;
    tracing::info!("starting gatekeep authorization engine");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.worker_threads.max(1))
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);

    let backend = BackendKind::from_str(&config.store.backend)?;
    let store = StorageFactory::create(StoreConfig {
        backend,
        host: config.store.host.clone(),
        port: config.store.port,
        keyspace: config.store.keyspace.clone(),
    })
    .await?;
    tracing::info!(backend = backend.as_str(), "storage backend ready");

    let cache: Option<Arc<dyn DecisionCache>> = if config.cache.enabled {
        let ttl = Duration::from_secs(config.cache.ttl_seconds);
        let cache: Arc<dyn DecisionCache> = match config.cache.backend.as_str() {
            "redis" => {
                tracing::info!(
                    host = %config.cache.host,
                    port = config.cache.port,
                    "using redis decision cache"
                );
                Arc::new(RedisCache::connect(&config.cache.host, config.cache.port, ttl)?)
            },
            _ => {
                tracing::info!("using in-process decision cache");
                Arc::new(MokaCache::new(config.cache.max_capacity, ttl))
            },
        };
        Some(cache)
    } else {
        tracing::warn!("decision cache disabled, every check hits the store");
        None
    };

    let checker = Arc::new(Checker::new(
        Arc::clone(&store),
        cache.clone(),
        CheckerConfig {
            max_depth: config.check.max_depth,
            probe_parallelism: config.check.probe_parallelism,
        },
    ));
    tracing::info!(max_depth = config.check.max_depth, "permission checker ready");

    let state = AppState::new(store, cache, checker, config);
    gatekeep_api::serve(state).await
}
