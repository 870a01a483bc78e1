//! Record Cache - demonstration run
//!
//! Replays a warm/update/read/invalidate sequence against Redis, or against
//! the in-memory store when started with `--memory`.

use std::collections::BTreeSet;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use record_cache::store::{Connector, MemoryConnector, RedisConnector};
use record_cache::{
    spawn_pool_maintenance_task, CacheClient, CacheService, Config, InMemorySource, KeyScheme,
    Pool, Record, SourceStore,
};

/// Number of records in the synthetic source
const SOURCE_RECORDS: usize = 100;

/// Main entry point for the demonstration run.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the connection pool and start pool maintenance
/// 4. Flush the cache and bulk-load the source records
/// 5. Insert, update, remove and read records
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "record_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Configuration loaded: store={}:{}, max_total={}, max_idle={}, min_idle={}",
        config.store.host,
        config.store.port,
        config.pool.max_total,
        config.pool.max_idle,
        config.pool.min_idle
    );

    if std::env::args().any(|arg| arg == "--memory") {
        info!("Using in-memory store");
        let connector = MemoryConnector::new();
        run(connector.clone(), &config).await?;

        let stats = connector.store().read().await.stats();
        info!(
            "Store stats at exit: {} hits, {} misses, hit rate {:.2}, {} entries",
            stats.hits,
            stats.misses,
            stats.hit_rate(),
            stats.total_entries
        );
        Ok(())
    } else {
        let connector =
            RedisConnector::new(config.store.clone()).context("invalid Redis configuration")?;
        run(connector, &config).await
    }
}

async fn run<C: Connector>(connector: C, config: &Config) -> anyhow::Result<()> {
    let pool = Pool::new(connector, config.pool.clone()).await?;
    let maintenance = spawn_pool_maintenance_task(pool.clone(), config.maintenance_interval);

    let keys = KeyScheme::new(config.namespace.as_str())?;
    let service = CacheService::new(CacheClient::new(pool, config.store.op_timeout), keys);
    let source = InMemorySource::synthetic(SOURCE_RECORDS);

    let records = source.fetch_all().await?;
    service.invalidate_all().await.context("flushing cache")?;
    service
        .populate_from(&records)
        .await
        .context("bulk loading records")?;

    service
        .save(&Record::new(100, "Product 100", 100_000.0))
        .await?;
    service.save(&Record::new(0, "Product 000", 100.0)).await?;
    service.remove_one(50).await?;

    if let Some(record) = service.fetch_one(0).await? {
        print_record(&record);
    }

    let ids: BTreeSet<_> = (1..=5).collect();
    for record in service.fetch_many(&ids).await? {
        print_record(&record);
    }

    service.remove_many(&ids).await?;
    info!("Pool status at exit: {:?}", service.pool_status());

    maintenance.abort();
    Ok(())
}

fn print_record(record: &Record) {
    println!(
        "[Product #{}, Name: {}, Price: {:.2}]",
        record.id, record.name, record.price
    );
}
