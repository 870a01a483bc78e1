//! Pool Maintenance Task
//!
//! Background task that periodically evicts dead idle connections and keeps
//! `min_idle` connections open.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::pool::Pool;
use crate::store::Connector;

/// Spawns a background task that runs [`Pool::maintain`] at a fixed interval.
///
/// # Arguments
/// * `pool` - Pool to maintain
/// * `interval_secs` - Interval in seconds between maintenance runs
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let pool = Pool::new(connector, config.pool.clone()).await?;
/// let maintenance = spawn_pool_maintenance_task(pool.clone(), 30);
/// // Later, during shutdown:
/// maintenance.abort();
/// ```
pub fn spawn_pool_maintenance_task<C: Connector>(
    pool: Pool<C>,
    interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting pool maintenance task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            match pool.maintain().await {
                Ok(report) if report.evicted > 0 || report.opened > 0 => {
                    info!(
                        "Pool maintenance: evicted {} dead connections, opened {}",
                        report.evicted, report.opened
                    );
                }
                Ok(_) => debug!("Pool maintenance: nothing to do"),
                Err(e) => warn!("Pool maintenance could not refill idle connections: {}", e),
            }
        }
    })
}
