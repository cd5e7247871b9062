use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gpuwatch_common::{HostDescriptor, HostResult, Snapshot};
use gpuwatch_remote::RemoteConnector;

use crate::cache::SnapshotCache;
use crate::collector::Collector;
use crate::config::MonitorConfig;
use crate::error::{SchedulerError, QUERY_ERROR};
use crate::metrics::MonitorMetrics;
use crate::pool::ConnectionPool;

/// Pause before the next cycle: what is left of the cadence, but never less
/// than `floor`.
pub fn sleep_duration(cadence: Duration, floor: Duration, elapsed: Duration) -> Duration {
    cadence.saturating_sub(elapsed).max(floor)
}

/// Drives fixed-cadence collection over the whole registry.
pub struct Scheduler {
    hosts: Arc<[HostDescriptor]>,
    collector: Arc<Collector>,
    pool: Arc<ConnectionPool>,
    cache: Arc<SnapshotCache>,
    metrics: Arc<MonitorMetrics>,
    cadence: Duration,
    floor: Duration,
    cycle: AtomicU64,
}

impl Scheduler {
    pub fn new(
        hosts: Vec<HostDescriptor>,
        connector: Arc<dyn RemoteConnector>,
        config: &MonitorConfig,
        cache: Arc<SnapshotCache>,
        metrics: Arc<MonitorMetrics>,
    ) -> Result<Self, SchedulerError> {
        if hosts.is_empty() {
            return Err(SchedulerError::EmptyRegistry);
        }

        let pool = Arc::new(ConnectionPool::new(
            connector,
            config.connect_timeout,
            metrics.clone(),
        ));
        let collector = Arc::new(Collector::new(
            pool.clone(),
            config.query_timeout,
            config.lookup_timeout,
            metrics.clone(),
        ));

        Ok(Self {
            hosts: hosts.into(),
            collector,
            pool,
            cache,
            metrics,
            cadence: config.cadence,
            floor: config.floor,
            cycle: AtomicU64::new(0),
        })
    }

    pub fn pool(&self) -> Arc<ConnectionPool> {
        self.pool.clone()
    }

    /// Loop until `shutdown` fires, then close every pooled session.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            hosts = self.hosts.len(),
            cadence_ms = self.cadence.as_millis() as u64,
            floor_ms = self.floor.as_millis() as u64,
            "scheduler started"
        );

        while !shutdown.is_cancelled() {
            let started = Instant::now();

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.run_cycle() => {}
            }

            let pause = sleep_duration(self.cadence, self.floor, started.elapsed());
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        self.pool.close_all().await;
        info!("scheduler stopped");
    }

    /// Collect every host once and publish the result.
    pub async fn run_cycle(&self) -> Arc<Snapshot> {
        let cycle = self.cycle.fetch_add(1, Ordering::Relaxed) + 1;
        let collected_at = Utc::now();
        let started = Instant::now();

        let mut tasks = JoinSet::new();
        for (idx, host) in self.hosts.iter().enumerate() {
            let collector = self.collector.clone();
            let host = host.clone();
            tasks.spawn(async move { (idx, collector.collect(&host).await) });
        }

        let mut results: Vec<Option<HostResult>> = vec![None; self.hosts.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => error!(cycle, error=%e, "collection task failed"),
            }
        }

        let hosts: Vec<HostResult> = results
            .into_iter()
            .zip(self.hosts.iter())
            .map(|(result, host)| {
                result.unwrap_or_else(|| {
                    HostResult::failed(host.hostname.clone(), QUERY_ERROR, "collection task panicked")
                })
            })
            .collect();

        let failed = hosts.iter().filter(|h| h.is_error()).count();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.metrics.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.metrics.last_cycle_ms.store(elapsed_ms, Ordering::Relaxed);
        self.metrics
            .host_success_total
            .fetch_add((hosts.len() - failed) as u64, Ordering::Relaxed);
        self.metrics
            .host_error_total
            .fetch_add(failed as u64, Ordering::Relaxed);

        if failed > 0 {
            warn!(cycle, elapsed_ms, failed, hosts = hosts.len(), "cycle finished with errors");
        } else {
            info!(cycle, elapsed_ms, hosts = hosts.len(), "cycle finished");
        }

        self.cache
            .replace(Snapshot {
                cycle,
                collected_at,
                hosts,
            })
            .await;
        self.cache.read().await
    }
}
