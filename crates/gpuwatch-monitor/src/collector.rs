use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use gpuwatch_common::{GpuSample, HostDescriptor, HostResult};
use gpuwatch_remote::{RemoteError, RemoteSession};

use crate::error::CollectError;
use crate::metrics::MonitorMetrics;
use crate::pool::ConnectionPool;
use crate::query::{assemble, combined_command, owner_lookup_command, parse_combined, parse_owners};

/// Samples one host per call through the shared pool.
pub struct Collector {
    pool: Arc<ConnectionPool>,
    query_timeout: Duration,
    lookup_timeout: Duration,
    metrics: Arc<MonitorMetrics>,
}

impl Collector {
    pub fn new(
        pool: Arc<ConnectionPool>,
        query_timeout: Duration,
        lookup_timeout: Duration,
        metrics: Arc<MonitorMetrics>,
    ) -> Self {
        Self {
            pool,
            query_timeout,
            lookup_timeout,
            metrics,
        }
    }

    /// Never fails: every error becomes a placeholder result for the host.
    pub async fn collect(&self, host: &HostDescriptor) -> HostResult {
        match self.try_collect(host).await {
            Ok(gpus) => {
                debug!(hostname=%host.hostname, gpus = gpus.len(), "collected");
                HostResult::ok(host.hostname.clone(), gpus)
            }
            Err(err) => {
                warn!(hostname=%host.hostname, error=%err, "collection failed");
                if err.evicts() {
                    self.pool.evict(&host.hostname).await;
                }
                HostResult::failed(host.hostname.clone(), err.marker(), err.to_string())
            }
        }
    }

    async fn try_collect(&self, host: &HostDescriptor) -> Result<Vec<GpuSample>, CollectError> {
        let session = self.pool.acquire(host).await?;

        let raw = exec(session.as_ref(), &combined_command(), self.query_timeout).await?;
        let parsed = parse_combined(&raw)?;
        if parsed.skipped > 0 {
            debug!(hostname=%host.hostname, skipped = parsed.skipped, "dropped malformed lines");
            self.metrics
                .malformed_lines_total
                .fetch_add(parsed.skipped as u64, Ordering::Relaxed);
        }

        let owners = if parsed.pids.is_empty() {
            HashMap::new()
        } else {
            let out = exec(
                session.as_ref(),
                &owner_lookup_command(&parsed.pids),
                self.lookup_timeout,
            )
            .await?;
            parse_owners(&out)
        };

        Ok(assemble(&parsed, &owners))
    }
}

async fn exec(
    session: &dyn RemoteSession,
    command: &str,
    limit: Duration,
) -> Result<String, CollectError> {
    match tokio::time::timeout(limit, session.exec(command)).await {
        Ok(Ok(out)) => Ok(out),
        Ok(Err(e)) => Err(CollectError::Execution(e)),
        Err(_) => Err(CollectError::Execution(RemoteError::Timeout(
            limit.as_millis() as u64,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CONNECTION_ERROR, QUERY_ERROR};
    use crate::query::{GPU_QUERY, SECTION_SPLIT};
    use gpuwatch_remote::{ScriptedConnector, ScriptedHost};

    const TWO_GPUS: &str = "GPU-a,0,A100,45,10,1000,8000,50,300\n\
                            GPU-b,1,A100,50,80,6000,8000,250,300\n\
                            |||SECTION_SPLIT|||\n\
                            GPU-b,321,python train.py,5800\n\
                            GPU-b,654,jupyter,100\n";

    fn host(name: &str) -> HostDescriptor {
        HostDescriptor::new(name, 22, "monitor", "secret")
    }

    fn collector(connector: &ScriptedConnector) -> (Collector, Arc<ConnectionPool>) {
        let metrics = Arc::new(MonitorMetrics::default());
        let pool = Arc::new(ConnectionPool::new(
            Arc::new(connector.clone()),
            Duration::from_secs(5),
            metrics.clone(),
        ));
        let collector = Collector::new(
            pool.clone(),
            Duration::from_secs(10),
            Duration::from_secs(5),
            metrics,
        );
        (collector, pool)
    }

    #[tokio::test]
    async fn test_collects_with_owner_lookup() {
        let connector = ScriptedConnector::new();
        connector
            .set_host(
                "gpu-01",
                ScriptedHost::new()
                    .reply(GPU_QUERY, TWO_GPUS)
                    .reply("ps ", "321 alice\n"),
            )
            .await;
        let (collector, _) = collector(&connector);

        let result = collector.collect(&host("gpu-01")).await;
        assert!(!result.is_error());
        assert_eq!(result.gpus.len(), 2);
        assert_eq!(result.gpus[0].process_count, 0);
        assert_eq!(
            result.gpus[1].process_summary,
            "alice(pythontrain.py,5800M) unknown(jupyter,100M)"
        );
        assert_eq!(result.gpus[1].process_count, 2);

        let commands = connector.commands("gpu-01").await;
        assert_eq!(commands.len(), 2);
        assert!(commands[0].contains(SECTION_SPLIT));
        assert_eq!(commands[1], "ps -o pid=,user= -p 321,654");
    }

    #[tokio::test]
    async fn test_skips_lookup_without_processes() {
        let connector = ScriptedConnector::new();
        connector
            .set_host(
                "gpu-01",
                ScriptedHost::new().reply(GPU_QUERY, "0,0,A100,45,10,1000,8000,50,300\n|||SECTION_SPLIT|||\n"),
            )
            .await;
        let (collector, _) = collector(&connector);

        let result = collector.collect(&host("gpu-01")).await;
        assert_eq!(result.gpus[0].memory_used_pct, 13);
        assert_eq!(connector.commands("gpu-01").await.len(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_is_placeholder() {
        let connector = ScriptedConnector::new();
        let (collector, pool) = collector(&connector);

        let result = collector.collect(&host("down")).await;
        assert!(result.is_error());
        assert_eq!(result.gpus.len(), 1);
        assert_eq!(result.gpus[0].index, "Err");
        assert_eq!(result.gpus[0].name, CONNECTION_ERROR);
        assert_eq!(result.gpus[0].process_summary, result.error.clone().unwrap());
        assert!(!pool.contains("down").await);
    }

    #[tokio::test]
    async fn test_exec_failure_evicts() {
        let connector = ScriptedConnector::new();
        connector
            .set_host(
                "gpu-01",
                ScriptedHost::new().fail_exec(RemoteError::Exec("channel reset".into())),
            )
            .await;
        let (collector, pool) = collector(&connector);

        let result = collector.collect(&host("gpu-01")).await;
        assert_eq!(result.gpus[0].name, CONNECTION_ERROR);
        assert!(!pool.contains("gpu-01").await);

        collector.collect(&host("gpu-01")).await;
        assert_eq!(connector.connect_count("gpu-01").await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_timeout_evicts() {
        let connector = ScriptedConnector::new();
        connector
            .set_host(
                "gpu-01",
                ScriptedHost::new()
                    .exec_delay(Duration::from_secs(30))
                    .reply(GPU_QUERY, TWO_GPUS),
            )
            .await;
        let (collector, pool) = collector(&connector);

        let result = collector.collect(&host("gpu-01")).await;
        assert!(result.error.as_deref().unwrap().contains("timed out after 10000ms"));
        assert!(!pool.contains("gpu-01").await);
    }

    #[tokio::test]
    async fn test_parse_failures_keep_session() {
        let connector = ScriptedConnector::new();
        connector.set_host("empty", ScriptedHost::new()).await;
        connector
            .set_host("nogpu", ScriptedHost::new().reply(GPU_QUERY, "No devices were found\n"))
            .await;
        let (collector, pool) = collector(&connector);

        let empty = collector.collect(&host("empty")).await;
        assert_eq!(empty.gpus[0].name, QUERY_ERROR);
        assert_eq!(empty.error.as_deref(), Some("Empty response from nvidia-smi"));

        let nogpu = collector.collect(&host("nogpu")).await;
        assert_eq!(nogpu.error.as_deref(), Some("No GPUs found"));

        assert!(pool.contains("empty").await);
        assert!(pool.contains("nogpu").await);
    }
}
