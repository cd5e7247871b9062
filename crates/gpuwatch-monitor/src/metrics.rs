use std::sync::atomic::{AtomicU64, Ordering};

/// Shared monitor counters, safe for concurrent access.
#[derive(Debug, Default)]
pub struct MonitorMetrics {
    /// Completed collection cycles.
    pub cycles_total: AtomicU64,
    /// Wall time of the most recent cycle (gauge).
    pub last_cycle_ms: AtomicU64,
    pub host_success_total: AtomicU64,
    pub host_error_total: AtomicU64,
    /// Fresh sessions opened by the pool.
    pub connects_total: AtomicU64,
    /// Sessions discarded after a transport failure.
    pub evictions_total: AtomicU64,
    /// Output lines dropped by the parser.
    pub malformed_lines_total: AtomicU64,
}

impl MonitorMetrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Prometheus text exposition format. `cycle` is the cycle of the snapshot
    /// currently served.
    pub fn render(&self, pool_size: usize, cycle: u64) -> String {
        format!(
            "# HELP gpuwatch_cycles_total Completed collection cycles.\n\
             # TYPE gpuwatch_cycles_total counter\n\
             gpuwatch_cycles_total {}\n\
             # HELP gpuwatch_last_cycle_ms Duration of the last collection cycle in milliseconds.\n\
             # TYPE gpuwatch_last_cycle_ms gauge\n\
             gpuwatch_last_cycle_ms {}\n\
             # HELP gpuwatch_host_success_total Hosts sampled successfully.\n\
             # TYPE gpuwatch_host_success_total counter\n\
             gpuwatch_host_success_total {}\n\
             # HELP gpuwatch_host_error_total Hosts that produced an error result.\n\
             # TYPE gpuwatch_host_error_total counter\n\
             gpuwatch_host_error_total {}\n\
             # HELP gpuwatch_connects_total SSH sessions opened.\n\
             # TYPE gpuwatch_connects_total counter\n\
             gpuwatch_connects_total {}\n\
             # HELP gpuwatch_evictions_total SSH sessions evicted after a failure.\n\
             # TYPE gpuwatch_evictions_total counter\n\
             gpuwatch_evictions_total {}\n\
             # HELP gpuwatch_malformed_lines_total nvidia-smi output lines skipped by the parser.\n\
             # TYPE gpuwatch_malformed_lines_total counter\n\
             gpuwatch_malformed_lines_total {}\n\
             # HELP gpuwatch_pool_sessions Sessions currently held by the pool.\n\
             # TYPE gpuwatch_pool_sessions gauge\n\
             gpuwatch_pool_sessions {}\n\
             # HELP gpuwatch_snapshot_cycle Cycle number of the published snapshot.\n\
             # TYPE gpuwatch_snapshot_cycle gauge\n\
             gpuwatch_snapshot_cycle {}\n",
            self.cycles_total.load(Ordering::Relaxed),
            self.last_cycle_ms.load(Ordering::Relaxed),
            self.host_success_total.load(Ordering::Relaxed),
            self.host_error_total.load(Ordering::Relaxed),
            self.connects_total.load(Ordering::Relaxed),
            self.evictions_total.load(Ordering::Relaxed),
            self.malformed_lines_total.load(Ordering::Relaxed),
            pool_size,
            cycle,
        )
    }
}
