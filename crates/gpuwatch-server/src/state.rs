use std::sync::Arc;

use gpuwatch_monitor::{ConnectionPool, MonitorMetrics, SnapshotCache};

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<SnapshotCache>,
    pub metrics: Arc<MonitorMetrics>,
    /// Absent when no hosts are registered and the scheduler never runs.
    pub pool: Option<Arc<ConnectionPool>>,
}
