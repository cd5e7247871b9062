use std::time::Duration;

/// Timing knobs for one monitor instance.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Target time between cycle starts.
    pub cadence: Duration,
    /// Minimum pause between cycles, even when collection overruns the cadence.
    pub floor: Duration,
    /// Covers TCP connect, handshake and authentication.
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
    pub lookup_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(3),
            floor: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(10),
            lookup_timeout: Duration::from_secs(5),
        }
    }
}
