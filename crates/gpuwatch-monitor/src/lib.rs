pub mod cache;
pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod query;
pub mod scheduler;

pub use cache::SnapshotCache;
pub use collector::Collector;
pub use config::MonitorConfig;
pub use error::{CollectError, ConnectError, SchedulerError};
pub use metrics::MonitorMetrics;
pub use pool::ConnectionPool;
pub use scheduler::Scheduler;
