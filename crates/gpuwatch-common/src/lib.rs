pub mod gpu_sample;
pub mod host;
pub mod snapshot;

pub use gpu_sample::{memory_used_pct, GpuSample, HostResult, ERROR_INDEX};
pub use host::{Credential, HostDescriptor};
pub use snapshot::Snapshot;

pub mod telemetry;
