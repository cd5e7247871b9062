use thiserror::Error;

use gpuwatch_remote::RemoteError;

/// Placeholder GPU name for hosts whose channel failed.
pub const CONNECTION_ERROR: &str = "Connection Error";
/// Placeholder GPU name for hosts that answered with nothing usable.
pub const QUERY_ERROR: &str = "Query Error";

#[derive(Debug, Clone, Error)]
#[error("connect to {hostname} failed: {source}")]
pub struct ConnectError {
    pub hostname: String,
    #[source]
    pub source: RemoteError,
}

/// Why one host produced no samples this cycle.
#[derive(Debug, Clone, Error)]
pub enum CollectError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The remote command failed, timed out or lost its channel.
    #[error("remote command failed: {0}")]
    Execution(RemoteError),

    #[error("Empty response from nvidia-smi")]
    EmptyResponse,

    #[error("No GPUs found")]
    NoGpus,
}

impl CollectError {
    /// Only transport failures discard the pooled session.
    pub fn evicts(&self) -> bool {
        matches!(self, CollectError::Connect(_) | CollectError::Execution(_))
    }

    pub fn marker(&self) -> &'static str {
        if self.evicts() {
            CONNECTION_ERROR
        } else {
            QUERY_ERROR
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("host registry is empty")]
    EmptyRegistry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_policy() {
        let connect = CollectError::from(ConnectError {
            hostname: "gpu-01".into(),
            source: RemoteError::Timeout(5000),
        });
        assert!(connect.evicts());
        assert_eq!(connect.marker(), CONNECTION_ERROR);
        assert_eq!(
            connect.to_string(),
            "connect to gpu-01 failed: timed out after 5000ms"
        );

        assert!(CollectError::Execution(RemoteError::Closed).evicts());
        assert!(!CollectError::EmptyResponse.evicts());
        assert!(!CollectError::NoGpus.evicts());
        assert_eq!(CollectError::NoGpus.marker(), QUERY_ERROR);
    }
}
