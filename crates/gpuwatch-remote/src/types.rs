use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use gpuwatch_common::HostDescriptor;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// TCP connect or key exchange failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The server rejected the credentials.
    #[error("authentication rejected for user {0}")]
    Auth(String),

    /// Opening a channel or running the command failed.
    #[error("exec failed: {0}")]
    Exec(String),

    /// The transport is gone.
    #[error("session closed")]
    Closed,

    #[error("timed out after {0}ms")]
    Timeout(u64),
}

/// A live, authenticated command channel to one host.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run `command` and return everything it wrote to stdout.
    async fn exec(&self, command: &str) -> Result<String, RemoteError>;

    /// Cheap transport check; must not perform I/O.
    fn is_alive(&self) -> bool;

    /// Best-effort disconnect.
    async fn close(&self);
}

#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, host: &HostDescriptor) -> Result<Arc<dyn RemoteSession>, RemoteError>;
}
