use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;

use gpuwatch_common::HostDescriptor;

use crate::types::{RemoteConnector, RemoteError, RemoteSession};

/// Keep-alive interval used when none is configured.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);
/// Unanswered keep-alives before the transport is considered dead.
const KEEPALIVE_MAX: usize = 3;

#[derive(Debug, Clone)]
pub struct SshOptions {
    pub keepalive_interval: Duration,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE,
        }
    }
}

/// Host keys are accepted without verification, matching an auto-add policy.
struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Opens password-authenticated SSH sessions with russh.
#[derive(Clone)]
pub struct SshConnector {
    config: Arc<client::Config>,
}

impl SshConnector {
    pub fn new(opts: SshOptions) -> Self {
        let config = client::Config {
            keepalive_interval: Some(opts.keepalive_interval),
            keepalive_max: KEEPALIVE_MAX,
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(SshOptions::default())
    }
}

impl std::fmt::Debug for SshConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConnector")
            .field("keepalive_interval", &self.config.keepalive_interval)
            .finish()
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(&self, host: &HostDescriptor) -> Result<Arc<dyn RemoteSession>, RemoteError> {
        let addr = (host.hostname.as_str(), host.port);
        let mut handle = client::connect(self.config.clone(), addr, AcceptAnyHostKey)
            .await
            .map_err(|e| RemoteError::Connect(e.to_string()))?;

        let accepted = handle
            .authenticate_password(host.username.as_str(), host.password.expose())
            .await
            .map_err(|e| RemoteError::Connect(e.to_string()))?;
        if !accepted {
            return Err(RemoteError::Auth(host.username.clone()));
        }

        tracing::debug!(hostname=%host.hostname, port=host.port, "ssh session established");
        Ok(Arc::new(SshSession {
            hostname: host.hostname.clone(),
            handle,
        }))
    }
}

pub struct SshSession {
    hostname: String,
    handle: Handle<AcceptAnyHostKey>,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&self, command: &str) -> Result<String, RemoteError> {
        if self.handle.is_closed() {
            return Err(RemoteError::Closed);
        }

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| RemoteError::Exec(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| RemoteError::Exec(e.to_string()))?;

        let mut stdout = Vec::new();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } if exit_status != 0 => {
                    tracing::debug!(hostname=%self.hostname, exit_status, "remote command exited non-zero");
                }
                _ => {}
            }
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn is_alive(&self) -> bool {
        !self.handle.is_closed()
    }

    async fn close(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!(hostname=%self.hostname, error=%e, "ssh disconnect failed");
        }
    }
}
