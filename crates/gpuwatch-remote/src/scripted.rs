use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use gpuwatch_common::HostDescriptor;

use crate::types::{RemoteConnector, RemoteError, RemoteSession};

/// Canned behaviour for one host.
#[derive(Debug, Clone, Default)]
pub struct ScriptedHost {
    connect_error: Option<RemoteError>,
    connect_delay: Duration,
    exec_error: Option<RemoteError>,
    exec_delay: Duration,
    /// (command prefix, stdout); first match wins.
    replies: Vec<(String, String)>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, command_prefix: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.replies.push((command_prefix.into(), stdout.into()));
        self
    }

    pub fn fail_connect(mut self, err: RemoteError) -> Self {
        self.connect_error = Some(err);
        self
    }

    pub fn fail_exec(mut self, err: RemoteError) -> Self {
        self.exec_error = Some(err);
        self
    }

    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = delay;
        self
    }
}

#[derive(Debug, Default)]
struct Inner {
    hosts: HashMap<String, ScriptedHost>,
    connects: HashMap<String, u64>,
    commands: Vec<(String, String)>,
    sessions: Vec<(String, Arc<ScriptedSession>)>,
}

/// In-memory [`RemoteConnector`] that replays scripted output. Hosts with no
/// script refuse connections.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    inner: Arc<Mutex<Inner>>,
    next_session_id: Arc<AtomicU64>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_host(&self, hostname: &str, script: ScriptedHost) {
        self.inner
            .lock()
            .await
            .hosts
            .insert(hostname.to_string(), script);
    }

    /// Number of successful or attempted connects for `hostname`.
    pub async fn connect_count(&self, hostname: &str) -> u64 {
        self.inner
            .lock()
            .await
            .connects
            .get(hostname)
            .copied()
            .unwrap_or(0)
    }

    /// Commands executed against `hostname`, oldest first.
    pub async fn commands(&self, hostname: &str) -> Vec<String> {
        self.inner
            .lock()
            .await
            .commands
            .iter()
            .filter(|(h, _)| h == hostname)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Simulate a silent transport drop on every session opened to `hostname`.
    pub async fn drop_sessions(&self, hostname: &str) {
        let inner = self.inner.lock().await;
        for (h, session) in &inner.sessions {
            if h == hostname {
                session.alive.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Identifiers of every session opened to `hostname`, oldest first.
    pub async fn session_ids(&self, hostname: &str) -> Vec<u64> {
        self.inner
            .lock()
            .await
            .sessions
            .iter()
            .filter(|(h, _)| h == hostname)
            .map(|(_, s)| s.id)
            .collect()
    }

    /// Sessions to `hostname` that have been neither closed nor dropped.
    pub async fn live_sessions(&self, hostname: &str) -> usize {
        self.inner
            .lock()
            .await
            .sessions
            .iter()
            .filter(|(h, s)| h == hostname && s.alive.load(Ordering::SeqCst))
            .count()
    }

    async fn record_command(&self, hostname: &str, command: &str) {
        self.inner
            .lock()
            .await
            .commands
            .push((hostname.to_string(), command.to_string()));
    }
}

#[async_trait]
impl RemoteConnector for ScriptedConnector {
    async fn connect(&self, host: &HostDescriptor) -> Result<Arc<dyn RemoteSession>, RemoteError> {
        let script = {
            let mut inner = self.inner.lock().await;
            *inner.connects.entry(host.hostname.clone()).or_insert(0) += 1;
            inner.hosts.get(&host.hostname).cloned()
        };
        let Some(script) = script else {
            return Err(RemoteError::Connect(format!(
                "{}:{}: connection refused",
                host.hostname, host.port
            )));
        };

        if !script.connect_delay.is_zero() {
            tokio::time::sleep(script.connect_delay).await;
        }
        if let Some(err) = script.connect_error.clone() {
            return Err(err);
        }

        let session = Arc::new(ScriptedSession {
            id: self.next_session_id.fetch_add(1, Ordering::SeqCst),
            hostname: host.hostname.clone(),
            script,
            connector: self.clone(),
            alive: AtomicBool::new(true),
        });
        self.inner
            .lock()
            .await
            .sessions
            .push((host.hostname.clone(), session.clone()));
        Ok(session)
    }
}

#[derive(Debug)]
pub struct ScriptedSession {
    id: u64,
    hostname: String,
    script: ScriptedHost,
    connector: ScriptedConnector,
    alive: AtomicBool,
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    async fn exec(&self, command: &str) -> Result<String, RemoteError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(RemoteError::Closed);
        }
        self.connector.record_command(&self.hostname, command).await;

        if !self.script.exec_delay.is_zero() {
            tokio::time::sleep(self.script.exec_delay).await;
        }
        if let Some(err) = self.script.exec_error.clone() {
            return Err(err);
        }

        let stdout = self
            .script
            .replies
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        Ok(stdout)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str) -> HostDescriptor {
        HostDescriptor::new(name, 22, "monitor", "secret")
    }

    #[tokio::test]
    async fn test_unscripted_host_refuses() {
        let connector = ScriptedConnector::new();
        let err = connector.connect(&host("ghost")).await.err().unwrap();
        assert!(matches!(err, RemoteError::Connect(_)));
        assert_eq!(connector.connect_count("ghost").await, 1);
    }

    #[tokio::test]
    async fn test_reply_by_prefix() {
        let connector = ScriptedConnector::new();
        connector
            .set_host("gpu-01", ScriptedHost::new().reply("ps ", "123 alice\n"))
            .await;

        let session = connector.connect(&host("gpu-01")).await.unwrap();
        assert_eq!(session.exec("ps -o pid=,user= -p 123").await.unwrap(), "123 alice\n");
        assert_eq!(session.exec("uptime").await.unwrap(), "");
        assert_eq!(connector.commands("gpu-01").await.len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_session_is_dead() {
        let connector = ScriptedConnector::new();
        connector.set_host("gpu-01", ScriptedHost::new()).await;

        let session = connector.connect(&host("gpu-01")).await.unwrap();
        assert!(session.is_alive());
        connector.drop_sessions("gpu-01").await;
        assert!(!session.is_alive());
        assert_eq!(connector.live_sessions("gpu-01").await, 0);
        assert_eq!(session.exec("uptime").await, Err(RemoteError::Closed));
    }
}
