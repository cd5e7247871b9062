use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info};

use gpuwatch_common::HostDescriptor;
use gpuwatch_remote::{RemoteConnector, RemoteError, RemoteSession};

use crate::error::ConnectError;
use crate::metrics::MonitorMetrics;

/// At most one live session per hostname, reused across cycles.
///
/// The map lock covers lookup, insert and removal only. Connecting and
/// closing happen outside it so one slow host never stalls the others.
/// Once [`ConnectionPool::close_all`] has run the pool stays closed.
pub struct ConnectionPool {
    connector: Arc<dyn RemoteConnector>,
    connect_timeout: Duration,
    sessions: Mutex<HashMap<String, Arc<dyn RemoteSession>>>,
    /// Only flipped while `sessions` is locked.
    closed: AtomicBool,
    metrics: Arc<MonitorMetrics>,
}

impl ConnectionPool {
    pub fn new(
        connector: Arc<dyn RemoteConnector>,
        connect_timeout: Duration,
        metrics: Arc<MonitorMetrics>,
    ) -> Self {
        Self {
            connector,
            connect_timeout,
            sessions: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            metrics,
        }
    }

    /// Return the pooled session for `host`, opening a new one if there is none
    /// or the old transport is dead. Never retries.
    pub async fn acquire(&self, host: &HostDescriptor) -> Result<Arc<dyn RemoteSession>, ConnectError> {
        let stale = {
            let mut sessions = self.sessions.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(self.closed_error(host));
            }
            if let Some(session) = sessions.get(&host.hostname) {
                if session.is_alive() {
                    return Ok(session.clone());
                }
            }
            sessions.remove(&host.hostname)
        };
        if let Some(stale) = stale {
            debug!(hostname=%host.hostname, "pooled session is dead, reconnecting");
            close_in_background(stale);
        }

        let session = match tokio::time::timeout(self.connect_timeout, self.connector.connect(host)).await {
            Ok(Ok(session)) => session,
            Ok(Err(source)) => {
                return Err(ConnectError {
                    hostname: host.hostname.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(ConnectError {
                    hostname: host.hostname.clone(),
                    source: RemoteError::Timeout(self.connect_timeout.as_millis() as u64),
                })
            }
        };
        MonitorMetrics::incr(&self.metrics.connects_total);

        let raced = {
            let mut sessions = self.sessions.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                None
            } else {
                Some(sessions.insert(host.hostname.clone(), session.clone()))
            }
        };
        let Some(raced) = raced else {
            debug!(hostname=%host.hostname, "pool closed while connecting");
            session.close().await;
            return Err(self.closed_error(host));
        };
        if let Some(raced) = raced {
            close_in_background(raced);
        }
        info!(hostname=%host.hostname, port=host.port, "connected");
        Ok(session)
    }

    fn closed_error(&self, host: &HostDescriptor) -> ConnectError {
        ConnectError {
            hostname: host.hostname.clone(),
            source: RemoteError::Closed,
        }
    }

    /// Drop the session for `hostname` so the next acquire reconnects.
    /// Returns whether anything was pooled.
    pub async fn evict(&self, hostname: &str) -> bool {
        let evicted = self.sessions.lock().await.remove(hostname);
        match evicted {
            Some(session) => {
                MonitorMetrics::incr(&self.metrics.evictions_total);
                debug!(hostname, "evicted session");
                close_in_background(session);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    #[cfg(test)]
    pub(crate) async fn contains(&self, hostname: &str) -> bool {
        self.sessions.lock().await.contains_key(hostname)
    }

    /// Disconnect everything and refuse further sessions. Used on shutdown.
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut sessions = self.sessions.lock().await;
            self.closed.store(true, Ordering::SeqCst);
            sessions.drain().collect()
        };
        if drained.is_empty() {
            return;
        }
        info!(sessions = drained.len(), "closing pooled sessions");
        join_all(drained.iter().map(|(_, session)| session.close())).await;
    }
}

fn close_in_background(session: Arc<dyn RemoteSession>) {
    tokio::spawn(async move { session.close().await });
}
