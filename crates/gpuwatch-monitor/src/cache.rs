use std::sync::Arc;

use tokio::sync::RwLock;

use gpuwatch_common::Snapshot;

/// Latest published snapshot. Readers clone an `Arc` and never wait on
/// collection.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in `snapshot`. A snapshot older than the current one is refused
    /// and `false` returned.
    pub async fn replace(&self, snapshot: Snapshot) -> bool {
        let mut current = self.current.write().await;
        if snapshot.cycle < current.cycle {
            tracing::warn!(
                current = current.cycle,
                rejected = snapshot.cycle,
                "refusing stale snapshot"
            );
            return false;
        }
        *current = Arc::new(snapshot);
        true
    }

    pub async fn read(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    pub async fn cycle(&self) -> u64 {
        self.current.read().await.cycle
    }
}
