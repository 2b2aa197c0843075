// In-memory snapshot store.
// Holds the current published snapshot; publishing swaps in a fully built replacement.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::info;

use super::snapshot::{Route, Snapshot};

/// Current-snapshot cell shared by the refresh loop (single writer) and request handlers.
#[derive(Debug)]
pub struct CacheStore {
    current: watch::Sender<Arc<Snapshot>>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        let (current, _) = watch::channel(Arc::new(Snapshot::empty()));
        Self { current }
    }

    /// Replace the current snapshot. Readiness never goes back to false.
    pub fn publish(&self, mut snapshot: Snapshot) -> Arc<Snapshot> {
        let was_ready = self.is_ready();
        snapshot.ready |= was_ready;

        let snapshot = Arc::new(snapshot);
        self.current.send_replace(Arc::clone(&snapshot));

        if snapshot.ready && !was_ready {
            info!(generation = snapshot.generation, "Ready to accept requests");
        }
        snapshot
    }

    /// The published snapshot. Holding it keeps that generation alive across later publishes.
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.current.borrow())
    }

    pub fn get(&self, route: Route) -> Option<Bytes> {
        self.current().body(route)
    }

    pub fn is_ready(&self) -> bool {
        self.current.borrow().ready
    }

    /// Receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.current.subscribe()
    }

    /// Wait until the first successful publish.
    pub async fn wait_ready(&self) -> Arc<Snapshot> {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        match rx.wait_for(|snapshot| snapshot.ready).await {
            Ok(snapshot) => Arc::clone(&*snapshot),
            Err(_) => self.current(),
        }
    }
}
