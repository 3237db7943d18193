//! Delayed purge of finished download records.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::debug;

use super::registry::DownloadRegistry;

/// Removes terminal records from the registry after a grace window.
///
/// The window gives pollers time to observe the final state. Purge tasks are
/// tracked so they can be aborted when the owning service shuts down.
#[derive(Debug)]
pub struct RetentionManager {
    registry: Arc<DownloadRegistry>,
    window: Duration,
    pending: DashMap<String, JoinHandle<()>>,
}

impl RetentionManager {
    #[must_use]
    pub fn new(registry: Arc<DownloadRegistry>, window: Duration) -> Self {
        Self {
            registry,
            window,
            pending: DashMap::new(),
        }
    }

    /// Schedules removal of `download_id` once the window has elapsed.
    ///
    /// Only a record that is terminal at purge time is removed.
    pub fn schedule(&self, download_id: &str) {
        self.pending.retain(|_, handle| !handle.is_finished());

        let registry = Arc::clone(&self.registry);
        let window = self.window;
        let id = download_id.to_string();
        debug!(download_id, window_secs = window.as_secs_f64(), "scheduling record purge");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if registry.remove_terminal(&id) {
                debug!(download_id = %id, "purged finished download record");
            }
        });
        if let Some(previous) = self.pending.insert(download_id.to_string(), handle) {
            previous.abort();
        }
    }

    /// Number of purges that have not run yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .count()
    }

    /// Aborts every scheduled purge.
    pub fn shutdown(&self) {
        for entry in &self.pending {
            entry.value().abort();
        }
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::DownloadRecord;

    fn finished_registry(id: &str) -> Arc<DownloadRegistry> {
        let registry = Arc::new(DownloadRegistry::new());
        registry.insert(DownloadRecord::new(id, "http://x", "vae", "v.bin", "/tmp/v.bin"));
        registry.update(id, |r| r.complete(1));
        registry
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_survives_until_window_elapses() {
        let registry = finished_registry("a");
        let retention = RetentionManager::new(Arc::clone(&registry), Duration::from_secs(60));

        retention.schedule("a");
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(registry.contains("a"));
        assert_eq!(retention.pending(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!registry.contains("a"));
        assert_eq!(retention.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_record_is_not_purged() {
        let registry = Arc::new(DownloadRegistry::new());
        registry.insert(DownloadRecord::new("a", "http://x", "vae", "v.bin", "/tmp/v.bin"));
        let retention = RetentionManager::new(Arc::clone(&registry), Duration::from_secs(1));

        retention.schedule("a");
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(registry.contains("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_pending_purges() {
        let registry = finished_registry("a");
        let retention = RetentionManager::new(Arc::clone(&registry), Duration::from_secs(60));

        retention.schedule("a");
        retention.shutdown();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(registry.contains("a"));
        assert_eq!(retention.pending(), 0);
    }
}
