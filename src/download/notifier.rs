//! Progress notifications derived from registry state.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use super::constants::PROGRESS_EVENT;
use super::record::{DownloadStatus, ProgressEvent};
use super::registry::DownloadRegistry;
use crate::push::PushChannel;

/// Minimum-interval gate for an expensive side effect.
///
/// The first call always passes; later calls pass once `interval` has
/// elapsed since the last one that passed.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_fired: Option<Instant>,
}

impl Throttle {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    /// Returns true (and arms the gate) if the side effect may fire at `now`.
    pub fn ready(&mut self, now: Instant) -> bool {
        let due = self
            .last_fired
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last_fired = Some(now);
        }
        due
    }
}

/// Publishes one progress event per call, reading the current record.
///
/// Throttling is the caller's concern (see [`Throttle`]); terminal updates are
/// sent unconditionally by the download task.
#[derive(Clone)]
pub struct ProgressNotifier {
    registry: Arc<DownloadRegistry>,
    channel: Arc<dyn PushChannel>,
}

impl std::fmt::Debug for ProgressNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressNotifier").finish_non_exhaustive()
    }
}

impl ProgressNotifier {
    #[must_use]
    pub fn new(registry: Arc<DownloadRegistry>, channel: Arc<dyn PushChannel>) -> Self {
        Self { registry, channel }
    }

    /// Emits the current state of `download_id`.
    ///
    /// No-op if the record has already been purged. Transport failures are
    /// logged and swallowed so they never affect the transfer.
    pub async fn notify(&self, download_id: &str) {
        let Some(record) = self.registry.get(download_id) else {
            return;
        };

        match record.status {
            DownloadStatus::Completed => {
                info!(download_id, filename = %record.requested_filename, "Download complete");
            }
            DownloadStatus::Error => {
                info!(
                    download_id,
                    error = record.error_message.as_deref().unwrap_or_default(),
                    "Download error"
                );
            }
            DownloadStatus::Downloading => {}
        }

        let payload = match serde_json::to_value(ProgressEvent::from(&record)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(download_id, error = %e, "failed to serialize progress event");
                return;
            }
        };

        if let Err(e) = self.channel.publish(PROGRESS_EVENT, payload).await {
            warn!(download_id, error = %e, "push notification failed");
        }
    }
}
