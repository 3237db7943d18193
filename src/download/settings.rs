//! Tunables for the download service.

use std::time::Duration;

use super::constants::{
    CHUNK_SIZE, CONNECT_TIMEOUT_SECS, PROGRESS_INTERVAL, READ_TIMEOUT_SECS, RETENTION_WINDOW,
};

/// Runtime settings shared by every download task of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderSettings {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Maximum wait between received bytes.
    pub read_timeout: Duration,
    /// Accounting chunk size in bytes.
    pub chunk_size: usize,
    /// Minimum interval between push notifications per download.
    pub progress_interval: Duration,
    /// Grace period before a finished record is purged.
    pub retention_window: Duration,
}

impl Default for DownloaderSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            chunk_size: CHUNK_SIZE,
            progress_interval: PROGRESS_INTERVAL,
            retention_window: RETENTION_WINDOW,
        }
    }
}
