//! Constants for the download module (timeouts, chunking, throttling, retention).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout between received bytes (30 seconds).
///
/// There is deliberately no overall request timeout: model artifacts can take
/// hours to transfer.
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Fixed size of the chunks the streaming loop accounts for (1 MiB).
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Minimum interval between push notifications for one download.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// How long a finished record stays queryable before it is purged.
pub const RETENTION_WINDOW: Duration = Duration::from_secs(60);

/// Event name used on the push channel for progress updates.
pub const PROGRESS_EVENT: &str = "model_download_progress";

/// Bytes per mebibyte, used for MB/s and log formatting.
pub(crate) const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;
