//! Background transfer of model artifacts into local folders.
//!
//! This module owns the per-download state machine, the shared registry of
//! download records, progress accounting and push notification, and the
//! delayed purge of finished records.
//!
//! # Features
//!
//! - Streaming downloads in fixed-size chunks (memory-bounded for large files)
//! - Size discovery by HEAD, falling back to the GET headers
//! - Timestamp renaming when the destination already exists
//! - Throttled progress events with speed and ETA
//! - Finished records stay queryable for a retention window
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use model_downloader_core::download::{
//!     Downloader, DownloaderSettings, DownloadRecord, DownloadRegistry, HttpClient,
//!     ProgressNotifier, RetentionManager,
//! };
//! use model_downloader_core::push::BroadcastChannel;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = DownloaderSettings::default();
//! let registry = Arc::new(DownloadRegistry::new());
//! let notifier = ProgressNotifier::new(Arc::clone(&registry), Arc::new(BroadcastChannel::new(16)));
//! let retention = Arc::new(RetentionManager::new(Arc::clone(&registry), Duration::from_secs(60)));
//! let downloader = Downloader::new(HttpClient::new()?, Arc::clone(&registry), notifier, retention, &settings);
//!
//! let target = std::path::PathBuf::from("/tmp/models/checkpoints/model.safetensors");
//! registry.insert(DownloadRecord::new("id-1", "https://example.com/model.safetensors", "checkpoints", "model.safetensors", target.clone()));
//! downloader.run("id-1".to_string(), "https://example.com/model.safetensors".to_string(), target).await;
//! println!("{:?}", registry.get("id-1").map(|r| r.status));
//! # Ok(())
//! # }
//! ```

mod client;
mod conflict;
mod constants;
mod downloader;
mod error;
mod notifier;
mod progress;
mod record;
mod registry;
mod retention;
mod settings;
mod stream;

pub use client::{HttpClient, SizeProbe, content_length, content_type};
pub use conflict::prepare_destination;
pub use constants::{
    CHUNK_SIZE, CONNECT_TIMEOUT_SECS, PROGRESS_EVENT, PROGRESS_INTERVAL, READ_TIMEOUT_SECS,
    RETENTION_WINDOW,
};
pub use downloader::{Downloader, Phase};
pub use error::DownloadError;
pub use notifier::{ProgressNotifier, Throttle};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use record::{DownloadRecord, DownloadStatus, ProgressEvent};
pub use registry::DownloadRegistry;
pub use retention::RetentionManager;
pub use settings::DownloaderSettings;
pub use stream::ChunkReader;

pub(crate) use record::unix_now;

// Note: no module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
