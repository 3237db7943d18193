//! The download service: intake, background tasks and queries.
//!
//! [`DownloadService`] is constructed explicitly with its collaborators and
//! owns the registry. Hosts call [`submit`](DownloadService::submit) for new
//! requests and read records back through [`progress`](DownloadService::progress)
//! and [`list`](DownloadService::list).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::download::{
    DownloadRecord, DownloadRegistry, Downloader, DownloaderSettings, HttpClient, ProgressNotifier,
    RetentionManager, unix_now,
};
use crate::intake::{DownloadRequest, IntakeError, ValidatedRequest};
use crate::paths::PathResolver;
use crate::push::PushChannel;

/// Status word returned in the intake acknowledgement.
///
/// Only acknowledgement text: records start in `downloading`.
pub const QUEUED_STATUS: &str = "queued";

/// Message returned in the intake acknowledgement.
pub const QUEUED_MESSAGE: &str = "Download has been queued and will start automatically";

/// Acknowledgement for an accepted download request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadTicket {
    pub download_id: String,
    pub status: &'static str,
    pub message: &'static str,
}

/// Accepts download requests and runs each one as a background task.
///
/// Every accepted request gets a record in the registry before its task is
/// spawned, so the returned id is immediately queryable.
pub struct DownloadService {
    registry: Arc<DownloadRegistry>,
    resolver: Arc<dyn PathResolver>,
    downloader: Arc<Downloader>,
    retention: Arc<RetentionManager>,
    tasks: DashMap<String, JoinHandle<()>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for DownloadService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadService")
            .field("records", &self.registry.len())
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl DownloadService {
    /// Creates a service with an HTTP client built from `settings`.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the HTTP client cannot be created.
    pub fn new(
        resolver: Arc<dyn PathResolver>,
        channel: Arc<dyn PushChannel>,
        settings: &DownloaderSettings,
    ) -> Result<Self, reqwest::Error> {
        let client = HttpClient::with_timeouts(settings.connect_timeout, settings.read_timeout)?;
        Ok(Self::with_client(resolver, channel, client, settings))
    }

    /// Creates a service around an existing HTTP client.
    #[must_use]
    pub fn with_client(
        resolver: Arc<dyn PathResolver>,
        channel: Arc<dyn PushChannel>,
        client: HttpClient,
        settings: &DownloaderSettings,
    ) -> Self {
        let registry = Arc::new(DownloadRegistry::new());
        let notifier = ProgressNotifier::new(Arc::clone(&registry), channel);
        let retention = Arc::new(RetentionManager::new(
            Arc::clone(&registry),
            settings.retention_window,
        ));
        let downloader = Downloader::new(
            client,
            Arc::clone(&registry),
            notifier,
            Arc::clone(&retention),
            settings,
        );
        debug!(?settings, "creating download service");

        Self {
            registry,
            resolver,
            downloader: Arc::new(downloader),
            retention,
            tasks: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Shared registry of download records.
    #[must_use]
    pub fn registry(&self) -> &Arc<DownloadRegistry> {
        &self.registry
    }

    /// Validates a request, registers its record and starts the download.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError`] when a field is missing or unsafe, or the
    /// folder is unknown. No record is created in that case.
    #[instrument(skip(self, request))]
    pub fn submit(&self, request: DownloadRequest) -> Result<DownloadTicket, IntakeError> {
        let ValidatedRequest {
            url,
            folder,
            filename,
        } = request.validate()?;
        info!(folder = %folder, filename = %filename, "received download request");

        let target = self.resolve_target(&folder, &filename)?;
        let download_id = self.next_id(&folder, &filename);

        self.registry.insert(DownloadRecord::new(
            download_id.clone(),
            url.clone(),
            folder,
            filename,
            target.clone(),
        ));

        let downloader = Arc::clone(&self.downloader);
        let task_id = download_id.clone();
        let handle = tokio::spawn(async move {
            downloader.run(task_id, url, target).await;
        });
        self.tasks.retain(|_, handle| !handle.is_finished());
        self.tasks.insert(download_id.clone(), handle);
        info!(download_id = %download_id, "download queued");

        Ok(DownloadTicket {
            download_id,
            status: QUEUED_STATUS,
            message: QUEUED_MESSAGE,
        })
    }

    fn resolve_target(&self, folder: &str, filename: &str) -> Result<PathBuf, IntakeError> {
        let Some(base) = self.resolver.resolve(folder).into_iter().next() else {
            warn!(folder, "unknown folder category");
            return Err(IntakeError::UnknownFolder {
                folder: folder.to_string(),
            });
        };
        Ok(base.join(filename))
    }

    /// `{folder}_{filename}_{unix_secs}_{seq}`; the sequence keeps ids
    /// unique for identical requests within the same second. Path
    /// separators in nested filenames become `_` so the id stays a single
    /// URL path segment.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn next_id(&self, folder: &str, filename: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let secs = unix_now() as u64;
        let filename = filename.replace(['/', '\\'], "_");
        format!("{folder}_{filename}_{secs}_{seq}")
    }

    /// Snapshot of one record, or `None` once purged or never created.
    #[must_use]
    pub fn progress(&self, download_id: &str) -> Option<DownloadRecord> {
        self.registry.get(download_id)
    }

    /// Snapshot of every record keyed by id.
    #[must_use]
    pub fn list(&self) -> BTreeMap<String, DownloadRecord> {
        self.registry.snapshot()
    }

    /// Number of download tasks that have not finished yet.
    #[must_use]
    pub fn active_downloads(&self) -> usize {
        self.tasks
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .count()
    }

    /// Waits for the task of one download to finish.
    ///
    /// Returns `false` if no task is tracked for `download_id`.
    pub async fn wait_for(&self, download_id: &str) -> bool {
        let Some((_, handle)) = self.tasks.remove(download_id) else {
            return false;
        };
        if let Err(e) = handle.await {
            warn!(download_id, error = %e, "download task panicked");
        }
        true
    }

    /// Waits for every in-flight download to finish.
    pub async fn drain(&self) {
        let ids: Vec<String> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        debug!(task_count = ids.len(), "waiting for downloads to complete");
        for id in ids {
            self.wait_for(&id).await;
        }
    }

    /// Drains downloads, then aborts pending record purges.
    pub async fn shutdown(&self) {
        self.drain().await;
        self.retention.shutdown();
        info!(records = self.registry.len(), "download service stopped");
    }
}
