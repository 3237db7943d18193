//! Background transfer of one artifact: the download state machine.
//!
//! A download moves through `Preparing → Probing → Streaming → Finalizing`
//! and ends either `completed` or `error`. Failures in any phase land in the
//! same terminal state; only the message differs. Size discovery failures
//! are the exception: they are logged and the transfer continues with an
//! unknown size.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::{HttpClient, content_length, content_type};
use super::conflict::prepare_destination;
use super::constants::BYTES_PER_MIB;
use super::error::DownloadError;
use super::notifier::{ProgressNotifier, Throttle};
use super::progress::ProgressTracker;
use super::registry::DownloadRegistry;
use super::retention::RetentionManager;
use super::settings::DownloaderSettings;
use super::stream::ChunkReader;

/// Non-terminal phases of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Destination directory creation and conflict resolution.
    Preparing,
    /// URL validation and HEAD size discovery.
    Probing,
    /// GET and chunked body transfer.
    Streaming,
    /// Flushing and closing the destination file.
    Finalizing,
}

#[derive(Debug)]
struct TransferFailure {
    phase: Phase,
    error: DownloadError,
}

fn at(phase: Phase) -> impl FnOnce(DownloadError) -> TransferFailure {
    move |error| TransferFailure { phase, error }
}

/// Executes download tasks against the shared registry.
///
/// Each call to [`run`](Self::run) owns exactly one record and is the only
/// writer of it until the record turns terminal.
#[derive(Debug)]
pub struct Downloader {
    client: HttpClient,
    registry: Arc<DownloadRegistry>,
    notifier: ProgressNotifier,
    retention: Arc<RetentionManager>,
    chunk_size: usize,
    progress_interval: Duration,
}

impl Downloader {
    #[must_use]
    pub fn new(
        client: HttpClient,
        registry: Arc<DownloadRegistry>,
        notifier: ProgressNotifier,
        retention: Arc<RetentionManager>,
        settings: &DownloaderSettings,
    ) -> Self {
        Self {
            client,
            registry,
            notifier,
            retention,
            chunk_size: settings.chunk_size,
            progress_interval: settings.progress_interval,
        }
    }

    /// Runs the download for an already-registered record to a terminal state.
    ///
    /// Never returns an error: failures are written into the record, pushed
    /// to subscribers, and the record is handed to the retention purge.
    #[instrument(skip_all, fields(download_id = %download_id))]
    pub async fn run(&self, download_id: String, url: String, target: PathBuf) {
        info!(url = %url, path = %target.display(), "starting download task");

        if let Err(failure) = self.transfer(&download_id, &url, &target).await {
            warn!(phase = ?failure.phase, error = %failure.error, "download failed");
            let message = failure.error.to_string();
            self.registry.update(&download_id, |record| record.fail(message));
        }

        self.notifier.notify(&download_id).await;
        self.retention.schedule(&download_id);
    }

    async fn transfer(
        &self,
        download_id: &str,
        url: &str,
        target: &Path,
    ) -> Result<(), TransferFailure> {
        let path = prepare_destination(target)
            .await
            .map_err(at(Phase::Preparing))?;
        if path != target {
            self.adopt_renamed_path(download_id, &path);
        }

        Url::parse(url)
            .map_err(|_| DownloadError::invalid_url(url))
            .map_err(at(Phase::Probing))?;
        let probed_size = self.discover_size(download_id, url).await;

        let response = self
            .client
            .open_stream(url)
            .await
            .map_err(at(Phase::Streaming))?;
        let total_size = if probed_size > 0 {
            probed_size
        } else {
            self.adopt_response_size(download_id, &response)
        };
        info!(
            size_mb = format_args!("{:.2}", mib(total_size)),
            "starting transfer"
        );

        let file = File::create(&path)
            .await
            .map_err(|e| DownloadError::io(&path, e))
            .map_err(at(Phase::Streaming))?;
        let mut writer = BufWriter::new(file);
        let started = Instant::now();

        let streamed = self
            .stream_body(download_id, url, response, &mut writer, &path, total_size, started)
            .await;
        let outcome = match streamed {
            Ok(bytes) => writer
                .shutdown()
                .await
                .map(|()| bytes)
                .map_err(|e| DownloadError::io(&path, e))
                .map_err(at(Phase::Finalizing)),
            Err(error) => Err(at(Phase::Streaming)(error)),
        };
        drop(writer);

        let downloaded = match outcome {
            Ok(bytes) => bytes,
            Err(failure) => {
                debug!(path = %path.display(), "removing partial file after error");
                let _ = tokio::fs::remove_file(&path).await;
                return Err(failure);
            }
        };

        self.registry
            .update(download_id, |record| record.complete(downloaded));

        let elapsed = started.elapsed().as_secs_f64();
        let average = if elapsed > 0.0 {
            mib(downloaded) / elapsed
        } else {
            0.0
        };
        info!(
            size_mb = format_args!("{:.2}", mib(downloaded)),
            elapsed_secs = format_args!("{elapsed:.1}"),
            speed_mb_s = format_args!("{average:.2}"),
            path = %path.display(),
            "download completed"
        );
        Ok(())
    }

    /// HEAD request for the total size. Returns `0` when unknown.
    async fn discover_size(&self, download_id: &str, url: &str) -> u64 {
        match self.client.probe_size(url).await {
            Ok(probe) => {
                let Some(total_size) = probe.total_size else {
                    warn!("HEAD response had no content-length");
                    return 0;
                };
                info!(
                    total_size,
                    size_mb = format_args!("{:.2}", mib(total_size)),
                    "file size from HEAD"
                );
                self.registry.update(download_id, |record| {
                    record.total_size = total_size;
                    record.content_type = probe.content_type;
                });
                total_size
            }
            Err(e) => {
                warn!(error = %e, "HEAD request failed, size unknown until GET");
                0
            }
        }
    }

    /// Takes the size from the GET headers when HEAD did not provide it.
    fn adopt_response_size(&self, download_id: &str, response: &reqwest::Response) -> u64 {
        let Some(total_size) = content_length(response.headers()) else {
            return 0;
        };
        let content_type = content_type(response.headers());
        self.registry.update(download_id, |record| {
            record.total_size = total_size;
            record.content_type = content_type;
        });
        total_size
    }

    fn adopt_renamed_path(&self, download_id: &str, path: &Path) {
        let Some(new_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return;
        };
        self.registry.update(download_id, |record| {
            record.requested_filename = Path::new(&record.requested_filename)
                .with_file_name(&new_name)
                .to_string_lossy()
                .into_owned();
            record.resolved_path = path.to_path_buf();
        });
        info!(path = %path.display(), "updated download path");
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_body(
        &self,
        download_id: &str,
        url: &str,
        response: reqwest::Response,
        writer: &mut BufWriter<File>,
        path: &Path,
        total_size: u64,
        started: Instant,
    ) -> Result<u64, DownloadError> {
        let mut chunks = ChunkReader::new(response.bytes_stream(), self.chunk_size);
        let mut tracker = ProgressTracker::new(total_size, started);
        let mut throttle = Throttle::new(self.progress_interval);

        while let Some(chunk) = chunks
            .next_chunk()
            .await
            .map_err(|e| DownloadError::network(url, e))?
        {
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(path, e))?;

            let snapshot = tracker.record_chunk(chunk.len(), Instant::now());
            self.registry.update(download_id, |record| {
                record.downloaded_bytes = snapshot.downloaded;
                if let Some(percent) = snapshot.percent {
                    record.percent = percent;
                }
                if snapshot.speed.is_some() {
                    record.speed = snapshot.speed;
                }
                if snapshot.eta.is_some() {
                    record.eta = snapshot.eta;
                }
            });

            for &milestone in &snapshot.milestones {
                info!(
                    percent = milestone,
                    downloaded_mb = format_args!("{:.2}", mib(snapshot.downloaded)),
                    total_mb = format_args!("{:.2}", mib(total_size)),
                    speed_mb_s = snapshot.speed.unwrap_or(0.0),
                    eta = %format_eta(snapshot.eta),
                    "download progress"
                );
            }

            if throttle.ready(Instant::now()) {
                self.notifier.notify(download_id).await;
            }
        }

        Ok(tracker.downloaded())
    }
}

#[allow(clippy::cast_precision_loss)]
fn mib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MIB
}

fn format_eta(eta: Option<u64>) -> String {
    match eta {
        Some(secs) if secs > 0 => format!("{}m {}s", secs / 60, secs % 60),
        _ => "-".to_string(),
    }
}
