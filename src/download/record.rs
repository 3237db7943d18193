//! Download record and status definitions.

use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Status of a download record.
///
/// The intake acknowledgement says `"queued"`, but that word is only the
/// response text; a record is created directly in [`Downloading`](Self::Downloading).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Transfer in progress (includes size discovery).
    Downloading,
    /// Artifact fully written to disk.
    Completed,
    /// Preparation, network or IO failure.
    Error,
}

impl DownloadStatus {
    /// Returns the wire string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Returns true for `completed` and `error`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress and state of one requested download.
///
/// Field names on the wire follow the progress JSON the frontend polls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Unique identifier generated at intake.
    #[serde(rename = "download_id")]
    pub id: String,
    /// Source URL of the artifact.
    #[serde(rename = "url")]
    pub source_url: String,
    /// Logical storage folder the artifact belongs to.
    #[serde(rename = "folder")]
    pub folder_category: String,
    /// Requested filename, rewritten when the destination was already taken.
    #[serde(rename = "filename")]
    pub requested_filename: String,
    /// Absolute destination path.
    #[serde(rename = "path")]
    pub resolved_path: PathBuf,
    /// Declared size in bytes; `0` when unknown.
    pub total_size: u64,
    /// Bytes written so far.
    #[serde(rename = "downloaded")]
    pub downloaded_bytes: u64,
    /// Integer percentage, only meaningful when `total_size > 0`.
    pub percent: u8,
    pub status: DownloadStatus,
    /// Failure message, present only in the `error` state.
    #[serde(rename = "error")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Average throughput in MB/s.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Estimated seconds remaining.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<u64>,
    /// Unix seconds at intake.
    pub start_time: f64,
    /// Unix seconds of the terminal transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
}

impl DownloadRecord {
    /// Creates a fresh record in the `downloading` state.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source_url: impl Into<String>,
        folder_category: impl Into<String>,
        requested_filename: impl Into<String>,
        resolved_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
            folder_category: folder_category.into(),
            requested_filename: requested_filename.into(),
            resolved_path: resolved_path.into(),
            total_size: 0,
            downloaded_bytes: 0,
            percent: 0,
            status: DownloadStatus::Downloading,
            error_message: None,
            content_type: None,
            speed: None,
            eta: None,
            start_time: unix_now(),
            end_time: None,
        }
    }

    /// Marks the record completed.
    pub fn complete(&mut self, downloaded_bytes: u64) {
        self.status = DownloadStatus::Completed;
        self.downloaded_bytes = downloaded_bytes;
        if self.total_size > 0 {
            self.percent = 100;
        }
        self.end_time = Some(unix_now());
    }

    /// Marks the record failed with a message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = DownloadStatus::Error;
        self.error_message = Some(message.into());
        self.end_time = Some(unix_now());
    }
}

/// Payload pushed to subscribers on every progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub download_id: String,
    pub status: DownloadStatus,
    pub percent: u8,
    pub downloaded: u64,
    pub total_size: u64,
    /// MB/s, `0` until measured.
    pub speed: f64,
    /// Seconds, `0` until measured.
    pub eta: u64,
    pub error: Option<String>,
}

impl From<&DownloadRecord> for ProgressEvent {
    fn from(record: &DownloadRecord) -> Self {
        Self {
            download_id: record.id.clone(),
            status: record.status,
            percent: record.percent,
            downloaded: record.downloaded_bytes,
            total_size: record.total_size,
            speed: record.speed.unwrap_or(0.0),
            eta: record.eta.unwrap_or(0),
            error: record.error_message.clone(),
        }
    }
}

/// Current wall-clock time as fractional unix seconds.
pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}
