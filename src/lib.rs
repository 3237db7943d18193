//! Model Downloader Core Library
//!
//! Background download manager for large model artifacts. Callers submit a
//! request naming a source URL, a logical folder category and a filename;
//! the artifact is streamed to disk in the background while its progress is
//! tracked, pushed to subscribers, and kept queryable for a while after it
//! finishes.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`intake`] - Request decoding and validation
//! - [`service`] - Service lifetime, task spawning and queries
//! - [`download`] - Download state machine, registry, progress and retention
//! - [`paths`] - Folder-category to directory resolution
//! - [`push`] - Progress event channel
//! - [`api`] - HTTP and WebSocket routes

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod download;
pub mod intake;
pub mod paths;
pub mod push;
pub mod service;

// Re-export commonly used types
pub use api::{ApiState, RouteRegistrar, register_routes, router};
pub use download::{
    DownloadError, DownloadRecord, DownloadRegistry, DownloadStatus, DownloaderSettings,
    HttpClient, ProgressEvent,
};
pub use intake::{DownloadRequest, IntakeError, IntakeErrorKind, parse_request};
pub use paths::{FolderPaths, PathResolver};
pub use push::{BroadcastChannel, PushChannel, TransportError};
pub use service::{DownloadService, DownloadTicket};
