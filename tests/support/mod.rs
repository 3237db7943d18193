//! Shared helpers for integration tests: push recording, downloader wiring
//! and mock artifact endpoints.

#![allow(dead_code)]

pub mod socket_guard;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use model_downloader_core::download::{
    DownloadRecord, DownloadRegistry, Downloader, DownloaderSettings, HttpClient, ProgressEvent,
    ProgressNotifier, RetentionManager,
};
use model_downloader_core::push::{PushChannel, TransportError};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const MIB: usize = 1024 * 1024;

/// Push channel that keeps every published event.
#[derive(Default)]
pub struct RecordingChannel {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingChannel {
    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().unwrap().clone()
    }

    /// Progress events for one download, in publish order.
    pub fn progress_for(&self, download_id: &str) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter_map(|(_, payload)| serde_json::from_value::<ProgressEvent>(payload).ok())
            .filter(|event| event.download_id == download_id)
            .collect()
    }
}

#[async_trait]
impl PushChannel for RecordingChannel {
    async fn publish(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        self.events
            .lock()
            .unwrap()
            .push((event.to_string(), payload));
        Ok(())
    }
}

/// A downloader wired to its own registry and recording channel.
pub struct Harness {
    pub registry: Arc<DownloadRegistry>,
    pub retention: Arc<RetentionManager>,
    pub channel: Arc<RecordingChannel>,
    pub downloader: Downloader,
}

impl Harness {
    /// Every chunk notifies; records are kept for a minute.
    pub fn new() -> Self {
        Self::with_settings(DownloaderSettings {
            progress_interval: Duration::ZERO,
            ..DownloaderSettings::default()
        })
    }

    pub fn with_settings(settings: DownloaderSettings) -> Self {
        let registry = Arc::new(DownloadRegistry::new());
        let channel = Arc::new(RecordingChannel::default());
        let notifier = ProgressNotifier::new(Arc::clone(&registry), channel.clone());
        let retention = Arc::new(RetentionManager::new(
            Arc::clone(&registry),
            settings.retention_window,
        ));
        let client = HttpClient::with_timeouts(settings.connect_timeout, settings.read_timeout)
            .expect("client builds");
        let downloader = Downloader::new(
            client,
            Arc::clone(&registry),
            notifier,
            Arc::clone(&retention),
            &settings,
        );
        Self {
            registry,
            retention,
            channel,
            downloader,
        }
    }

    /// Registers a record and runs its download to completion.
    pub async fn download(&self, id: &str, url: &str, dir: &Path, filename: &str) -> DownloadRecord {
        let target = dir.join(filename);
        self.registry.insert(DownloadRecord::new(
            id,
            url,
            "checkpoints",
            filename,
            target.clone(),
        ));
        self.downloader
            .run(id.to_string(), url.to_string(), target)
            .await;
        self.registry.get(id).expect("record retained after finishing")
    }
}

/// Serves `body` for GET at `route`, and a matching HEAD.
pub async fn mount_artifact(server: &MockServer, route: &str, body: Vec<u8>) {
    let len = body.len().to_string();
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).insert_header("content-length", len.as_str()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/octet-stream")
                .set_body_bytes(body),
        )
        .mount(server)
        .await;
}

/// Serves every GET with `content-length: declared` but closes the connection
/// after writing only `sent` bytes. HEAD requests get a 404.
pub async fn spawn_truncating_server(declared: usize, sent: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_truncated(stream, declared, sent));
        }
    });
    addr
}

async fn serve_truncated(mut stream: TcpStream, declared: usize, sent: usize) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    if head.starts_with(b"HEAD") {
        let _ = stream
            .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await;
    } else {
        let header = format!("HTTP/1.1 200 OK\r\ncontent-length: {declared}\r\n\r\n");
        let _ = stream.write_all(header.as_bytes()).await;
        let _ = stream.write_all(&vec![0xA5u8; sent]).await;
    }
    let _ = stream.shutdown().await;
}
