//! Server entry point for the model downloader.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use model_downloader_core::download::DownloaderSettings;
use model_downloader_core::paths::default_base_dir;
use model_downloader_core::{BroadcastChannel, DownloadService, FolderPaths, router};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::FileConfig;
use cli::Args;

const DEFAULT_LISTEN: &str = "127.0.0.1:8188";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let file_config = app_config::load_config(args.config.as_deref())?.unwrap_or_default();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity > info
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => file_config.verbosity.map_or("info", |v| v.filter()),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, ?file_config, "configuration loaded");

    let base_dir = args
        .base_dir
        .clone()
        .or_else(|| file_config.base_dir.clone())
        .or_else(default_base_dir)
        .context("Could not determine a base directory; pass --base-dir")?;

    let mut folders = FolderPaths::with_default_categories(&base_dir);
    for (name, path) in file_config.extra_folders.iter().chain(&args.extra_folders) {
        folders.add_folder_path(name, path);
    }

    let settings = settings_from(&file_config);
    let push = BroadcastChannel::default();
    let service = Arc::new(
        DownloadService::new(Arc::new(folders), Arc::new(push.clone()), &settings)
            .context("Failed to create HTTP client")?,
    );

    let listen = resolve_listen(args.listen, &file_config)?;
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;
    info!(
        addr = %listen,
        base_dir = %base_dir.display(),
        "Model downloader listening"
    );

    axum::serve(listener, router(Arc::clone(&service), push))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!(
        active = service.active_downloads(),
        "Shutting down, waiting for downloads"
    );
    service.shutdown().await;
    Ok(())
}

fn settings_from(config: &FileConfig) -> DownloaderSettings {
    let mut settings = DownloaderSettings::default();
    if let Some(secs) = config.connect_timeout_secs {
        settings.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = config.read_timeout_secs {
        settings.read_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = config.retention_secs {
        settings.retention_window = Duration::from_secs(secs);
    }
    if let Some(ms) = config.progress_interval_ms {
        settings.progress_interval = Duration::from_millis(ms);
    }
    settings
}

fn resolve_listen(cli: Option<SocketAddr>, config: &FileConfig) -> Result<SocketAddr> {
    match cli.or(config.listen) {
        Some(addr) => Ok(addr),
        None => DEFAULT_LISTEN
            .parse()
            .with_context(|| format!("Invalid default listen address {DEFAULT_LISTEN}")),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
