//! CLI argument definitions using clap derive macros.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use model_downloader_core::paths::parse_folder_spec;

/// Background download manager for model artifacts.
///
/// Serves an HTTP API that accepts download requests for a folder category,
/// streams each artifact to disk in the background and reports progress over
/// polling endpoints and a WebSocket.
#[derive(Parser, Debug)]
#[command(name = "model-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Address to listen on [default: 127.0.0.1:8188]
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Base directory holding models/<category> folders
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Config file (defaults to $XDG_CONFIG_HOME/model-downloader/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Extra folder category as NAME=PATH (repeatable)
    #[arg(long = "extra-folder", value_name = "NAME=PATH", value_parser = parse_folder_spec)]
    pub extra_folders: Vec<(String, PathBuf)>,
}
