//! Folder-category resolution.
//!
//! Requests name a logical folder (`checkpoints`, `loras`, ...) rather than a
//! filesystem path. [`PathResolver`] maps that name to base directories; the
//! first one is where new downloads land.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Model categories registered by [`FolderPaths::with_default_categories`].
pub const DEFAULT_MODEL_CATEGORIES: &[&str] = &[
    "checkpoints",
    "loras",
    "vae",
    "controlnet",
    "embeddings",
    "upscale_models",
    "clip",
    "diffusers",
];

/// Maps a logical storage-folder name to absolute base directories.
pub trait PathResolver: Send + Sync {
    /// Returns the base directories for `folder`, preferred first.
    ///
    /// An empty result means the category is unknown.
    fn resolve(&self, folder: &str) -> Vec<PathBuf>;
}

/// Static category table.
#[derive(Debug, Clone, Default)]
pub struct FolderPaths {
    folders: BTreeMap<String, Vec<PathBuf>>,
}

impl FolderPaths {
    /// Creates an empty table; every lookup fails until folders are added.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every [`DEFAULT_MODEL_CATEGORIES`] entry as `<base>/models/<category>`.
    #[must_use]
    pub fn with_default_categories(base_dir: &Path) -> Self {
        let mut paths = Self::new();
        let models_dir = base_dir.join("models");
        for category in DEFAULT_MODEL_CATEGORIES {
            paths.add_folder_path(category, models_dir.join(category));
        }
        paths
    }

    /// Appends a base directory to `folder`, creating the category if needed.
    pub fn add_folder_path(&mut self, folder: &str, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(folder, path = %path.display(), "registering folder path");
        self.folders.entry(folder.to_string()).or_default().push(path);
    }
}

impl PathResolver for FolderPaths {
    fn resolve(&self, folder: &str) -> Vec<PathBuf> {
        self.folders.get(folder).cloned().unwrap_or_default()
    }
}

/// Resolves the default base directory.
///
/// Priority:
/// 1. `$COMFY_USER_DIR`
/// 2. `$HOME/.config/comfy-ui`
#[must_use]
pub fn default_base_dir() -> Option<PathBuf> {
    if let Some(dir) = env_var_non_empty_os("COMFY_USER_DIR") {
        return Some(PathBuf::from(dir));
    }
    let home = env_var_non_empty_os("HOME")?;
    Some(PathBuf::from(home).join(".config").join("comfy-ui"))
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Parses a `name=path` folder spec as used by `--extra-folder`.
///
/// # Errors
///
/// Returns a description of the problem when either side is empty or `=` is missing.
pub fn parse_folder_spec(spec: &str) -> Result<(String, PathBuf), String> {
    let Some((name, path)) = spec.split_once('=') else {
        return Err(format!("expected NAME=PATH, got '{spec}'"));
    };
    let name = name.trim();
    let path = path.trim();
    if name.is_empty() || path.is_empty() {
        return Err(format!("expected NAME=PATH, got '{spec}'"));
    }
    Ok((name.to_string(), PathBuf::from(path)))
}
