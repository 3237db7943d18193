//! Destination preparation: parent directory creation and filename
//! disambiguation when the target is already taken.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use super::error::DownloadError;

/// Upper bound on numeric suffixes tried after a timestamp collision.
const MAX_SUFFIX_ATTEMPTS: u32 = 1000;

/// Ensures the destination directory exists and returns a free path.
///
/// If `target` does not exist it is returned unchanged. Otherwise the current
/// unix timestamp is inserted before the extension (`model.bin` becomes
/// `model_1700000000.bin`); a numeric suffix follows if that name is taken too.
///
/// The existence check and the later file creation are not atomic; a
/// concurrent external writer can still race us.
///
/// # Errors
///
/// Returns [`DownloadError::CreateDir`] if the parent directory cannot be created.
pub async fn prepare_destination(target: &Path) -> Result<PathBuf, DownloadError> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty())
        && !path_exists(parent).await
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::create_dir(parent, e))?;
        info!(directory = %parent.display(), "created destination directory");
    }

    if !path_exists(target).await {
        return Ok(target.to_path_buf());
    }

    warn!(path = %target.display(), "file already exists, adding timestamp");
    Ok(disambiguate(target, unix_seconds()).await)
}

async fn disambiguate(target: &Path, timestamp: u64) -> PathBuf {
    let (stem, ext) = split_file_name(target);
    let dir = target.parent().unwrap_or_else(|| Path::new(""));

    let candidate = dir.join(format!("{stem}_{timestamp}{ext}"));
    if !path_exists(&candidate).await {
        return candidate;
    }

    for i in 2..MAX_SUFFIX_ATTEMPTS {
        let candidate = dir.join(format!("{stem}_{timestamp}_{i}{ext}"));
        if !path_exists(&candidate).await {
            return candidate;
        }
    }

    // Exhausted suffixes; let the open() call overwrite the last candidate.
    dir.join(format!("{stem}_{timestamp}_{MAX_SUFFIX_ATTEMPTS}{ext}"))
}

/// Splits a path's file name into stem and extension (with leading dot).
fn split_file_name(path: &Path) -> (String, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rfind('.') {
        Some(pos) if pos > 0 => (name[..pos].to_string(), name[pos..].to_string()),
        _ => (name, String::new()),
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
