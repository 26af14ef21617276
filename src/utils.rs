//! Utility functions for file operations and path manipulation

use crate::error::{ExtractError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Get a collision-free path for `path`
///
/// Returns `path` unchanged when nothing exists there. Otherwise a numeric
/// disambiguator ` (n)` is inserted before the extension, starting at 1. A name that
/// already carries a disambiguator is decomposed to its base first, so
/// `X (3)` yields `X (1)` rather than `X (3) (1)`. Directories never have their
/// name split at a dot.
///
/// # Examples
///
/// ```
/// use nested_unpack::utils::get_unique_path;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/nested-unpack-doc-missing/movie.mkv");
/// assert_eq!(get_unique_path(path).unwrap(), path);
/// ```
pub fn get_unique_path(path: &Path) -> Result<PathBuf> {
    if !exists(path) {
        return Ok(path.to_path_buf());
    }

    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        ExtractError::InvalidPath {
            path: path.to_path_buf(),
            reason: "cannot extract file name".to_string(),
        }
    })?;
    let parent = path.parent().ok_or_else(|| ExtractError::InvalidPath {
        path: path.to_path_buf(),
        reason: "cannot extract parent directory".to_string(),
    })?;

    let (stem, extension) = if path.is_dir() {
        (name, None)
    } else {
        split_extension(name)
    };
    let base = strip_disambiguator(stem);

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = match extension {
            Some(ext) => format!("{} ({}).{}", base, i, ext),
            None => format!("{} ({})", base, i),
        };
        let candidate = parent.join(candidate);
        if !exists(&candidate) {
            return Ok(candidate);
        }
    }

    Err(ExtractError::FileCollision {
        path: path.to_path_buf(),
        reason: format!(
            "could not find unique name after {} attempts",
            MAX_RENAME_ATTEMPTS
        ),
    }
    .into())
}

/// Split `name` at its last dot; a leading dot is part of the stem
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => (&name[..pos], Some(&name[pos + 1..])),
        _ => (name, None),
    }
}

/// Remove a trailing ` (n)` disambiguator, if any
pub fn strip_disambiguator(stem: &str) -> &str {
    if let Some(open) = stem.rfind(" (")
        && stem.ends_with(')')
    {
        let digits = &stem[open + 2..stem.len() - 1];
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) && open > 0 {
            return &stem[..open];
        }
    }
    stem
}

/// `exists()` that also reports dangling symlinks as taken
fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Compare two paths after canonicalization
///
/// Falls back to a lexical comparison when either side cannot be canonicalized
/// (for example because it does not exist yet).
pub fn paths_equal(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => {
            if cfg!(windows) {
                a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
            } else {
                a.components().eq(b.components())
            }
        }
    }
}

/// Size of a file, or the total size of all files below a directory
///
/// Unreadable entries count as zero; symlinks are not followed.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Remove every empty directory below and including `root`, deepest first
///
/// Returns the number of directories removed. Failures are logged and skipped.
pub fn prune_empty_dirs(root: &Path) -> usize {
    if !root.is_dir() {
        return 0;
    }

    let mut removed = 0;
    for entry in WalkDir::new(root)
        .follow_links(false)
        .contents_first(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let is_empty = std::fs::read_dir(entry.path())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty {
            continue;
        }
        match std::fs::remove_dir(entry.path()) {
            Ok(()) => {
                debug!(path = ?entry.path(), "removed empty directory");
                removed += 1;
            }
            Err(e) => {
                warn!(path = ?entry.path(), error = %e, "failed to remove empty directory");
            }
        }
    }
    removed
}

/// Move a file or directory to `dest`, never overwriting
///
/// Parent directories of `dest` are created as needed. When a plain rename is
/// impossible because source and destination live on different file systems, the
/// tree is copied and the source removed afterwards.
pub fn move_path(source: &Path, dest: &Path) -> Result<()> {
    let move_failed = |reason: String| ExtractError::MoveFailed {
        source_path: source.to_path_buf(),
        dest_path: dest.to_path_buf(),
        reason,
    };

    if exists(dest) {
        return Err(ExtractError::FileCollision {
            path: dest.to_path_buf(),
            reason: "destination already exists".to_string(),
        }
        .into());
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| move_failed(format!("failed to create parent: {}", e)))?;
    }

    match std::fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            debug!(?source, ?dest, "rename crosses devices, copying instead");
            copy_tree(source, dest).map_err(|e| move_failed(format!("copy failed: {}", e)))?;
            let removal = if source.is_dir() {
                std::fs::remove_dir_all(source)
            } else {
                std::fs::remove_file(source)
            };
            removal.map_err(|e| move_failed(format!("copied but source not removed: {}", e)))?;
            Ok(())
        }
        Err(e) => Err(move_failed(e.to_string()).into()),
    }
}

fn copy_tree(source: &Path, dest: &Path) -> std::io::Result<()> {
    if !source.is_dir() {
        std::fs::copy(source, dest)?;
        return Ok(());
    }
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(std::io::Error::other)?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Move `source` into `root` under `name`, picking a unique name on collision
///
/// Returns the final location.
pub fn relocate_into(source: &Path, root: &Path, name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    let dest = get_unique_path(&root.join(name))?;
    move_path(source, &dest)?;
    Ok(dest)
}
