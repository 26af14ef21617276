//! Redundant nesting removal
//!
//! Archives commonly wrap their content in a folder named after the archive, so a
//! result extracted into `Movie/` often ends up as `Movie/Movie/…`. The normalizer
//! walks a result top-down and lifts a lone child into its parent's place when the
//! two names are redundant under the configured [`RedundancyRule`].

use crate::config::{NormalizeConfig, RedundancyRule};
use crate::error::{ExtractError, Result};
use crate::utils::{get_unique_path, move_path, paths_equal, strip_disambiguator};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Collapses single-child nesting below a result directory
#[derive(Clone, Debug)]
pub struct DirectoryNormalizer {
    max_depth: u32,
    rule: RedundancyRule,
    rename_on_collision: bool,
}

impl DirectoryNormalizer {
    /// Create a normalizer from configuration
    pub fn new(config: &NormalizeConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            rule: config.rule,
            rename_on_collision: config.rename_on_collision,
        }
    }

    /// Normalize `path` and return where its content lives afterwards
    ///
    /// Returns `None` when the directory was empty and has been removed. A file is
    /// returned unchanged. Nothing is ever overwritten: an empty destination
    /// directory is replaced, any other occupied destination stops the merge at that
    /// level with a warning.
    pub fn normalize(&self, path: &Path) -> Result<Option<PathBuf>> {
        self.normalize_level(path, self.max_depth)
    }

    fn normalize_level(&self, dir: &Path, budget: u32) -> Result<Option<PathBuf>> {
        if !dir.is_dir() {
            return Ok(Some(dir.to_path_buf()));
        }

        let mut entries = list_dir(dir)?;
        if entries.is_empty() {
            std::fs::remove_dir(dir)?;
            debug!(?dir, "removed empty directory");
            return Ok(None);
        }
        if budget == 0 {
            return Ok(Some(dir.to_path_buf()));
        }

        if entries.len() > 1 {
            for child in entries {
                if child.is_dir() {
                    self.normalize_level(&child, budget - 1)?;
                }
            }
            // Children may have collapsed into nothing
            return Ok(if list_dir(dir)?.is_empty() {
                std::fs::remove_dir(dir)?;
                None
            } else {
                Some(dir.to_path_buf())
            });
        }

        let mut child = entries.remove(0);
        if child.is_dir() {
            match self.normalize_level(&child, budget - 1)? {
                Some(normalized) => child = normalized,
                None => {
                    std::fs::remove_dir(dir)?;
                    return Ok(None);
                }
            }
        }

        if !self.is_redundant(dir, &child) {
            return Ok(Some(dir.to_path_buf()));
        }
        match self.merge_up(dir, &child) {
            Ok(merged) => Ok(Some(merged)),
            Err(crate::Error::Extract(e @ ExtractError::MergeConflict { .. })) => {
                warn!(error = %e, "leaving nested directory in place");
                Ok(Some(dir.to_path_buf()))
            }
            Err(e) => Err(e),
        }
    }

    fn is_redundant(&self, dir: &Path, child: &Path) -> bool {
        let Some(parent_name) = dir.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
            return false;
        };
        let Some(child_name) = child.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
            return false;
        };
        let child_name = if child.is_dir() {
            child_name.as_str()
        } else {
            match child_name.rfind('.') {
                Some(pos) if pos > 0 => &child_name[..pos],
                _ => child_name.as_str(),
            }
        };
        let parent_name = strip_disambiguator(&parent_name);
        let child_name = strip_disambiguator(child_name);

        match self.rule {
            RedundancyRule::SameName => parent_name == child_name,
            RedundancyRule::Containment => {
                parent_name.contains(child_name) || child_name.contains(parent_name)
            }
            RedundancyRule::Always => true,
        }
    }

    /// Move the lone `child` of `dir` next to `dir` and remove `dir`
    fn merge_up(&self, dir: &Path, child: &Path) -> Result<PathBuf> {
        let (Some(grandparent), Some(child_name)) = (dir.parent(), child.file_name()) else {
            return Err(ExtractError::InvalidPath {
                path: dir.to_path_buf(),
                reason: "cannot merge at the file system root".to_string(),
            }
            .into());
        };
        let mut dest = grandparent.join(child_name);

        if paths_equal(&dest, dir) {
            // The child takes over its parent's name: park it, then swap
            let parked = get_unique_path(&dest)?;
            move_path(child, &parked)?;
            std::fs::remove_dir(dir)?;
            move_path(&parked, &dest)?;
        } else {
            if is_empty_dir(&dest) {
                std::fs::remove_dir(&dest)?;
                debug!(?dest, "replacing empty directory");
            }
            if dest.symlink_metadata().is_ok() {
                if !self.rename_on_collision {
                    return Err(ExtractError::MergeConflict {
                        source_path: child.to_path_buf(),
                        dest_path: dest,
                    }
                    .into());
                }
                dest = get_unique_path(&dest)?;
            }
            move_path(child, &dest)?;
            std::fs::remove_dir(dir)?;
        }

        debug!(?dir, ?dest, "collapsed redundant nesting");
        Ok(dest)
    }
}

fn is_empty_dir(path: &Path) -> bool {
    path.symlink_metadata().is_ok_and(|m| m.is_dir())
        && std::fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_none())
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}
