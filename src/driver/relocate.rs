//! Moving outcomes into the failure and success roots

use super::{Origin, RecursiveExtractionDriver, RunState};
use crate::config::VolumeStaging;
use crate::error::{Error, ExtractError};
use crate::extraction::base_name;
use crate::normalize::DirectoryNormalizer;
use crate::types::Event;
use crate::utils::{get_unique_path, move_path, paths_equal, prune_empty_dirs, relocate_into};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

impl RecursiveExtractionDriver {
    /// Report a failed unit and move its files to the failure root
    ///
    /// A single file keeps its name; several files go together into one folder named
    /// `folder_name`. File-system errors leave the files where they are.
    pub(super) fn fail_unit(
        &self,
        state: &mut RunState,
        members: &[PathBuf],
        folder_name: &str,
        error: &Error,
    ) {
        let archive = members.first().cloned().unwrap_or_default();
        warn!(?archive, error = %error, code = error.error_code(), "extraction failed");
        self.emit(Event::ExtractFailed {
            archive,
            code: error.error_code().to_string(),
            reason: error.to_string(),
        });

        let failure_root = &self.config.roots.failure_dir;
        let present: Vec<&PathBuf> = members
            .iter()
            .filter(|member| member.symlink_metadata().is_ok())
            .collect();

        let destination = match present.as_slice() {
            [] => return,
            [single] => {
                let name = single
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| folder_name.to_string());
                match relocate_into(single, failure_root, &name) {
                    Ok(dest) => {
                        self.emit(Event::MovedToFailure {
                            source: (*single).clone(),
                            destination: dest.clone(),
                        });
                        dest
                    }
                    Err(e) => {
                        warn!(source = ?single, error = %e, "failed to move to failure root");
                        return;
                    }
                }
            }
            several => {
                let folder = match get_unique_path(&failure_root.join(folder_name)) {
                    Ok(folder) => folder,
                    Err(e) => {
                        warn!(error = %e, "no free failure folder name");
                        return;
                    }
                };
                if let Err(e) = std::fs::create_dir_all(&folder) {
                    warn!(?folder, error = %e, "failed to create failure folder");
                    return;
                }
                for member in several {
                    let Some(name) = member.file_name() else {
                        continue;
                    };
                    let dest = folder.join(name);
                    match move_path(member, &dest) {
                        Ok(()) => self.emit(Event::MovedToFailure {
                            source: (*member).clone(),
                            destination: dest,
                        }),
                        Err(e) => {
                            warn!(?member, error = %e, "failed to move volume to failure root")
                        }
                    }
                }
                folder
            }
        };

        info!(?destination, "moved to failure root");
        state.summary.failed.push(destination);
    }

    /// Drain phase: fail incomplete sets, then place results and leftovers
    pub(super) fn finish(&self, state: &mut RunState) {
        for set in state.table.drain_all() {
            state.pending.remove(set.key());
            let error = Error::from(ExtractError::IncompleteVolumeSet {
                prefix: set.prefix().to_string(),
                found: set.found(),
                expected: set.expected(),
            });
            let files = set.files();
            self.fail_unit(state, &files, set.base_name(), &error);
        }

        let success_root = self.config.roots.success_dir.clone();
        let normalizer = DirectoryNormalizer::new(&self.config.normalize);
        let mut per_origin: HashMap<usize, usize> = HashMap::new();
        for result in &state.results {
            *per_origin.entry(result.origin).or_default() += 1;
        }
        // Directory a lone result landed in, for absorbing its leftovers later
        let mut placed: HashMap<usize, PathBuf> = HashMap::new();

        for result in std::mem::take(&mut state.results) {
            let mut path = result.path;
            if self.config.normalize.enabled {
                match normalizer.normalize(&path) {
                    Ok(Some(after)) => {
                        if after != path {
                            self.emit(Event::Normalized {
                                before: path.clone(),
                                after: after.clone(),
                            });
                            path = after;
                        }
                    }
                    Ok(None) => {
                        debug!(?path, "result was empty");
                        continue;
                    }
                    Err(e) => warn!(?path, error = %e, "normalization failed, keeping layout"),
                }
            }

            let single = per_origin.get(&result.origin).copied() == Some(1);
            let name = if path.is_file() {
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| result.producer.clone())
            } else if single {
                state
                    .origins
                    .get(result.origin)
                    .map(|origin| self.origin_name(origin))
                    .unwrap_or_else(|| result.producer.clone())
            } else {
                result.producer.clone()
            };

            match relocate_into(&path, &success_root, &name) {
                Ok(dest) => {
                    info!(source = ?path, destination = ?dest, "moved result to success root");
                    self.emit(Event::MovedToSuccess {
                        source: path,
                        destination: dest.clone(),
                    });
                    if single && dest.is_dir() {
                        placed.insert(result.origin, dest.clone());
                    }
                    state.summary.succeeded.push(dest);
                }
                Err(e) => warn!(?path, error = %e, "failed to move result, leaving in place"),
            }
        }

        // Deepest first, so nested leftovers are handled before their parents
        for intermediate in std::mem::take(&mut state.intermediates).into_iter().rev() {
            let path = intermediate.path;
            if !path.is_dir() {
                continue;
            }
            prune_empty_dirs(&path);
            if !path.exists() {
                continue;
            }
            match placed.get(&intermediate.origin) {
                Some(target) => self.absorb_residue(&path, target),
                None => match relocate_into(&path, &success_root, &intermediate.producer) {
                    Ok(dest) => {
                        self.emit(Event::MovedToSuccess {
                            source: path,
                            destination: dest.clone(),
                        });
                        state.summary.succeeded.push(dest);
                    }
                    Err(e) => warn!(?path, error = %e, "failed to move leftover content"),
                },
            }
        }

        if self.config.extraction.volume_staging == VolumeStaging::StagingRoot {
            prune_empty_dirs(&self.config.roots.staging_dir);
        }
    }

    /// Move leftover entries of an intermediate directory into a placed result
    fn absorb_residue(&self, residue: &Path, target: &Path) {
        let entries = match std::fs::read_dir(residue) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(?residue, error = %e, "cannot read leftover content");
                return;
            }
        };
        for entry in entries.flatten() {
            let source = entry.path();
            let dest = match get_unique_path(&target.join(entry.file_name())) {
                Ok(dest) => dest,
                Err(e) => {
                    warn!(?source, error = %e, "no free name for leftover content");
                    continue;
                }
            };
            match move_path(&source, &dest) {
                Ok(()) => debug!(?source, ?dest, "kept leftover content with its result"),
                Err(e) => warn!(?source, error = %e, "failed to move leftover content"),
            }
        }
        prune_empty_dirs(residue);
    }

    /// Name for the only result of an origin
    ///
    /// The entry's containing folder, or the archive's base name when the entry
    /// sits directly in the scanned directory (or was given on its own).
    fn origin_name(&self, origin: &Origin) -> String {
        let entry_name = origin
            .entry
            .file_name()
            .map(|n| base_name(&n.to_string_lossy(), &self.rules))
            .unwrap_or_default();
        let parent = origin.entry.parent();
        match (&origin.scan_root, parent) {
            (Some(root), Some(parent)) if !paths_equal(parent, root) => parent
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or(entry_name),
            _ => entry_name,
        }
    }
}
