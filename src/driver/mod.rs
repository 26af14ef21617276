//! Recursive extraction driver
//!
//! [`RecursiveExtractionDriver::run`] takes an entry path and a password list and
//! works a breadth-first queue until nothing extractable is left:
//!
//! - each dequeued file is classified by name, multi-volume members are gathered
//!   in a [`VolumeTable`] until their set is complete
//! - ready units go through the [`PasswordTrialExtractor`]
//! - successful output is scanned; output consisting only of archives is queued
//!   again, anything else is a final result
//! - failures are moved to the failure root right away, final results are
//!   normalized and moved to the success root once the queue drains
//!
//! The run is sequential. Queue, table and results live in a [`RunState`] owned by
//! `run()`, so nothing needs locking.

mod relocate;


use crate::config::{Config, VolumeStaging};
use crate::error::{Error, ExtractError, NO_CORRECT_PASSWORD, Result};
use crate::extraction::{
    ArchiveTool, ExtractionUnit, NameClass, NameRules, PasswordArg, PasswordList,
    PasswordTrialExtractor, ProbeReport, RatioThresholds, SetKey, TrialSuccess, VolumeKey,
    VolumeTable, base_name, classify_name, classify_path, parse_list_output,
    resolve_sibling_volumes,
};
use crate::types::{ArchiveFormat, Event, RunSummary};
use crate::utils::{get_unique_path, move_path, paths_equal};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// One queued file
#[derive(Clone, Debug)]
struct WorkItem {
    path: PathBuf,
    /// Index into [`RunState::origins`]
    origin: usize,
    depth: u32,
}

/// A top-level entry everything else descends from
#[derive(Clone, Debug)]
struct Origin {
    entry: PathBuf,
    /// The scanned input directory, `None` for a single-file input
    scan_root: Option<PathBuf>,
}

/// Lineage of a volume set that is still being gathered
#[derive(Clone, Copy, Debug, Default)]
struct PendingSet {
    origin: usize,
    depth: u32,
}

/// Output directory that holds final content
#[derive(Clone, Debug)]
struct FinalResult {
    path: PathBuf,
    origin: usize,
    /// Base name of the archive that produced it
    producer: String,
}

/// Output directory whose archives were queued again
#[derive(Clone, Debug)]
struct Intermediate {
    path: PathBuf,
    origin: usize,
    producer: String,
}

/// Everything a single run mutates
struct RunState {
    queue: VecDeque<WorkItem>,
    table: VolumeTable,
    pending: HashMap<SetKey, PendingSet>,
    passwords: PasswordList,
    origins: Vec<Origin>,
    results: Vec<FinalResult>,
    intermediates: Vec<Intermediate>,
    /// Files that were part of an attempted unit; never processed twice
    consumed: HashSet<PathBuf>,
    summary: RunSummary,
}

impl RunState {
    fn new(passwords: PasswordList) -> Self {
        Self {
            queue: VecDeque::new(),
            table: VolumeTable::new(),
            pending: HashMap::new(),
            passwords,
            origins: Vec::new(),
            results: Vec::new(),
            intermediates: Vec::new(),
            consumed: HashSet::new(),
            summary: RunSummary::default(),
        }
    }

    fn add_origin(&mut self, entry: PathBuf, scan_root: Option<PathBuf>) -> usize {
        self.origins.push(Origin { entry, scan_root });
        self.origins.len() - 1
    }
}

/// What scanning an output directory decided
enum Scan {
    /// Foreign content present (or nothing to recurse into)
    Final,
    /// Only archives (and incidental text); these files go back on the queue
    Recurse(Vec<PathBuf>),
}

/// Result of probing one file, possibly under a new name
struct Probe {
    report: ProbeReport,
    path: PathBuf,
}

/// Recursively unpacks nested, multi-volume and password-protected archives
///
/// # Examples
///
/// ```no_run
/// use nested_unpack::{CliArchiveTool, Config, PasswordList, RecursiveExtractionDriver};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let tool = CliArchiveTool::from_config(&config.tools).ok_or("no archiver found")?;
/// let passwords = PasswordList::collect(&["secret".to_string()], None, true).await;
///
/// let driver = RecursiveExtractionDriver::new(config, Arc::new(tool));
/// let mut events = driver.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("{:?}", event);
///     }
/// });
///
/// let summary = driver.run(Path::new("downloads"), passwords).await?;
/// println!("{} results, {} failures", summary.succeeded.len(), summary.failed.len());
/// # Ok(())
/// # }
/// ```
pub struct RecursiveExtractionDriver {
    config: Arc<Config>,
    tool: Arc<dyn ArchiveTool>,
    event_tx: broadcast::Sender<Event>,
    rules: NameRules,
}

impl RecursiveExtractionDriver {
    /// Create a driver with its own event channel
    pub fn new(config: Config, tool: Arc<dyn ArchiveTool>) -> Self {
        // Slow subscribers lag instead of blocking the run
        let (event_tx, _rx) = broadcast::channel(1000);
        let rules = NameRules::from(&config.extraction);
        Self {
            config: Arc::new(config),
            tool,
            event_tx,
            rules,
        }
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The configuration this driver runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Unpack everything reachable from `input` (a file or a directory)
    ///
    /// Only a failure to launch the archiver aborts the run; every other problem is
    /// contained to its item, logged, and reported through events and the summary.
    pub async fn run(&self, input: &Path, passwords: PasswordList) -> Result<RunSummary> {
        self.config.validate()?;
        if input.symlink_metadata().is_err() {
            return Err(ExtractError::InvalidPath {
                path: input.to_path_buf(),
                reason: "entry path does not exist".to_string(),
            }
            .into());
        }
        let roots = &self.config.roots;
        tokio::fs::create_dir_all(&roots.success_dir).await?;
        tokio::fs::create_dir_all(&roots.failure_dir).await?;

        let mut state = RunState::new(passwords);
        self.seed(&mut state, input);
        info!(
            ?input,
            queued = state.queue.len(),
            tool = self.tool.name(),
            "starting recursive extraction"
        );

        while let Some(item) = state.queue.pop_front() {
            let path = item.path.clone();
            if let Err(e) = self.process_item(&mut state, item).await {
                if e.is_fatal() {
                    error!(?path, error = %e, "aborting run");
                    return Err(e);
                }
                if e.is_file_system() {
                    warn!(?path, error = %e, code = e.error_code(), "item left in place");
                } else {
                    self.fail_file(&mut state, &path, &e);
                }
            }
        }

        self.finish(&mut state);

        let summary = std::mem::take(&mut state.summary);
        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            extractions = summary.extractions,
            "recursive extraction complete"
        );
        self.emit(Event::RunComplete {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }

    fn enqueue(&self, state: &mut RunState, path: PathBuf, origin: usize, depth: u32) {
        self.emit(Event::Queued {
            path: path.clone(),
            depth,
        });
        state.queue.push_back(WorkItem {
            path,
            origin,
            depth,
        });
    }

    /// Queue the entry file, or every archive-named file below the entry directory
    fn seed(&self, state: &mut RunState, input: &Path) {
        if !input.is_dir() {
            let origin = state.add_origin(input.to_path_buf(), None);
            self.enqueue(state, input.to_path_buf(), origin, 0);
            return;
        }

        let roots: Vec<PathBuf> = [
            &self.config.roots.staging_dir,
            &self.config.roots.success_dir,
            &self.config.roots.failure_dir,
        ]
        .into_iter()
        .filter_map(|root| root.canonicalize().ok())
        .collect();

        let files: Vec<PathBuf> = WalkDir::new(input)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry
                    .path()
                    .canonicalize()
                    .map(|path| !roots.contains(&path))
                    .unwrap_or(true)
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();

        for path in files {
            if classify_path(&path, &self.rules).is_volume() {
                let origin = state.add_origin(path.clone(), Some(input.to_path_buf()));
                self.enqueue(state, path, origin, 0);
            }
        }
    }

    async fn process_item(&self, state: &mut RunState, item: WorkItem) -> Result<()> {
        if state.consumed.contains(&item.path) {
            debug!(path = ?item.path, "already consumed");
            return Ok(());
        }
        if item.path.symlink_metadata().is_err() {
            debug!(path = ?item.path, "vanished before processing");
            return Ok(());
        }

        match classify_path(&item.path, &self.rules) {
            NameClass::Text => {
                debug!(path = ?item.path, "skipping incidental text");
                Ok(())
            }
            NameClass::NotArchive => {
                self.reject_file(state, &item.path);
                Ok(())
            }
            NameClass::FormatHint(format) => {
                if self.config.extraction.probe_disguised_archives
                    && let Some(renamed) = self
                        .identify_disguised(&item.path, format, &state.passwords)
                        .await?
                {
                    state.queue.push_front(WorkItem {
                        path: renamed,
                        ..item
                    });
                } else {
                    self.reject_file(state, &item.path);
                }
                Ok(())
            }
            NameClass::Continuation(key) => {
                let set_key = key.set_key();
                self.track_volume(state, &key, item.path.clone(), false);
                state.pending.entry(set_key.clone()).or_insert(PendingSet {
                    origin: item.origin,
                    depth: item.depth,
                });
                self.extract_if_complete(state, &set_key).await
            }
            NameClass::FirstVolume(key) => self.process_first_volume(state, &item, &key).await,
        }
    }

    fn reject_file(&self, state: &mut RunState, path: &Path) {
        let error = Error::from(ExtractError::NotAnArchive {
            path: path.to_path_buf(),
        });
        self.fail_file(state, path, &error);
    }

    /// Route one file to the failure root; it is never picked up again
    fn fail_file(&self, state: &mut RunState, path: &Path, error: &Error) {
        let name = path
            .file_name()
            .map(|n| base_name(&n.to_string_lossy(), &self.rules))
            .unwrap_or_default();
        state.consumed.insert(path.to_path_buf());
        self.fail_unit(state, &[path.to_path_buf()], &name, error);
    }

    /// Record a volume, failing it when another file already holds its index
    ///
    /// Returns whether the volume was recorded.
    fn track_volume(
        &self,
        state: &mut RunState,
        key: &VolumeKey,
        path: PathBuf,
        is_first: bool,
    ) -> bool {
        let Some(rejected) = state.table.insert(key, path, is_first) else {
            return true;
        };
        let error = Error::from(ExtractError::DuplicateVolume {
            path: rejected.clone(),
            prefix: key.prefix.clone(),
            index: key.index,
        });
        self.fail_file(state, &rejected, &error);
        false
    }

    async fn process_first_volume(
        &self,
        state: &mut RunState,
        item: &WorkItem,
        key: &VolumeKey,
    ) -> Result<()> {
        let set_key = key.set_key();
        for (index, path) in resolve_sibling_volumes(&item.path, key, &self.rules) {
            if state.consumed.contains(&path) {
                continue;
            }
            let is_first = path
                .file_name()
                .map(|name| classify_name(&name.to_string_lossy(), None, &self.rules))
                .is_some_and(|class| matches!(class, NameClass::FirstVolume(_)));
            let sibling = VolumeKey {
                index,
                ..key.clone()
            };
            self.track_volume(state, &sibling, path, is_first);
        }
        let lineage = PendingSet {
            origin: item.origin,
            depth: item.depth,
        };
        if !state.consumed.contains(&item.path)
            && self.track_volume(state, key, item.path.clone(), true)
        {
            state.pending.insert(set_key.clone(), lineage);
        } else {
            state.pending.entry(set_key.clone()).or_insert(lineage);
        }

        let Some(set) = state.table.get(&set_key) else {
            return Ok(());
        };
        if set.expected().is_none()
            && let Some(first) = set.first_volume().map(Path::to_path_buf)
        {
            let allow_strip = set.found() == 1;
            let probe = self.probe(&first, &state.passwords, allow_strip).await?;
            if probe.path != first
                && let Some(set) = state.table.get_mut(&set_key)
            {
                set.relocate(&first, &probe.path);
            }

            let failure = match probe.report {
                ProbeReport::Archive(info) => {
                    if let Some(set) = state.table.get_mut(&set_key) {
                        let descriptor = info.descriptor(&probe.path, set.prefix());
                        debug!(?descriptor, "probed first volume");
                        set.set_expected(descriptor.total_volumes);
                    }
                    None
                }
                ProbeReport::WrongPassword => Some(ExtractError::ExtractionFailed {
                    archive: probe.path.clone(),
                    reason: NO_CORRECT_PASSWORD.to_string(),
                }),
                ProbeReport::Unsupported(format) => Some(ExtractError::UnsupportedFormat {
                    path: probe.path.clone(),
                    format,
                }),
                ProbeReport::NotArchive | ProbeReport::RetryWithoutExtension { .. } => {
                    Some(ExtractError::NotAnArchive {
                        path: probe.path.clone(),
                    })
                }
            };
            if let Some(failure) = failure {
                self.abandon_set(state, &set_key, failure.into());
                return Ok(());
            }
        }

        self.extract_if_complete(state, &set_key).await
    }

    async fn extract_if_complete(&self, state: &mut RunState, set_key: &SetKey) -> Result<()> {
        let Some(set) = state.table.get(set_key) else {
            return Ok(());
        };
        if set.is_complete() {
            return self.extract_set(state, set_key).await;
        }
        debug!(
            prefix = set.prefix(),
            found = set.found(),
            expected = ?set.expected(),
            "waiting for more volumes"
        );
        self.emit(Event::Waiting {
            prefix: set.prefix().to_string(),
            found: set.found(),
            expected: set.expected(),
        });
        Ok(())
    }

    /// Drop a set from the table and route its files to the failure root
    fn abandon_set(&self, state: &mut RunState, set_key: &SetKey, error: Error) {
        state.pending.remove(set_key);
        if let Some(set) = state.table.remove(set_key) {
            let files = set.files();
            state.consumed.extend(files.iter().cloned());
            self.fail_unit(state, &files, set.base_name(), &error);
        }
    }

    async fn extract_set(&self, state: &mut RunState, set_key: &SetKey) -> Result<()> {
        let Some(set) = state.table.remove(set_key) else {
            return Ok(());
        };
        let lineage = state.pending.remove(set_key).unwrap_or_default();
        let members = set.files();
        state.consumed.extend(members.iter().cloned());
        let Some(first) = set.first_volume().map(Path::to_path_buf) else {
            return Ok(());
        };

        let unit = self.co_locate(&first, &members, set.base_name())?;
        let extractor = PasswordTrialExtractor::new(
            self.tool.as_ref(),
            RatioThresholds::from(&self.config.extraction),
            &self.event_tx,
        );
        let outcome = extractor.extract(&unit, &state.passwords).await;
        match outcome {
            Ok(success) => self.on_success(state, &unit, success, lineage).await,
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.fail_unit(state, &unit.members, &unit.base_name, &e);
                Ok(())
            }
        }
    }

    /// Gather a unit's files in one directory according to the staging policy
    fn co_locate(&self, first: &Path, members: &[PathBuf], base: &str) -> Result<ExtractionUnit> {
        let target_dir = match self.config.extraction.volume_staging {
            VolumeStaging::StagingRoot if members.len() > 1 => {
                let dir = get_unique_path(&self.config.roots.staging_dir.join(base))?;
                std::fs::create_dir_all(&dir)?;
                dir
            }
            _ => first
                .parent()
                .ok_or_else(|| ExtractError::InvalidPath {
                    path: first.to_path_buf(),
                    reason: "archive has no parent directory".to_string(),
                })?
                .to_path_buf(),
        };

        let mut representative = first.to_path_buf();
        let mut located = Vec::with_capacity(members.len());
        for member in members {
            let in_place = member
                .parent()
                .is_some_and(|parent| paths_equal(parent, &target_dir));
            let dest = match member.file_name() {
                Some(name) if !in_place => {
                    let dest = target_dir.join(name);
                    move_path(member, &dest)?;
                    debug!(?member, ?dest, "co-located volume");
                    dest
                }
                _ => member.clone(),
            };
            if member == first {
                representative = dest.clone();
            }
            located.push(dest);
        }

        Ok(ExtractionUnit {
            representative,
            members: located,
            base_name: base.to_string(),
        })
    }

    async fn on_success(
        &self,
        state: &mut RunState,
        unit: &ExtractionUnit,
        success: TrialSuccess,
        lineage: PendingSet,
    ) -> Result<()> {
        state.summary.extractions += 1;
        let extraction = &self.config.extraction;

        if extraction.delete_consumed_archives {
            for member in &unit.members {
                if let Err(e) = std::fs::remove_file(member) {
                    warn!(?member, error = %e, "failed to delete consumed archive");
                }
            }
        }
        if extraction.promote_successful_password {
            state.passwords.promote(&success.password);
        }

        let output_dir = success.output_dir;
        let next_depth = lineage.depth + 1;
        let scan = if extraction
            .max_recursion_depth
            .is_some_and(|max| next_depth > max)
        {
            debug!(
                ?output_dir,
                depth = next_depth,
                "maximum recursion depth reached, output is final"
            );
            Scan::Final
        } else {
            self.scan_output(&output_dir, &state.passwords).await?
        };

        match scan {
            Scan::Final => {
                info!(?output_dir, "final result");
                self.emit(Event::FinalResult {
                    directory: output_dir.clone(),
                });
                state.results.push(FinalResult {
                    path: output_dir,
                    origin: lineage.origin,
                    producer: unit.base_name.clone(),
                });
            }
            Scan::Recurse(candidates) => {
                info!(
                    ?output_dir,
                    archives = candidates.len(),
                    "output contains only archives, recursing"
                );
                self.emit(Event::Recursing {
                    directory: output_dir.clone(),
                    archives: candidates.len(),
                });
                state.intermediates.push(Intermediate {
                    path: output_dir,
                    origin: lineage.origin,
                    producer: unit.base_name.clone(),
                });
                for candidate in candidates {
                    self.enqueue(state, candidate, lineage.origin, next_depth);
                }
            }
        }
        Ok(())
    }

    /// Decide whether an output directory is final or holds archives to unpack
    async fn scan_output(&self, dir: &Path, passwords: &PasswordList) -> Result<Scan> {
        let mut candidates = Vec::new();
        let mut hinted = Vec::new();

        for entry in WalkDir::new(dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
        {
            let path = entry.into_path();
            match classify_path(&path, &self.rules) {
                NameClass::Text => {}
                NameClass::FirstVolume(_) | NameClass::Continuation(_) => candidates.push(path),
                NameClass::FormatHint(format)
                    if self.config.extraction.probe_disguised_archives =>
                {
                    hinted.push((path, format));
                }
                _ => {
                    debug!(?path, "foreign content");
                    return Ok(Scan::Final);
                }
            }
        }

        // Only probe disguised files once nothing else rules out recursion
        let mut identified: Vec<(PathBuf, PathBuf)> = Vec::new();
        for (path, format) in hinted {
            match self.identify_disguised(&path, format, passwords).await {
                Ok(Some(renamed)) => {
                    candidates.push(renamed.clone());
                    identified.push((renamed, path));
                }
                Ok(None) => {
                    debug!(?path, "foreign content");
                    restore_names(&identified);
                    return Ok(Scan::Final);
                }
                Err(e) => {
                    restore_names(&identified);
                    return Err(e);
                }
            }
        }

        Ok(if candidates.is_empty() {
            Scan::Final
        } else {
            Scan::Recurse(candidates)
        })
    }

    /// Rename a file to its hinted extension and keep the name if it probes as an archive
    async fn identify_disguised(
        &self,
        path: &Path,
        format: ArchiveFormat,
        passwords: &PasswordList,
    ) -> Result<Option<PathBuf>> {
        let Some(ext) = format.extension() else {
            return Ok(None);
        };
        let renamed = path.with_extension(ext);
        if renamed.symlink_metadata().is_ok() {
            debug!(?path, ?renamed, "hinted name is taken, not probing");
            return Ok(None);
        }
        if let Err(e) = std::fs::rename(path, &renamed) {
            warn!(?path, error = %e, "failed to rename for probing");
            return Ok(None);
        }

        let probe = match self.probe(&renamed, passwords, false).await {
            Ok(probe) => probe,
            Err(e) => {
                restore_name(&renamed, path);
                return Err(e);
            }
        };
        match probe.report {
            ProbeReport::Archive(_) | ProbeReport::WrongPassword => {
                info!(?path, ?renamed, "identified disguised archive");
                Ok(Some(renamed))
            }
            _ => {
                restore_name(&renamed, path);
                Ok(None)
            }
        }
    }

    /// List `path` with each password until the archiver stops asking for another
    ///
    /// When `allow_strip` is set and the archiver rejected the file because of its
    /// extension, the extension is removed and the listing retried once. A file that
    /// turns out to be an archive keeps the stripped name; otherwise the original
    /// name is restored.
    async fn probe(
        &self,
        path: &Path,
        passwords: &PasswordList,
        allow_strip: bool,
    ) -> Result<Probe> {
        let attempts: Vec<PasswordArg<'_>> = if passwords.is_empty() {
            vec![PasswordArg::None]
        } else {
            passwords.iter().map(PasswordArg::from_entry).collect()
        };
        let mut current = path.to_path_buf();
        let mut retry_allowed = allow_strip;

        for password in attempts {
            loop {
                let output = match self.tool.list(&current, password).await {
                    Ok(output) => output,
                    Err(e) => {
                        if current != path {
                            restore_name(&current, path);
                        }
                        return Err(e);
                    }
                };
                match parse_list_output(&output, retry_allowed) {
                    ProbeReport::RetryWithoutExtension { claimed } => {
                        retry_allowed = false;
                        let stripped = current.with_extension("");
                        if stripped.symlink_metadata().is_ok()
                            || std::fs::rename(&current, &stripped).is_err()
                        {
                            return Ok(Probe {
                                report: ProbeReport::NotArchive,
                                path: current,
                            });
                        }
                        debug!(
                            ?path,
                            %claimed,
                            "archiver went by the extension, retrying without it"
                        );
                        current = stripped;
                    }
                    ProbeReport::WrongPassword => break,
                    ProbeReport::Archive(info) => {
                        return Ok(Probe {
                            report: ProbeReport::Archive(info),
                            path: current,
                        });
                    }
                    report => {
                        if current != path {
                            restore_name(&current, path);
                        }
                        return Ok(Probe {
                            report,
                            path: path.to_path_buf(),
                        });
                    }
                }
            }
        }

        if current != path {
            restore_name(&current, path);
        }
        Ok(Probe {
            report: ProbeReport::WrongPassword,
            path: path.to_path_buf(),
        })
    }
}

fn restore_name(current: &Path, original: &Path) {
    if let Err(e) = std::fs::rename(current, original) {
        warn!(?current, ?original, error = %e, "failed to restore original name");
    }
}

/// Undo renames of `(current, original)` pairs
fn restore_names(renamed: &[(PathBuf, PathBuf)]) {
    for (current, original) in renamed {
        restore_name(current, original);
    }
}
