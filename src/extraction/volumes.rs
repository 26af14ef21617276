//! Multi-volume aggregation
//!
//! [`resolve_sibling_volumes`] finds the members of a set that already sit next to
//! its first volume. [`VolumeTable`] accumulates members that arrive from elsewhere
//! (for example from different nested archives) until a set is complete.

use super::classifier::{
    NameClass, NameRules, SetKey, VolumeKey, classify_name, prefix_base_name,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Find every file next to `seed` that belongs to the same set as `key`
///
/// Returns an index → path map ordered by index. Gaps are not errors. An unreadable
/// directory or a vanished seed yields an empty map.
pub fn resolve_sibling_volumes(
    seed: &Path,
    key: &VolumeKey,
    rules: &NameRules,
) -> BTreeMap<u32, PathBuf> {
    let mut found = BTreeMap::new();
    if !seed.is_file() {
        return found;
    }
    let Some(dir) = seed.parent() else {
        return found;
    };
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(?dir, error = %e, "cannot read directory for sibling volumes");
            return found;
        }
    };

    let wanted = key.set_key();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let NameClass::FirstVolume(sibling) | NameClass::Continuation(sibling) =
            classify_name(&name, None, rules)
            && sibling.set_key() == wanted
        {
            found.insert(sibling.index, path);
        }
    }
    found
}

/// Volumes of one set seen so far
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeSet {
    key: SetKey,
    prefix: String,
    expected: Option<u32>,
    volumes: BTreeMap<u32, PathBuf>,
    first: Option<PathBuf>,
    first_index: Option<u32>,
}

impl VolumeSet {
    /// Create an empty set; `prefix` keeps its original case for naming
    pub fn new(key: SetKey, prefix: impl Into<String>) -> Self {
        Self {
            key,
            prefix: prefix.into(),
            expected: None,
            volumes: BTreeMap::new(),
            first: None,
            first_index: None,
        }
    }

    /// Record a member; the first volume is tracked separately as well
    ///
    /// An index already held by another path keeps it, and the rejected path is
    /// returned. When two members claim to be first (`x.rar` and `x.r00`), the
    /// lower index wins.
    pub fn insert(&mut self, index: u32, path: PathBuf, is_first: bool) -> Option<PathBuf> {
        if let Some(held) = self.volumes.get(&index)
            && *held != path
        {
            debug!(?held, rejected = ?path, index, "volume index already taken");
            return Some(path);
        }
        if is_first && self.first_index.is_none_or(|current| index <= current) {
            self.first = Some(path.clone());
            self.first_index = Some(index);
        }
        self.volumes.insert(index, path);
        if let Some(expected) = self.expected {
            self.expected = Some(expected.max(self.index_span()));
        }
        None
    }

    /// Set the expected volume count
    ///
    /// The count never drops below the span of indices already known.
    pub fn set_expected(&mut self, probed: u32) {
        self.expected = Some(probed.max(self.index_span()));
    }

    /// Distance between the lowest and highest known index, inclusive
    pub fn index_span(&self) -> u32 {
        match (self.volumes.keys().next(), self.volumes.keys().next_back()) {
            (Some(low), Some(high)) => high.saturating_sub(*low).saturating_add(1),
            _ => 0,
        }
    }

    /// Complete iff the expected count is known and every volume is present
    pub fn is_complete(&self) -> bool {
        self.first.is_some()
            && self
                .expected
                .is_some_and(|expected| self.volumes.len() == expected as usize)
    }

    /// Aggregation key
    pub fn key(&self) -> &SetKey {
        &self.key
    }

    /// Common prefix in its original case
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Name for output and failure folders
    pub fn base_name(&self) -> &str {
        prefix_base_name(self.key.group, &self.prefix)
    }

    /// Expected count, once a probe has reported it
    pub fn expected(&self) -> Option<u32> {
        self.expected
    }

    /// Number of distinct volumes seen
    pub fn found(&self) -> usize {
        self.volumes.len()
    }

    /// The first volume, if seen
    pub fn first_volume(&self) -> Option<&Path> {
        self.first.as_deref()
    }

    /// Member paths ordered by index
    pub fn files(&self) -> Vec<PathBuf> {
        self.volumes.values().cloned().collect()
    }

    /// Replace a member's path after it was moved
    pub fn relocate(&mut self, from: &Path, to: &Path) {
        for path in self.volumes.values_mut() {
            if path == from {
                *path = to.to_path_buf();
            }
        }
        if self.first.as_deref() == Some(from) {
            self.first = Some(to.to_path_buf());
        }
    }
}

/// Run-local table of volume sets keyed by `(scheme, lowercase prefix)`
#[derive(Debug, Default)]
pub struct VolumeTable {
    sets: HashMap<SetKey, VolumeSet>,
}

impl VolumeTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a member, creating the set on its first sighting
    ///
    /// Returns the path back when its index is already held by another file.
    pub fn insert(&mut self, key: &VolumeKey, path: PathBuf, is_first: bool) -> Option<PathBuf> {
        self.sets
            .entry(key.set_key())
            .or_insert_with(|| VolumeSet::new(key.set_key(), key.prefix.clone()))
            .insert(key.index, path, is_first)
    }

    /// Look up a set
    pub fn get(&self, key: &SetKey) -> Option<&VolumeSet> {
        self.sets.get(key)
    }

    /// Look up a set for modification
    pub fn get_mut(&mut self, key: &SetKey) -> Option<&mut VolumeSet> {
        self.sets.get_mut(key)
    }

    /// Remove a set, typically right before extraction is attempted
    pub fn remove(&mut self, key: &SetKey) -> Option<VolumeSet> {
        self.sets.remove(key)
    }

    /// Remove and return every remaining set, ordered by prefix
    pub fn drain_all(&mut self) -> Vec<VolumeSet> {
        let mut sets: Vec<VolumeSet> = self.sets.drain().map(|(_, set)| set).collect();
        sets.sort_by(|a, b| a.key.prefix.cmp(&b.key.prefix));
        sets
    }

    /// Number of sets being tracked
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Whether no set is being tracked
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::classifier::VolumeGroup;
    use crate::types::ArchiveFormat;
    use std::fs;

    fn key(index: u32) -> VolumeKey {
        VolumeKey {
            group: VolumeGroup::Numbered,
            prefix: "report.7z".to_string(),
            index,
            format: ArchiveFormat::SevenZip,
        }
    }

    fn first_key(name: &str) -> VolumeKey {
        match classify_name(name, None, &NameRules::default()) {
            NameClass::FirstVolume(key) => key,
            other => panic!("expected first volume, got {other:?}"),
        }
    }

    #[test]
    fn index_span_saturates_at_the_top_index() {
        let mut set = VolumeSet::new(key(0).set_key(), "report.7z");
        set.insert(0, PathBuf::from("report.7z.001"), true);
        set.insert(u32::MAX, PathBuf::from("report.7z.far"), false);
        assert_eq!(set.index_span(), u32::MAX);
        set.set_expected(2);
        assert!(!set.is_complete());
    }

    #[test]
    fn out_of_order_arrival_completes_only_when_all_present() {
        let mut table = VolumeTable::new();
        let set_key = key(0).set_key();

        table.insert(&key(1), PathBuf::from("/a/report.7z.002"), false);
        table.get_mut(&set_key).unwrap().set_expected(3);
        assert!(!table.get(&set_key).unwrap().is_complete());

        table.insert(&key(0), PathBuf::from("/a/report.7z.001"), true);
        assert!(!table.get(&set_key).unwrap().is_complete());

        assert_eq!(table.insert(&key(2), PathBuf::from("/b/report.7z.003"), false), None);
        let set = table.get(&set_key).unwrap();
        assert!(set.is_complete());
        assert_eq!(set.first_volume(), Some(Path::new("/a/report.7z.001")));
        assert_eq!(
            set.files(),
            vec![
                PathBuf::from("/a/report.7z.001"),
                PathBuf::from("/a/report.7z.002"),
                PathBuf::from("/b/report.7z.003"),
            ]
        );
    }

    #[test]
    fn taken_index_keeps_the_earlier_file() {
        let mut table = VolumeTable::new();
        let set_key = key(0).set_key();
        table.insert(&key(0), PathBuf::from("/a/report.7z.001"), true);

        let rejected = table.insert(&key(0), PathBuf::from("/b/report.7z.001"), true);
        assert_eq!(rejected, Some(PathBuf::from("/b/report.7z.001")));
        assert_eq!(table.insert(&key(0), PathBuf::from("/a/report.7z.001"), true), None);

        let set = table.get(&set_key).unwrap();
        assert_eq!(set.found(), 1);
        assert_eq!(set.first_volume(), Some(Path::new("/a/report.7z.001")));
    }

    #[test]
    fn unknown_expected_count_is_never_complete() {
        let mut set = VolumeSet::new(key(0).set_key(), "report.7z");
        set.insert(0, PathBuf::from("report.7z.001"), true);
        set.insert(1, PathBuf::from("report.7z.002"), false);
        assert_eq!(set.expected(), None);
        assert!(!set.is_complete());
    }

    #[test]
    fn expected_count_is_at_least_the_index_span() {
        let mut set = VolumeSet::new(key(0).set_key(), "report.7z");
        set.insert(0, PathBuf::from("report.7z.001"), true);
        set.insert(3, PathBuf::from("report.7z.004"), false);
        set.set_expected(1);
        assert_eq!(set.expected(), Some(4));
        assert!(!set.is_complete());

        set.insert(5, PathBuf::from("report.7z.006"), false);
        assert_eq!(set.expected(), Some(6));
    }

    #[test]
    fn lowest_first_volume_wins() {
        let mut set = VolumeSet::new(first_key("old.rar").set_key(), "old");
        set.insert(1, PathBuf::from("old.r00"), true);
        set.insert(0, PathBuf::from("old.rar"), true);
        set.insert(1, PathBuf::from("old.r00"), true);
        assert_eq!(set.first_volume(), Some(Path::new("old.rar")));
    }

    #[test]
    fn relocate_updates_members_and_first() {
        let mut set = VolumeSet::new(key(0).set_key(), "report.7z");
        set.insert(0, PathBuf::from("/in/report.7z.001"), true);
        set.relocate(Path::new("/in/report.7z.001"), Path::new("/stage/report.7z.001"));
        assert_eq!(set.first_volume(), Some(Path::new("/stage/report.7z.001")));
        assert_eq!(set.files(), vec![PathBuf::from("/stage/report.7z.001")]);
    }

    #[test]
    fn drain_all_empties_the_table() {
        let mut table = VolumeTable::new();
        table.insert(&key(1), PathBuf::from("report.7z.002"), false);
        let drained = table.drain_all();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].prefix(), "report.7z");
        assert!(table.is_empty());
    }

    #[test]
    fn resolver_collects_matching_siblings_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        for name in [
            "Movie.part1.rar",
            "movie.part2.rar",
            "Movie.part4.rar",
            "Other.part2.rar",
            "Movie.rar",
            "notes.txt",
        ] {
            fs::write(dir.join(name), b"x").unwrap();
        }
        fs::create_dir(dir.join("Movie.part3.rar")).unwrap();

        let seed = dir.join("Movie.part1.rar");
        let found = resolve_sibling_volumes(
            &seed,
            &first_key("Movie.part1.rar"),
            &NameRules::default(),
        );
        assert_eq!(found.keys().copied().collect::<Vec<_>>(), vec![0, 1, 3]);
        assert_eq!(found[&1], dir.join("movie.part2.rar"));
    }

    #[test]
    fn resolver_gathers_legacy_and_zip_split_siblings() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        for name in ["old.rar", "old.r00", "old.r01", "pics.zip", "pics.z01", "pics.z02"] {
            fs::write(dir.join(name), b"x").unwrap();
        }
        let rules = NameRules::default();

        let rar = resolve_sibling_volumes(&dir.join("old.rar"), &first_key("old.rar"), &rules);
        assert_eq!(rar.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);

        let zip = resolve_sibling_volumes(&dir.join("pics.zip"), &first_key("pics.zip"), &rules);
        assert_eq!(zip.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn resolver_on_vanished_seed_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let seed = temp_dir.path().join("gone.7z.001");
        let found =
            resolve_sibling_volumes(&seed, &first_key("gone.7z.001"), &NameRules::default());
        assert!(found.is_empty());
    }
}
