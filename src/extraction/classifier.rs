//! Volume name classification
//!
//! A pure function from a file name (plus an optional size) to a [`NameClass`].
//! Patterns are checked in a fixed priority order:
//!
//! 1. `.txt`/`.md` below the size threshold ⇒ [`NameClass::Text`]
//! 2. `name.partN.rar`
//! 3. `name.rar`, `name.zip`, `name.7z`
//! 4. `name[.7z|.zip|.zipx].NNN`
//! 5. `name.zNN`
//! 6. `name.rNN`
//! 7. single-character heuristics on the extension ⇒ [`NameClass::FormatHint`]
//!
//! No I/O happens here except in [`classify_path`], which only reads the file size.

use crate::config::ExtractionConfig;
use crate::types::ArchiveFormat;
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

/// Naming scheme a volume belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VolumeGroup {
    /// `name.part1.rar`, `name.part2.rar`, …
    RarPart,
    /// `name.7z.001`, `name.zip.002`, `name.003`, …
    Numbered,
    /// `name.zip` plus `name.z01`, `name.z02`, …
    ZipSplit,
    /// `name.rar` plus `name.r00`, `name.r01`, …
    RarLegacy,
    /// `name.7z`, which never has numbered siblings
    Single7z,
}

/// Where a file sits inside its (possibly single-member) volume set
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeKey {
    /// Naming scheme
    pub group: VolumeGroup,
    /// Shared stem, original case (`movie` for `movie.part2.rar`, `movie.7z` for `movie.7z.002`)
    pub prefix: String,
    /// Ordering key within the set (0 = first where the scheme has one)
    pub index: u32,
    /// Format implied by the name; `Other` when only a probe can tell
    pub format: ArchiveFormat,
}

impl VolumeKey {
    /// Aggregation key shared by all members of one set
    pub fn set_key(&self) -> SetKey {
        SetKey {
            group: self.group,
            prefix: self.prefix.to_lowercase(),
        }
    }

    /// Human-facing base name (inner archive extension removed)
    pub fn base_name(&self) -> &str {
        prefix_base_name(self.group, &self.prefix)
    }
}

/// Strip the inner archive extension a numbered prefix carries (`report.7z` ⇒ `report`)
pub fn prefix_base_name(group: VolumeGroup, prefix: &str) -> &str {
    if group == VolumeGroup::Numbered {
        let lower = prefix.to_ascii_lowercase();
        for inner in [".7z", ".zipx", ".zip", ".rar"] {
            if lower.ends_with(inner) && lower.len() > inner.len() {
                return &prefix[..prefix.len() - inner.len()];
            }
        }
    }
    prefix
}

/// Aggregation key for the volume table
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SetKey {
    /// Naming scheme
    pub group: VolumeGroup,
    /// Lower-cased common prefix
    pub prefix: String,
}

impl fmt::Display for SetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}

/// Classification of one file name
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameClass {
    /// Ordinary content
    NotArchive,
    /// Small documentation file; ignored when deciding about recursion
    Text,
    /// Single archive or the first volume of a set
    FirstVolume(VolumeKey),
    /// A later volume of a set
    Continuation(VolumeKey),
    /// Unrecognized name whose extension resembles an archive family
    FormatHint(ArchiveFormat),
}

impl NameClass {
    /// Whether the name alone marks the file as an archive or volume
    pub fn is_volume(&self) -> bool {
        matches!(self, NameClass::FirstVolume(_) | NameClass::Continuation(_))
    }
}

/// Inputs to classification besides the name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NameRules {
    /// `.txt`/`.md` below this size are [`NameClass::Text`]
    pub text_size_threshold: u64,
    /// Whether `.r00` opens a legacy RAR set
    pub r00_is_first: bool,
}

impl Default for NameRules {
    fn default() -> Self {
        Self::from(&ExtractionConfig::default())
    }
}

impl From<&ExtractionConfig> for NameRules {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            text_size_threshold: config.text_size_threshold,
            r00_is_first: config.r00_is_first,
        }
    }
}

/// Highest volume number a name may carry; larger numbers are not volumes
pub const MAX_VOLUME_NUMBER: u32 = 99_999;

struct Patterns {
    part: Regex,
    base: Regex,
    numbered: Regex,
    zip_split: Regex,
    rar_legacy: Regex,
}

// The literals below are fixed and known to compile.
#[allow(clippy::expect_used)]
static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| Patterns {
    part: Regex::new(r"(?i)^(?P<prefix>.+)\.part(?P<n>\d+)\.rar$").expect("part pattern"),
    base: Regex::new(r"(?i)^(?P<prefix>.+)\.(?P<ext>rar|zip|7z)$").expect("base pattern"),
    numbered: Regex::new(r"(?i)^(?P<prefix>.+)\.(?P<n>\d{3,})$").expect("numbered pattern"),
    zip_split: Regex::new(r"(?i)^(?P<prefix>.+)\.z(?P<n>\d{2,})$").expect("zip split pattern"),
    rar_legacy: Regex::new(r"(?i)^(?P<prefix>.+)\.r(?P<n>\d{2,})$").expect("rar pattern"),
});

/// Classify a file name
///
/// `size` is only consulted for the text rule; an unknown size counts as small.
///
/// # Examples
///
/// ```
/// use nested_unpack::extraction::{classify_name, NameClass, NameRules};
///
/// let rules = NameRules::default();
/// assert!(matches!(classify_name("a.part1.rar", None, &rules), NameClass::FirstVolume(_)));
/// assert!(matches!(classify_name("a.7z.002", None, &rules), NameClass::Continuation(_)));
/// assert_eq!(classify_name("blob.xyz", None, &rules), NameClass::NotArchive);
/// ```
pub fn classify_name(name: &str, size: Option<u64>, rules: &NameRules) -> NameClass {
    let patterns = &*PATTERNS;
    let extension = final_extension(name).map(|e| e.to_ascii_lowercase());

    if let Some(ext) = extension.as_deref()
        && (ext == "txt" || ext == "md")
        && size.is_none_or(|s| s < rules.text_size_threshold)
    {
        return NameClass::Text;
    }

    if let Some(caps) = patterns.part.captures(name) {
        let Some(n) = parse_number(&caps["n"]) else {
            return NameClass::NotArchive;
        };
        let key = VolumeKey {
            group: VolumeGroup::RarPart,
            prefix: caps["prefix"].to_string(),
            index: n.saturating_sub(1),
            format: ArchiveFormat::Rar,
        };
        return if n <= 1 {
            NameClass::FirstVolume(key)
        } else {
            NameClass::Continuation(key)
        };
    }

    if let Some(caps) = patterns.base.captures(name) {
        let (group, format) = match caps["ext"].to_ascii_lowercase().as_str() {
            "rar" => (VolumeGroup::RarLegacy, ArchiveFormat::Rar),
            "zip" => (VolumeGroup::ZipSplit, ArchiveFormat::Zip),
            _ => (VolumeGroup::Single7z, ArchiveFormat::SevenZip),
        };
        return NameClass::FirstVolume(VolumeKey {
            group,
            prefix: caps["prefix"].to_string(),
            index: 0,
            format,
        });
    }

    if let Some(caps) = patterns.numbered.captures(name) {
        let Some(n) = parse_number(&caps["n"]) else {
            return NameClass::NotArchive;
        };
        let prefix = caps["prefix"].to_string();
        let format = match final_extension(&prefix).map(|e| e.to_ascii_lowercase()) {
            Some(inner) if inner == "7z" => ArchiveFormat::SevenZip,
            Some(inner) if inner == "zip" || inner == "zipx" => ArchiveFormat::Zip,
            Some(inner) if inner == "rar" => ArchiveFormat::Rar,
            _ => ArchiveFormat::Other,
        };
        let key = VolumeKey {
            group: VolumeGroup::Numbered,
            prefix,
            index: n.saturating_sub(1),
            format,
        };
        return if n <= 1 {
            NameClass::FirstVolume(key)
        } else {
            NameClass::Continuation(key)
        };
    }

    if let Some(caps) = patterns.zip_split.captures(name) {
        let Some(n) = parse_number(&caps["n"]) else {
            return NameClass::NotArchive;
        };
        return NameClass::Continuation(VolumeKey {
            group: VolumeGroup::ZipSplit,
            prefix: caps["prefix"].to_string(),
            index: n,
            format: ArchiveFormat::Zip,
        });
    }

    if let Some(caps) = patterns.rar_legacy.captures(name) {
        let Some(n) = parse_number(&caps["n"]) else {
            return NameClass::NotArchive;
        };
        // `.rar` itself is index 0, so `.r00` is index 1 in either convention
        let key = VolumeKey {
            group: VolumeGroup::RarLegacy,
            prefix: caps["prefix"].to_string(),
            index: n + 1,
            format: ArchiveFormat::Rar,
        };
        return if n == 0 && rules.r00_is_first {
            NameClass::FirstVolume(key)
        } else {
            NameClass::Continuation(key)
        };
    }

    match extension.as_deref().and_then(format_hint) {
        Some(format) => NameClass::FormatHint(format),
        None => NameClass::NotArchive,
    }
}

/// Classify the file at `path`, using its size for the text rule
pub fn classify_path(path: &Path, rules: &NameRules) -> NameClass {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return NameClass::NotArchive;
    };
    let size = std::fs::metadata(path).ok().map(|m| m.len());
    classify_name(&name, size, rules)
}

/// Name used for output folders and relocated results
///
/// Volume sets use their common prefix without an inner archive extension; other
/// files use their stem.
pub fn base_name(name: &str, rules: &NameRules) -> String {
    match classify_name(name, None, rules) {
        NameClass::FirstVolume(key) | NameClass::Continuation(key) => key.base_name().to_string(),
        _ => match name.rfind('.') {
            Some(pos) if pos > 0 => name[..pos].to_string(),
            _ => name.to_string(),
        },
    }
}

fn final_extension(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => Some(&name[pos + 1..]),
        _ => None,
    }
}

/// Volume number, `None` beyond [`MAX_VOLUME_NUMBER`]
fn parse_number(digits: &str) -> Option<u32> {
    digits
        .parse::<u32>()
        .ok()
        .filter(|n| *n <= MAX_VOLUME_NUMBER)
}

/// Family suggested by a single character of an unrecognized extension
fn format_hint(ext: &str) -> Option<ArchiveFormat> {
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    if ext.contains('7') {
        Some(ArchiveFormat::SevenZip)
    } else if ext.starts_with('z') || ext.ends_with('z') {
        Some(ArchiveFormat::Zip)
    } else if ext.starts_with('r') || ext.ends_with('r') {
        Some(ArchiveFormat::Rar)
    } else {
        None
    }
}
