//! Core types and events

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Archive family as reported by the archiver probe (or guessed from a name)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// ZIP archive (.zip, .zNN, .zip.NNN)
    Zip,
    /// 7-Zip archive (.7z, .7z.NNN)
    SevenZip,
    /// RAR archive (.rar, .partN.rar, .rNN)
    Rar,
    /// Anything else; never extracted
    Other,
}

impl ArchiveFormat {
    /// Map an archiver `Type = …` value onto a family
    pub fn from_type_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "zip" | "zipx" => ArchiveFormat::Zip,
            "7z" => ArchiveFormat::SevenZip,
            "rar" | "rar4" | "rar5" => ArchiveFormat::Rar,
            _ => ArchiveFormat::Other,
        }
    }

    /// Canonical file extension for this family
    pub fn extension(self) -> Option<&'static str> {
        match self {
            ArchiveFormat::Zip => Some("zip"),
            ArchiveFormat::SevenZip => Some("7z"),
            ArchiveFormat::Rar => Some("rar"),
            ArchiveFormat::Other => None,
        }
    }

    /// Whether the archiver may be asked to extract this family
    pub fn is_extractable(self) -> bool {
        !matches!(self, ArchiveFormat::Other)
    }
}

/// Result of probing one archive file
///
/// Immutable once built; lives only for the duration of one extraction pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveDescriptor {
    /// The probed file
    pub path: PathBuf,
    /// Archive family
    pub format: ArchiveFormat,
    /// 0-based volume index (0 = first)
    pub volume_index: u32,
    /// Number of volumes (1 = single volume)
    pub total_volumes: u32,
    /// Grouping key shared by all volumes of one set, present iff `total_volumes > 1`
    pub common_prefix: Option<String>,
}

impl ArchiveDescriptor {
    /// Whether this descriptor describes a multi-volume set
    pub fn is_multi_volume(&self) -> bool {
        self.total_volumes > 1
    }
}

/// Outcome of one extraction attempt with one password
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// Extraction produced plausible output in this directory
    Success(PathBuf),
    /// The password was wrong; the next one may be tried
    WrongPassword,
    /// Terminal failure for this archive; no further passwords are tried
    Failed(String),
}

/// Event emitted while a run progresses
///
/// Presentation is left to subscribers; the driver never prints.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A file was added to the work queue
    Queued {
        /// The queued file
        path: PathBuf,
        /// Nesting depth (0 = entry level)
        depth: u32,
    },

    /// A multi-volume set is waiting for more volumes
    Waiting {
        /// Common prefix of the set
        prefix: String,
        /// Volumes seen so far
        found: usize,
        /// Volumes expected, once known
        #[serde(skip_serializing_if = "Option::is_none")]
        expected: Option<u32>,
    },

    /// An extraction attempt started
    Extracting {
        /// Representative archive file
        archive: PathBuf,
        /// 1-based attempt number
        attempt: usize,
        /// Number of passwords available
        total: usize,
    },

    /// An attempt was rejected as a wrong password
    WrongPassword {
        /// Representative archive file
        archive: PathBuf,
        /// 1-based attempt number
        attempt: usize,
    },

    /// An archive (or set) was extracted
    Extracted {
        /// Representative archive file
        archive: PathBuf,
        /// Output directory
        output: PathBuf,
        /// Output/input size ratio
        ratio: f64,
    },

    /// An archive (or set) could not be extracted
    ExtractFailed {
        /// Representative archive file
        archive: PathBuf,
        /// Machine-readable error code
        code: String,
        /// Human-readable reason
        reason: String,
    },

    /// An output directory contains only archives and will be unpacked again
    Recursing {
        /// Output directory
        directory: PathBuf,
        /// Number of archive candidates enqueued
        archives: usize,
    },

    /// An output directory holds final content
    FinalResult {
        /// Output directory
        directory: PathBuf,
    },

    /// Single-child nesting was collapsed
    Normalized {
        /// Directory before normalization
        before: PathBuf,
        /// Location of the content afterwards
        after: PathBuf,
    },

    /// Something was moved into the failure root
    MovedToFailure {
        /// Original location
        source: PathBuf,
        /// New location
        destination: PathBuf,
    },

    /// A final result was moved into the success root
    MovedToSuccess {
        /// Original location
        source: PathBuf,
        /// New location
        destination: PathBuf,
    },

    /// The work queue drained and all relocation finished
    RunComplete {
        /// Summary of the run
        summary: RunSummary,
    },
}

/// What a run produced
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Final locations under the success root
    pub succeeded: Vec<PathBuf>,
    /// Final locations under the failure root
    pub failed: Vec<PathBuf>,
    /// Number of successful extractions (archives and volume sets)
    pub extractions: usize,
}
