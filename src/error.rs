//! Error types for nested-unpack
//!
//! This module provides the error taxonomy for the library:
//! - The crate-wide [`Error`] type with configuration, I/O and process-launch failures
//! - The domain-specific [`ExtractError`] for everything that can go wrong with one archive
//! - Machine-readable error codes for structured events and logs
//!
//! Only [`Error::ProcessLaunchFailed`] is fatal to a run. Every other error is contained
//! at the driver's per-item boundary and routed to the failure root or skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for nested-unpack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reason attached to [`ExtractError::ExtractionFailed`] when every password was rejected
pub const NO_CORRECT_PASSWORD: &str = "no correct password";

/// Main error type for nested-unpack
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "extraction.success_ratio")
        key: Option<String>,
    },

    /// Archive-level error (classification, probing, extraction, relocation)
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// The external archiver could not be started at all
    #[error("failed to launch archiver {program}: {reason}")]
    ProcessLaunchFailed {
        /// Program that was being launched
        program: PathBuf,
        /// The reason the launch failed
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (configuration files, events)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors concerning a single archive, volume set or relocation step
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file is not an archive at all
    #[error("not an archive: {path}")]
    NotAnArchive {
        /// The file that was classified as non-archive content
        path: PathBuf,
    },

    /// Archive-like, but not one of the supported families (zip, 7z, rar)
    #[error("unsupported archive format {format} for {path}")]
    UnsupportedFormat {
        /// The archive path
        path: PathBuf,
        /// The format name reported by the archiver
        format: String,
    },

    /// Archive extraction failed
    #[error("extraction failed for {archive}: {reason}")]
    ExtractionFailed {
        /// The archive file that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// No passwords available (not even the no-password entry)
    #[error("no passwords available for archive {archive}")]
    NoPasswordsAvailable {
        /// The archive that could not be attempted
        archive: PathBuf,
    },

    /// A multi-volume set never became complete
    #[error("volume set {prefix} incomplete: found {found} of {expected:?} volumes")]
    IncompleteVolumeSet {
        /// Common prefix of the set
        prefix: String,
        /// Number of volumes found on disk
        found: usize,
        /// Number of volumes reported by the probe, if any probe succeeded
        expected: Option<u32>,
    },

    /// Two files claim the same slot of one volume set
    #[error("volume {index} of set {prefix} already taken, rejecting {path}")]
    DuplicateVolume {
        /// The file that was turned away
        path: PathBuf,
        /// Common prefix of the set
        prefix: String,
        /// 0-based index both files claim
        index: u32,
    },

    /// File move/rename failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    MoveFailed {
        /// The source path of the file being moved
        source_path: PathBuf,
        /// The destination path where the file should be moved
        dest_path: PathBuf,
        /// The reason the move failed
        reason: String,
    },

    /// No free name could be allocated at the destination
    #[error("file collision at {path}: {reason}")]
    FileCollision {
        /// The path where the collision occurred
        path: PathBuf,
        /// The reason for the collision
        reason: String,
    },

    /// Invalid path encountered
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The invalid path that was encountered
        path: PathBuf,
        /// The reason the path is invalid
        reason: String,
    },

    /// Directory merge aborted because the destination holds unrelated content
    #[error("refusing to merge {source_path} into occupied {dest_path}")]
    MergeConflict {
        /// Directory or file that was being moved up
        source_path: PathBuf,
        /// Occupied destination
        dest_path: PathBuf,
    },
}

impl Error {
    /// Whether this error must abort the whole run
    ///
    /// Nothing useful can happen without a working archiver, so a launch failure
    /// stops the driver. All other errors are handled per item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ProcessLaunchFailed { .. })
    }

    /// Get the machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Extract(e) => match e {
                ExtractError::NotAnArchive { .. } => "not_an_archive",
                ExtractError::UnsupportedFormat { .. } => "unsupported_format",
                ExtractError::ExtractionFailed { .. } => "extraction_failed",
                ExtractError::NoPasswordsAvailable { .. } => "no_passwords_available",
                ExtractError::IncompleteVolumeSet { .. } => "incomplete_volume_set",
                ExtractError::DuplicateVolume { .. } => "duplicate_volume",
                ExtractError::MoveFailed { .. } => "move_failed",
                ExtractError::FileCollision { .. } => "file_collision",
                ExtractError::InvalidPath { .. } => "invalid_path",
                ExtractError::MergeConflict { .. } => "merge_conflict",
            },
            Error::ProcessLaunchFailed { .. } => "process_launch_failed",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }

    /// Whether this is a file-system side-effect error (best effort, never fatal)
    pub fn is_file_system(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Extract(
                    ExtractError::MoveFailed { .. }
                        | ExtractError::FileCollision { .. }
                        | ExtractError::InvalidPath { .. }
                        | ExtractError::MergeConflict { .. }
                )
        )
    }
}
