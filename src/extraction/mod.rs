//! Archive identification and extraction with password support
//!
//! This module holds the per-archive building blocks the driver composes:
//! - [`classifier`] - file name ⇒ archive role, without touching the archive
//! - [`volumes`] - sibling discovery and aggregation of multi-volume sets
//! - [`process`] - the external archiver behind the [`ArchiveTool`] trait
//! - [`parser`] - interpretation of the archiver's listing output
//! - [`trial`] - the password trial loop and its size-ratio verdicts

pub mod classifier;
pub mod parser;
mod password_list;
pub mod process;
pub mod trial;
pub mod volumes;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

// Re-exports
pub use classifier::{
    NameClass, NameRules, SetKey, VolumeGroup, VolumeKey, base_name, classify_name,
    classify_path, prefix_base_name,
};
pub use parser::{ProbeInfo, ProbeReport, parse_list_output};
pub use password_list::PasswordList;
pub use process::{ArchiveTool, CliArchiveTool, PasswordArg, ProcessOutput};
pub use trial::{
    ExtractionUnit, PasswordTrialExtractor, RatioThresholds, TrialSuccess, judge_attempt,
    size_ratio,
};
pub use volumes::{VolumeSet, VolumeTable, resolve_sibling_volumes};
