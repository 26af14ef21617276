//! # nested-unpack
//!
//! Recursive extraction of nested, multi-volume and password-protected archives.
//!
//! Give the driver a file or a directory and a list of candidate passwords. It
//! unpacks every archive it finds through an external 7-Zip binary, unpacks the
//! archives that come out of those, and so on until only real content is left.
//! Results end up in a success root with redundant single-child folders collapsed;
//! anything that could not be opened ends up, untouched, in a failure root.
//!
//! ## Design Philosophy
//!
//! - **Sensible defaults** - `Config::default()` plus a 7z binary on `PATH` is enough
//! - **Library-first** - the driver never prints; consumers subscribe to events
//! - **Contained failures** - one bad archive never stops the run, only a missing
//!   archiver does
//!
//! ## Quick Start
//!
//! ```no_run
//! use nested_unpack::{CliArchiveTool, Config, PasswordList, RecursiveExtractionDriver};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.roots.success_dir = PathBuf::from("/data/unpacked");
//!     config.roots.failure_dir = PathBuf::from("/data/failed");
//!
//!     let tool = CliArchiveTool::from_config(&config.tools).ok_or("7z not found")?;
//!     let passwords = PasswordList::collect(
//!         &["hunter2".to_string()],
//!         config.tools.password_file.as_deref(),
//!         config.tools.try_no_password,
//!     )
//!     .await;
//!
//!     let driver = RecursiveExtractionDriver::new(config, Arc::new(tool));
//!
//!     // Subscribe to events
//!     let mut events = driver.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = driver.run("/data/incoming".as_ref(), passwords).await?;
//!     println!("{} extracted, {} failed", summary.extractions, summary.failed.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Recursive extraction driver
pub mod driver;
/// Error types
pub mod error;
/// Archive identification and extraction
pub mod extraction;
/// Collapsing redundant single-child directories
pub mod normalize;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{Config, NormalizeConfig, RedundancyRule, VolumeStaging};
pub use driver::RecursiveExtractionDriver;
pub use error::{Error, ExtractError, Result};
pub use extraction::{ArchiveTool, CliArchiveTool, PasswordList};
pub use normalize::DirectoryNormalizer;
pub use types::{ArchiveDescriptor, ArchiveFormat, Event, RunSummary};
