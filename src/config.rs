//! Configuration types for nested-unpack

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration passed to the driver at construction
///
/// Every field has a sensible default, so `Config::default()` works for a run in the
/// current directory. Tests point the three roots at temporary directories.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// The three well-known outcome directories
    #[serde(default)]
    pub roots: RootsConfig,

    /// External archiver and password sources
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Extraction policy (thresholds, naming rules, staging)
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Post-extraction directory normalization
    #[serde(default)]
    pub normalize: NormalizeConfig,
}

/// Staging, success and failure roots
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RootsConfig {
    /// Where multi-volume sets are co-located before extraction (default: "./staging")
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Final destination for fully unpacked content (default: "./unpacked")
    #[serde(default = "default_success_dir")]
    pub success_dir: PathBuf,

    /// Destination for archives and sets that could not be extracted (default: "./failed")
    #[serde(default = "default_failure_dir")]
    pub failure_dir: PathBuf,
}

impl Default for RootsConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            success_dir: default_success_dir(),
            failure_dir: default_failure_dir(),
        }
    }
}

/// External tool paths and password sources
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to a 7-Zip compatible binary (None = search PATH for 7z, 7zz, 7za)
    #[serde(default)]
    pub archiver_path: Option<PathBuf>,

    /// Global password file, one password per line
    #[serde(default)]
    pub password_file: Option<PathBuf>,

    /// Try "no password" before any real password (default: true)
    #[serde(default = "default_true")]
    pub try_no_password: bool,

    /// Value passed after `-p` when no password is wanted (default: "-")
    ///
    /// Must differ from the empty string so that "no password" and an explicit empty
    /// password stay distinguishable on the command line.
    #[serde(default = "default_no_password_sentinel")]
    pub no_password_sentinel: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            archiver_path: None,
            password_file: None,
            try_no_password: true,
            no_password_sentinel: default_no_password_sentinel(),
        }
    }
}

/// Where complete multi-volume sets are gathered before extraction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeStaging {
    /// Move stray volumes next to the first volume and extract there (default)
    #[default]
    InPlace,
    /// Move every volume into a fresh folder under the staging root
    StagingRoot,
}

/// Archive extraction policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Minimum output/input size ratio accepted as a real extraction (default: 0.5)
    #[serde(default = "default_success_ratio")]
    pub success_ratio: f64,

    /// Output/input ratio below which a "successful" exit means a wrong password (default: 0.05)
    ///
    /// Ratios between this value and `success_ratio` are treated as a terminal failure.
    #[serde(default = "default_wrong_password_ratio")]
    pub wrong_password_ratio: f64,

    /// `.txt`/`.md` files smaller than this are incidental documentation (default: 64 KiB)
    #[serde(default = "default_text_size_threshold")]
    pub text_size_threshold: u64,

    /// Treat `name.r00` as the first volume of a legacy RAR set (default: true)
    #[serde(default = "default_true")]
    pub r00_is_first: bool,

    /// Volume co-location policy
    #[serde(default)]
    pub volume_staging: VolumeStaging,

    /// Delete archive files once their extracted output is confirmed (default: true)
    #[serde(default = "default_true")]
    pub delete_consumed_archives: bool,

    /// Move the password that opened an archive to the front for the rest of the run
    /// (default: true)
    #[serde(default = "default_true")]
    pub promote_successful_password: bool,

    /// Probe files whose extension only resembles an archive extension (default: true)
    #[serde(default = "default_true")]
    pub probe_disguised_archives: bool,

    /// Maximum nesting depth (None = unlimited)
    #[serde(default)]
    pub max_recursion_depth: Option<u32>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            success_ratio: default_success_ratio(),
            wrong_password_ratio: default_wrong_password_ratio(),
            text_size_threshold: default_text_size_threshold(),
            r00_is_first: true,
            volume_staging: VolumeStaging::default(),
            delete_consumed_archives: true,
            promote_successful_password: true,
            probe_disguised_archives: true,
            max_recursion_depth: None,
        }
    }
}

/// When a lone child directory is considered redundant with its parent
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedundancyRule {
    /// Names are equal (case-insensitive)
    SameName,
    /// One name contains the other (case-insensitive, default)
    #[default]
    Containment,
    /// Always merge a lone child
    Always,
}

/// Directory normalization settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Normalize final results before relocation (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How many levels of nesting may be collapsed (default: 3)
    #[serde(default = "default_normalize_depth")]
    pub max_depth: u32,

    /// Merge predicate
    #[serde(default)]
    pub rule: RedundancyRule,

    /// Move to a ` (n)` name instead of merging when the destination is taken (default: false)
    #[serde(default)]
    pub rename_on_collision: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: default_normalize_depth(),
            rule: RedundancyRule::default(),
            rename_on_collision: false,
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file; missing keys take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and root layout
    pub fn validate(&self) -> Result<()> {
        let extraction = &self.extraction;
        if extraction.wrong_password_ratio.is_nan() || extraction.wrong_password_ratio < 0.0 {
            return Err(Error::Config {
                message: format!(
                    "wrong_password_ratio must be non-negative, got {}",
                    extraction.wrong_password_ratio
                ),
                key: Some("extraction.wrong_password_ratio".to_string()),
            });
        }
        if extraction.success_ratio.is_nan()
            || extraction.success_ratio <= extraction.wrong_password_ratio
        {
            return Err(Error::Config {
                message: format!(
                    "success_ratio ({}) must be greater than wrong_password_ratio ({})",
                    extraction.success_ratio, extraction.wrong_password_ratio
                ),
                key: Some("extraction.success_ratio".to_string()),
            });
        }
        if self.tools.no_password_sentinel.is_empty() {
            return Err(Error::Config {
                message: "no_password_sentinel must not be empty".to_string(),
                key: Some("tools.no_password_sentinel".to_string()),
            });
        }

        let roots = [
            ("roots.staging_dir", &self.roots.staging_dir),
            ("roots.success_dir", &self.roots.success_dir),
            ("roots.failure_dir", &self.roots.failure_dir),
        ];
        for (i, (key, a)) in roots.iter().enumerate() {
            for (_, b) in roots.iter().skip(i + 1) {
                if a == b {
                    return Err(Error::Config {
                        message: format!("{} shares its path with another root", a.display()),
                        key: Some((*key).to_string()),
                    });
                }
            }
        }
        Ok(())
    }
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./staging")
}

fn default_success_dir() -> PathBuf {
    PathBuf::from("./unpacked")
}

fn default_failure_dir() -> PathBuf {
    PathBuf::from("./failed")
}

fn default_true() -> bool {
    true
}

fn default_no_password_sentinel() -> String {
    "-".to_string()
}

fn default_success_ratio() -> f64 {
    0.5
}

fn default_wrong_password_ratio() -> f64 {
    0.05
}

fn default_text_size_threshold() -> u64 {
    64 * 1024
}

fn default_normalize_depth() -> u32 {
    3
}
