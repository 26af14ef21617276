//! Password trial state machine
//!
//! Every password gets a fresh output directory. An attempt is judged by the
//! archiver's exit code and by how much output it produced relative to the archive
//! size, since some archivers report success for a wrong password on formats
//! without integrity checks.

use super::password_list::PasswordList;
use super::process::{ArchiveTool, PasswordArg, ProcessOutput};
use crate::config::ExtractionConfig;
use crate::error::{Error, ExtractError, NO_CORRECT_PASSWORD, Result};
use crate::types::{Event, ExtractionOutcome};
use crate::utils::{dir_size, get_unique_path};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Output/input ratio thresholds
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatioThresholds {
    /// Ratios at or above this are a success
    pub success_ratio: f64,
    /// Ratios below this (with exit code 0) mean a wrong password
    pub wrong_password_ratio: f64,
}

impl Default for RatioThresholds {
    fn default() -> Self {
        Self::from(&ExtractionConfig::default())
    }
}

impl From<&ExtractionConfig> for RatioThresholds {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            success_ratio: config.success_ratio,
            wrong_password_ratio: config.wrong_password_ratio,
        }
    }
}

/// `extracted / archive`, or 0 for an empty archive
pub fn size_ratio(extracted_bytes: u64, archive_bytes: u64) -> f64 {
    if archive_bytes == 0 {
        return 0.0;
    }
    extracted_bytes as f64 / archive_bytes as f64
}

/// Judge one attempt that wrote into `output_dir`
pub fn judge_attempt(
    output: &ProcessOutput,
    ratio: f64,
    output_dir: &Path,
    thresholds: &RatioThresholds,
) -> ExtractionOutcome {
    if !output.success() {
        if output
            .stderr
            .iter()
            .any(|line| line.to_lowercase().contains("wrong password"))
        {
            return ExtractionOutcome::WrongPassword;
        }
        return ExtractionOutcome::Failed(failure_reason(output));
    }

    if ratio >= thresholds.success_ratio {
        ExtractionOutcome::Success(output_dir.to_path_buf())
    } else if ratio >= thresholds.wrong_password_ratio {
        ExtractionOutcome::Failed(format!(
            "output is only {:.1}% of the archive size",
            ratio * 100.0
        ))
    } else {
        ExtractionOutcome::WrongPassword
    }
}

fn failure_reason(output: &ProcessOutput) -> String {
    output
        .stderr
        .iter()
        .find(|line| line.to_lowercase().contains("error"))
        .or_else(|| output.stderr.iter().rev().find(|line| !line.trim().is_empty()))
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| format!("archiver exited with code {}", output.exit_code))
}

/// One archive or complete volume set ready for extraction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionUnit {
    /// File handed to the archiver (the first volume of a set)
    pub representative: PathBuf,
    /// Every file of the unit, including the representative
    pub members: Vec<PathBuf>,
    /// Name for the output directory
    pub base_name: String,
}

impl ExtractionUnit {
    /// Total size of all members on disk
    pub fn archive_bytes(&self) -> u64 {
        self.members
            .iter()
            .filter_map(|path| std::fs::metadata(path).ok())
            .map(|metadata| metadata.len())
            .sum()
    }
}

/// A kept extraction
#[derive(Clone, Debug, PartialEq)]
pub struct TrialSuccess {
    /// Directory holding the extracted content
    pub output_dir: PathBuf,
    /// The password entry that worked
    pub password: Option<String>,
    /// Output/input size ratio
    pub ratio: f64,
}

/// Tries passwords against one [`ExtractionUnit`] until one is accepted
pub struct PasswordTrialExtractor<'a> {
    tool: &'a dyn ArchiveTool,
    thresholds: RatioThresholds,
    events: &'a broadcast::Sender<Event>,
}

impl<'a> PasswordTrialExtractor<'a> {
    /// Create an extractor that reports progress on `events`
    pub fn new(
        tool: &'a dyn ArchiveTool,
        thresholds: RatioThresholds,
        events: &'a broadcast::Sender<Event>,
    ) -> Self {
        Self {
            tool,
            thresholds,
            events,
        }
    }

    /// Try each password in order
    ///
    /// Output of rejected attempts is removed. Exhausting the list yields
    /// [`ExtractError::ExtractionFailed`] with reason [`NO_CORRECT_PASSWORD`]; an empty
    /// list yields [`ExtractError::NoPasswordsAvailable`]. A failure to launch the
    /// archiver is returned as is.
    pub async fn extract(
        &self,
        unit: &ExtractionUnit,
        passwords: &PasswordList,
    ) -> Result<TrialSuccess> {
        let archive_path = unit.representative.as_path();
        if passwords.is_empty() {
            warn!(?archive_path, "no passwords to try");
            return Err(ExtractError::NoPasswordsAvailable {
                archive: archive_path.to_path_buf(),
            }
            .into());
        }

        let parent = archive_path.parent().ok_or_else(|| ExtractError::InvalidPath {
            path: archive_path.to_path_buf(),
            reason: "archive has no parent directory".to_string(),
        })?;
        let archive_bytes = unit.archive_bytes();
        let total = passwords.len();

        info!(
            ?archive_path,
            volumes = unit.members.len(),
            password_count = total,
            "attempting extraction with {} password(s)",
            total
        );

        for (i, password) in passwords.iter().enumerate() {
            let attempt = i + 1;
            self.events
                .send(Event::Extracting {
                    archive: archive_path.to_path_buf(),
                    attempt,
                    total,
                })
                .ok();

            let output_dir = get_unique_path(&parent.join(&unit.base_name))?;
            tokio::fs::create_dir_all(&output_dir).await?;

            debug!(
                ?archive_path,
                ?output_dir,
                attempt,
                total,
                "trying password {}/{}",
                attempt,
                total
            );

            let output = match self
                .tool
                .extract(archive_path, &output_dir, PasswordArg::from_entry(password))
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    discard(&output_dir).await;
                    return Err(e);
                }
            };

            let ratio = size_ratio(dir_size(&output_dir), archive_bytes);
            match judge_attempt(&output, ratio, &output_dir, &self.thresholds) {
                ExtractionOutcome::Success(output_dir) => {
                    info!(?archive_path, ?output_dir, attempt, ratio, "extraction successful");
                    self.events
                        .send(Event::Extracted {
                            archive: archive_path.to_path_buf(),
                            output: output_dir.clone(),
                            ratio,
                        })
                        .ok();
                    return Ok(TrialSuccess {
                        output_dir,
                        password: password.clone(),
                        ratio,
                    });
                }
                ExtractionOutcome::WrongPassword => {
                    debug!(?archive_path, attempt, ratio, "wrong password, trying next");
                    discard(&output_dir).await;
                    self.events
                        .send(Event::WrongPassword {
                            archive: archive_path.to_path_buf(),
                            attempt,
                        })
                        .ok();
                }
                ExtractionOutcome::Failed(reason) => {
                    warn!(
                        ?archive_path,
                        attempt,
                        %reason,
                        "extraction failed with non-password error"
                    );
                    discard(&output_dir).await;
                    return Err(Error::Extract(ExtractError::ExtractionFailed {
                        archive: archive_path.to_path_buf(),
                        reason,
                    }));
                }
            }
        }

        warn!(?archive_path, attempted = total, "all passwords failed");
        Err(ExtractError::ExtractionFailed {
            archive: archive_path.to_path_buf(),
            reason: NO_CORRECT_PASSWORD.to_string(),
        }
        .into())
    }
}

async fn discard(output_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(output_dir).await {
        warn!(?output_dir, error = %e, "failed to remove rejected output");
    }
}
