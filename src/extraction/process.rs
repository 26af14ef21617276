//! External archiver invocation
//!
//! The [`ArchiveTool`] trait is the seam between the orchestrator and the program
//! that actually decompresses bytes. [`CliArchiveTool`] drives a 7-Zip compatible
//! binary; tests substitute a scripted in-memory double.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Binaries tried, in order, when no archiver path is configured
pub const ARCHIVER_BINARIES: [&str; 3] = ["7z", "7zz", "7za"];

/// Captured result of one archiver invocation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code (-1 when the process was terminated by a signal)
    pub exit_code: i32,
    /// Standard output, split into lines
    pub stdout: Vec<String>,
    /// Standard error, split into lines
    pub stderr: Vec<String>,
}

impl ProcessOutput {
    /// Whether the archiver exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Standard output followed by standard error
    pub fn all_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.iter().chain(self.stderr.iter()).map(String::as_str)
    }

    fn from_std(output: std::process::Output) -> Self {
        Self {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: split_lines(&output.stdout),
            stderr: split_lines(&output.stderr),
        }
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

/// Password argument for one invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordArg<'a> {
    /// No password; rendered with the configured sentinel
    None,
    /// A concrete password, possibly empty
    Some(&'a str),
}

impl<'a> PasswordArg<'a> {
    /// Borrow a password list entry as an argument
    pub fn from_entry(entry: &'a Option<String>) -> Self {
        match entry {
            Some(pw) => PasswordArg::Some(pw),
            None => PasswordArg::None,
        }
    }

    /// Render as a `-p…` switch
    ///
    /// # Examples
    ///
    /// ```
    /// use nested_unpack::extraction::PasswordArg;
    ///
    /// assert_eq!(PasswordArg::None.render("-"), "-p-");
    /// assert_eq!(PasswordArg::Some("").render("-"), "-p");
    /// assert_eq!(PasswordArg::Some("hunter2").render("-"), "-phunter2");
    /// ```
    pub fn render(self, sentinel: &str) -> String {
        match self {
            PasswordArg::None => format!("-p{}", sentinel),
            PasswordArg::Some(pw) => format!("-p{}", pw),
        }
    }
}

/// Archive listing and extraction backend
#[async_trait]
pub trait ArchiveTool: Send + Sync {
    /// List an archive with technical details (`l -slt`)
    ///
    /// A non-zero exit is not an error; only a failure to start the program is.
    async fn list(&self, archive: &Path, password: PasswordArg<'_>) -> crate::Result<ProcessOutput>;

    /// Extract an archive into `dest` (`x -o<dest>`)
    async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        password: PasswordArg<'_>,
    ) -> crate::Result<ProcessOutput>;

    /// Get the name of this tool
    fn name(&self) -> &'static str;
}

/// [`ArchiveTool`] backed by a 7-Zip compatible command line program
///
/// # Examples
///
/// ```no_run
/// use nested_unpack::extraction::{ArchiveTool, CliArchiveTool, PasswordArg};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tool = CliArchiveTool::from_path().ok_or("7z not found in PATH")?;
/// let output = tool.list(Path::new("backup.7z"), PasswordArg::None).await?;
/// println!("exit code {}", output.exit_code);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct CliArchiveTool {
    binary_path: PathBuf,
    no_password_sentinel: String,
}

impl CliArchiveTool {
    /// Create a tool with an explicit binary path and the default `-` sentinel
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            no_password_sentinel: "-".to_string(),
        }
    }

    /// Replace the value rendered after `-p` when no password is wanted
    pub fn with_no_password_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.no_password_sentinel = sentinel.into();
        self
    }

    /// Attempt to find `7z`, `7zz` or `7za` in PATH
    pub fn from_path() -> Option<Self> {
        ARCHIVER_BINARIES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(Self::new)
    }

    /// Build from configuration: explicit path if set, PATH discovery otherwise
    pub fn from_config(tools: &crate::config::ToolsConfig) -> Option<Self> {
        let tool = match &tools.archiver_path {
            Some(path) => Self::new(path.clone()),
            None => Self::from_path()?,
        };
        Some(tool.with_no_password_sentinel(tools.no_password_sentinel.clone()))
    }

    /// Path of the archiver binary
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    async fn run(&self, args: Vec<std::ffi::OsString>) -> crate::Result<ProcessOutput> {
        debug!(binary = ?self.binary_path, ?args, "running archiver");
        // `output()` drains stdout and stderr concurrently until exit
        let output = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| crate::Error::ProcessLaunchFailed {
                program: self.binary_path.clone(),
                reason: e.to_string(),
            })?;
        Ok(ProcessOutput::from_std(output))
    }
}

#[async_trait]
impl ArchiveTool for CliArchiveTool {
    async fn list(
        &self,
        archive: &Path,
        password: PasswordArg<'_>,
    ) -> crate::Result<ProcessOutput> {
        let args = vec![
            "l".into(),
            "-slt".into(),
            "-y".into(),
            password.render(&self.no_password_sentinel).into(),
            archive.as_os_str().to_owned(),
        ];
        self.run(args).await
    }

    async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        password: PasswordArg<'_>,
    ) -> crate::Result<ProcessOutput> {
        let mut out_switch = std::ffi::OsString::from("-o");
        out_switch.push(dest.as_os_str());
        let args = vec![
            "x".into(),
            "-y".into(),
            password.render(&self.no_password_sentinel).into(),
            out_switch,
            archive.as_os_str().to_owned(),
        ];
        self.run(args).await
    }

    fn name(&self) -> &'static str {
        "cli-7z"
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_rendering_distinguishes_none_and_empty() {
        assert_eq!(PasswordArg::None.render("-"), "-p-");
        assert_eq!(PasswordArg::Some("").render("-"), "-p");
        assert_eq!(PasswordArg::Some("s3cret").render("-"), "-ps3cret");
        assert_eq!(PasswordArg::None.render("none"), "-pnone");
    }

    #[test]
    fn password_arg_from_list_entry() {
        let none: Option<String> = None;
        let empty = Some(String::new());
        assert_eq!(PasswordArg::from_entry(&none), PasswordArg::None);
        assert_eq!(PasswordArg::from_entry(&empty), PasswordArg::Some(""));
    }

    #[test]
    fn output_lines_are_split_without_carriage_returns() {
        assert_eq!(split_lines(b"a\r\nb\n\nc"), vec!["a", "b", "", "c"]);
        assert!(split_lines(b"").is_empty());
    }

    #[test]
    fn from_config_prefers_explicit_path() {
        let tools = crate::config::ToolsConfig {
            archiver_path: Some(PathBuf::from("/opt/7zip/7zz")),
            no_password_sentinel: "x".to_string(),
            ..Default::default()
        };
        let tool = CliArchiveTool::from_config(&tools).unwrap();
        assert_eq!(tool.binary_path(), Path::new("/opt/7zip/7zz"));
        assert_eq!(tool.no_password_sentinel, "x");
        assert_eq!(tool.name(), "cli-7z");
    }

    #[test]
    fn from_path_matches_which() {
        let expected = ARCHIVER_BINARIES
            .iter()
            .find_map(|name| which::which(name).ok());
        let found = CliArchiveTool::from_path().map(|t| t.binary_path);
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_failure() {
        let tool = CliArchiveTool::new(PathBuf::from("/nonexistent/bin/7z-missing"));
        let err = tool
            .list(Path::new("whatever.7z"), PasswordArg::None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::ProcessLaunchFailed { .. }));
        assert!(err.is_fatal());
    }
}
