//! Shared test helpers: a scripted in-memory archiver and file fixtures.

use crate::error::{Error, Result};
use crate::extraction::{ArchiveTool, PasswordArg, ProcessOutput};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// How a fake archive reacts to a wrong password during extraction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WrongPasswordBehavior {
    /// Exit 0 after writing a single garbage byte (unencrypted listing)
    Garbage,
    /// Exit 2 with a "Wrong password" error line
    Error,
}

/// Scripted content of one fake archive
#[derive(Clone, Debug)]
pub(crate) struct FakeArchive {
    pub(crate) type_name: String,
    pub(crate) volumes: u32,
    pub(crate) password: Option<String>,
    pub(crate) encrypted_headers: bool,
    pub(crate) wrong_password: WrongPasswordBehavior,
    pub(crate) entries: Vec<(String, Vec<u8>)>,
    pub(crate) exit_code: i32,
}

impl FakeArchive {
    pub(crate) fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            volumes: 1,
            password: None,
            encrypted_headers: false,
            wrong_password: WrongPasswordBehavior::Garbage,
            entries: Vec::new(),
            exit_code: 0,
        }
    }

    pub(crate) fn volumes(mut self, volumes: u32) -> Self {
        self.volumes = volumes;
        self
    }

    pub(crate) fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub(crate) fn encrypted_headers(mut self) -> Self {
        self.encrypted_headers = true;
        self
    }

    pub(crate) fn wrong_password(mut self, behavior: WrongPasswordBehavior) -> Self {
        self.wrong_password = behavior;
        self
    }

    pub(crate) fn entry(mut self, name: &str, content: impl Into<Vec<u8>>) -> Self {
        self.entries.push((name.to_string(), content.into()));
        self
    }

    pub(crate) fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    fn accepts(&self, password: PasswordArg<'_>) -> bool {
        match (&self.password, password) {
            (None, _) => true,
            (Some(expected), PasswordArg::Some(given)) => expected == given,
            (Some(_), PasswordArg::None) => false,
        }
    }
}

/// One recorded call into the fake
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FakeCall {
    pub(crate) op: &'static str,
    pub(crate) archive: PathBuf,
    pub(crate) password: Option<String>,
}

/// [`ArchiveTool`] answering from a table keyed by file name
#[derive(Default)]
pub(crate) struct FakeArchiveTool {
    archives: Mutex<HashMap<String, FakeArchive>>,
    calls: Mutex<Vec<FakeCall>>,
    launch_fails: bool,
}

impl FakeArchiveTool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A tool whose binary can never be started
    pub(crate) fn unlaunchable() -> Self {
        Self {
            launch_fails: true,
            ..Self::default()
        }
    }

    pub(crate) fn with(self, file_name: &str, archive: FakeArchive) -> Self {
        self.add(file_name, archive);
        self
    }

    pub(crate) fn add(&self, file_name: &str, archive: FakeArchive) {
        self.archives
            .lock()
            .unwrap()
            .insert(file_name.to_string(), archive);
    }

    pub(crate) fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn extract_calls(&self) -> Vec<FakeCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.op == "extract")
            .collect()
    }

    fn lookup(
        &self,
        op: &'static str,
        archive: &Path,
        password: PasswordArg<'_>,
    ) -> Result<Option<FakeArchive>> {
        self.calls.lock().unwrap().push(FakeCall {
            op,
            archive: archive.to_path_buf(),
            password: match password {
                PasswordArg::None => None,
                PasswordArg::Some(pw) => Some(pw.to_string()),
            },
        });
        if self.launch_fails {
            return Err(Error::ProcessLaunchFailed {
                program: PathBuf::from("7z"),
                reason: "No such file or directory (os error 2)".to_string(),
            });
        }
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(self.archives.lock().unwrap().get(&name).cloned())
    }
}

fn not_an_archive(archive: &Path) -> ProcessOutput {
    ProcessOutput {
        exit_code: 2,
        stdout: vec![String::new()],
        stderr: vec![
            format!("ERROR: {}", archive.display()),
            "Can not open the file as archive".to_string(),
        ],
    }
}

#[async_trait]
impl ArchiveTool for FakeArchiveTool {
    async fn list(&self, archive: &Path, password: PasswordArg<'_>) -> Result<ProcessOutput> {
        let Some(fake) = self.lookup("list", archive, password)? else {
            return Ok(not_an_archive(archive));
        };
        if fake.encrypted_headers && !fake.accepts(password) {
            return Ok(ProcessOutput {
                exit_code: 2,
                stdout: Vec::new(),
                stderr: vec![format!(
                    "ERROR: {} : Can not open encrypted archive. Wrong password?",
                    archive.display()
                )],
            });
        }

        let mut stdout = vec![
            "--".to_string(),
            format!("Path = {}", archive.display()),
            format!("Type = {}", fake.type_name),
        ];
        if fake.volumes > 1 {
            stdout.push("Volume Index = 0".to_string());
            stdout.push(format!("Volumes = {}", fake.volumes));
        }
        stdout.push("----------".to_string());
        for (name, content) in &fake.entries {
            stdout.push(format!("Path = {}", name));
            stdout.push(format!("Size = {}", content.len()));
            stdout.push(format!(
                "Encrypted = {}",
                if fake.password.is_some() { "+" } else { "-" }
            ));
            stdout.push(String::new());
        }
        Ok(ProcessOutput {
            exit_code: 0,
            stdout,
            stderr: Vec::new(),
        })
    }

    async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        password: PasswordArg<'_>,
    ) -> Result<ProcessOutput> {
        let Some(fake) = self.lookup("extract", archive, password)? else {
            return Ok(not_an_archive(archive));
        };
        std::fs::create_dir_all(dest)?;

        if !fake.accepts(password) {
            return Ok(match fake.wrong_password {
                WrongPasswordBehavior::Garbage => {
                    std::fs::write(dest.join("garbage.bin"), [0u8])?;
                    ProcessOutput::default()
                }
                WrongPasswordBehavior::Error => ProcessOutput {
                    exit_code: 2,
                    stdout: Vec::new(),
                    stderr: vec!["ERROR: Wrong password : data".to_string()],
                },
            });
        }

        for (name, content) in &fake.entries {
            let target = dest.join(name);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(target, content)?;
        }
        Ok(ProcessOutput {
            exit_code: fake.exit_code,
            stdout: vec!["Everything is Ok".to_string()],
            stderr: if fake.exit_code == 0 {
                Vec::new()
            } else {
                vec!["ERROR: Data Error : data".to_string()]
            },
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Write `len` filler bytes to `path`, creating parent directories
pub(crate) fn write_file(path: &Path, len: usize) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, vec![b'x'; len]).unwrap();
}
