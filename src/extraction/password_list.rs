use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Ordered password candidates for archive extraction
///
/// Each entry is either `None` ("no password") or a concrete password, which may be
/// the empty string. Sources in priority order:
/// 1. No password (when enabled)
/// 2. Explicit passwords supplied by the caller
/// 3. Global password file (one password per line)
///
/// Duplicates are dropped, keeping the first occurrence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PasswordList {
    passwords: Vec<Option<String>>,
}

impl PasswordList {
    /// Collect passwords from all sources, de-duplicated, in priority order
    ///
    /// An unreadable password file is logged and skipped.
    pub async fn collect(
        passwords: &[String],
        password_file: Option<&Path>,
        try_no_password: bool,
    ) -> Self {
        let mut entries: Vec<Option<String>> = Vec::new();
        if try_no_password {
            entries.push(None);
        }
        entries.extend(passwords.iter().cloned().map(Some));

        if let Some(path) = password_file {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => {
                    // Blank lines carry no password; an intentional empty password
                    // has to be passed explicitly.
                    entries.extend(
                        content
                            .lines()
                            .map(str::trim)
                            .filter(|pw| !pw.is_empty())
                            .map(|pw| Some(pw.to_string())),
                    );
                }
                Err(e) => {
                    warn!(?path, error = %e, "could not read password file");
                }
            }
        }

        let list = Self::from_entries(entries);
        debug!("collected {} unique passwords for extraction", list.len());
        list
    }

    /// Build a list from entries in the given order, dropping duplicates
    pub fn from_entries(entries: impl IntoIterator<Item = Option<String>>) -> Self {
        let mut seen = HashSet::new();
        let passwords = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.clone()))
            .collect();
        Self { passwords }
    }

    /// A list holding only the "no password" entry
    pub fn no_password() -> Self {
        Self {
            passwords: vec![None],
        }
    }

    /// Move `password` to the front; no-op when it is not in the list
    pub fn promote(&mut self, password: &Option<String>) {
        if let Some(pos) = self.passwords.iter().position(|p| p == password)
            && pos > 0
        {
            let entry = self.passwords.remove(pos);
            self.passwords.insert(0, entry);
        }
    }

    /// Get an iterator over passwords
    pub fn iter(&self) -> impl Iterator<Item = &Option<String>> {
        self.passwords.iter()
    }

    /// Check if there are any passwords to try
    pub fn is_empty(&self) -> bool {
        self.passwords.is_empty()
    }

    /// Get the number of passwords
    pub fn len(&self) -> usize {
        self.passwords.len()
    }
}
