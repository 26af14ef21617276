//! Parser for archiver listing output

use super::process::ProcessOutput;
use crate::types::{ArchiveDescriptor, ArchiveFormat};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

// Fixed literal, known to compile.
#[allow(clippy::expect_used)]
static OPEN_AS_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)can ?not open the file as \[(\w+)\] archive").expect("open-as pattern")
});

/// Archive-level facts read from a successful listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeInfo {
    /// Archive family
    pub format: ArchiveFormat,
    /// Raw `Type = …` value
    pub type_name: String,
    /// 0-based index of the probed volume
    pub volume_index: u32,
    /// Number of volumes reported (1 when the listing does not say)
    pub total_volumes: u32,
    /// Whether any entry or header is encrypted
    pub encrypted: bool,
}

impl ProbeInfo {
    /// Turn the probe into a descriptor for `path`
    pub fn descriptor(&self, path: &Path, prefix: &str) -> ArchiveDescriptor {
        ArchiveDescriptor {
            path: path.to_path_buf(),
            format: self.format,
            volume_index: self.volume_index,
            total_volumes: self.total_volumes,
            common_prefix: (self.total_volumes > 1).then(|| prefix.to_string()),
        }
    }
}

/// Interpretation of one `l -slt` invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeReport {
    /// A supported archive
    Archive(ProbeInfo),
    /// The archive is encrypted and the password did not open it
    WrongPassword,
    /// The archiver trusted the extension and failed; worth one retry without it
    RetryWithoutExtension {
        /// Format the archiver tried because of the extension
        claimed: String,
    },
    /// Not an archive
    NotArchive,
    /// An archive of a family that is never extracted
    Unsupported(String),
}

/// Parse the output of `7z l -slt`
///
/// `first_attempt` is false once the file has already been retried without its
/// extension; an open failure is then final.
pub fn parse_list_output(output: &ProcessOutput, first_attempt: bool) -> ProbeReport {
    if output
        .all_lines()
        .any(|line| line.to_lowercase().contains("wrong password"))
    {
        return ProbeReport::WrongPassword;
    }

    let mut type_name: Option<String> = None;
    let mut volume_index: u32 = 0;
    let mut total_volumes: u32 = 1;
    let mut encrypted = false;

    for line in &output.stdout {
        let Some((key, value)) = line.split_once(" = ") else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            // The split container wraps the real archive; its inner type follows
            "Type" if !value.eq_ignore_ascii_case("split") && type_name.is_none() => {
                type_name = Some(value.to_string());
            }
            "Volume Index" => {
                if let Ok(index) = value.parse() {
                    volume_index = index;
                }
            }
            "Volumes" => {
                if let Ok(count) = value.parse::<u32>() {
                    total_volumes = total_volumes.max(count);
                }
            }
            "Encrypted" if value == "+" => encrypted = true,
            _ => {}
        }
    }

    if let Some(type_name) = type_name {
        let format = ArchiveFormat::from_type_name(&type_name);
        if !format.is_extractable() {
            return ProbeReport::Unsupported(type_name);
        }
        return ProbeReport::Archive(ProbeInfo {
            format,
            type_name,
            volume_index,
            total_volumes,
            encrypted,
        });
    }

    if first_attempt
        && let Some(caps) = output.all_lines().find_map(|line| OPEN_AS_FORMAT.captures(line))
    {
        return ProbeReport::RetryWithoutExtension {
            claimed: caps[1].to_string(),
        };
    }

    ProbeReport::NotArchive
}
