use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_MOUNT_PREFIX: &str = "//data/";

/// VfsConfig controls which files are treated as archives when mounting.
///
/// Every field is optional in the JSON form:
///
/// ```json
/// {
///     "mountPrefix": "//data/",
///     "archiveExtensions": ["vpp_pc"],
///     "nestedExtensions": ["str2_pc"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct VfsConfig {
    #[serde(rename = "mountPrefix")]
    pub mount_prefix: String,
    /// Outer archives found in the mounted directory
    #[serde(rename = "archiveExtensions")]
    pub archive_extensions: Vec<String>,
    /// Logical files inside an outer archive that are containers themselves
    #[serde(rename = "nestedExtensions")]
    pub nested_extensions: Vec<String>,
}

impl Default for VfsConfig {
    fn default() -> Self {
        VfsConfig {
            mount_prefix: DEFAULT_MOUNT_PREFIX.to_string(),
            archive_extensions: vec!["vpp_pc".to_string()],
            nested_extensions: vec!["str2_pc".to_string()],
        }
    }
}

impl VfsConfig {
    /// Load a VfsConfig from a JSON reader
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Load a VfsConfig from a file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn is_archive(&self, name: &str) -> bool {
        has_extension(name, &self.archive_extensions)
    }

    pub fn is_nested_container(&self, name: &str) -> bool {
        has_extension(name, &self.nested_extensions)
    }
}

fn has_extension(name: &str, extensions: &[String]) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => extensions
            .iter()
            .any(|candidate| candidate.trim_start_matches('.').eq_ignore_ascii_case(ext)),
        _ => false,
    }
}
