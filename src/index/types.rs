//! Records returned by the release index

use serde::{Deserialize, Serialize};

/// A file in some release that provides the queried module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleFileHit {
    pub release: String,
    pub author: String,
    pub distribution: String,
    /// Module version declared by the matched file, as the index reports it.
    /// This is not the release's own version.
    pub version: Option<String>,
    pub date: Option<String>,
    pub download_url: Option<String>,
    pub maturity: Option<String>,
}

/// One module declared by one file of a release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseFile {
    pub path: String,
    pub module_name: String,
    pub module_version: Option<String>,
    pub file_size: u64,
}

/// Release metadata fields as returned by the index
pub type ReleaseMetadata = serde_json::Map<String, serde_json::Value>;
