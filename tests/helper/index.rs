//! In-memory release index for end-to-end survey tests

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;

use dist_surveyor::index::error::IndexError;
use dist_surveyor::index::registry::ReleaseIndex;
use dist_surveyor::index::types::{ModuleFileHit, ReleaseFile, ReleaseMetadata};
use dist_surveyor::inventory::InstalledModule;
use dist_surveyor::version::PerlVersion;

/// A release served by [`FakeIndex`]
#[derive(Debug, Clone)]
pub struct FakeRelease {
    pub author: String,
    pub distribution: String,
    pub version: String,
    pub files: Vec<ReleaseFile>,
}

impl FakeRelease {
    pub fn new(author: &str, distribution: &str, version: &str) -> Self {
        Self {
            author: author.to_string(),
            distribution: distribution.to_string(),
            version: version.to_string(),
            files: Vec::new(),
        }
    }

    pub fn name(&self) -> String {
        format!("{}-{}", self.distribution, self.version)
    }

    /// Add a module file at `lib/<Module/Path>.pm`
    pub fn module(mut self, name: &str, version: Option<&str>, size: u64) -> Self {
        self.files.push(ReleaseFile {
            path: format!("lib/{}.pm", name.replace("::", "/")),
            module_name: name.to_string(),
            module_version: version.map(str::to_string),
            file_size: size,
        });
        self
    }
}

/// Answers queries from a fixed set of releases.
///
/// Unversioned module files are indexed as version `0`, the version an
/// unversioned local module is queried with.
#[derive(Debug, Default)]
pub struct FakeIndex {
    releases: Vec<FakeRelease>,
    too_broad: HashSet<String>,
    without_metadata: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release(mut self, release: FakeRelease) -> Self {
        self.releases.push(release);
        self
    }

    /// Module queries for `module` fail with `CountExceeded`
    pub fn too_broad(mut self, module: &str) -> Self {
        self.too_broad.insert(module.to_string());
        self
    }

    /// Metadata lookups for `release` fail with `NotFound`
    pub fn without_metadata(mut self, release: &str) -> Self {
        self.without_metadata.insert(release.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn find(&self, author: &str, release: &str) -> Option<&FakeRelease> {
        self.releases
            .iter()
            .find(|r| r.author == author && r.name() == release)
    }
}

#[async_trait]
impl ReleaseIndex for FakeIndex {
    async fn files_by_module(
        &self,
        module: &str,
        versions: &[String],
        file_size: Option<u64>,
    ) -> Result<Vec<ModuleFileHit>, IndexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.too_broad.contains(module) {
            return Err(IndexError::CountExceeded {
                query: module.to_string(),
                count: 5000,
                limit: 5000,
            });
        }

        let hits = self
            .releases
            .iter()
            .filter(|release| {
                release.files.iter().any(|file| {
                    let indexed = file.module_version.as_deref().unwrap_or("0");
                    file.module_name == module
                        && versions.iter().any(|v| v == indexed)
                        && file_size.is_none_or(|size| size == file.file_size)
                })
            })
            .map(|release| ModuleFileHit {
                release: release.name(),
                author: release.author.clone(),
                distribution: release.distribution.clone(),
                version: Some(release.version.clone()),
                date: Some("2020-01-02T03:04:05".to_string()),
                download_url: None,
                maturity: Some("released".to_string()),
            })
            .collect();

        Ok(hits)
    }

    async fn files_by_release(
        &self,
        author: &str,
        release: &str,
    ) -> Result<Vec<ReleaseFile>, IndexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        self.find(author, release)
            .map(|r| r.files.clone())
            .ok_or_else(|| IndexError::NotFound(release.to_string()))
    }

    async fn release_metadata(
        &self,
        author: &str,
        release: &str,
    ) -> Result<ReleaseMetadata, IndexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.without_metadata.contains(release) {
            return Err(IndexError::NotFound(release.to_string()));
        }
        let found = self
            .find(author, release)
            .ok_or_else(|| IndexError::NotFound(release.to_string()))?;

        let metadata = json!({
            "name": found.name(),
            "distribution": found.distribution,
            "author": found.author,
            "version": found.version,
            "date": "2020-01-02T03:04:05",
            "status": "cpan"
        });
        metadata
            .as_object()
            .cloned()
            .ok_or_else(|| IndexError::InvalidResponse("metadata is not an object".to_string()))
    }
}

/// An installed module as the scanner would report it
pub fn installed(name: &str, version: Option<&str>, size: u64) -> InstalledModule {
    InstalledModule {
        name: name.to_string(),
        version: version.map(|v| PerlVersion::parse(v).unwrap()),
        file_size: size,
        path: PathBuf::from(format!("/perl/lib/{}.pm", name.replace("::", "/"))),
    }
}

/// Write a module file declaring `version` and return its size in bytes
pub fn write_module(lib: &Path, name: &str, version: &str) -> u64 {
    let path = lib.join(format!("{}.pm", name.replace("::", "/")));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let source = format!("package {};\nour $VERSION = '{}';\n1;\n", name, version);
    std::fs::write(&path, &source).unwrap();
    source.len() as u64
}
