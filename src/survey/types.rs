//! Common types for the survey pipeline

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::index::types::{ModuleFileHit, ReleaseMetadata};
use crate::version::PerlVersion;

/// A release that provides an installed module at the installed version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRelease {
    pub distribution: String,
    /// Release identifier, e.g. "Foo-Bar-1.23"
    pub release: String,
    pub author: String,
    pub version: PerlVersion,
    pub date: Option<String>,
    pub download_url: Option<String>,
    pub maturity: Option<String>,
}

impl CandidateRelease {
    pub fn from_hit(hit: ModuleFileHit) -> Self {
        let version = release_version(&hit.release, &hit.distribution, hit.version.as_deref());
        Self {
            distribution: hit.distribution,
            release: hit.release,
            author: hit.author,
            version,
            date: hit.date,
            download_url: hit.download_url,
            maturity: hit.maturity,
        }
    }
}

/// Candidates for one module keyed by release identifier
pub type CandidateSet = BTreeMap<String, CandidateRelease>;

/// Version of a release, taken from its name (`Foo-Bar-1.23` -> `1.23`).
/// When the name carries no parseable version, the module version the index
/// reported for the matched file stands in for it.
pub fn release_version(release: &str, distribution: &str, reported: Option<&str>) -> PerlVersion {
    release
        .strip_prefix(distribution)
        .and_then(|rest| rest.strip_prefix('-'))
        .map(|suffix| suffix.trim_end_matches("-TRIAL"))
        .and_then(|suffix| PerlVersion::parse(suffix).ok())
        .or_else(|| reported.and_then(|v| PerlVersion::parse(v).ok()))
        .unwrap_or_else(PerlVersion::zero)
}

/// A module as provided by a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub version: Option<String>,
    pub file_size: u64,
    pub path: String,
}

/// Every module a release provides, keyed by module name
pub type ReleaseModuleManifest = BTreeMap<String, ManifestEntry>;

/// A candidate release with its installed fraction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRelease {
    pub candidate: CandidateRelease,
    pub fraction_installed: f64,
}

impl ScoredRelease {
    pub fn new(candidate: CandidateRelease, fraction_installed: f64) -> Self {
        Self {
            candidate,
            fraction_installed,
        }
    }

    pub fn release(&self) -> &str {
        &self.candidate.release
    }

    pub fn distribution(&self) -> &str {
        &self.candidate.distribution
    }

    /// Installed fraction as a percentage with two decimals
    pub fn percent_installed(&self) -> f64 {
        (self.fraction_installed * 10_000.0).round() / 100.0
    }
}

/// Why a module's candidates came from a looser query, or none were found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleFlag {
    /// The index has this module version, but no file of the local size
    FileSizeMismatch,
    /// The index has no file for this module version at all
    VersionNotOnCpan,
}

impl ModuleFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleFlag::FileSizeMismatch => "file_size_mismatch",
            ModuleFlag::VersionNotOnCpan => "version_not_on_cpan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallKind {
    Installed,
    Remnant,
}

/// Scoring evidence attached to each resolved release
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistData {
    pub distribution: String,
    pub release: String,
    pub author: String,
    pub version: PerlVersion,
    pub fraction_installed: f64,
    pub percent_installed: f64,
    /// Installed modules this release explains
    pub modules: Vec<String>,
    /// Releases that tied with this one for at least one module
    pub or: Vec<String>,
}

/// One release the survey concluded is (or was) installed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedInstallation {
    pub installation: InstallKind,
    #[serde(flatten)]
    pub metadata: ReleaseMetadata,
    /// Download path relative to a CPAN mirror root, e.g. "authors/id/A/AL/ALICE/Foo-1.0.tar.gz"
    pub url: String,
    /// Release date as YYYY-MM-DD, when the index reported one
    pub released: Option<String>,
    /// `name=version` pairs for every module of the release, joined by `;`
    pub modvers: String,
    pub dist_data: DistData,
    pub mods_in_rel: ReleaseModuleManifest,
}

impl ResolvedInstallation {
    pub fn distribution(&self) -> &str {
        &self.dist_data.distribution
    }

    pub fn release(&self) -> &str {
        &self.dist_data.release
    }
}
