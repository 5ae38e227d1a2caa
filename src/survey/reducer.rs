//! Distribution reduction
//!
//! Every module votes for the releases that best explain it. Per
//! distribution, one release is chosen as installed and the rest become
//! remnants of earlier installations.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::index::error::IndexError;
use crate::survey::context::SurveyContext;
use crate::survey::types::{
    DistData, InstallKind, ReleaseModuleManifest, ResolvedInstallation, ScoredRelease,
};

/// Why a release was kept for a distribution
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseEvidence {
    pub scored: ScoredRelease,
    /// Installed modules that selected this release
    pub modules: Vec<String>,
    /// Releases that tied with this one for some module
    pub alternatives: BTreeSet<String>,
}

/// Distribution name -> release identifier -> evidence
#[derive(Debug, Clone, Default)]
pub struct DistributionAggregate {
    distributions: BTreeMap<String, BTreeMap<String, ReleaseEvidence>>,
}

impl DistributionAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the releases selected for one module
    pub fn record(&mut self, module: &str, best: &[ScoredRelease]) {
        for scored in best {
            let evidence = self
                .distributions
                .entry(scored.distribution().to_string())
                .or_default()
                .entry(scored.release().to_string())
                .or_insert_with(|| ReleaseEvidence {
                    scored: scored.clone(),
                    modules: Vec::new(),
                    alternatives: BTreeSet::new(),
                });

            evidence.modules.push(module.to_string());
            evidence.alternatives.extend(
                best.iter()
                    .map(|other| other.release())
                    .filter(|other| *other != scored.release())
                    .map(str::to_string),
            );
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, ReleaseEvidence>)> {
        self.distributions.iter()
    }

    pub fn len(&self) -> usize {
        self.distributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distributions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reduction<'a> {
    pub installed: &'a ReleaseEvidence,
    /// Every other release of the distribution, oldest first
    pub remnants: Vec<&'a ReleaseEvidence>,
    /// The highest version and the highest fraction pointed at different releases
    pub ambiguous: bool,
}

/// Choose the installed release of one distribution.
///
/// The newest release and the most installed release usually agree. When
/// they don't, the newest one wins and the disagreement is reported.
pub fn reduce<'a>(
    distribution: &str,
    releases: &'a BTreeMap<String, ReleaseEvidence>,
) -> Option<Reduction<'a>> {
    let by_version = releases.values().max_by(|a, b| {
        a.scored
            .candidate
            .version
            .cmp(&b.scored.candidate.version)
            .then(a.scored.fraction_installed.total_cmp(&b.scored.fraction_installed))
            .then(a.scored.release().cmp(b.scored.release()))
    })?;
    let by_fraction = releases.values().max_by(|a, b| {
        a.scored
            .fraction_installed
            .total_cmp(&b.scored.fraction_installed)
            .then(a.scored.candidate.version.cmp(&b.scored.candidate.version))
            .then(a.scored.release().cmp(b.scored.release()))
    })?;

    let ambiguous = by_version.scored.release() != by_fraction.scored.release();
    if ambiguous {
        warn!(
            "{}: newest release {} ({:.2}) and most installed release {} ({:.2}) differ; using {}",
            distribution,
            by_version.scored.release(),
            by_version.scored.fraction_installed,
            by_fraction.scored.release(),
            by_fraction.scored.fraction_installed,
            by_version.scored.release()
        );
    }

    let mut remnants: Vec<&ReleaseEvidence> = releases
        .values()
        .filter(|e| e.scored.release() != by_version.scored.release())
        .collect();
    remnants.sort_by(|a, b| {
        a.scored
            .candidate
            .version
            .cmp(&b.scored.candidate.version)
            .then(a.scored.release().cmp(b.scored.release()))
    });

    Some(Reduction {
        installed: by_version,
        remnants,
        ambiguous,
    })
}

/// Fetch metadata and the module manifest for a chosen release.
///
/// Returns `Ok(None)` when a non-fatal fetch failure means the release has
/// to be skipped.
pub async fn resolve_release(
    ctx: &SurveyContext,
    evidence: &ReleaseEvidence,
    kind: InstallKind,
) -> Result<Option<ResolvedInstallation>, IndexError> {
    let candidate = &evidence.scored.candidate;

    ctx.record_remote_call();
    let mut metadata = match ctx
        .index()
        .release_metadata(&candidate.author, &candidate.release)
        .await
    {
        Ok(metadata) => metadata,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!("Skipping {}: {}", candidate.release, e);
            return Ok(None);
        }
    };

    let manifest = match ctx.manifest(&candidate.author, &candidate.release).await {
        Ok(manifest) => manifest,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!("Skipping {}: {}", candidate.release, e);
            return Ok(None);
        }
    };

    let download_url = metadata
        .get("download_url")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| candidate.download_url.clone());
    let date = metadata
        .get("date")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| candidate.date.clone());

    // Keys produced by the survey itself take precedence
    for key in ["installation", "url", "released", "modvers", "dist_data", "mods_in_rel"] {
        metadata.remove(key);
    }

    debug!("Resolved {} as {:?}", candidate.release, kind);

    Ok(Some(ResolvedInstallation {
        installation: kind,
        metadata,
        url: canonical_url(download_url.as_deref(), &candidate.author, &candidate.release),
        released: date.as_deref().and_then(release_day),
        modvers: modvers(&manifest),
        dist_data: DistData {
            distribution: candidate.distribution.clone(),
            release: candidate.release.clone(),
            author: candidate.author.clone(),
            version: candidate.version.clone(),
            fraction_installed: evidence.scored.fraction_installed,
            percent_installed: evidence.scored.percent_installed(),
            modules: evidence.modules.clone(),
            or: evidence.alternatives.iter().cloned().collect(),
        },
        mods_in_rel: (*manifest).clone(),
    }))
}

/// Download path relative to a mirror root: `authors/id/A/AU/AUTHOR/Release.tar.gz`
pub fn canonical_url(download_url: Option<&str>, author: &str, release: &str) -> String {
    if let Some(url) = download_url {
        return match url.find("authors/") {
            Some(pos) => url[pos..].to_string(),
            None => url.to_string(),
        };
    }

    let author = author.to_uppercase();
    let first: String = author.chars().take(1).collect();
    let first_two: String = author.chars().take(2).collect();
    format!(
        "authors/id/{}/{}/{}/{}.tar.gz",
        first, first_two, author, release
    )
}

/// `name=version` for every module, sorted by name and joined with `;`
pub fn modvers(manifest: &ReleaseModuleManifest) -> String {
    manifest
        .iter()
        .map(|(name, entry)| format!("{}={}", name, entry.version.as_deref().unwrap_or("undef")))
        .collect::<Vec<_>>()
        .join(";")
}

/// `2012-03-04T05:06:07` -> `2012-03-04`
pub fn release_day(date: &str) -> Option<String> {
    NaiveDateTime::parse_from_str(date.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|datetime| datetime.format("%Y-%m-%d").to_string())
}
