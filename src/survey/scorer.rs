//! Installed-fraction scoring
//!
//! A release's score is the share of its modules found locally at the
//! release's version. A module whose version matches but whose file size
//! differs only counts for a fraction of a match.

use std::path::Path;
use std::sync::LazyLock;

use futures::future::try_join_all;
use regex::Regex;
use tracing::debug;

use crate::index::error::IndexError;
use crate::index::types::ReleaseFile;
use crate::inventory::Inventory;
use crate::survey::context::SurveyContext;
use crate::survey::types::{CandidateSet, ManifestEntry, ReleaseModuleManifest, ScoredRelease};
use crate::version::matches_reported;

/// Modules under these top-level directories are never installed
static EXCLUDED_PATHS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:t|xt|tests?|inc|samples?|ex|examples?|bak|local-lib)\b")
        .expect("valid regex")
});

/// Reduce a release's file list to the modules an installation would put on disk
pub fn build_manifest(files: Vec<ReleaseFile>) -> ReleaseModuleManifest {
    let mut manifest = ReleaseModuleManifest::new();

    for file in files {
        if EXCLUDED_PATHS.is_match(&file.path) {
            continue;
        }
        // Secondary packages declared inside another module's file
        if !declared_in_own_file(&file.module_name, &file.path) {
            continue;
        }
        manifest
            .entry(file.module_name)
            .or_insert_with(|| ManifestEntry {
                version: file.module_version,
                file_size: file.file_size,
                path: file.path,
            });
    }

    manifest
}

fn declared_in_own_file(module: &str, path: &str) -> bool {
    let last_segment = module.rsplit("::").next().unwrap_or(module);
    let base_name = Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .unwrap_or_default();
    last_segment == base_name
}

/// Weighted share of a release's modules that are installed at its version.
///
/// An empty manifest scores zero.
pub fn fraction_installed(
    manifest: &ReleaseModuleManifest,
    inventory: &Inventory,
    size_mismatch_weight: f64,
) -> f64 {
    if manifest.is_empty() {
        return 0.0;
    }

    let mismatch_weight = size_mismatch_weight.clamp(0.0, 1.0);
    let installed: f64 = manifest
        .iter()
        .filter_map(|(name, entry)| {
            let local = inventory.get(name)?;
            if !matches_reported(local.version.as_ref(), entry.version.as_deref()) {
                return None;
            }
            let size_differs =
                entry.file_size != 0 && local.file_size != 0 && entry.file_size != local.file_size;
            Some(if size_differs { mismatch_weight } else { 1.0 })
        })
        .sum();

    installed / manifest.len() as f64
}

/// Candidates sharing the highest fraction, in release order
pub fn select_best(scored: Vec<ScoredRelease>) -> Vec<ScoredRelease> {
    let Some(best) = scored
        .iter()
        .map(|s| s.fraction_installed)
        .max_by(|a, b| a.total_cmp(b))
    else {
        return Vec::new();
    };

    scored
        .into_iter()
        .filter(|s| s.fraction_installed == best)
        .collect()
}

/// Score every candidate against the inventory
pub async fn score_candidates(
    ctx: &SurveyContext,
    candidates: &CandidateSet,
    inventory: &Inventory,
) -> Result<Vec<ScoredRelease>, IndexError> {
    let weight = ctx.options().size_mismatch_weight;

    let scored = try_join_all(candidates.values().map(|candidate| async move {
        let manifest = ctx.manifest(&candidate.author, &candidate.release).await?;
        let fraction = fraction_installed(&manifest, inventory, weight);
        debug!("{} is {:.2} installed", candidate.release, fraction);
        Ok::<_, IndexError>(ScoredRelease::new(candidate.clone(), fraction))
    }))
    .await?;

    Ok(scored)
}

pub async fn best_releases(
    ctx: &SurveyContext,
    candidates: &CandidateSet,
    inventory: &Inventory,
) -> Result<Vec<ScoredRelease>, IndexError> {
    Ok(select_best(score_candidates(ctx, candidates, inventory).await?))
}
