//! Release inference for an installed module tree
//!
//! # Pipeline
//!
//! ```text
//! Inventory ──▶ candidates ──▶ scorer ──▶ disambiguate ──▶ reducer ──▶ SurveyReport
//!  (modules)    (per module)   (fraction)  (install log)   (per dist)
//! ```
//!
//! Modules are resolved concurrently and merged in name order, so the
//! report does not depend on completion order.
//!
//! # Modules
//!
//! - [`candidates`]: Index lookup of releases containing a module version
//! - [`scorer`]: Release manifests and installed-fraction scoring
//! - [`disambiguate`]: Install-log tie breaking
//! - [`overrides`]: Primary module names of irregular distributions
//! - [`reducer`]: Per-distribution choice of installed release and remnants
//! - [`context`]: Per-run state: index, install log, options, counters
//! - [`types`]: Records passed between the stages
//! - [`error`]: Run-aborting errors

pub mod candidates;
pub mod context;
pub mod disambiguate;
pub mod error;
pub mod overrides;
pub mod reducer;
pub mod scorer;
pub mod types;

use std::pin::pin;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::index::error::IndexError;
use crate::inventory::{InstalledModule, Inventory};
use crate::survey::candidates::resolve_candidates;
use crate::survey::context::SurveyContext;
use crate::survey::disambiguate::{Narrowed, narrow};
use crate::survey::error::SurveyError;
use crate::survey::reducer::{DistributionAggregate, reduce, resolve_release};
use crate::survey::scorer::best_releases;
use crate::survey::types::{InstallKind, ModuleFlag, ResolvedInstallation, ScoredRelease};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    /// At least one release explains the module
    Resolved,
    /// Unversioned module matching several releases equally
    Unresolvable,
    /// The index knows no release with this module version
    NoCandidates,
    /// A non-fatal index failure
    Failed,
}

/// What the survey concluded about one installed module
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleFinding {
    pub module: String,
    pub version: Option<String>,
    pub status: ModuleStatus,
    pub flag: Option<ModuleFlag>,
    /// Releases selected for the module
    pub releases: Vec<String>,
    pub error: Option<String>,
}

impl ModuleFinding {
    fn new(module: &InstalledModule) -> Self {
        Self {
            module: module.name.clone(),
            version: module.version.as_ref().map(|v| v.to_string()),
            status: ModuleStatus::NoCandidates,
            flag: None,
            releases: Vec::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SurveyReport {
    /// Installed releases, each preceded by its remnants when they were requested
    pub releases: Vec<ResolvedInstallation>,
    /// One finding per installed module, in name order
    pub findings: Vec<ModuleFinding>,
    /// Distributions whose newest and most installed releases differ
    pub ambiguous: Vec<String>,
    pub remote_calls: usize,
}

impl SurveyReport {
    pub fn installed(&self) -> impl Iterator<Item = &ResolvedInstallation> {
        self.releases
            .iter()
            .filter(|r| r.installation == InstallKind::Installed)
    }

    pub fn remnants(&self) -> impl Iterator<Item = &ResolvedInstallation> {
        self.releases
            .iter()
            .filter(|r| r.installation == InstallKind::Remnant)
    }

    /// Modules no release was found for
    pub fn unresolved(&self) -> impl Iterator<Item = &ModuleFinding> {
        self.findings
            .iter()
            .filter(|f| f.status != ModuleStatus::Resolved)
    }
}

struct ModuleResolution {
    finding: ModuleFinding,
    best: Vec<ScoredRelease>,
}

/// Infer the releases that produced `inventory`.
///
/// Fatal index errors stop the run; any other failure only affects the
/// module or release it occurred for.
pub async fn survey(ctx: &SurveyContext, inventory: &Inventory) -> Result<SurveyReport, SurveyError> {
    info!("Surveying {} modules", inventory.len());

    let mut resolutions = pin!(
        stream::iter(inventory.iter())
            .map(|module| resolve_module(ctx, inventory, module))
            .buffered(ctx.options().concurrency.max(1))
    );

    let mut aggregate = DistributionAggregate::new();
    let mut findings = Vec::with_capacity(inventory.len());
    while let Some(resolution) = resolutions.next().await {
        let resolution = resolution?;
        aggregate.record(&resolution.finding.module, &resolution.best);
        findings.push(resolution.finding);
    }

    info!("Reducing {} distributions", aggregate.len());

    let mut releases = Vec::new();
    let mut ambiguous = Vec::new();
    for (distribution, candidates) in aggregate.iter() {
        let Some(reduction) = reduce(distribution, candidates) else {
            continue;
        };
        if reduction.ambiguous {
            ambiguous.push(distribution.clone());
        }
        debug!(
            "{}: {} installed, {} remnants",
            distribution,
            reduction.installed.scored.release(),
            reduction.remnants.len()
        );

        if ctx.options().include_remnants {
            for remnant in &reduction.remnants {
                let resolved = resolve_release(ctx, remnant, InstallKind::Remnant)
                    .await
                    .map_err(|e| SurveyError::fatal(remnant.scored.release(), e))?;
                releases.extend(resolved);
            }
        }

        let resolved = resolve_release(ctx, reduction.installed, InstallKind::Installed)
            .await
            .map_err(|e| SurveyError::fatal(reduction.installed.scored.release(), e))?;
        releases.extend(resolved);
    }

    let report = SurveyReport {
        releases,
        findings,
        ambiguous,
        remote_calls: ctx.remote_calls(),
    };
    info!(
        "Found {} installed releases using {} index queries",
        report.installed().count(),
        report.remote_calls
    );
    Ok(report)
}

async fn resolve_module(
    ctx: &SurveyContext,
    inventory: &Inventory,
    module: &InstalledModule,
) -> Result<ModuleResolution, SurveyError> {
    let mut finding = ModuleFinding::new(module);
    let version = module.query_version();

    let outcome = match resolve_candidates(ctx, &module.name, &version, module.file_size).await {
        Ok(outcome) => outcome,
        Err(e) => return isolate(finding, e),
    };
    finding.flag = outcome.flag();

    let candidates = outcome.into_candidates();
    if candidates.is_empty() {
        return Ok(ModuleResolution {
            finding,
            best: Vec::new(),
        });
    }

    let best = match best_releases(ctx, &candidates, inventory).await {
        Ok(best) => best,
        Err(e) => return isolate(finding, e),
    };

    let best = match narrow(best, module, ctx.install_log()) {
        Narrowed::Releases(best) => {
            finding.status = ModuleStatus::Resolved;
            best
        }
        Narrowed::Unresolvable(tied) => {
            finding.status = ModuleStatus::Unresolvable;
            finding.releases = tied.iter().map(|s| s.release().to_string()).collect();
            return Ok(ModuleResolution {
                finding,
                best: Vec::new(),
            });
        }
    };

    if best.len() > 1 {
        debug!(
            "{} is explained equally well by {} releases",
            module.name,
            best.len()
        );
    }
    finding.releases = best.iter().map(|s| s.release().to_string()).collect();

    Ok(ModuleResolution { finding, best })
}

/// Confine a non-fatal error to the module it occurred for
fn isolate(mut finding: ModuleFinding, error: IndexError) -> Result<ModuleResolution, SurveyError> {
    if error.is_fatal() {
        return Err(SurveyError::fatal(finding.module, error));
    }

    warn!("Failed to resolve {}: {}", finding.module, error);
    finding.status = ModuleStatus::Failed;
    finding.error = Some(error.to_string());
    Ok(ModuleResolution {
        finding,
        best: Vec::new(),
    })
}
