//! Candidate release lookup
//!
//! Asks the index which releases contain a module at the installed version,
//! widening the query step by step when the strict one finds nothing.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::index::error::IndexError;
use crate::index::types::ModuleFileHit;
use crate::survey::context::SurveyContext;
use crate::survey::types::{CandidateRelease, CandidateSet, ModuleFlag};
use crate::version::PerlVersion;

/// Releases of the interpreter itself and its forks bundle core modules and
/// would otherwise match almost everything.
static EXCLUDED_RELEASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:perl|ponie|kurila|parrot|Perl6-Pugs|v6-pugs|cperl)-\d|perl5\.|perl_mlb)")
        .expect("valid regex")
});

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Version and file size both matched
    Exact(CandidateSet),
    /// Only the version matched
    Loose(CandidateSet),
    NoMatch,
}

impl MatchOutcome {
    pub fn flag(&self) -> Option<ModuleFlag> {
        match self {
            MatchOutcome::Exact(_) => None,
            MatchOutcome::Loose(_) => Some(ModuleFlag::FileSizeMismatch),
            MatchOutcome::NoMatch => Some(ModuleFlag::VersionNotOnCpan),
        }
    }

    pub fn into_candidates(self) -> CandidateSet {
        match self {
            MatchOutcome::Exact(set) | MatchOutcome::Loose(set) => set,
            MatchOutcome::NoMatch => CandidateSet::new(),
        }
    }
}

pub fn is_excluded_release(release: &str) -> bool {
    EXCLUDED_RELEASES.is_match(release)
}

/// Find releases containing `module` at `version`.
///
/// The size-filtered query runs first; when it yields nothing the size filter
/// is dropped. A `file_size` of zero means the size is unknown, so only the
/// version query runs.
pub async fn resolve_candidates(
    ctx: &SurveyContext,
    module: &str,
    version: &PerlVersion,
    file_size: u64,
) -> Result<MatchOutcome, IndexError> {
    let variants = version.query_variants();

    if file_size == 0 {
        let found = query(ctx, module, &variants, None).await?;
        return Ok(if found.is_empty() {
            info!("{} {}: version_not_on_cpan", module, version);
            MatchOutcome::NoMatch
        } else {
            MatchOutcome::Exact(found)
        });
    }

    let exact = query(ctx, module, &variants, Some(file_size)).await?;
    if !exact.is_empty() {
        return Ok(MatchOutcome::Exact(exact));
    }

    let loose = query(ctx, module, &variants, None).await?;
    if !loose.is_empty() {
        info!(
            "{} {}: file_size_mismatch ({} bytes locally)",
            module, version, file_size
        );
        return Ok(MatchOutcome::Loose(loose));
    }

    info!("{} {}: version_not_on_cpan", module, version);
    Ok(MatchOutcome::NoMatch)
}

async fn query(
    ctx: &SurveyContext,
    module: &str,
    variants: &[String],
    file_size: Option<u64>,
) -> Result<CandidateSet, IndexError> {
    ctx.record_remote_call();
    let hits = ctx
        .index()
        .files_by_module(module, variants, file_size)
        .await?;
    Ok(collect_candidates(module, hits))
}

fn collect_candidates(module: &str, hits: Vec<ModuleFileHit>) -> CandidateSet {
    let mut candidates = CandidateSet::new();

    for hit in hits {
        if is_excluded_release(&hit.release) {
            debug!("{}: ignoring interpreter release {}", module, hit.release);
            continue;
        }
        candidates
            .entry(hit.release.clone())
            .or_insert_with(|| CandidateRelease::from_hit(hit));
    }

    candidates
}
