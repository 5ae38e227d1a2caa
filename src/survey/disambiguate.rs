//! Tie breaking between equally scored releases

use tracing::{debug, warn};

use crate::inventory::InstalledModule;
use crate::inventory::install_log::InstallLog;
use crate::survey::overrides::primary_module_name;
use crate::survey::types::ScoredRelease;
use crate::version::PerlVersion;

#[derive(Debug, Clone, PartialEq)]
pub enum Narrowed {
    /// Releases kept for the module; more than one means an unbroken tie
    Releases(Vec<ScoredRelease>),
    /// The module declares no version and the tie could not be broken
    Unresolvable(Vec<ScoredRelease>),
}

/// Narrow tied releases using the install log.
///
/// Releases whose distribution's primary module is logged at the release's
/// version are preferred. Failing that, releases whose primary module is
/// logged at all are kept. Either kind of evidence is only used when it
/// selects a non-empty strict subset; otherwise every tie is kept.
pub fn narrow(tied: Vec<ScoredRelease>, module: &InstalledModule, log: &InstallLog) -> Narrowed {
    if tied.len() <= 1 {
        return Narrowed::Releases(tied);
    }

    let total = tied.len();
    let tied = match strict_subset(tied, |scored| logged_at_release_version(scored, log)) {
        Ok(narrowed) => return narrowed_by_log(module, "version", total, narrowed),
        Err(tied) => tied,
    };
    let tied = match strict_subset(tied, |scored| logged_at_all(scored, log)) {
        Ok(narrowed) => return narrowed_by_log(module, "presence", total, narrowed),
        Err(tied) => tied,
    };

    if module.version.is_none() {
        warn!(
            "{} has no version and matches {} releases equally; ignoring it",
            module.name,
            tied.len()
        );
        return Narrowed::Unresolvable(tied);
    }

    Narrowed::Releases(tied)
}

/// `Ok` with the matching releases when they are a non-empty strict subset,
/// `Err` with the input, order preserved, otherwise
fn strict_subset<F>(
    tied: Vec<ScoredRelease>,
    keep: F,
) -> Result<Vec<ScoredRelease>, Vec<ScoredRelease>>
where
    F: Fn(&ScoredRelease) -> bool,
{
    let matching = tied.iter().filter(|scored| keep(scored)).count();
    if matching == 0 || matching == tied.len() {
        return Err(tied);
    }
    Ok(tied.into_iter().filter(|scored| keep(scored)).collect())
}

fn narrowed_by_log(
    module: &InstalledModule,
    evidence: &str,
    total: usize,
    narrowed: Vec<ScoredRelease>,
) -> Narrowed {
    debug!(
        "{}: install log {} narrowed {} ties to {}",
        module.name,
        evidence,
        total,
        narrowed.len()
    );
    Narrowed::Releases(narrowed)
}

fn logged_at_release_version(scored: &ScoredRelease, log: &InstallLog) -> bool {
    let primary = primary_module_name(scored.distribution());
    log.lookup_primary_module_version(&primary)
        .and_then(|logged| PerlVersion::parse(logged).ok())
        .is_some_and(|logged| logged == scored.candidate.version)
}

fn logged_at_all(scored: &ScoredRelease, log: &InstallLog) -> bool {
    let primary = primary_module_name(scored.distribution());
    log.lookup_primary_module_version(&primary).is_some()
}
