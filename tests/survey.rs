//! End-to-end survey tests against an in-memory index

mod helper;

use std::sync::Arc;

use tempfile::TempDir;

use dist_surveyor::index::error::IndexError;
use dist_surveyor::inventory::Inventory;
use dist_surveyor::inventory::install_log::InstallLog;
use dist_surveyor::inventory::scan::scan_lib_dirs;
use dist_surveyor::output::{Formatter, OutputMode, write_report};
use dist_surveyor::survey::context::{SurveyContext, SurveyOptions};
use dist_surveyor::survey::types::{InstallKind, ModuleFlag};
use dist_surveyor::survey::{ModuleStatus, SurveyReport, survey};

use helper::{FakeIndex, FakeRelease, installed, write_module};

fn options(include_remnants: bool) -> SurveyOptions {
    SurveyOptions {
        include_remnants,
        ..SurveyOptions::default()
    }
}

async fn run(
    index: FakeIndex,
    log: InstallLog,
    include_remnants: bool,
    inventory: &Inventory,
) -> (Arc<FakeIndex>, SurveyReport) {
    let index = Arc::new(index);
    let ctx = SurveyContext::new(index.clone(), log, options(include_remnants));
    let report = survey(&ctx, inventory).await.unwrap();
    (index, report)
}

fn releases(report: &SurveyReport) -> Vec<(&str, InstallKind)> {
    report
        .releases
        .iter()
        .map(|r| (r.release(), r.installation))
        .collect()
}

/// Foo-1.0 and Foo-1.1 both ship Foo::Util 1.0
fn tied_index(module_version: Option<&str>) -> FakeIndex {
    FakeIndex::new()
        .with_release(FakeRelease::new("ALICE", "Foo", "1.0").module("Foo::Util", module_version, 50))
        .with_release(FakeRelease::new("ALICE", "Foo", "1.1").module("Foo::Util", module_version, 50))
}

#[tokio::test]
async fn half_installed_release_scores_one_half() {
    let index = FakeIndex::new().with_release(
        FakeRelease::new("ALICE", "Foo", "1.0")
            .module("Foo", Some("1.0"), 100)
            .module("Foo::Bar", Some("1.0"), 200),
    );
    let inventory: Inventory = vec![installed("Foo", Some("1.0"), 100)].into_iter().collect();

    let (index, report) = run(index, InstallLog::default(), false, &inventory).await;

    assert_eq!(releases(&report), vec![("Foo-1.0", InstallKind::Installed)]);
    let foo = &report.releases[0];
    assert_eq!(foo.dist_data.fraction_installed, 0.5);
    assert_eq!(foo.dist_data.percent_installed, 50.0);
    assert_eq!(foo.modvers, "Foo=1.0;Foo::Bar=1.0");
    assert_eq!(foo.url, "authors/id/A/AL/ALICE/Foo-1.0.tar.gz");
    assert_eq!(foo.released.as_deref(), Some("2020-01-02"));
    assert_eq!(report.remote_calls, index.calls());
}

#[tokio::test]
async fn install_log_breaks_tie_between_releases() {
    let inventory: Inventory = vec![installed("Foo::Util", Some("1.0"), 50)].into_iter().collect();
    let log = InstallLog::from_entries([("Foo", "1.1")]);

    let (_, report) = run(tied_index(Some("1.0")), log, true, &inventory).await;

    assert_eq!(report.findings[0].releases, vec!["Foo-1.1"]);
    assert_eq!(releases(&report), vec![("Foo-1.1", InstallKind::Installed)]);
}

#[tokio::test]
async fn unbroken_tie_of_versioned_module_keeps_both_releases() {
    let inventory: Inventory = vec![installed("Foo::Util", Some("1.0"), 50)].into_iter().collect();

    let (_, report) = run(tied_index(Some("1.0")), InstallLog::default(), true, &inventory).await;

    assert_eq!(report.findings[0].releases, vec!["Foo-1.0", "Foo-1.1"]);
    assert_eq!(
        releases(&report),
        vec![
            ("Foo-1.0", InstallKind::Remnant),
            ("Foo-1.1", InstallKind::Installed),
        ]
    );
    assert!(report.ambiguous.is_empty());
}

#[tokio::test]
async fn unversioned_module_with_tie_is_dropped() {
    let inventory: Inventory = vec![installed("Foo::Util", None, 50)].into_iter().collect();

    let (_, report) = run(tied_index(None), InstallLog::default(), true, &inventory).await;

    assert!(report.releases.is_empty());
    assert_eq!(report.findings[0].status, ModuleStatus::Unresolvable);
    assert_eq!(report.unresolved().count(), 1);
}

fn upgraded_index() -> (FakeIndex, Inventory) {
    // Foo-2.0 is 19/20 installed; Foo-1.0 left 9 of its 10 modules behind
    let mut new_release = FakeRelease::new("ALICE", "Foo", "2.0");
    let mut old_release = FakeRelease::new("ALICE", "Foo", "1.0");
    let mut modules = Vec::new();

    for i in 1..=20 {
        let name = format!("Foo::New{}", i);
        new_release = new_release.module(&name, Some("2.0"), 10);
        if i <= 19 {
            modules.push(installed(&name, Some("2.0"), 10));
        }
    }
    for i in 1..=10 {
        let name = format!("Foo::Old{}", i);
        old_release = old_release.module(&name, Some("1.0"), 10);
        if i <= 9 {
            modules.push(installed(&name, Some("1.0"), 10));
        }
    }

    let index = FakeIndex::new()
        .with_release(old_release)
        .with_release(new_release);
    (index, modules.into_iter().collect())
}

#[tokio::test]
async fn newest_best_installed_release_wins_without_remnants() {
    let (index, inventory) = upgraded_index();

    let (_, report) = run(index, InstallLog::default(), false, &inventory).await;

    assert_eq!(releases(&report), vec![("Foo-2.0", InstallKind::Installed)]);
    assert_eq!(report.releases[0].dist_data.fraction_installed, 0.95);
    assert!(report.ambiguous.is_empty());
}

#[tokio::test]
async fn superseded_release_is_reported_as_remnant_on_request() {
    let (index, inventory) = upgraded_index();

    let (_, report) = run(index, InstallLog::default(), true, &inventory).await;

    assert_eq!(
        releases(&report),
        vec![
            ("Foo-1.0", InstallKind::Remnant),
            ("Foo-2.0", InstallKind::Installed),
        ]
    );
    assert_eq!(report.remnants().next().unwrap().dist_data.fraction_installed, 0.9);
}

#[tokio::test]
async fn count_exceeded_halts_the_run() {
    let index = FakeIndex::new()
        .with_release(FakeRelease::new("ALICE", "Foo", "1.0").module("Foo", Some("1.0"), 100))
        .too_broad("Aaa");
    let inventory: Inventory = vec![
        installed("Aaa", Some("1.0"), 10),
        installed("Foo", Some("1.0"), 100),
    ]
    .into_iter()
    .collect();
    let ctx = SurveyContext::new(Arc::new(index), InstallLog::default(), options(false));

    let error = survey(&ctx, &inventory).await.unwrap_err();

    assert!(matches!(error.index_error(), IndexError::CountExceeded { .. }));
}

#[tokio::test]
async fn release_without_metadata_is_skipped() {
    let index = FakeIndex::new()
        .with_release(FakeRelease::new("ALICE", "Bar", "1.0").module("Bar", Some("1.0"), 10))
        .with_release(FakeRelease::new("ALICE", "Foo", "1.0").module("Foo", Some("1.0"), 10))
        .without_metadata("Foo-1.0");
    let inventory: Inventory = vec![
        installed("Bar", Some("1.0"), 10),
        installed("Foo", Some("1.0"), 10),
    ]
    .into_iter()
    .collect();

    let (_, report) = run(index, InstallLog::default(), false, &inventory).await;

    assert_eq!(releases(&report), vec![("Bar-1.0", InstallKind::Installed)]);
    assert!(report.findings.iter().all(|f| f.status == ModuleStatus::Resolved));
}

#[tokio::test]
async fn modified_module_is_flagged_and_partially_credited() {
    let index = FakeIndex::new()
        .with_release(FakeRelease::new("ALICE", "Foo", "1.0").module("Foo", Some("1.0"), 100));
    let inventory: Inventory = vec![installed("Foo", Some("1.0"), 130)].into_iter().collect();

    let (_, report) = run(index, InstallLog::default(), false, &inventory).await;

    assert_eq!(report.findings[0].flag, Some(ModuleFlag::FileSizeMismatch));
    assert_eq!(report.releases[0].dist_data.fraction_installed, 0.1);
}

#[tokio::test]
async fn module_missing_from_index_is_flagged() {
    let index = FakeIndex::new();
    let inventory: Inventory = vec![installed("Local::Hack", Some("0.01"), 10)].into_iter().collect();

    let (_, report) = run(index, InstallLog::default(), false, &inventory).await;

    assert!(report.releases.is_empty());
    assert_eq!(report.findings[0].status, ModuleStatus::NoCandidates);
    assert_eq!(report.findings[0].flag, Some(ModuleFlag::VersionNotOnCpan));
}

#[tokio::test]
async fn scanned_tree_is_printed_with_template() {
    let temp_dir = TempDir::new().unwrap();
    let lib = temp_dir.path().join("lib");
    let foo_size = write_module(&lib, "Foo", "1.0");
    let bar_size = write_module(&lib, "Foo::Bar", "1.0");
    let baz_size = write_module(&lib, "Baz", "0.5");

    let index = FakeIndex::new()
        .with_release(
            FakeRelease::new("ALICE", "Foo", "1.0")
                .module("Foo", Some("1.0"), foo_size)
                .module("Foo::Bar", Some("1.0"), bar_size),
        )
        .with_release(FakeRelease::new("BOB", "Baz", "0.5").module("Baz", Some("0.5"), baz_size));
    let inventory = scan_lib_dirs(&[lib]).unwrap();

    let (_, report) = run(index, InstallLog::default(), false, &inventory).await;

    let mut out = Vec::new();
    let mode = OutputMode::Template(Formatter::new(r"{name}\t{dist_data.percent_installed}\t{url}"));
    write_report(&mut out, &report, &mode).unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "Baz-0.5\t100.0\tauthors/id/B/BO/BOB/Baz-0.5.tar.gz\n\
         Foo-1.0\t100.0\tauthors/id/A/AL/ALICE/Foo-1.0.tar.gz\n"
    );
}
