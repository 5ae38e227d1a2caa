//! Per-run state shared by every module resolution

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::{DEFAULT_CONCURRENCY, DEFAULT_SIZE_MISMATCH_WEIGHT};
use crate::index::error::IndexError;
use crate::index::registry::ReleaseIndex;
use crate::inventory::install_log::InstallLog;
use crate::survey::scorer::build_manifest;
use crate::survey::types::ReleaseModuleManifest;

#[derive(Debug, Clone, PartialEq)]
pub struct SurveyOptions {
    /// Emit superseded releases next to the installed one
    pub include_remnants: bool,
    /// Modules resolved concurrently
    pub concurrency: usize,
    /// Weight of a version match whose file size differs
    pub size_mismatch_weight: f64,
}

impl Default for SurveyOptions {
    fn default() -> Self {
        Self {
            include_remnants: false,
            concurrency: DEFAULT_CONCURRENCY,
            size_mismatch_weight: DEFAULT_SIZE_MISMATCH_WEIGHT,
        }
    }
}

/// Created at run start and read for diagnostics at run end
pub struct SurveyContext {
    index: Arc<dyn ReleaseIndex>,
    install_log: InstallLog,
    options: SurveyOptions,
    remote_calls: AtomicUsize,
    manifests: Mutex<HashMap<(String, String), Arc<ReleaseModuleManifest>>>,
}

impl SurveyContext {
    pub fn new(index: Arc<dyn ReleaseIndex>, install_log: InstallLog, options: SurveyOptions) -> Self {
        Self {
            index,
            install_log,
            options,
            remote_calls: AtomicUsize::new(0),
            manifests: Mutex::new(HashMap::new()),
        }
    }

    pub fn index(&self) -> &dyn ReleaseIndex {
        self.index.as_ref()
    }

    pub fn install_log(&self) -> &InstallLog {
        &self.install_log
    }

    pub fn options(&self) -> &SurveyOptions {
        &self.options
    }

    pub fn record_remote_call(&self) {
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of index queries issued so far
    pub fn remote_calls(&self) -> usize {
        self.remote_calls.load(Ordering::Relaxed)
    }

    /// Module manifest of a release, fetched once per run.
    ///
    /// Concurrent first requests for the same release may both fetch; the
    /// results are identical, so the last writer wins.
    pub async fn manifest(
        &self,
        author: &str,
        release: &str,
    ) -> Result<Arc<ReleaseModuleManifest>, IndexError> {
        let key = (author.to_string(), release.to_string());

        if let Some(manifest) = self.lock_manifests().get(&key) {
            return Ok(Arc::clone(manifest));
        }

        self.record_remote_call();
        let files = self.index.files_by_release(author, release).await?;
        let manifest = Arc::new(build_manifest(files));
        debug!(
            "Manifest of {}/{} has {} modules",
            author,
            release,
            manifest.len()
        );

        self.lock_manifests().insert(key, Arc::clone(&manifest));
        Ok(manifest)
    }

    fn lock_manifests(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<(String, String), Arc<ReleaseModuleManifest>>> {
        // Entries are inserted whole, so a poisoned map is still consistent
        self.manifests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
