//! Installed module inventory
//!
//! - [`scan`]: walks library directories and extracts module versions
//! - [`install_log`]: parses the `perllocal.pod` installation log

pub mod install_log;
pub mod scan;

use std::collections::BTreeMap;
use std::path::PathBuf;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::version::PerlVersion;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Library directory does not exist: {0:?}")]
    MissingDirectory(PathBuf),

    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A module file found in a library directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModule {
    pub name: String,
    /// `None` when the file declares no parseable version
    pub version: Option<PerlVersion>,
    pub file_size: u64,
    pub path: PathBuf,
}

impl InstalledModule {
    /// Version used for index queries; unversioned modules are queried as `0`
    pub fn query_version(&self) -> PerlVersion {
        self.version.clone().unwrap_or_else(PerlVersion::zero)
    }
}

/// Installed modules keyed by name, iterated in name order
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    modules: BTreeMap<String, InstalledModule>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module unless one with the same name is already present.
    ///
    /// Earlier library directories shadow later ones, as on the interpreter's
    /// search path. Returns whether the module was added.
    pub fn insert(&mut self, module: InstalledModule) -> bool {
        if let Some(existing) = self.modules.get(&module.name) {
            debug!(
                "{} at {:?} is shadowed by {:?}",
                module.name, module.path, existing.path
            );
            return false;
        }
        self.modules.insert(module.name.clone(), module);
        true
    }

    pub fn get(&self, name: &str) -> Option<&InstalledModule> {
        self.modules.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstalledModule> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Keep only modules whose name matches `pattern`
    pub fn retain_matching(&mut self, pattern: &Regex) {
        self.modules.retain(|name, _| pattern.is_match(name));
    }
}

impl FromIterator<InstalledModule> for Inventory {
    fn from_iter<T: IntoIterator<Item = InstalledModule>>(iter: T) -> Self {
        let mut inventory = Inventory::new();
        for module in iter {
            inventory.insert(module);
        }
        inventory
    }
}
