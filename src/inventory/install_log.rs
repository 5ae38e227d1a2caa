//! `perllocal.pod` installation log
//!
//! MakeMaker and Module::Build append one entry per installed distribution:
//!
//! ```text
//! =head2 Wed Jan  1 00:00:00 2020: C<Module> L<Foo::Bar|Foo::Bar>
//!
//! =over 4
//!
//! =item *
//!
//! C<VERSION: 1.23>
//! ```
//!
//! Only the primary module name and version are kept. The log is a hint used
//! to break ties between equally good releases, never a source of truth.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use crate::inventory::InventoryError;

const LOG_FILE_NAME: &str = "perllocal.pod";

static ENTRY_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^=head2\s+.*?:\s+C<(?:Module|Script)>\s+L<([^|>]+)(?:\|[^>]*)?>")
        .expect("valid regex")
});

static ENTRY_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"C<VERSION:\s*([^>]*)>").expect("valid regex"));

#[derive(Debug, Clone, Default)]
pub struct InstallLog {
    modules: HashMap<String, String>,
}

impl InstallLog {
    /// Parse log text; later entries for the same module replace earlier ones
    pub fn parse(text: &str) -> Self {
        let mut modules = HashMap::new();
        let mut current: Option<String> = None;

        for line in text.lines() {
            if let Some(caps) = ENTRY_HEADING.captures(line) {
                let name = caps[1].trim().to_string();
                modules.insert(name.clone(), "undef".to_string());
                current = Some(name);
                continue;
            }

            if let Some(caps) = ENTRY_VERSION.captures(line)
                && let Some(name) = current.take()
            {
                let version = caps[1].trim();
                let version = if version.is_empty() { "undef" } else { version };
                modules.insert(name, version.to_string());
            }
        }

        Self { modules }
    }

    pub fn load(path: &Path) -> Result<Self, InventoryError> {
        let bytes = std::fs::read(path).map_err(|source| InventoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let log = Self::parse(&String::from_utf8_lossy(&bytes));
        debug!("Loaded {} install log entries from {:?}", log.len(), path);
        Ok(log)
    }

    /// Find the first `perllocal.pod` within two levels of any library directory
    pub fn discover(dirs: &[PathBuf]) -> Option<PathBuf> {
        dirs.iter().find_map(|dir| {
            WalkDir::new(dir)
                .max_depth(2)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .find(|e| e.file_type().is_file() && e.file_name() == LOG_FILE_NAME)
                .map(|e| e.into_path())
        })
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            modules: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Version recorded for a distribution's primary module, if it was ever installed
    pub fn lookup_primary_module_version(&self, module: &str) -> Option<&str> {
        self.modules.get(module).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
=head2 Wed Jan  1 00:00:00 2020: C<Module> L<Foo::Bar|Foo::Bar>

=over 4

=item *

C<installed into: /usr/lib/perl5>

=item *

C<VERSION: 1.23>

=back

=head2 Thu Jan  2 00:00:00 2020: C<Module> L<LWP|LWP>

=over 4

=item *

C<VERSION: 6.05>

=back

=head2 Fri Jan  3 00:00:00 2020: C<Module> L<Foo::Bar|Foo::Bar>

=over 4

=item *

C<VERSION: 1.30>

=back
";

    #[test]
    fn parse_records_latest_version_per_module() {
        let log = InstallLog::parse(SAMPLE);

        assert_eq!(log.len(), 2);
        assert_eq!(log.lookup_primary_module_version("Foo::Bar"), Some("1.30"));
        assert_eq!(log.lookup_primary_module_version("LWP"), Some("6.05"));
        assert_eq!(log.lookup_primary_module_version("Missing"), None);
    }

    #[test]
    fn parse_keeps_entries_without_version() {
        let log = InstallLog::parse("=head2 Mon Jan  6 00:00:00 2020: C<Module> L<Bare|Bare>\n");

        assert_eq!(log.lookup_primary_module_version("Bare"), Some("undef"));
    }

    #[test]
    fn discover_finds_log_below_library_directory() {
        let temp_dir = TempDir::new().unwrap();
        let arch = temp_dir.path().join("lib").join("x86_64-linux");
        std::fs::create_dir_all(&arch).unwrap();
        std::fs::write(arch.join("perllocal.pod"), SAMPLE).unwrap();

        let found = InstallLog::discover(&[temp_dir.path().join("lib")]);

        assert_eq!(found, Some(arch.join("perllocal.pod")));
        let log = InstallLog::load(found.as_deref().unwrap()).unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn discover_returns_none_without_log() {
        let temp_dir = TempDir::new().unwrap();

        assert_eq!(InstallLog::discover(&[temp_dir.path().to_path_buf()]), None);
    }
}
