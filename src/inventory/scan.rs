//! Library directory scanning
//!
//! Collects every `*.pm` file below the given library directories and reads the
//! version it declares, the same way MakeMaker's `parse_version` does: the first
//! `$VERSION = ...` assignment outside POD, or a `package NAME VERSION` line.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::inventory::{InstalledModule, Inventory, InventoryError};
use crate::version::PerlVersion;

static VERSION_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s;{(])(?:our\s+)?\$(?:[\w:']*(?:::|'))?VERSION\s*=\s*([^=~].*)$"#)
        .expect("valid regex")
});

static VERSION_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:qv\s*\(\s*|version\s*->\s*(?:declare|parse|new)\s*\(\s*)?['"]?\s*(v?[\d._]+)"#,
    )
    .expect("valid regex")
});

static PACKAGE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*package\s+([\w:']+)\s+(v?[\d._]+)\s*[;{]"#).expect("valid regex")
});

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_]\w*$").expect("valid regex"));

/// Scan library directories in search-path order
pub fn scan_lib_dirs(dirs: &[PathBuf]) -> Result<Inventory, InventoryError> {
    let roots: HashSet<&Path> = dirs.iter().map(PathBuf::as_path).collect();
    let mut inventory = Inventory::new();

    for dir in dirs {
        let added = scan_lib_dir(dir, &roots, &mut inventory)?;
        info!("Found {} modules in {:?}", added, dir);
    }

    Ok(inventory)
}

/// Scan one library directory, skipping nested directories that are scanned on their own
fn scan_lib_dir(
    dir: &Path,
    roots: &HashSet<&Path>,
    inventory: &mut Inventory,
) -> Result<usize, InventoryError> {
    if !dir.is_dir() {
        return Err(InventoryError::MissingDirectory(dir.to_path_buf()));
    }

    let mut added = 0;
    let entries = WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !roots.contains(e.path()))
        .filter_map(|entry| {
            entry
                .inspect_err(|e| warn!("Skipping unreadable entry under {:?}: {}", dir, e))
                .ok()
        })
        .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|x| x == "pm"));

    for entry in entries {
        let path = entry.path();
        let Some(name) = path.strip_prefix(dir).ok().and_then(module_name_from_path) else {
            debug!("Skipping {:?}: not a module path", path);
            continue;
        };

        let module = match read_module(&name, path) {
            Ok(module) => module,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };

        if inventory.insert(module) {
            added += 1;
        }
    }

    Ok(added)
}

fn read_module(name: &str, path: &Path) -> Result<InstalledModule, InventoryError> {
    let bytes = std::fs::read(path).map_err(|source| InventoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let source = String::from_utf8_lossy(&bytes);

    let version = extract_version(&source, name).and_then(|raw| {
        PerlVersion::parse(&raw)
            .inspect_err(|e| debug!("{} in {:?}", e, path))
            .ok()
    });

    Ok(InstalledModule {
        name: name.to_string(),
        version,
        file_size: bytes.len() as u64,
        path: path.to_path_buf(),
    })
}

/// `Foo/Bar.pm` -> `Foo::Bar`; `None` when a component is not a package identifier
pub fn module_name_from_path(relative: &Path) -> Option<String> {
    let stem = relative.with_extension("");
    let mut parts = Vec::new();

    for component in stem.components() {
        let part = component.as_os_str().to_str()?;
        if !IDENTIFIER.is_match(part) {
            return None;
        }
        parts.push(part);
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("::"))
    }
}

/// Extract the version literal a module declares, without evaluating any code
pub fn extract_version(source: &str, module: &str) -> Option<String> {
    let mut in_pod = false;

    for line in source.lines() {
        if in_pod {
            if line.starts_with("=cut") {
                in_pod = false;
            }
            continue;
        }
        if line.starts_with('=') && line[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
            in_pod = true;
            continue;
        }
        if line.starts_with("__END__") || line.starts_with("__DATA__") {
            break;
        }

        let code = line.trim_start();
        if code.starts_with('#') {
            continue;
        }

        if let Some(caps) = PACKAGE_VERSION.captures(code)
            && &caps[1] == module
        {
            return Some(caps[2].to_string());
        }

        if let Some(caps) = VERSION_ASSIGNMENT.captures(code) {
            let rhs = caps[1].trim();
            return VERSION_LITERAL
                .captures(rhs)
                .map(|v| v[1].trim_end_matches('.').to_string());
        }
    }

    None
}
