//! Directory listing and path resolution for `@include`.

use std::path::{Path, PathBuf};

use regex_lite::Regex;
use tracing::debug;

/// Default pattern for file names skipped when including a directory:
/// dotfiles, editor backups and package-manager leftovers.
pub const DEFAULT_EXCLUDE_REGEXP: &str = r"^((\..*)|(.*~)|(#.*)|(.*\.rpmsave)|(.*\.rpmnew))$";

/// Supplies the files to load when `@include` names a directory.
pub trait DirLister {
    /// Files in `dir`, in the order they should be loaded.
    fn list(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>>;
}

/// Lists regular files in lexicographic order, skipping excluded names.
#[derive(Debug, Clone)]
pub struct FsDirLister {
    exclude: Option<Regex>,
}

impl Default for FsDirLister {
    fn default() -> Self {
        Self {
            exclude: Regex::new(DEFAULT_EXCLUDE_REGEXP).ok(),
        }
    }
}

impl FsDirLister {
    /// Use `exclude` instead of [`DEFAULT_EXCLUDE_REGEXP`]; `None` includes
    /// every regular file.
    pub fn with_exclude(exclude: Option<Regex>) -> Self {
        Self { exclude }
    }
}

impl DirLister for FsDirLister {
    fn list(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if self.exclude.as_ref().is_some_and(|re| re.is_match(&name)) {
                debug!(file = %name, "skipping excluded file in include dir");
                continue;
            }
            if entry.path().is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Resolve an `@include` target. A relative path is taken relative to the
/// directory of the including source when the source name has one.
pub fn resolve_include(source_name: &str, target: &str) -> PathBuf {
    let target = Path::new(target);
    if target.is_absolute() {
        return target.to_path_buf();
    }
    match Path::new(source_name).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(target),
        _ => target.to_path_buf(),
    }
}
