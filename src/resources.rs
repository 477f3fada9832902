//! Packaged resource access.
//!
//! Schema scripts and the named-query table are looked up through a
//! [`ResourceSource`], so the same code reads them from a directory on disk
//! or from assets compiled into the binary.

use crate::error::{DbError, DbResult};
use glob::{MatchOptions, Pattern};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::marker::PhantomData;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Location of the named-query table.
pub const SQL_ENTRIES_PATH: &str = "db/sql.yaml";

/// A namespace of resources addressed by `/`-separated relative paths.
pub trait ResourceSource: Send + Sync {
    /// Paths matching a glob pattern, sorted.
    fn list(&self, pattern: &str) -> DbResult<Vec<String>>;

    /// Open one resource for reading.
    fn open(&self, path: &str) -> DbResult<Box<dyn BufRead + Send>>;
}

/// Resources under a directory on the filesystem.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceSource for DirectoryResources {
    fn list(&self, pattern: &str) -> DbResult<Vec<String>> {
        let escaped_root = Pattern::escape(&self.root.to_string_lossy());
        let full = format!("{}/{pattern}", escaped_root.trim_end_matches('/'));
        let entries =
            glob::glob(&full).map_err(|e| DbError::resource(pattern, e.to_string()))?;

        let mut paths = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) => {
                    if let Some(relative) = relative_path(&self.root, &path) {
                        paths.push(relative);
                    }
                }
                Err(e) => warn!(error = %e, "Skipping unreadable resource"),
            }
        }
        paths.sort();
        debug!(root = %self.root.display(), pattern, found = paths.len(), "Listed resources");
        Ok(paths)
    }

    fn open(&self, path: &str) -> DbResult<Box<dyn BufRead + Send>> {
        let file = File::open(self.root.join(path))
            .map_err(|e| DbError::resource(path, e.to_string()))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// `path` relative to `root`, joined with `/`.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok().or_else(|| {
        // glob drops leading `./` components from what it yields
        let trimmed: PathBuf = root
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        path.strip_prefix(trimmed).ok()
    })?;
    Some(
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

/// Resources compiled into the binary with `rust_embed`.
pub struct EmbeddedResources<E> {
    _assets: PhantomData<fn() -> E>,
}

impl<E: rust_embed::RustEmbed> EmbeddedResources<E> {
    pub fn new() -> Self {
        Self {
            _assets: PhantomData,
        }
    }
}

impl<E: rust_embed::RustEmbed> Default for EmbeddedResources<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EmbeddedResources<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedResources").finish_non_exhaustive()
    }
}

impl<E: rust_embed::RustEmbed> ResourceSource for EmbeddedResources<E> {
    fn list(&self, pattern: &str) -> DbResult<Vec<String>> {
        let matcher = Pattern::new(pattern).map_err(|e| DbError::resource(pattern, e.to_string()))?;
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };

        let mut paths: Vec<String> = E::iter()
            .filter(|name| matcher.matches_with(name, options))
            .map(|name| name.into_owned())
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn open(&self, path: &str) -> DbResult<Box<dyn BufRead + Send>> {
        let file = E::get(path).ok_or_else(|| DbError::resource(path, "not embedded"))?;
        Ok(Box::new(Cursor::new(file.data.into_owned())))
    }
}

/// Named SQL statements, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlEntries {
    entries: BTreeMap<String, String>,
}

impl SqlEntries {
    /// Load [`SQL_ENTRIES_PATH`]. A missing or unreadable table yields an
    /// empty one.
    pub fn load(resources: &dyn ResourceSource) -> Self {
        let reader = match resources.open(SQL_ENTRIES_PATH) {
            Ok(reader) => reader,
            Err(e) => {
                info!(path = SQL_ENTRIES_PATH, error = %e, "No named SQL entries loaded");
                return Self::default();
            }
        };

        match serde_yaml::from_reader::<_, BTreeMap<String, String>>(reader) {
            Ok(entries) => {
                info!(path = SQL_ENTRIES_PATH, count = entries.len(), "Loaded named SQL entries");
                Self { entries }
            }
            Err(e) => {
                info!(path = SQL_ENTRIES_PATH, error = %e, "Failed to parse named SQL entries");
                Self::default()
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SqlEntries {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;

    fn resource_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let schemas = dir.path().join("db").join("schemas");
        fs::create_dir_all(&schemas).unwrap();
        fs::write(schemas.join("schema_2.sql"), "SELECT 2;\n").unwrap();
        fs::write(schemas.join("schema_1.sql"), "SELECT 1;\n").unwrap();
        fs::write(schemas.join("notes.txt"), "ignore me").unwrap();
        dir
    }

    #[test]
    fn test_directory_list_is_sorted_and_relative() {
        let dir = resource_dir();
        let resources = DirectoryResources::new(dir.path());
        let paths = resources.list("db/schemas/schema_*.sql").unwrap();
        assert_eq!(
            paths,
            vec!["db/schemas/schema_1.sql", "db/schemas/schema_2.sql"]
        );
    }

    #[test]
    fn test_relative_path_with_current_dir_root() {
        assert_eq!(
            relative_path(Path::new("."), Path::new("db/schemas/schema_1.sql")).as_deref(),
            Some("db/schemas/schema_1.sql")
        );
        assert_eq!(
            relative_path(Path::new("/srv/app"), Path::new("/srv/app/db/sql.yaml")).as_deref(),
            Some("db/sql.yaml")
        );
    }

    #[test]
    fn test_directory_open() {
        let dir = resource_dir();
        let resources = DirectoryResources::new(dir.path());
        let mut text = String::new();
        resources
            .open("db/schemas/schema_1.sql")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "SELECT 1;\n");
        assert!(resources.open("db/missing.sql").is_err());
    }

    #[test]
    fn test_missing_sql_entries_is_empty() {
        let dir = resource_dir();
        let entries = SqlEntries::load(&DirectoryResources::new(dir.path()));
        assert!(entries.is_empty());
    }

    #[test]
    fn test_sql_entries_from_yaml() {
        let dir = resource_dir();
        fs::write(
            dir.path().join("db").join("sql.yaml"),
            "activeUsers: SELECT * FROM users WHERE status = :{status}\n\
             countUsers: SELECT COUNT(*) FROM users\n",
        )
        .unwrap();
        let entries = SqlEntries::load(&DirectoryResources::new(dir.path()));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.get("countUsers"), Some("SELECT COUNT(*) FROM users"));
        assert_eq!(entries.get("missing"), None);
    }

    #[test]
    fn test_sql_entries_unparsable_is_empty() {
        let dir = resource_dir();
        fs::write(dir.path().join("db").join("sql.yaml"), "- just\n- a list\n").unwrap();
        assert!(SqlEntries::load(&DirectoryResources::new(dir.path())).is_empty());
    }
}
