//! Configuration handling.
//!
//! Database connections are described by flat key/value settings:
//! `DB_HOST`, `DB_DRIVER`, `DB_NAME`, `DB_USER`, `DB_PASSWORD`, `DB_TESTQUERY`
//! and `DB_MAXCONNECTIONS`. The bare keys describe the `default` database;
//! a `_<name>` suffix describes database `<name>`.
//!
//! The migration runner's own options are parsed by clap from CLI arguments
//! and environment variables.

use crate::models::{DEFAULT_DATABASE, DatabaseConfig};
use clap::Parser;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use tracing::{debug, warn};

pub const DB_HOST: &str = "DB_HOST";
pub const DB_DRIVER: &str = "DB_DRIVER";
pub const DB_NAME: &str = "DB_NAME";
pub const DB_USER: &str = "DB_USER";
pub const DB_PASSWORD: &str = "DB_PASSWORD";
pub const DB_TESTQUERY: &str = "DB_TESTQUERY";
pub const DB_MAXCONNECTIONS: &str = "DB_MAXCONNECTIONS";

/// A source of string key/value settings.
pub trait ConfigSource {
    /// All keys currently defined.
    fn keys(&self) -> Vec<String>;

    /// Raw value for a key.
    fn get(&self, key: &str) -> Option<String>;

    /// Value for a key, treating empty strings as unset.
    fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty())
    }
}

impl ConfigSource for HashMap<String, String> {
    fn keys(&self) -> Vec<String> {
        HashMap::keys(self).cloned().collect()
    }

    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl ConfigSource for BTreeMap<String, String> {
    fn keys(&self) -> Vec<String> {
        BTreeMap::keys(self).cloned().collect()
    }

    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

/// Settings read from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn keys(&self) -> Vec<String> {
        utf8_keys(std::env::vars_os().map(|(k, _)| k))
    }

    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Keys that are valid UTF-8; others cannot name a `DB_*` setting.
fn utf8_keys(keys: impl Iterator<Item = OsString>) -> Vec<String> {
    keys.filter_map(|key| match key.into_string() {
        Ok(key) => Some(key),
        Err(raw) => {
            debug!(key = ?raw, "Skipping environment variable with a non UTF-8 name");
            None
        }
    })
    .collect()
}

/// All configured databases, keyed by logical name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseConfigSet {
    databases: BTreeMap<String, DatabaseConfig>,
}

impl DatabaseConfigSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a configuration source for `DB_HOST[_<name>]` keys and collect
    /// the matching settings for each database.
    pub fn from_source(source: &dyn ConfigSource) -> Self {
        let mut set = Self::new();
        let mut keys = source.keys();
        keys.sort();

        for key in keys.iter().filter(|k| k.starts_with(DB_HOST)) {
            let name = if key == DB_HOST {
                DEFAULT_DATABASE
            } else {
                match key.strip_prefix("DB_HOST_") {
                    Some(name) if !name.is_empty() => name,
                    _ => {
                        debug!(key = %key, "Ignoring key that only shares the DB_HOST prefix");
                        continue;
                    }
                }
            };

            if key != DB_HOST && name == DEFAULT_DATABASE {
                warn!(key = %key, "The 'default' database is configured by the bare DB_* keys; ignoring");
                continue;
            }

            if let Some(config) = Self::pull_config(source, name, key != DB_HOST) {
                set.insert(config);
            }
        }

        set
    }

    fn pull_config(source: &dyn ConfigSource, name: &str, suffixed: bool) -> Option<DatabaseConfig> {
        let suffix = if suffixed {
            format!("_{name}")
        } else {
            String::new()
        };
        let lookup = |base: &str| source.get_non_empty(&format!("{base}{suffix}"));

        let Some(host) = lookup(DB_HOST) else {
            debug!(database = %name, "Empty DB_HOST; skipping");
            return None;
        };

        Some(DatabaseConfig {
            name: name.to_string(),
            host,
            driver: lookup(DB_DRIVER),
            database_name: lookup(DB_NAME),
            user: lookup(DB_USER),
            password: lookup(DB_PASSWORD),
            test_query: lookup(DB_TESTQUERY),
            max_connections: lookup(DB_MAXCONNECTIONS),
        })
    }

    /// Add or replace the configuration for `config.name`.
    pub fn insert(&mut self, config: DatabaseConfig) -> Option<DatabaseConfig> {
        self.databases.insert(config.name.clone(), config)
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseConfig> {
        self.databases.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatabaseConfig> {
        self.databases.values()
    }

    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}

impl FromIterator<DatabaseConfig> for DatabaseConfigSet {
    fn from_iter<I: IntoIterator<Item = DatabaseConfig>>(iter: I) -> Self {
        let mut set = Self::new();
        for config in iter {
            set.insert(config);
        }
        set
    }
}

/// Options for the `db-update` migration runner.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-update",
    about = "Applies versioned db/schemas/schema_<version>.sql files to a configured database",
    version,
    author
)]
pub struct Config {
    /// Root directory holding the `db/` resource tree.
    #[arg(long, value_name = "DIR", default_value = ".", env = "DB_RESOURCES")]
    pub resources: String,

    /// Logical database to migrate.
    #[arg(long, default_value = DEFAULT_DATABASE, env = "DB_UPDATE_DATABASE")]
    pub database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DB_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DB_JSON_LOGS")]
    pub json_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resources: ".".to_string(),
            database: DEFAULT_DATABASE.to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
