//! Versioned schema migration.
//!
//! Discovers `db/schemas/schema_<version>.sql` scripts, compares each version
//! with the highest one recorded in `db_versions`, and applies every newer
//! script on a single connection. A failing statement does not stop its
//! script; its message is stored with the version row instead.

use crate::db::executor;
use crate::db::pool::{PoolRegistry, ScopedConnection};
use crate::error::DbResult;
use crate::migrate::parser::{parse_statements, schema_version};
use crate::models::{DEFAULT_DATABASE, QueryParam};
use crate::resources::ResourceSource;
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Resources holding schema scripts.
pub const SCHEMA_PATTERN: &str = "db/schemas/schema_*.sql";

const CREATE_DB_VERSIONS: &str = "CREATE TABLE db_versions (\
     db_version VARCHAR(50) PRIMARY KEY, \
     db_update TIMESTAMP DEFAULT CURRENT_TIMESTAMP, \
     db_errors TEXT)";

const SELECT_VERSION: &str = "SELECT MAX(db_version) AS last_update FROM db_versions";

const INSERT_VERSION: &str = "INSERT INTO db_versions (db_version, db_errors) VALUES (?, ?)";

const SELECT_HISTORY: &str =
    "SELECT db_version, db_update, db_errors FROM db_versions ORDER BY db_version";

/// Result of applying one schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionOutcome {
    pub version: String,
    /// Failed statement messages, each followed by `\n`. Empty when all ran.
    pub errors: String,
}

impl VersionOutcome {
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Summary of one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Highest recorded version before the run; empty for a fresh database.
    pub previous_version: String,
    pub applied: Vec<VersionOutcome>,
    /// Discovered versions not newer than `previous_version`.
    pub skipped: Vec<String>,
}

impl MigrationReport {
    pub fn has_statement_errors(&self) -> bool {
        self.applied.iter().any(|v| !v.succeeded())
    }
}

/// One row of `db_versions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRecord {
    pub version: String,
    pub applied_at: Option<NaiveDateTime>,
    pub errors: String,
}

type VersionRow = (String, Option<NaiveDateTime>, Option<String>);

/// Applies schema scripts to one database of a registry.
pub struct SchemaMigrator {
    registry: Arc<PoolRegistry>,
    resources: Arc<dyn ResourceSource>,
    database: String,
}

impl SchemaMigrator {
    /// Migrator for the default database.
    pub fn new(registry: Arc<PoolRegistry>, resources: Arc<dyn ResourceSource>) -> Self {
        Self {
            registry,
            resources,
            database: DEFAULT_DATABASE.to_string(),
        }
    }

    /// Target a different database of the registry.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Statement batches keyed by version, in ascending string order.
    ///
    /// Scripts sharing a version are concatenated in path order. Listing or
    /// read failures are logged and leave the affected batch empty.
    pub fn discover(&self) -> BTreeMap<String, Vec<String>> {
        let mut batches: BTreeMap<String, Vec<String>> = BTreeMap::new();

        let paths = match self.resources.list(SCHEMA_PATTERN) {
            Ok(paths) => paths,
            Err(e) => {
                error!(pattern = SCHEMA_PATTERN, error = %e, "Schema discovery failed");
                return batches;
            }
        };
        info!(count = paths.len(), "Found schema files");

        for path in &paths {
            let Some(version) = schema_version(path) else {
                debug!(path = %path, "No version in schema file name");
                continue;
            };
            let batch = batches.entry(version.to_string()).or_default();

            match self.resources.open(path) {
                Ok(reader) => batch.extend(parse_statements(reader)),
                Err(e) => error!(path = %path, error = %e, "File Read Failed"),
            }
        }

        batches
    }

    /// Apply every discovered version newer than the recorded one.
    ///
    /// Fails only when the connection cannot be acquired or the version
    /// table cannot be read, created or written.
    pub async fn run(&self) -> DbResult<MigrationReport> {
        let batches = self.discover();
        let mut conn = self.registry.acquire(&self.database).await?;
        let previous_version = self.current_version(&mut conn).await?;

        info!(
            database = %self.database,
            current_version = %previous_version,
            discovered = batches.len(),
            "Starting schema migration"
        );

        let mut report = MigrationReport {
            previous_version,
            ..Default::default()
        };

        for (version, statements) in batches {
            // Plain string ordering: "10" sorts before "9"
            if version.as_str() <= report.previous_version.as_str() {
                debug!(version = %version, "Version already applied");
                report.skipped.push(version);
                continue;
            }

            let mut errors = String::new();
            let mut failed = 0usize;
            for sql in &statements {
                if let Err(e) = executor::execute(&mut conn, sql, &[]).await {
                    failed += 1;
                    warn!(version = %version, error = %e, "Schema statement failed");
                    errors.push_str(&e.to_string());
                    errors.push('\n');
                }
            }

            let params = [
                QueryParam::from(version.as_str()),
                QueryParam::from(errors.as_str()),
            ];
            executor::execute(&mut conn, INSERT_VERSION, &params).await?;

            info!(
                version = %version,
                statements = statements.len(),
                failed,
                "Schema version applied"
            );
            report.applied.push(VersionOutcome { version, errors });
        }

        Ok(report)
    }

    /// Highest recorded version, creating `db_versions` if it cannot be read.
    async fn current_version(&self, conn: &mut ScopedConnection) -> DbResult<String> {
        match executor::fetch_scalar(conn, SELECT_VERSION, &[]).await {
            Ok(Some(JsonValue::String(version))) => Ok(version),
            Ok(Some(JsonValue::Null) | None) => Ok(String::new()),
            Ok(Some(other)) => Ok(other.to_string()),
            Err(e) => {
                info!(error = %e, "Creating db_versions table");
                executor::execute(conn, CREATE_DB_VERSIONS, &[]).await?;
                Ok(String::new())
            }
        }
    }

    /// Every recorded version, in ascending string order.
    pub async fn history(&self) -> DbResult<Vec<VersionRecord>> {
        let mut conn = self.registry.acquire(&self.database).await?;
        let rows: Vec<VersionRow> = match &mut conn {
            ScopedConnection::MySql(c) => sqlx::query_as(SELECT_HISTORY).fetch_all(&mut **c).await?,
            ScopedConnection::Postgres(c) => {
                sqlx::query_as(SELECT_HISTORY).fetch_all(&mut **c).await?
            }
            ScopedConnection::SQLite(c) => {
                sqlx::query_as(SELECT_HISTORY).fetch_all(&mut **c).await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|(version, applied_at, errors)| VersionRecord {
                version,
                applied_at,
                errors: errors.unwrap_or_default(),
            })
            .collect())
    }
}
