//! Connection pool registry.
//!
//! One database-specific pool (MySqlPool, PgPool, SqlitePool) per configured
//! database. A pool that fails to build is recorded as absent; the other
//! databases keep working.
//!
//! The registry is built once (`configure`), shared by reference while
//! serving, and closed with `shutdown`. It is never mutated in between, so
//! callers need no locking.

use crate::config::{ConfigSource, DatabaseConfigSet};
use crate::db::settings::PoolSettings;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseConfig, DatabaseType};
use crate::resources::{ResourceSource, SqlEntries};
use sqlx::pool::PoolConnection;
use sqlx::{
    Executor, MySql, MySqlPool, PgPool, Postgres, Sqlite, SqlitePool, mysql::MySqlConnectOptions,
    mysql::MySqlPoolOptions, postgres::PgConnectOptions, postgres::PgPoolOptions,
    sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions,
};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, error, info, warn};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// True until the pool has been closed.
    pub fn is_running(&self) -> bool {
        match self {
            DbPool::MySql(pool) => !pool.is_closed(),
            DbPool::Postgres(pool) => !pool.is_closed(),
            DbPool::SQLite(pool) => !pool.is_closed(),
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Check out one connection. It goes back to the pool when dropped.
    pub async fn acquire(&self, database: &str) -> DbResult<ScopedConnection> {
        let conn = match self {
            DbPool::MySql(pool) => pool.acquire().await.map(ScopedConnection::MySql),
            DbPool::Postgres(pool) => pool.acquire().await.map(ScopedConnection::Postgres),
            DbPool::SQLite(pool) => pool.acquire().await.map(ScopedConnection::SQLite),
        };
        conn.map_err(|e| DbError::from_acquire(database, e))
    }
}

/// A pooled connection held for the duration of one operation.
///
/// Dropping it returns the physical connection to its pool on every exit
/// path, including early returns through `?`.
#[derive(Debug)]
pub enum ScopedConnection {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

impl ScopedConnection {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            ScopedConnection::MySql(_) => DatabaseType::MySQL,
            ScopedConnection::Postgres(_) => DatabaseType::PostgreSQL,
            ScopedConnection::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

/// Owns one pool per configured database.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    configs: DatabaseConfigSet,
    /// `None` marks a database whose pool failed to build.
    pools: BTreeMap<String, Option<DbPool>>,
    sql_entries: SqlEntries,
}

impl PoolRegistry {
    /// Build a pool for every configured database.
    pub async fn configure(configs: DatabaseConfigSet) -> Self {
        let mut pools = BTreeMap::new();
        for config in configs.iter() {
            let pool = Self::setup_pool(config).await;
            pools.insert(config.name.clone(), pool);
        }

        info!(
            configured = configs.len(),
            running = pools.values().filter(|p| p.is_some()).count(),
            "Database pools configured"
        );

        Self {
            configs,
            pools,
            sql_entries: SqlEntries::default(),
        }
    }

    /// Read `DB_*` settings from `source`, build the pools and load the
    /// named-query table from `resources`.
    pub async fn from_source(source: &dyn ConfigSource, resources: &dyn ResourceSource) -> Self {
        let configs = DatabaseConfigSet::from_source(source);
        Self::configure(configs)
            .await
            .with_sql_entries(SqlEntries::load(resources))
    }

    /// Attach a named-query table.
    pub fn with_sql_entries(mut self, sql_entries: SqlEntries) -> Self {
        self.sql_entries = sql_entries;
        self
    }

    /// True only when every registered pool exists and is running.
    ///
    /// An empty registry is unhealthy.
    pub fn status(&self) -> bool {
        let mut healthy = false;
        for (name, pool) in &self.pools {
            healthy = pool.as_ref().is_some_and(DbPool::is_running);
            if !healthy {
                debug!(database = %name, "Pool is missing or closed");
                break;
            }
        }
        healthy
    }

    /// Pool for a named database.
    pub fn pool(&self, database: &str) -> DbResult<&DbPool> {
        match self.pools.get(database) {
            Some(Some(pool)) => Ok(pool),
            Some(None) => Err(DbError::connection(
                database,
                "Pool failed to initialize at startup",
            )),
            None => Err(DbError::not_configured(database)),
        }
    }

    /// Check out a connection from a named database's pool.
    pub async fn acquire(&self, database: &str) -> DbResult<ScopedConnection> {
        self.pool(database)?.acquire(database).await
    }

    /// Raw SQL for a named query, if the table has one.
    pub fn sql_entry(&self, name: &str) -> Option<&str> {
        self.sql_entries.get(name)
    }

    pub fn configs(&self) -> &DatabaseConfigSet {
        &self.configs
    }

    pub fn database_names(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    /// Close every pool.
    pub async fn shutdown(&self) {
        for (name, pool) in &self.pools {
            if let Some(pool) = pool {
                info!(database = %name, "Closing pool");
                pool.close().await;
            }
        }
        info!("All pools closed");
    }

    async fn setup_pool(config: &DatabaseConfig) -> Option<DbPool> {
        match Self::create_pool(config).await {
            Ok(pool) => {
                info!(database = %config.name, db_type = %pool.db_type(), "Pool ready");
                Some(pool)
            }
            Err(e) => {
                error!(database = %config.name, error = %e, "Database Connection Failed");
                None
            }
        }
    }

    /// Create a connection pool for the given configuration.
    async fn create_pool(config: &DatabaseConfig) -> DbResult<DbPool> {
        let settings = PoolSettings::from_config(config)?;
        let (db_type, url) = settings.connect_url()?;

        info!(
            database = %config.name,
            host = %config.host,
            db_name = ?config.database_name,
            user = ?config.user,
            "Db Settings"
        );

        let connect_err = |e: sqlx::Error| DbError::connection(&config.name, e.to_string());
        let url_err = |e: sqlx::Error| {
            DbError::connection(&config.name, format!("Invalid {db_type} connection URL: {e}"))
        };

        match db_type {
            DatabaseType::MySQL => {
                let mut options = MySqlConnectOptions::from_str(&url)
                    .map_err(url_err)?
                    .charset("utf8mb4");
                if let Some(user) = &settings.username {
                    options = options.username(user);
                }
                if let Some(password) = &settings.password {
                    options = options.password(password);
                }

                let mut pool_options = MySqlPoolOptions::new();
                if let Some(max) = settings.max_connections {
                    pool_options = pool_options.max_connections(max);
                }
                if let Some(query) = settings.connection_test_query.clone() {
                    pool_options = pool_options.before_acquire(move |conn, _meta| {
                        let query = query.clone();
                        Box::pin(async move {
                            conn.execute(query.as_str()).await?;
                            Ok(true)
                        })
                    });
                }

                let pool = pool_options
                    .connect_with(options)
                    .await
                    .map_err(connect_err)?;
                Ok(DbPool::MySql(pool))
            }
            DatabaseType::PostgreSQL => {
                let mut options = PgConnectOptions::from_str(&url).map_err(url_err)?;
                if let Some(user) = &settings.username {
                    options = options.username(user);
                }
                if let Some(password) = &settings.password {
                    options = options.password(password);
                }

                let mut pool_options = PgPoolOptions::new();
                if let Some(max) = settings.max_connections {
                    pool_options = pool_options.max_connections(max);
                }
                if let Some(query) = settings.connection_test_query.clone() {
                    pool_options = pool_options.before_acquire(move |conn, _meta| {
                        let query = query.clone();
                        Box::pin(async move {
                            conn.execute(query.as_str()).await?;
                            Ok(true)
                        })
                    });
                }

                let pool = pool_options
                    .connect_with(options)
                    .await
                    .map_err(connect_err)?;
                Ok(DbPool::Postgres(pool))
            }
            DatabaseType::SQLite => {
                if settings.username.is_some() {
                    debug!(database = %config.name, "SQLite ignores DB_USER/DB_PASSWORD");
                }
                let options = SqliteConnectOptions::from_str(&url)
                    .map_err(url_err)?
                    .create_if_missing(true);

                let mut pool_options = SqlitePoolOptions::new();
                if let Some(max) = settings.max_connections {
                    pool_options = pool_options.max_connections(max);
                }
                if let Some(query) = settings.connection_test_query.clone() {
                    pool_options = pool_options.before_acquire(move |conn, _meta| {
                        let query = query.clone();
                        Box::pin(async move {
                            conn.execute(query.as_str()).await?;
                            Ok(true)
                        })
                    });
                }

                let pool = pool_options
                    .connect_with(options)
                    .await
                    .map_err(connect_err)?;
                Ok(DbPool::SQLite(pool))
            }
            DatabaseType::SqlServer => {
                warn!(
                    database = %config.name,
                    driver = ?settings.driver_class,
                    "No SQL Server backend available"
                );
                Err(DbError::connection(
                    &config.name,
                    format!("SQL Server is not supported (url: {})", settings.url),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_empty_registry_is_unhealthy() {
        let registry = PoolRegistry::configure(DatabaseConfigSet::new()).await;
        assert!(!registry.status());
        assert_eq!(registry.database_names().count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_database_not_configured() {
        let registry = PoolRegistry::default();
        let err = registry.pool("nonexistent").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConfigured);
    }

    #[tokio::test]
    async fn test_sqlserver_pool_is_absent() {
        let configs: DatabaseConfigSet = [DatabaseConfig::new("legacy", "mssql:1433")
            .with_driver("com.microsoft.sqlserver.jdbc.SQLServerDriver")
            .with_database_name("orders")]
        .into_iter()
        .collect();
        let registry = PoolRegistry::configure(configs).await;

        assert!(!registry.status());
        let err = registry.pool("legacy").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.code(), 511);
    }

    #[tokio::test]
    async fn test_invalid_max_connections_degrades_only_that_database() {
        let configs: DatabaseConfigSet = [DatabaseConfig::new("broken", "sqlite::memory:")
            .with_max_connections("many")]
        .into_iter()
        .collect();
        let registry = PoolRegistry::configure(configs).await;
        assert!(registry.pool("broken").is_err());
        assert!(registry.configs().get("broken").is_some());
    }
}
