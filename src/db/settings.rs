//! Driver-aware pool settings.
//!
//! Turns one [`DatabaseConfig`] into the URL and options a pool is built
//! from. This is pure: nothing here opens a connection.

use crate::config::DB_MAXCONNECTIONS;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseConfig, DatabaseType};

/// Everything needed to open a pool for one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub driver_class: Option<String>,
    pub url: String,
    pub username: Option<String>,
    /// Contains sensitive data - never log
    pub password: Option<String>,
    pub connection_test_query: Option<String>,
    pub max_connections: Option<u32>,
}

impl PoolSettings {
    pub fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        let host = config.host.as_str();
        let db_name = config.database_name.as_deref().unwrap_or_default();
        let driver = config.driver.as_deref().unwrap_or_default();
        let driver_lower = driver.to_lowercase();

        let driver_class = if !config.host_is_url() || config.has_driver() {
            config.driver.clone()
        } else {
            None
        };

        let (url, username) = if driver_lower.contains("sqlserver") {
            let user = config.user.as_deref().unwrap_or_default();
            (
                format!("jdbc:sqlserver://{host};databaseName={db_name};user={user};"),
                None,
            )
        } else if !config.host_is_url() && driver_lower.contains("jtds") {
            (
                format!("jdbc:jtds:sqlserver://{host};DatabaseName={db_name}"),
                config.user.clone(),
            )
        } else {
            let url = if host.ends_with('/') {
                format!("{host}{db_name}")
            } else {
                format!("{host}/{db_name}")
            };
            (url, config.user.clone())
        };

        let max_connections = config
            .max_connections
            .as_deref()
            .map(|raw| parse_max_connections(&config.name, raw))
            .transpose()?;

        Ok(Self {
            driver_class,
            url,
            username,
            password: config.password.clone(),
            connection_test_query: config.test_query.clone(),
            max_connections,
        })
    }

    /// Backend that will serve this pool.
    pub fn database_type(&self) -> Option<DatabaseType> {
        let bare = self.url.strip_prefix("jdbc:").unwrap_or(&self.url);
        DatabaseType::from_connection_string(bare)
            .or_else(|| self.driver_class.as_deref().and_then(DatabaseType::from_driver))
    }

    /// URL in the form the sqlx drivers accept.
    ///
    /// Strips a `jdbc:` prefix and adds the backend's scheme when the
    /// configured host carried none.
    pub fn connect_url(&self) -> DbResult<(DatabaseType, String)> {
        let db_type = self.database_type().ok_or_else(|| {
            DbError::validation(format!(
                "Cannot determine database type from driver {:?}",
                self.driver_class
            ))
        })?;

        let bare = self.url.strip_prefix("jdbc:").unwrap_or(&self.url);
        let url = if DatabaseType::from_connection_string(bare).is_some() {
            bare.to_string()
        } else {
            format!("{}{}", db_type.scheme_prefix(), bare)
        };
        Ok((db_type, url))
    }
}

fn parse_max_connections(database: &str, raw: &str) -> DbResult<u32> {
    let key = if database == crate::models::DEFAULT_DATABASE {
        DB_MAXCONNECTIONS.to_string()
    } else {
        format!("{DB_MAXCONNECTIONS}_{database}")
    };
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(DbError::config(key, "must be greater than 0")),
        Ok(n) => Ok(n),
        Err(e) => Err(DbError::config(key, format!("'{raw}' is not an integer: {e}"))),
    }
}
