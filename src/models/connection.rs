//! Connection-related data models.
//!
//! This module defines the backend types and the per-database configuration
//! consumed by the pool registry.

use serde::{Deserialize, Serialize};

/// Name given to the database configured through the bare `DB_*` keys.
pub const DEFAULT_DATABASE: &str = "default";

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
    /// URLs are built for it, but no pool backend exists.
    SqlServer,
}

impl DatabaseType {
    /// Backend named by a URL scheme (`postgres://`, `sqlite:` ...).
    ///
    /// A bare `host:port` is not a scheme, even when the host is called
    /// `postgres` or `mysql`.
    pub fn from_connection_string(url: &str) -> Option<Self> {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("sqlite:") {
            return Some(Self::SQLite);
        }
        if lower.starts_with("jtds:sqlserver://") {
            return Some(Self::SqlServer);
        }
        let (scheme, _) = lower.split_once("://")?;
        match scheme {
            "postgres" | "postgresql" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlserver" => Some(Self::SqlServer),
            _ => None,
        }
    }

    /// Guess the database type from a driver name such as `org.postgresql.Driver`.
    pub fn from_driver(driver: &str) -> Option<Self> {
        let lower = driver.to_lowercase();
        if lower.contains("sqlserver") || lower.contains("jtds") {
            Some(Self::SqlServer)
        } else if lower.contains("postgres") {
            Some(Self::PostgreSQL)
        } else if lower.contains("mysql") || lower.contains("mariadb") {
            Some(Self::MySQL)
        } else if lower.contains("sqlite") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// URL scheme prefix used when the configured host carries none.
    pub fn scheme_prefix(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgres://",
            Self::MySQL => "mysql://",
            Self::SQLite => "sqlite://",
            Self::SqlServer => "sqlserver://",
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
            Self::SqlServer => "SQL Server",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Connection parameters for one logical database.
///
/// Optional values stay `None` when the matching key is absent; nothing is
/// defaulted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub host: String,
    pub driver: Option<String>,
    pub database_name: Option<String>,
    pub user: Option<String>,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub test_query: Option<String>,
    /// Raw value; parsed when the pool is built.
    pub max_connections: Option<String>,
}

impl DatabaseConfig {
    /// Create a configuration with only a name and host set.
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn with_database_name(mut self, database_name: impl Into<String>) -> Self {
        self.database_name = Some(database_name.into());
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_test_query(mut self, test_query: impl Into<String>) -> Self {
        self.test_query = Some(test_query.into());
        self
    }

    pub fn with_max_connections(mut self, max_connections: impl Into<String>) -> Self {
        self.max_connections = Some(max_connections.into());
        self
    }

    /// True when the host already is a complete JDBC-style URL.
    pub fn host_is_url(&self) -> bool {
        self.host.starts_with("jdbc:")
    }

    /// True when a non-empty driver name is configured.
    pub fn has_driver(&self) -> bool {
        self.driver.as_deref().is_some_and(|d| !d.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_from_connection_string() {
        assert_eq!(
            DatabaseType::from_connection_string("postgres://localhost/db"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(
            DatabaseType::from_connection_string("postgresql://localhost/db"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(
            DatabaseType::from_connection_string("mysql://localhost/db"),
            Some(DatabaseType::MySQL)
        );
        assert_eq!(
            DatabaseType::from_connection_string("sqlite:test.db"),
            Some(DatabaseType::SQLite)
        );
        assert_eq!(
            DatabaseType::from_connection_string("sqlserver://host;databaseName=x"),
            Some(DatabaseType::SqlServer)
        );
        assert_eq!(DatabaseType::from_connection_string("db.example.com/app"), None);
        assert_eq!(DatabaseType::from_connection_string("postgres:5432/app"), None);
        assert_eq!(DatabaseType::from_connection_string("mysql:3306/app"), None);
        assert_eq!(
            DatabaseType::from_connection_string("jtds:sqlserver://h;DatabaseName=x"),
            Some(DatabaseType::SqlServer)
        );
    }

    #[test]
    fn test_database_type_from_driver() {
        assert_eq!(
            DatabaseType::from_driver("org.postgresql.Driver"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(
            DatabaseType::from_driver("com.mysql.cj.jdbc.Driver"),
            Some(DatabaseType::MySQL)
        );
        assert_eq!(
            DatabaseType::from_driver("org.mariadb.jdbc.Driver"),
            Some(DatabaseType::MySQL)
        );
        assert_eq!(
            DatabaseType::from_driver("com.microsoft.sqlserver.jdbc.SQLServerDriver"),
            Some(DatabaseType::SqlServer)
        );
        assert_eq!(
            DatabaseType::from_driver("net.sourceforge.jtds.jdbc.Driver"),
            Some(DatabaseType::SqlServer)
        );
        assert_eq!(DatabaseType::from_driver("sqlite"), Some(DatabaseType::SQLite));
        assert_eq!(DatabaseType::from_driver("oracle.jdbc.OracleDriver"), None);
    }

    #[test]
    fn test_host_is_url() {
        assert!(DatabaseConfig::new("default", "jdbc:postgresql://h/db").host_is_url());
        assert!(!DatabaseConfig::new("default", "postgres://h").host_is_url());
    }

    #[test]
    fn test_has_driver_ignores_empty() {
        assert!(!DatabaseConfig::new("default", "h").has_driver());
        assert!(!DatabaseConfig::new("default", "h").with_driver("").has_driver());
        assert!(DatabaseConfig::new("default", "h").with_driver("sqlite").has_driver());
    }
}
