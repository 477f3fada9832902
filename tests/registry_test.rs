//! Integration tests for the pool registry.
//!
//! Tests verify that:
//! - `DB_*` settings produce one pool per logical database
//! - Health status is false for empty, degraded or closed registries
//! - Unknown databases are reported as not configured
//! - The named-query table is loaded alongside the pools

use db_dataaccess::config::DatabaseConfigSet;
use db_dataaccess::db::PoolRegistry;
use db_dataaccess::error::ErrorKind;
use db_dataaccess::resources::DirectoryResources;
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

fn settings(pairs: &[(&str, String)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn sqlite_host(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().display())
}

#[tokio::test]
async fn test_default_and_named_databases() {
    let dir = TempDir::new().unwrap();
    let source = settings(&[
        ("DB_HOST", sqlite_host(&dir)),
        ("DB_NAME", "app.db".to_string()),
        ("DB_HOST_reports", sqlite_host(&dir)),
        ("DB_NAME_reports", "reports.db".to_string()),
        ("DB_TESTQUERY_reports", "SELECT 1".to_string()),
        ("DB_MAXCONNECTIONS_reports", "2".to_string()),
    ]);
    let resources = DirectoryResources::new(dir.path());

    let registry = PoolRegistry::from_source(&source, &resources).await;

    assert!(registry.status());
    assert_eq!(
        registry.database_names().collect::<Vec<_>>(),
        vec!["default", "reports"]
    );
    assert_eq!(
        registry
            .configs()
            .get("reports")
            .and_then(|c| c.test_query.as_deref()),
        Some("SELECT 1")
    );

    let conn = registry.acquire("reports").await.unwrap();
    drop(conn);
    assert!(dir.path().join("reports.db").exists());

    registry.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_marks_registry_unhealthy() {
    let dir = TempDir::new().unwrap();
    let source = settings(&[
        ("DB_HOST", sqlite_host(&dir)),
        ("DB_NAME", "app.db".to_string()),
    ]);
    let registry = PoolRegistry::from_source(&source, &DirectoryResources::new(dir.path())).await;
    assert!(registry.status());

    registry.shutdown().await;

    assert!(!registry.status());
    let err = registry.acquire("default").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(err.code(), 511);
}

#[tokio::test]
async fn test_failed_pool_degrades_only_its_database() {
    let dir = TempDir::new().unwrap();
    let source = settings(&[
        ("DB_HOST", sqlite_host(&dir)),
        ("DB_NAME", "app.db".to_string()),
        ("DB_HOST_legacy", "mssql.internal:1433".to_string()),
        (
            "DB_DRIVER_legacy",
            "com.microsoft.sqlserver.jdbc.SQLServerDriver".to_string(),
        ),
        ("DB_NAME_legacy", "orders".to_string()),
        ("DB_USER_legacy", "sa".to_string()),
        ("DB_PASSWORD_legacy", "secret".to_string()),
    ]);
    let registry = PoolRegistry::from_source(&source, &DirectoryResources::new(dir.path())).await;

    assert!(!registry.status());
    assert!(registry.acquire("default").await.is_ok());

    let err = registry.acquire("legacy").await.unwrap_err();
    assert_eq!(err.code(), 511);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_empty_registry_is_unhealthy() {
    let dir = TempDir::new().unwrap();
    let empty = BTreeMap::<String, String>::new();
    let registry = PoolRegistry::from_source(&empty, &DirectoryResources::new(dir.path())).await;

    assert!(!registry.status());
    assert!(registry.configs().is_empty());
}

#[tokio::test]
async fn test_unknown_database_is_not_configured() {
    let registry = PoolRegistry::configure(DatabaseConfigSet::new()).await;

    let err = registry.acquire("missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConfigured);
    assert_eq!(err.code(), 400);
    assert!(err.to_string().contains("missing"));
}

#[tokio::test]
async fn test_sql_entries_loaded_from_resources() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("db")).unwrap();
    fs::write(
        dir.path().join("db").join("sql.yaml"),
        "userById: SELECT * FROM users WHERE id = :{id}\n",
    )
    .unwrap();
    let source = settings(&[
        ("DB_HOST", sqlite_host(&dir)),
        ("DB_NAME", "app.db".to_string()),
    ]);

    let registry = PoolRegistry::from_source(&source, &DirectoryResources::new(dir.path())).await;

    assert_eq!(
        registry.sql_entry("userById"),
        Some("SELECT * FROM users WHERE id = :{id}")
    );
    assert_eq!(registry.sql_entry("missing"), None);

    registry.shutdown().await;
}
