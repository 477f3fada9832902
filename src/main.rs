//! db-update - applies versioned schema scripts to a configured database.
//!
//! Databases are configured through `DB_*` environment variables; scripts are
//! read from `<resources>/db/schemas/schema_<version>.sql`.

use clap::Parser;
use db_dataaccess::config::{Config, ConfigSource, EnvSource};
use db_dataaccess::db::PoolRegistry;
use db_dataaccess::migrate::SchemaMigrator;
use db_dataaccess::resources::{DirectoryResources, ResourceSource};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let config = Config::parse();
    init_tracing(&config);

    info!(
        resources = %config.resources,
        database = %config.database,
        "Starting db-update v{}",
        env!("CARGO_PKG_VERSION")
    );

    std::process::exit(run(&config, &EnvSource).await);
}

/// Run the migration and map the outcome to the process exit status.
///
/// Statement failures recorded with their version still exit with 0; only a
/// run that cannot connect or read the version table returns -1.
async fn run(config: &Config, settings: &dyn ConfigSource) -> i32 {
    let resources: Arc<dyn ResourceSource> = Arc::new(DirectoryResources::new(&config.resources));
    let registry = Arc::new(PoolRegistry::from_source(settings, resources.as_ref()).await);
    if !registry.status() {
        warn!("Not every configured database pool is running");
    }

    let migrator =
        SchemaMigrator::new(registry.clone(), resources).with_database(&config.database);
    let result = migrator.run().await;
    registry.shutdown().await;

    match result {
        Ok(report) => {
            info!(
                previous_version = %report.previous_version,
                applied = report.applied.len(),
                skipped = report.skipped.len(),
                with_errors = report.has_statement_errors(),
                "Schema update complete"
            );
            0
        }
        Err(e) => {
            error!(error = %e, code = e.code(), "Schema update failed");
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn runner_config(resources: &TempDir) -> Config {
        Config {
            resources: resources.path().display().to_string(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_exit_zero_even_with_failed_statements() {
        let dir = TempDir::new().unwrap();
        let schemas = dir.path().join("db").join("schemas");
        fs::create_dir_all(&schemas).unwrap();
        fs::write(
            schemas.join("schema_1.sql"),
            "CREATE TABLE t (id INTEGER);\n\nINSERT INTO missing_table VALUES (1);\n",
        )
        .unwrap();

        let settings: BTreeMap<String, String> = [
            ("DB_HOST", format!("sqlite://{}", dir.path().display())),
            ("DB_NAME", "app.db".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        assert_eq!(run(&runner_config(&dir), &settings).await, 0);
    }

    #[tokio::test]
    async fn test_exit_minus_one_without_a_database() {
        let dir = TempDir::new().unwrap();
        let settings = BTreeMap::<String, String>::new();

        assert_eq!(run(&runner_config(&dir), &settings).await, -1);
    }
}
