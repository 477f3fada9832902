//! Schema migration: script parsing and the version-tracked runner.

pub mod parser;
pub mod runner;

pub use parser::{parse_statements, schema_version};
pub use runner::{MigrationReport, SCHEMA_PATTERN, SchemaMigrator, VersionOutcome, VersionRecord};
