//! Pooled data access over several named SQL databases.
//!
//! This library provides:
//! - a registry of connection pools built from `DB_*` settings
//! - a facade for queries, updates and single-key upserts
//! - a versioned schema migration runner (the `db-update` binary)

pub mod config;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod resources;

pub use config::Config;
pub use db::{ConnectionFacade, PoolRegistry};
pub use error::{DbError, DbResult};
pub use migrate::SchemaMigrator;
pub use models::Record;
