//! Data models for the data access layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod record;

// Re-export commonly used types
pub use connection::{DEFAULT_DATABASE, DatabaseConfig, DatabaseType};
pub use query::{QueryParam, Statement};
pub use record::{ROOT, Record};
