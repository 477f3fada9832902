//! Database access layer.
//!
//! - `settings`: per-database pool settings and connection URLs
//! - `pool`: the pool registry and scoped connections
//! - `executor`: statement execution on a checked-out connection
//! - `template`: named and positional SQL templates
//! - `builder`: SQL generation for table-level calls
//! - `facade`: the query/update API callers use
//! - `types`: row decoding into records

pub mod builder;
pub mod executor;
pub mod facade;
pub mod params;
pub mod pool;
pub mod settings;
pub mod template;
pub mod types;

pub use builder::{KeyKind, SimpleStatementBuilder, StatementBuilder, UpsertPlan};
pub use facade::ConnectionFacade;
pub use pool::{DbPool, PoolRegistry, ScopedConnection};
pub use settings::PoolSettings;
