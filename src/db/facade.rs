//! Uniform query and update API over the pool registry.
//!
//! Every call checks out one connection from the named database's pool and
//! holds it only for the duration of that call. The connection is returned
//! to the pool when the call's [`ScopedConnection`] drops, whichever way the
//! call exits.

use crate::db::builder::{KeyKind, SimpleStatementBuilder, StatementBuilder};
use crate::db::executor;
use crate::db::pool::{PoolRegistry, ScopedConnection};
use crate::db::template::{bind_named, check_identifier};
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, Record, Statement};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info};

/// Query/update entry point shared by callers.
#[derive(Debug, Clone)]
pub struct ConnectionFacade {
    registry: Arc<PoolRegistry>,
    builder: Arc<dyn StatementBuilder>,
}

impl ConnectionFacade {
    /// Facade using [`SimpleStatementBuilder`] for table-level SQL.
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self::with_builder(registry, Arc::new(SimpleStatementBuilder::new()))
    }

    pub fn with_builder(registry: Arc<PoolRegistry>, builder: Arc<dyn StatementBuilder>) -> Self {
        Self { registry, builder }
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    async fn connection(&self, database: &str) -> DbResult<ScopedConnection> {
        self.registry.acquire(database).await
    }

    /// Rows of `table` matching `search`, under the result's root.
    pub async fn find(&self, database: &str, table: &str, search: &Record) -> DbResult<Record> {
        let stmt = self.builder.find(table, search)?;
        let mut conn = self.connection(database).await?;
        let rows = executor::fetch_rows(&mut conn, &stmt.sql, &stmt.params).await?;
        Ok(Record::from_rows(rows))
    }

    /// Insert or update a row keyed by an integer column.
    ///
    /// When the key is absent the database generates it and the returned
    /// record carries the new value.
    pub async fn upsert_integer_key(
        &self,
        database: &str,
        table: &str,
        key: &str,
        record: Record,
    ) -> DbResult<Record> {
        self.upsert(database, table, key, KeyKind::Integer, record)
            .await
            .map_err(DbError::into_duplicate_record)
    }

    /// Insert or update a row keyed by a caller-supplied string column.
    pub async fn upsert_string_key(
        &self,
        database: &str,
        table: &str,
        key: &str,
        record: Record,
    ) -> DbResult<Record> {
        self.upsert(database, table, key, KeyKind::String, record)
            .await
            .map_err(DbError::into_duplicate_record)
    }

    async fn upsert(
        &self,
        database: &str,
        table: &str,
        key: &str,
        kind: KeyKind,
        mut record: Record,
    ) -> DbResult<Record> {
        let plan = self.builder.upsert(table, key, kind, &record)?;
        let mut conn = self.connection(database).await?;

        if let Some(update) = &plan.update {
            let updated = executor::execute(&mut conn, &update.sql, &update.params).await?;
            if updated > 0 {
                debug!(table = %table, key = %key, "Updated existing row");
                return Ok(record);
            }
        }

        if plan.generated_key {
            if let Some(id) = executor::insert_returning_key(&mut conn, &plan.insert, key).await? {
                record.set(key, id);
            }
        } else {
            executor::execute(&mut conn, &plan.insert.sql, &plan.insert.params).await?;
        }
        debug!(table = %table, key = %key, "Inserted row");
        Ok(record)
    }

    /// Delete rows where `field` equals `value`.
    ///
    /// Deleting a row that does not exist still succeeds.
    pub async fn delete_by_id(
        &self,
        database: &str,
        table: &str,
        field: &str,
        value: impl Into<QueryParam>,
    ) -> DbResult<bool> {
        check_identifier(table, "table")?;
        check_identifier(field, "column")?;
        let stmt = Statement::new(format!("DELETE FROM {table} WHERE {field}=?")).with_param(value);

        let mut conn = self.connection(database).await?;
        let deleted = executor::execute(&mut conn, &stmt.sql, &stmt.params).await?;
        debug!(table = %table, deleted, "Delete executed");
        Ok(true)
    }

    /// Run a `:{field}` template against `values`; rows go under the root.
    pub async fn query_rows(&self, database: &str, sql: &str, values: &Record) -> DbResult<Record> {
        let stmt = bind_named(sql, values)?;
        self.query_rows_positional(database, &stmt.sql, &stmt.params)
            .await
    }

    /// Run a `?` template with positional arguments; rows go under the root.
    pub async fn query_rows_positional(
        &self,
        database: &str,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Record> {
        let mut conn = self.connection(database).await?;
        let rows = executor::fetch_rows(&mut conn, sql, params).await?;
        Ok(Record::from_rows(rows))
    }

    /// First row of a `:{field}` template's result.
    pub async fn first_row(
        &self,
        database: &str,
        sql: &str,
        values: &Record,
    ) -> DbResult<Option<Record>> {
        Ok(self.query_rows(database, sql, values).await?.first_row())
    }

    /// First row of a `?` template's result.
    pub async fn first_row_positional(
        &self,
        database: &str,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<Record>> {
        Ok(self
            .query_rows_positional(database, sql, params)
            .await?
            .first_row())
    }

    /// Run a `:{field}` statement and return the affected row count.
    pub async fn execute_update(&self, database: &str, sql: &str, values: &Record) -> DbResult<u64> {
        let stmt = bind_named(sql, values)?;
        self.execute_update_positional(database, &stmt.sql, &stmt.params)
            .await
    }

    /// Run a `?` statement and return the affected row count.
    pub async fn execute_update_positional(
        &self,
        database: &str,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let mut conn = self.connection(database).await?;
        executor::execute(&mut conn, sql, params).await
    }

    /// Single value rendered as text; `None` when no row or a NULL came back.
    pub async fn scalar_string(
        &self,
        database: &str,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<String>> {
        let mut conn = self.connection(database).await?;
        let value = executor::fetch_scalar(&mut conn, sql, params).await?;
        Ok(match value {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        })
    }

    /// Single integer value; `None` when no row or a NULL came back.
    pub async fn scalar_int(
        &self,
        database: &str,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<i64>> {
        let mut conn = self.connection(database).await?;
        let value = executor::fetch_scalar(&mut conn, sql, params).await?;
        match value {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Some)
                .ok_or_else(|| DbError::validation(format!("{n} is not an integer"))),
            Some(JsonValue::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| DbError::validation(format!("'{s}' is not an integer"))),
            Some(JsonValue::Bool(b)) => Ok(Some(i64::from(b))),
            Some(other) => Err(DbError::validation(format!(
                "Expected an integer, got {other}"
            ))),
        }
    }

    /// Append ORDER BY and LIMIT clauses taken from `search` to `sql`.
    pub fn apply_order_and_limit(
        &self,
        database: &str,
        sql: &mut String,
        search: &Record,
    ) -> DbResult<()> {
        if self.registry.configs().get(database).is_none() {
            return Err(DbError::not_configured(database));
        }
        self.builder.apply_order_by(sql, search)?;
        self.builder.apply_limit(sql, search)
    }

    /// SQL text registered under `name` in the named-query table.
    pub fn sql_entry(&self, name: &str) -> DbResult<&str> {
        self.registry
            .sql_entry(name)
            .ok_or_else(|| DbError::validation(format!("No SQL entry named '{name}'")))
    }

    /// Run a query from the named-query table as a `:{field}` template.
    pub async fn query_entry(&self, database: &str, name: &str, values: &Record) -> DbResult<Record> {
        let sql = self.sql_entry(name)?;
        info!(database = %database, entry = %name, "Running named query");
        self.query_rows(database, sql, values).await
    }
}
