//! Statement execution on a checked-out connection.
//!
//! Every function takes the caller's [`ScopedConnection`] so a facade call
//! or a migration run controls how long its connection is held. Placeholders
//! are rewritten for the connection's backend just before execution.
//!
//! The per-backend submodules mirror each other; only the way a
//! generated key is read back differs.

use crate::db::params::BindParams;
use crate::db::pool::ScopedConnection;
use crate::db::template::{check_identifier, to_backend_placeholders};
use crate::db::types::RowToRecord;
use crate::error::DbResult;
use crate::models::{DatabaseType, QueryParam, Record, Statement};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use tracing::debug;

/// Run a query and decode every returned row.
pub async fn fetch_rows(
    conn: &mut ScopedConnection,
    sql: &str,
    params: &[QueryParam],
) -> DbResult<Vec<Record>> {
    let sql = native_sql(sql, conn.db_type(), params);
    debug!(sql = %sql, params = params.len(), "Executing query");

    match conn {
        ScopedConnection::MySql(c) => mysql::fetch_rows(c, &sql, params).await,
        ScopedConnection::Postgres(c) => postgres::fetch_rows(c, &sql, params).await,
        ScopedConnection::SQLite(c) => sqlite::fetch_rows(c, &sql, params).await,
    }
}

/// Run a statement and return the number of affected rows.
pub async fn execute(
    conn: &mut ScopedConnection,
    sql: &str,
    params: &[QueryParam],
) -> DbResult<u64> {
    let sql = native_sql(sql, conn.db_type(), params);
    debug!(sql = %sql, params = params.len(), "Executing update");

    match conn {
        ScopedConnection::MySql(c) => mysql::execute(c, &sql, params).await,
        ScopedConnection::Postgres(c) => postgres::execute(c, &sql, params).await,
        ScopedConnection::SQLite(c) => sqlite::execute(c, &sql, params).await,
    }
}

/// Run an INSERT and read back the key the database generated for `key_column`.
pub async fn insert_returning_key(
    conn: &mut ScopedConnection,
    stmt: &Statement,
    key_column: &str,
) -> DbResult<Option<i64>> {
    check_identifier(key_column, "key column")?;
    let sql = native_sql(&stmt.sql, conn.db_type(), &stmt.params);
    debug!(sql = %sql, params = stmt.params.len(), key = %key_column, "Executing insert");

    match conn {
        ScopedConnection::MySql(c) => mysql::insert_returning_key(c, &sql, &stmt.params).await,
        ScopedConnection::Postgres(c) => {
            postgres::insert_returning_key(c, &sql, &stmt.params, key_column).await
        }
        ScopedConnection::SQLite(c) => sqlite::insert_returning_key(c, &sql, &stmt.params).await,
    }
}

/// First column of the first row, if any row came back.
pub async fn fetch_scalar(
    conn: &mut ScopedConnection,
    sql: &str,
    params: &[QueryParam],
) -> DbResult<Option<JsonValue>> {
    let sql = native_sql(sql, conn.db_type(), params);
    debug!(sql = %sql, params = params.len(), "Executing scalar query");

    match conn {
        ScopedConnection::MySql(c) => mysql::fetch_scalar(c, &sql, params).await,
        ScopedConnection::Postgres(c) => postgres::fetch_scalar(c, &sql, params).await,
        ScopedConnection::SQLite(c) => sqlite::fetch_scalar(c, &sql, params).await,
    }
}

/// SQL with the backend's placeholder syntax. Text without bound values
/// runs as written, so a PostgreSQL `?` operator in it stays intact.
fn native_sql<'a>(sql: &'a str, db_type: DatabaseType, params: &[QueryParam]) -> Cow<'a, str> {
    if params.is_empty() {
        Cow::Borrowed(sql)
    } else {
        to_backend_placeholders(sql, db_type)
    }
}

fn generated_key(value: Option<JsonValue>) -> Option<i64> {
    match value? {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

mod mysql {
    use super::*;
    use sqlx::pool::PoolConnection;
    use sqlx::{Executor, MySql};

    pub async fn fetch_rows(
        conn: &mut PoolConnection<MySql>,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<Record>> {
        // Raw SQL when there is nothing to bind; some statements cannot be prepared
        let rows = if params.is_empty() {
            (&mut **conn).fetch_all(sql).await?
        } else {
            sqlx::query::<MySql>(sql)
                .bind_all(params)
                .fetch_all(&mut **conn)
                .await?
        };
        Ok(rows.iter().map(RowToRecord::to_record).collect())
    }

    pub async fn execute(
        conn: &mut PoolConnection<MySql>,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            (&mut **conn).execute(sql).await?
        } else {
            sqlx::query::<MySql>(sql)
                .bind_all(params)
                .execute(&mut **conn)
                .await?
        };
        Ok(result.rows_affected())
    }

    pub async fn insert_returning_key(
        conn: &mut PoolConnection<MySql>,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<i64>> {
        let result = sqlx::query::<MySql>(sql)
            .bind_all(params)
            .execute(&mut **conn)
            .await?;
        Ok(i64::try_from(result.last_insert_id()).ok().filter(|id| *id > 0))
    }

    pub async fn fetch_scalar(
        conn: &mut PoolConnection<MySql>,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<JsonValue>> {
        let row = sqlx::query::<MySql>(sql)
            .bind_all(params)
            .fetch_optional(&mut **conn)
            .await?;
        Ok(row.and_then(|r| r.column_value(0)))
    }
}

mod postgres {
    use super::*;
    use sqlx::pool::PoolConnection;
    use sqlx::{Executor, Postgres};

    pub async fn fetch_rows(
        conn: &mut PoolConnection<Postgres>,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<Record>> {
        let rows = if params.is_empty() {
            (&mut **conn).fetch_all(sql).await?
        } else {
            sqlx::query::<Postgres>(sql)
                .bind_all(params)
                .fetch_all(&mut **conn)
                .await?
        };
        Ok(rows.iter().map(RowToRecord::to_record).collect())
    }

    pub async fn execute(
        conn: &mut PoolConnection<Postgres>,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            (&mut **conn).execute(sql).await?
        } else {
            sqlx::query::<Postgres>(sql)
                .bind_all(params)
                .execute(&mut **conn)
                .await?
        };
        Ok(result.rows_affected())
    }

    pub async fn insert_returning_key(
        conn: &mut PoolConnection<Postgres>,
        sql: &str,
        params: &[QueryParam],
        key_column: &str,
    ) -> DbResult<Option<i64>> {
        let sql = format!("{} RETURNING {key_column}", sql.trim_end().trim_end_matches(';'));
        let row = sqlx::query::<Postgres>(&sql)
            .bind_all(params)
            .fetch_optional(&mut **conn)
            .await?;
        Ok(generated_key(row.and_then(|r| r.column_value(0))))
    }

    pub async fn fetch_scalar(
        conn: &mut PoolConnection<Postgres>,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<JsonValue>> {
        let row = sqlx::query::<Postgres>(sql)
            .bind_all(params)
            .fetch_optional(&mut **conn)
            .await?;
        Ok(row.and_then(|r| r.column_value(0)))
    }
}

mod sqlite {
    use super::*;
    use sqlx::pool::PoolConnection;
    use sqlx::{Executor, Sqlite};

    pub async fn fetch_rows(
        conn: &mut PoolConnection<Sqlite>,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<Record>> {
        let rows = if params.is_empty() {
            (&mut **conn).fetch_all(sql).await?
        } else {
            sqlx::query::<Sqlite>(sql)
                .bind_all(params)
                .fetch_all(&mut **conn)
                .await?
        };
        Ok(rows.iter().map(RowToRecord::to_record).collect())
    }

    pub async fn execute(
        conn: &mut PoolConnection<Sqlite>,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            (&mut **conn).execute(sql).await?
        } else {
            sqlx::query::<Sqlite>(sql)
                .bind_all(params)
                .execute(&mut **conn)
                .await?
        };
        Ok(result.rows_affected())
    }

    pub async fn insert_returning_key(
        conn: &mut PoolConnection<Sqlite>,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<i64>> {
        let result = sqlx::query::<Sqlite>(sql)
            .bind_all(params)
            .execute(&mut **conn)
            .await?;
        Ok(Some(result.last_insert_rowid()))
    }

    pub async fn fetch_scalar(
        conn: &mut PoolConnection<Sqlite>,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<JsonValue>> {
        let row = sqlx::query::<Sqlite>(sql)
            .bind_all(params)
            .fetch_optional(&mut **conn)
            .await?;
        Ok(row.and_then(|r| r.column_value(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_key_from_number_or_text() {
        assert_eq!(generated_key(Some(json!(42))), Some(42));
        assert_eq!(generated_key(Some(json!("7"))), Some(7));
        assert_eq!(generated_key(Some(JsonValue::Null)), None);
        assert_eq!(generated_key(None), None);
    }

    #[test]
    fn test_unbound_postgres_sql_runs_as_written() {
        let sql = "SELECT '{\"a\":1}'::jsonb ? 'a'";
        assert_eq!(native_sql(sql, DatabaseType::PostgreSQL, &[]), sql);

        let params = [QueryParam::Int(1)];
        let bound = native_sql("SELECT * FROM t WHERE id = ?", DatabaseType::PostgreSQL, &params);
        assert_eq!(bound, "SELECT * FROM t WHERE id = $1");
    }
}
