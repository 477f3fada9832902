//! SQL generation for table-level facade calls.
//!
//! The facade never writes table SQL itself; it asks a [`StatementBuilder`]
//! for statements and executes them. [`SimpleStatementBuilder`] covers plain
//! equality search, ordering, paging and single-key upserts.

use crate::db::template::check_identifier;
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, Record, Statement};
use serde_json::Value as JsonValue;
use std::fmt::Write as _;
use tracing::debug;

/// Search key holding the sort order.
pub const ORDER_BY: &str = "orderBy";
/// Search key holding the maximum row count.
pub const LIMIT: &str = "limit";
/// Search key holding the number of rows to skip.
pub const OFFSET: &str = "offset";

const RESERVED_KEYS: [&str; 3] = [ORDER_BY, LIMIT, OFFSET];

/// How a table's primary key is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Generated by the database when omitted.
    Integer,
    /// Always supplied by the caller.
    String,
}

/// Statements for one upsert.
///
/// `update` runs first when present; `insert` runs only if the update
/// touched no rows (or there was no update).
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertPlan {
    pub update: Option<Statement>,
    pub insert: Statement,
    /// Read the generated key back after `insert`.
    pub generated_key: bool,
}

/// Produces SQL for table-level operations.
pub trait StatementBuilder: Send + Sync + std::fmt::Debug {
    /// SELECT matching every non-reserved field of `search`.
    fn find(&self, table: &str, search: &Record) -> DbResult<Statement>;

    /// UPDATE-then-INSERT statements writing `record` keyed on `key`.
    fn upsert(&self, table: &str, key: &str, kind: KeyKind, record: &Record)
    -> DbResult<UpsertPlan>;

    /// Append an ORDER BY clause taken from `search`, if it has one.
    fn apply_order_by(&self, sql: &mut String, search: &Record) -> DbResult<()>;

    /// Append a LIMIT/OFFSET clause taken from `search`, if it has one.
    fn apply_limit(&self, sql: &mut String, search: &Record) -> DbResult<()>;
}

/// Default builder: `col = ?` conjunctions and `INSERT`/`UPDATE` by column list.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleStatementBuilder;

impl SimpleStatementBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl StatementBuilder for SimpleStatementBuilder {
    fn find(&self, table: &str, search: &Record) -> DbResult<Statement> {
        check_identifier(table, "table")?;

        let mut sql = format!("SELECT * FROM {table}");
        let mut params = Vec::new();
        let mut conditions = Vec::new();

        for (column, value) in search.iter() {
            if RESERVED_KEYS.contains(&column.as_str()) {
                continue;
            }
            check_identifier(column, "column")?;
            match value {
                JsonValue::Null => conditions.push(format!("{column} IS NULL")),
                JsonValue::Array(_) | JsonValue::Object(_) => {
                    debug!(column = %column, "Skipping non-scalar search field");
                }
                scalar => {
                    conditions.push(format!("{column} = ?"));
                    params.push(QueryParam::from_json(scalar));
                }
            }
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        self.apply_order_by(&mut sql, search)?;
        self.apply_limit(&mut sql, search)?;

        Ok(Statement { sql, params })
    }

    fn upsert(
        &self,
        table: &str,
        key: &str,
        kind: KeyKind,
        record: &Record,
    ) -> DbResult<UpsertPlan> {
        check_identifier(table, "table")?;
        check_identifier(key, "key column")?;
        if record.is_empty() {
            return Err(DbError::validation(format!(
                "Nothing to write to table '{table}'"
            )));
        }

        let mut columns = Vec::with_capacity(record.len());
        let mut values = Vec::with_capacity(record.len());
        for (column, value) in record.iter() {
            if column == key {
                continue;
            }
            check_identifier(column, "column")?;
            columns.push(column.as_str());
            values.push(QueryParam::from_json(value));
        }

        let key_value = record
            .get(key)
            .filter(|v| !v.is_null())
            .map(QueryParam::from_json);

        match key_value {
            Some(key_param) => {
                let update = (!columns.is_empty()).then(|| {
                    let assignments = columns
                        .iter()
                        .map(|c| format!("{c} = ?"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let mut params = values.clone();
                    params.push(key_param.clone());
                    Statement {
                        sql: format!("UPDATE {table} SET {assignments} WHERE {key} = ?"),
                        params,
                    }
                });

                let mut insert_columns = vec![key];
                insert_columns.extend(columns.iter().copied());
                let mut insert_params = vec![key_param];
                insert_params.extend(values);

                Ok(UpsertPlan {
                    update,
                    insert: insert_statement(table, &insert_columns, insert_params),
                    generated_key: false,
                })
            }
            None if kind == KeyKind::String => Err(DbError::validation(format!(
                "Record for table '{table}' has no value for key '{key}'"
            ))),
            None if columns.is_empty() => Err(DbError::validation(format!(
                "Nothing to write to table '{table}'"
            ))),
            None => Ok(UpsertPlan {
                update: None,
                insert: insert_statement(table, &columns, values),
                generated_key: true,
            }),
        }
    }

    fn apply_order_by(&self, sql: &mut String, search: &Record) -> DbResult<()> {
        let terms: Vec<&str> = match search.get(ORDER_BY) {
            None | Some(JsonValue::Null) => return Ok(()),
            Some(JsonValue::String(s)) => s.split(',').collect(),
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().ok_or_else(|| {
                        DbError::validation(format!("{ORDER_BY} entries must be strings"))
                    })
                })
                .collect::<DbResult<_>>()?,
            Some(other) => {
                return Err(DbError::validation(format!(
                    "{ORDER_BY} must be a string or a list of strings, got {other}"
                )));
            }
        };

        let clauses = terms
            .into_iter()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(order_term)
            .collect::<DbResult<Vec<_>>>()?;

        if !clauses.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&clauses.join(", "));
        }
        Ok(())
    }

    fn apply_limit(&self, sql: &mut String, search: &Record) -> DbResult<()> {
        let limit = paging_value(search, LIMIT)?;
        let offset = paging_value(search, OFFSET)?;

        match (limit, offset) {
            (None, None) => {}
            (Some(limit), None) => {
                let _ = write!(sql, " LIMIT {limit}");
            }
            (Some(limit), Some(offset)) => {
                let _ = write!(sql, " LIMIT {limit} OFFSET {offset}");
            }
            (None, Some(_)) => {
                return Err(DbError::validation(format!("{OFFSET} requires {LIMIT}")));
            }
        }
        Ok(())
    }
}

fn insert_statement(table: &str, columns: &[&str], params: Vec<QueryParam>) -> Statement {
    let placeholders = vec!["?"; columns.len()].join(", ");
    Statement {
        sql: format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        ),
        params,
    }
}

/// Validate one `<column> [ASC|DESC]` term.
fn order_term(term: &str) -> DbResult<String> {
    let mut parts = term.split_whitespace();
    let column = parts.next().unwrap_or_default();
    check_identifier(column, "order by column")?;

    let direction = match parts.next() {
        None => None,
        Some(d) if d.eq_ignore_ascii_case("asc") => Some("ASC"),
        Some(d) if d.eq_ignore_ascii_case("desc") => Some("DESC"),
        Some(d) => {
            return Err(DbError::validation(format!(
                "Invalid sort direction '{d}' in '{term}'"
            )));
        }
    };
    if parts.next().is_some() {
        return Err(DbError::validation(format!("Invalid order by term '{term}'")));
    }

    Ok(match direction {
        Some(d) => format!("{column} {d}"),
        None => column.to_string(),
    })
}

/// Read a non-negative integer, accepting numeric strings.
fn paging_value(search: &Record, key: &str) -> DbResult<Option<u64>> {
    let invalid = || DbError::validation(format!("{key} must be a non-negative integer"));
    match search.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => n.as_u64().map(Some).ok_or_else(invalid),
        Some(JsonValue::String(s)) => s.trim().parse::<u64>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}
