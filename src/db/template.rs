//! SQL templates.
//!
//! Two template forms are accepted by the facade:
//! - named: `SELECT * FROM users WHERE id = :{id}`, values come from a record
//! - positional: `SELECT * FROM users WHERE id = ?`, values come in order
//!
//! Both are normalized to `?` placeholders, then rewritten to the backend's
//! native placeholder syntax right before execution.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam, Record, Statement};
use std::borrow::Cow;

/// Replace every `:{field}` marker with `?` and collect the matching values.
pub fn bind_named(sql: &str, values: &Record) -> DbResult<Statement> {
    let mut out = String::with_capacity(sql.len());
    let mut params = Vec::new();
    let mut rest = sql;

    while let Some(start) = rest.find(":{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            DbError::validation(format!("Unterminated field marker in SQL: {sql}"))
        })?;
        let field = after[..end].trim();
        let value = values
            .get(field)
            .ok_or_else(|| DbError::validation(format!("No value supplied for field '{field}'")))?;

        params.push(QueryParam::from_json(value));
        out.push('?');
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(Statement { sql: out, params })
}

/// Rewrite `?` placeholders into the syntax the backend expects.
///
/// PostgreSQL uses `$1..$n`; MySQL and SQLite take `?` unchanged. Quoted
/// literals and identifiers, comments and dollar-quoted bodies are copied
/// as they are, so a `?` inside them is never treated as a placeholder.
pub fn to_backend_placeholders(sql: &str, db_type: DatabaseType) -> Cow<'_, str> {
    if db_type != DatabaseType::PostgreSQL || !sql.contains('?') {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut rest = sql;

    while let Some(pos) = rest.find(['?', '\'', '"', '-', '/', '$']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        let opaque = opaque_len(tail);
        if opaque > 0 {
            out.push_str(&tail[..opaque]);
            rest = &tail[opaque..];
        } else if tail.starts_with('?') {
            index += 1;
            out.push('$');
            out.push_str(&index.to_string());
            rest = &tail[1..];
        } else {
            // A lone '-', '/' or '$'
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

/// Byte length of the literal, comment or dollar-quoted body that `sql`
/// starts with, or 0. An unterminated one runs to the end of the text.
fn opaque_len(sql: &str) -> usize {
    let until = |body_start: usize, close: &str| {
        sql[body_start..]
            .find(close)
            .map_or(sql.len(), |end| body_start + end + close.len())
    };

    match sql.as_bytes() {
        [b'\'', ..] => until(1, "'"),
        [b'"', ..] => until(1, "\""),
        [b'-', b'-', ..] => sql.find('\n').unwrap_or(sql.len()),
        [b'/', b'*', ..] => until(2, "*/"),
        [b'$', tail @ ..] => {
            let tag_len = tail
                .iter()
                .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
                .count();
            let starts_with_digit = tail.first().is_some_and(u8::is_ascii_digit);
            if starts_with_digit || tail.get(tag_len) != Some(&b'$') {
                return 0;
            }
            let delimiter = &sql[..tag_len + 2];
            until(delimiter.len(), delimiter)
        }
        _ => 0,
    }
}

/// True for table and column names safe to splice into SQL text.
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Validate an identifier, naming what it is in the error.
pub fn check_identifier(name: &str, what: &str) -> DbResult<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(DbError::validation(format!("Invalid {what} name: '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_bind_named_replaces_markers_in_order() {
        let values = Record::new().with("status", "active").with("min_age", 21);
        let stmt = bind_named(
            "SELECT * FROM users WHERE status = :{status} AND age >= :{min_age}",
            &values,
        )
        .unwrap();

        assert_eq!(stmt.sql, "SELECT * FROM users WHERE status = ? AND age >= ?");
        assert_eq!(
            stmt.params,
            vec![QueryParam::String("active".to_string()), QueryParam::Int(21)]
        );
    }

    #[test]
    fn test_bind_named_repeated_field() {
        let values = Record::new().with("q", "x");
        let stmt = bind_named("SELECT :{q}, :{q}", &values).unwrap();
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_bind_named_missing_field() {
        let err = bind_named("SELECT * FROM t WHERE id = :{id}", &Record::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("'id'"));
    }

    #[test]
    fn test_bind_named_without_markers() {
        let stmt = bind_named("SELECT 1", &Record::new()).unwrap();
        assert_eq!(stmt.sql, "SELECT 1");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_bind_named_unterminated() {
        assert!(bind_named("SELECT :{id", &Record::new().with("id", 1)).is_err());
    }

    #[test]
    fn test_postgres_placeholders() {
        let sql = "UPDATE t SET a = ?, b = '?' WHERE c = ?";
        assert_eq!(
            to_backend_placeholders(sql, DatabaseType::PostgreSQL),
            "UPDATE t SET a = $1, b = '?' WHERE c = $2"
        );
    }

    #[test]
    fn test_postgres_question_mark_operators_in_literals_and_comments() {
        let sql = "SELECT data ->> 'k' -- isn't it?\nFROM t /* why? */ WHERE id = ?";
        assert_eq!(
            to_backend_placeholders(sql, DatabaseType::PostgreSQL),
            "SELECT data ->> 'k' -- isn't it?\nFROM t /* why? */ WHERE id = $1"
        );

        let sql = "SELECT a FROM t -- don't\nWHERE b = ? AND c = ?";
        assert_eq!(
            to_backend_placeholders(sql, DatabaseType::PostgreSQL),
            "SELECT a FROM t -- don't\nWHERE b = $1 AND c = $2"
        );
    }

    #[test]
    fn test_postgres_dollar_quoted_bodies() {
        let sql = "CREATE FUNCTION f() RETURNS text AS $fn$ SELECT 'a?' || $$b?$$ $fn$ LANGUAGE sql; SELECT ?";
        assert_eq!(
            to_backend_placeholders(sql, DatabaseType::PostgreSQL),
            "CREATE FUNCTION f() RETURNS text AS $fn$ SELECT 'a?' || $$b?$$ $fn$ LANGUAGE sql; SELECT $1"
        );
    }

    #[test]
    fn test_postgres_arithmetic_is_not_a_comment() {
        assert_eq!(
            to_backend_placeholders("SELECT a - ? / 2 FROM t", DatabaseType::PostgreSQL),
            "SELECT a - $1 / 2 FROM t"
        );
    }

    #[test]
    fn test_other_backends_unchanged() {
        let sql = "SELECT * FROM t WHERE a = ?";
        assert!(matches!(
            to_backend_placeholders(sql, DatabaseType::SQLite),
            Cow::Borrowed(_)
        ));
        assert_eq!(to_backend_placeholders(sql, DatabaseType::MySQL), sql);
    }

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("users"));
        assert!(is_identifier("public.users"));
        assert!(is_identifier("user_id2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("users; DROP TABLE x"));
        assert!(!is_identifier("a b"));
        assert!(check_identifier("t-1", "table").is_err());
    }
}
