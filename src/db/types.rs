//! Row decoding into structured records.
//!
//! Each column is first classified by its declared type name into a
//! [`TypeCategory`], then decoded by the backend's decoder for that category.
//! A value that cannot be decoded becomes `null` rather than failing the row.

use crate::models::{DatabaseType, Record};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::types::{PgInterval, PgMoney};
use sqlx::postgres::{PgRow, PgValueFormat};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_ascii_lowercase();

    match lower.as_str() {
        // SQLite stores NUMERIC affinity as REAL or INTEGER
        t if t.contains("decimal") || t.contains("numeric") => match db {
            DatabaseType::SQLite => TypeCategory::Float,
            _ => TypeCategory::Decimal,
        },
        "uuid" => TypeCategory::Uuid,
        t if is_integer_name(t) => TypeCategory::Integer,
        "bool" | "boolean" => TypeCategory::Boolean,
        "real" | "float4" | "float8" => TypeCategory::Float,
        t if t.contains("float") || t.contains("double") => TypeCategory::Float,
        "json" | "jsonb" => TypeCategory::Json,
        "bytea" => TypeCategory::Binary,
        t if t.contains("blob") || t.contains("binary") => TypeCategory::Binary,
        _ => TypeCategory::Text,
    }
}

/// Exact integer type names; `interval` and `point` only contain "int".
fn is_integer_name(name: &str) -> bool {
    let base = name.strip_suffix(" unsigned").unwrap_or(name);
    matches!(
        base,
        "int"
            | "integer"
            | "int2"
            | "int4"
            | "int8"
            | "tinyint"
            | "smallint"
            | "mediumint"
            | "bigint"
            | "serial"
            | "smallserial"
            | "bigserial"
    )
}

/// Binary columns are carried as base64 text.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

/// Decode one nullable column, treating decode failures as absent.
fn value<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

/// First of several candidate Rust types that decodes, mapped to JSON.
macro_rules! first_decoded {
    ($row:expr, $idx:expr, $map:expr; $($ty:ty),+ $(,)?) => {
        None$(.or_else(|| value::<_, $ty>($row, $idx).map($map)))+
    };
}

fn display<T: ToString>(v: T) -> JsonValue {
    JsonValue::String(v.to_string())
}

/// Trait for converting database rows to records.
pub trait RowToRecord {
    fn to_record(&self) -> Record;

    /// Decoded value of a single column.
    fn column_value(&self, idx: usize) -> Option<JsonValue>;
}

macro_rules! impl_row_to_record {
    ($row:ty, $db:expr, $decoder:path) => {
        impl RowToRecord for $row {
            fn to_record(&self) -> Record {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let category = categorize_type(col.type_info().name(), $db);
                        (col.name().to_string(), $decoder(self, idx, category))
                    })
                    .collect::<serde_json::Map<_, _>>()
                    .into()
            }

            fn column_value(&self, idx: usize) -> Option<JsonValue> {
                let col = self.columns().get(idx)?;
                let category = categorize_type(col.type_info().name(), $db);
                Some($decoder(self, idx, category))
            }
        }
    };
}

impl_row_to_record!(MySqlRow, DatabaseType::MySQL, decode_mysql);
impl_row_to_record!(PgRow, DatabaseType::PostgreSQL, decode_postgres);
impl_row_to_record!(SqliteRow, DatabaseType::SQLite, decode_sqlite);

fn decode_mysql(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
    let decoded = match category {
        TypeCategory::Integer => first_decoded!(row, idx, JsonValue::from; i64, u64),
        TypeCategory::Float => first_decoded!(row, idx, JsonValue::from; f64, f32),
        TypeCategory::Decimal => first_decoded!(row, idx, display; Decimal),
        TypeCategory::Boolean => first_decoded!(row, idx, JsonValue::Bool; bool),
        TypeCategory::Binary => value::<_, Vec<u8>>(row, idx).map(|v| encode_binary(&v)),
        TypeCategory::Json => value::<_, JsonValue>(row, idx),
        TypeCategory::Text | TypeCategory::Uuid => {
            first_decoded!(row, idx, JsonValue::String; String).or_else(|| {
                first_decoded!(row, idx, display;
                    chrono::NaiveDateTime,
                    chrono::DateTime<chrono::Utc>,
                    chrono::NaiveDate,
                    chrono::NaiveTime,
                )
            })
        }
    };
    decoded.unwrap_or(JsonValue::Null)
}

fn decode_postgres(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
    let decoded = match category {
        TypeCategory::Integer => first_decoded!(row, idx, JsonValue::from; i64, i32, i16),
        TypeCategory::Float => first_decoded!(row, idx, JsonValue::from; f64, f32),
        TypeCategory::Decimal => first_decoded!(row, idx, display; Decimal),
        TypeCategory::Boolean => first_decoded!(row, idx, JsonValue::Bool; bool),
        TypeCategory::Binary => value::<_, Vec<u8>>(row, idx).map(|v| encode_binary(&v)),
        TypeCategory::Json => value::<_, JsonValue>(row, idx),
        TypeCategory::Uuid => first_decoded!(row, idx, display; uuid::Uuid),
        // Dates and times do not decode as text in the binary protocol
        TypeCategory::Text => first_decoded!(row, idx, JsonValue::String; String)
            .or_else(|| {
                first_decoded!(row, idx, display;
                    chrono::NaiveDateTime,
                    chrono::DateTime<chrono::Utc>,
                    chrono::NaiveDate,
                    chrono::NaiveTime,
                )
            })
            .or_else(|| value::<_, PgMoney>(row, idx).map(|m| display(m.to_decimal(2))))
            .or_else(|| value::<_, PgInterval>(row, idx).map(interval_text))
            .or_else(|| pg_raw_value(row, idx)),
    };
    decoded.unwrap_or(JsonValue::Null)
}

/// `1 mons 2 days 03:04:05.000006`, close to PostgreSQL's own output.
fn interval_text(interval: PgInterval) -> JsonValue {
    let sign = if interval.microseconds < 0 { "-" } else { "" };
    let micros = interval.microseconds.unsigned_abs();
    let secs = micros / 1_000_000;
    JsonValue::String(format!(
        "{} mons {} days {sign}{:02}:{:02}:{:02}.{:06}",
        interval.months,
        interval.days,
        secs / 3600,
        secs % 3600 / 60,
        secs % 60,
        micros % 1_000_000,
    ))
}

/// Types without a Rust mapping (`inet`, `point` ...) keep their wire value:
/// text under the simple protocol, base64 under the binary one.
fn pg_raw_value(row: &PgRow, idx: usize) -> Option<JsonValue> {
    let raw = row.try_get_raw(idx).ok()?;
    if raw.is_null() {
        return None;
    }
    match raw.format() {
        PgValueFormat::Text => raw.as_str().ok().map(|s| JsonValue::String(s.to_string())),
        PgValueFormat::Binary => raw.as_bytes().ok().map(encode_binary),
    }
}

fn decode_sqlite(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
    let decoded = match category {
        TypeCategory::Integer => first_decoded!(row, idx, JsonValue::from; i64),
        TypeCategory::Float | TypeCategory::Decimal => {
            first_decoded!(row, idx, JsonValue::from; f64, i64)
        }
        TypeCategory::Boolean => first_decoded!(row, idx, JsonValue::Bool; bool),
        TypeCategory::Binary => value::<_, Vec<u8>>(row, idx).map(|v| encode_binary(&v)),
        // JSON is stored as text; keep the text when it does not parse
        TypeCategory::Json => value::<_, String>(row, idx)
            .map(|s| serde_json::from_str(&s).unwrap_or(JsonValue::String(s))),
        // Expression columns carry no declared type; use the value's storage class
        TypeCategory::Text | TypeCategory::Uuid => {
            first_decoded!(row, idx, JsonValue::from; String, i64, f64)
                .or_else(|| value::<_, Vec<u8>>(row, idx).map(|v| encode_binary(&v)))
        }
    };
    decoded.unwrap_or(JsonValue::Null)
}
