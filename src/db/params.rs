//! Binding `QueryParam` values onto backend-specific sqlx queries.

use crate::models::QueryParam;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};

pub(crate) trait BindParams<'q>: Sized {
    fn bind_param(self, param: &'q QueryParam) -> Self;

    /// Bind every parameter in order.
    fn bind_all(self, params: &'q [QueryParam]) -> Self {
        params.iter().fold(self, Self::bind_param)
    }
}

impl<'q> BindParams<'q> for Query<'q, MySql, MySqlArguments> {
    fn bind_param(self, param: &'q QueryParam) -> Self {
        match param {
            QueryParam::Null => self.bind(None::<String>),
            QueryParam::Bool(v) => self.bind(*v),
            QueryParam::Int(v) => self.bind(*v),
            QueryParam::Float(v) => self.bind(*v),
            QueryParam::String(v) => self.bind(v.as_str()),
            QueryParam::Json(v) => self.bind(Json(v)),
        }
    }
}

impl<'q> BindParams<'q> for Query<'q, Postgres, PgArguments> {
    fn bind_param(self, param: &'q QueryParam) -> Self {
        match param {
            QueryParam::Null => self.bind(None::<String>),
            QueryParam::Bool(v) => self.bind(*v),
            QueryParam::Int(v) => self.bind(*v),
            QueryParam::Float(v) => self.bind(*v),
            QueryParam::String(v) => self.bind(v.as_str()),
            QueryParam::Json(v) => self.bind(Json(v)),
        }
    }
}

impl<'q> BindParams<'q> for Query<'q, Sqlite, SqliteArguments<'q>> {
    fn bind_param(self, param: &'q QueryParam) -> Self {
        match param {
            QueryParam::Null => self.bind(None::<String>),
            QueryParam::Bool(v) => self.bind(*v),
            QueryParam::Int(v) => self.bind(*v),
            QueryParam::Float(v) => self.bind(*v),
            QueryParam::String(v) => self.bind(v.as_str()),
            // SQLite has no native JSON type, store as text
            QueryParam::Json(v) => self.bind(v.to_string()),
        }
    }
}
