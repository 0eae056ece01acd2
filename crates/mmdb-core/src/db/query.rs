//! Typed statement execution.
//!
//! Statements take a slice of [`Param`] bound by position, and rows come
//! back through a caller-supplied decoder closure. Every statement is
//! prepared through the connection's statement cache and logged at `trace`.

use rusqlite::types::{ToSqlOutput, Value as SqlValue};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params_from_iter};

/// A positional statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Text(String),
    Integer(i64),
    Blob(Vec<u8>),
    Null,
}

impl ToSql for Param {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Text(s) => ToSqlOutput::from(s.as_str()),
            Self::Integer(i) => ToSqlOutput::from(*i),
            Self::Blob(b) => ToSqlOutput::from(b.as_slice()),
            Self::Null => ToSqlOutput::Owned(SqlValue::Null),
        })
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<Vec<u8>> for Param {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Build a `Vec<Param>` from heterogeneous values.
#[macro_export]
macro_rules! params {
    () => { ::std::vec::Vec::<$crate::db::query::Param>::new() };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::db::query::Param::from($value)),+]
    };
}

/// Run a statement that returns no rows, yielding the number of rows changed.
///
/// # Errors
///
/// Returns the SQLite error if preparing or running the statement fails.
pub fn execute(conn: &Connection, sql: &str, params: &[Param]) -> rusqlite::Result<usize> {
    tracing::trace!(sql, ?params, "execute");
    let mut stmt = conn.prepare_cached(sql)?;
    stmt.execute(params_from_iter(params))
}

/// Run a query and decode its first row, if any.
///
/// # Errors
///
/// Returns the SQLite error if the statement fails or `decode` does.
pub fn fetch_one<T, F>(
    conn: &Connection,
    sql: &str,
    params: &[Param],
    decode: F,
) -> rusqlite::Result<Option<T>>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    tracing::trace!(sql, ?params, "fetch_one");
    let mut stmt = conn.prepare_cached(sql)?;
    stmt.query_row(params_from_iter(params), decode).optional()
}

/// Run a query and decode every row.
///
/// # Errors
///
/// Returns the SQLite error if the statement fails or `decode` does for any row.
pub fn fetch_many<T, F>(
    conn: &Connection,
    sql: &str,
    params: &[Param],
    decode: F,
) -> rusqlite::Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    tracing::trace!(sql, ?params, "fetch_many");
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params_from_iter(params), decode)?;
    rows.collect()
}
