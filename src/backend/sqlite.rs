//! SQLite backend implementation.
//!
//! Wraps a `rusqlite::Connection` and implements [`Database`](super::Database)
//! by rendering the statement's FIND/COUNT form and binding its positional
//! parameters. A `REGEXP` scalar function is registered at open so the
//! grammar's `~` operator works against stock SQLite.

use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use serde_json::Value as Json;
use tracing::debug;

use crate::error::EngineError;
use crate::statement::Statement;
use crate::value::{Row, SqlValue, TIME_LAYOUT};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// SQLite-backed [`Database`](super::Database).
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open a database file.
    pub fn open(db_path: &Path) -> Result<Self, EngineError> {
        Self::from_connection(Connection::open(db_path)?)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection, registering the `REGEXP` function.
    pub fn from_connection(conn: Connection) -> Result<Self, EngineError> {
        register_regexp(&conn)?;
        Ok(SqliteBackend { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// `X REGEXP pattern` support; the compiled pattern is cached per statement
/// through the function's aux-data slot.
fn register_regexp(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        move |ctx| {
            let pattern: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> Result<_, BoxError> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;
            let matched = match ctx.get_raw(1) {
                ValueRef::Null => false,
                text => {
                    let text = text
                        .as_str()
                        .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
                    pattern.is_match(text)
                }
            };
            Ok(matched)
        },
    )
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Float(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            SqlValue::Time(t) => ToSqlOutput::Owned(Value::Text(t.format(TIME_LAYOUT).to_string())),
        })
    }
}

fn cell_to_json(value: ValueRef<'_>) -> Json {
    match value {
        ValueRef::Null => Json::Null,
        ValueRef::Integer(i) => Json::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        ValueRef::Text(t) => Json::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Json::String(hex::encode(b)),
    }
}

fn read_rows(
    stmt: &mut rusqlite::Statement<'_>,
    params: &[&SqlValue],
) -> Result<Vec<Row>, rusqlite::Error> {
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut map = Row::new();
        for (i, name) in names.iter().enumerate() {
            map.insert(name.clone(), cell_to_json(row.get_ref(i)?));
        }
        out.push(map);
    }
    Ok(out)
}

impl super::Database for SqliteBackend {
    fn find_all(&self, statement: &Statement) -> Result<Vec<Row>, EngineError> {
        let sql = statement.find_sql()?;
        debug!(sql = %sql, "find_all");
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(read_rows(&mut stmt, &statement.params())?)
    }

    fn find_one(&self, statement: &Statement) -> Result<Option<Row>, EngineError> {
        let mut capped = statement.clone();
        capped.limit(1);
        let sql = capped.find_sql()?;
        debug!(sql = %sql, "find_one");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = read_rows(&mut stmt, &capped.params())?;
        Ok(rows.into_iter().next())
    }

    fn count(&self, statement: &Statement) -> Result<u64, EngineError> {
        let sql = statement.count_sql()?;
        debug!(sql = %sql, "count");
        let count: i64 =
            self.conn
                .query_row(&sql, params_from_iter(statement.params().iter()), |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }
}
