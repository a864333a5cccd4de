//! Storage abstraction for statement execution.
//!
//! The [`Database`] trait is the engine's only coupling to the outside
//! world: it executes a rendered, parameterized statement and hands back
//! ordered row maps. The engine itself stays SQL-dialect-agnostic beyond
//! the operators its statements emit.

mod sqlite;

pub use sqlite::SqliteBackend;

use crate::error::EngineError;
use crate::statement::Statement;
use crate::value::Row;

/// Execution surface the evaluator drives.
///
/// `find_one` applies `LIMIT 1` on top of the supplied statement and returns
/// `None` when no row matches. Row maps preserve the column order of the
/// underlying SELECT.
pub trait Database {
    /// Execute the FIND form and return every matching row.
    fn find_all(&self, statement: &Statement) -> Result<Vec<Row>, EngineError>;

    /// Execute the FIND form capped at one row.
    fn find_one(&self, statement: &Statement) -> Result<Option<Row>, EngineError>;

    /// Execute the COUNT form.
    fn count(&self, statement: &Statement) -> Result<u64, EngineError>;
}
