//! treeql - Tree-shaped JSON queries over a relational backend.
//!
//! A request is a JSON object describing a tree of database queries; the
//! response is a JSON object of the same shape. One request can express
//! what would otherwise be several round trips plus client-side joining:
//! later queries reference earlier queries' results through association
//! paths, and array containers fan a template query out across parent rows.
//!
//! # Features
//!
//! - **Operator grammar**: `"id>"`, `"name$"` (LIKE), `"x{}"` (IN / OR
//!   groups), `"n%"` (BETWEEN), `"s~"` (REGEXP) and their AND/OR/NOT
//!   variants
//! - **Associations**: `"userId@": "Moment/userId"` binds a WHERE value to
//!   an earlier node's row
//! - **Array containers**: `"[]"` runs its first child once, then every
//!   sibling once per resulting row
//! - **Field arrays**: `"User-id[]"` projects one column, deduplicated,
//!   usable as an IN-list by later queries
//! - **Parameterized SQL**: user values only ever travel as positional
//!   parameters
//!
//! # Quick Start
//!
//! ```no_run
//! use treeql::{Engine, SqliteBackend};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::open(Path::new("app.db"))?;
//! let engine = Engine::new(&backend);
//! let response = engine.execute_str(r#"{"User": {"id>": 0}}"#)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`backend`] - Storage abstraction (Database trait, SQLite)
//! - [`encode`] - Response encoding
//! - [`engine`] - Request evaluator
//! - [`error`] - Error types
//! - [`grammar`] - Request key grammar
//! - [`statement`] - Parameterized SQL statement builder
//! - [`tree`] - Arena-allocated request tree
//! - [`value`] - Parameter and row values

pub mod backend;
mod encode;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod statement;
pub mod tree;
pub mod value;

// Re-export the surface most callers need.
pub use backend::{Database, SqliteBackend};
pub use engine::{CancelToken, Engine};
pub use error::{EngineError, ResolveError};
pub use statement::{JoinKind, JoinSpec, SetMap, Statement};
pub use value::{Row, SqlValue};
