//! Error types for treeql.
//!
//! Error codes are organized by category:
//!
//! - **TQL-E001 to TQL-E099**: request parsing and grammar errors
//! - **TQL-E100 to TQL-E199**: statement builder errors
//! - **TQL-E200 to TQL-E299**: execution and cancellation errors
//! - **TQL-E900 to TQL-E999**: propagated driver and serialization errors
//!
//! Association-path failures are deliberately not part of [`EngineError`]:
//! a path that cannot be resolved suppresses only the query for the affected
//! row slot (the response carries `null` there), so those failures live in
//! [`ResolveError`] and never abort a request.

use thiserror::Error;

/// Main error type for treeql operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Request body is not a JSON object.
    #[error("Request body must be a JSON object")]
    NotAnObject,

    /// Request is structurally invalid.
    #[error("Malformed request: {reason}")]
    MalformedRequest { reason: String },

    /// A `join` directive could not be parsed or wired.
    #[error("Invalid join spec: {spec}")]
    InvalidJoin { spec: String },

    /// An association key carried a non-string value.
    #[error("Association '{key}' must carry a string path")]
    AssociationNotString { key: String },

    /// Statement was rendered without a table name.
    #[error("Statement has no table name")]
    EmptyTable,

    /// The request was canceled or its deadline expired.
    #[error("Request canceled")]
    Canceled,

    /// SQLite error occurred.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error occurred.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Returns the error code for this error.
    pub const fn error_code(&self) -> &'static str {
        match self {
            EngineError::NotAnObject => "TQL-E001",
            EngineError::MalformedRequest { .. } => "TQL-E002",
            EngineError::InvalidJoin { .. } => "TQL-E003",
            EngineError::AssociationNotString { .. } => "TQL-E004",
            EngineError::EmptyTable => "TQL-E101",
            EngineError::Canceled => "TQL-E201",
            EngineError::Sqlite(_) => "TQL-E901",
            EngineError::Json(_) => "TQL-E902",
            EngineError::Io(_) => "TQL-E903",
        }
    }

    /// Returns remediation hints for this error, if available.
    pub const fn remediation(&self) -> Option<&'static str> {
        match self {
            EngineError::NotAnObject => {
                Some("Send a JSON object whose keys are table names, '[]' containers, or field arrays.")
            }
            EngineError::MalformedRequest { .. } => {
                Some("Check the request keys against the operator grammar.")
            }
            EngineError::InvalidJoin { .. } => {
                Some("A join spec is 'op/Table/field' with op one of <, >, &, FULL, !, and the joined table must appear in the container body.")
            }
            EngineError::AssociationNotString { .. } => {
                Some("Keys ending in '@' take a '/'-separated path string, not a literal value.")
            }
            EngineError::EmptyTable => Some("Call set_table() before rendering a statement."),
            EngineError::Canceled => None,
            EngineError::Sqlite(_) => {
                Some("The database may be locked or the emitted SQL unsupported by this backend.")
            }
            EngineError::Json(_) => Some("Check that the request body is valid JSON."),
            EngineError::Io(_) => Some("Check file permissions and disk space."),
        }
    }
}

/// Why a single association path failed to resolve.
///
/// These are soft failures: the enclosing query is skipped and the affected
/// row slot is emitted as `null` while sibling processing continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The path contains an empty segment outside the leading position.
    #[error("path has an empty segment")]
    EmptySegment,

    /// A segment did not name any sibling in the scope being walked.
    #[error("segment '{0}' not found")]
    SegmentNotFound(String),

    /// The path continues below a node that has no children.
    #[error("path interrupted before its final segment")]
    PathInterrupted,

    /// The referenced node has not materialized any rows.
    #[error("referenced data is empty")]
    DataEmpty,

    /// The referenced row does not carry the requested column.
    #[error("column '{0}' not present in referenced row")]
    FieldMissing(String),

    /// The referenced node is not a sibling of any ancestor of the
    /// referencing node.
    #[error("referenced node is not in a reachable ancestor layer")]
    NotInAncestorLayer,
}
