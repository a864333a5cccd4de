//! Request key grammar.
//!
//! A WHERE key combines a column name with a trailing operator suffix
//! (`"id>"`, `"name!$"`, `"userId{}"`). Classification is a longest-match
//! decision over the trailing one to three bytes; all suffixes are ASCII so
//! plain `strip_suffix` chains are safe on UTF-8 column names. No regular
//! expressions are involved.
//!
//! The same module classifies key *shape* at scope level (`[]` containers
//! and `name-col[]` field arrays), detects association keys (trailing `@`),
//! and hosts the small helpers shared with the statement builder: per-term
//! comparison prefixes inside `{}` comma groups, BETWEEN bounds, column
//! quoting, and `"table(alias)"` extraction.

/// Comparison operator extracted from a key suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// No suffix (or `!`): equality, IN for list values, IS NULL for null.
    Eq,
    /// `<>`
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `{}` and its `&`/`|`/`!` variants.
    In,
    /// `$` and its `&`/`|`/`!` variants.
    Like,
    /// `~`
    Regexp,
    /// `!~`
    NotRegexp,
    /// `%` and its `&`/`|`/`!` variants.
    Between,
    /// `+` ordering hint; produces no condition.
    Asc,
    /// `-` ordering hint; produces no condition.
    Desc,
}

impl Operator {
    /// SQL spelling for the plain comparison operators.
    pub fn comparison_sql(self) -> Option<&'static str> {
        match self {
            Operator::NotEq => Some("<>"),
            Operator::Gt => Some(">"),
            Operator::Gte => Some(">="),
            Operator::Lt => Some("<"),
            Operator::Lte => Some("<="),
            _ => None,
        }
    }
}

/// How the terms of a multi-valued condition combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connective {
    #[default]
    Or,
    And,
}

impl Connective {
    pub fn sql(self) -> &'static str {
        match self {
            Connective::Or => "OR",
            Connective::And => "AND",
        }
    }
}

/// Result of classifying a WHERE key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMatch {
    pub column: String,
    pub op: Operator,
    pub connective: Connective,
    pub negated: bool,
}

/// Classify a WHERE key into `(column, operator, connective, negation)`.
///
/// Unrecognized trailing characters stay part of the column name, which then
/// simply fails to match anything at query time.
pub fn classify(key: &str) -> KeyMatch {
    let (column, op, connective, negated) = if let Some(c) = key.strip_suffix("&{}") {
        (c, Operator::In, Connective::And, false)
    } else if let Some(c) = key.strip_suffix("|{}") {
        (c, Operator::In, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix("!{}") {
        (c, Operator::In, Connective::Or, true)
    } else if let Some(c) = key.strip_suffix("{}") {
        (c, Operator::In, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix("<>") {
        (c, Operator::NotEq, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix(">=") {
        (c, Operator::Gte, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix("<=") {
        (c, Operator::Lte, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix('>') {
        (c, Operator::Gt, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix('<') {
        (c, Operator::Lt, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix("&$") {
        (c, Operator::Like, Connective::And, false)
    } else if let Some(c) = key.strip_suffix("|$") {
        (c, Operator::Like, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix("!$") {
        (c, Operator::Like, Connective::Or, true)
    } else if let Some(c) = key.strip_suffix('$') {
        (c, Operator::Like, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix("!~") {
        (c, Operator::NotRegexp, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix('~') {
        (c, Operator::Regexp, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix("&%") {
        (c, Operator::Between, Connective::And, false)
    } else if let Some(c) = key.strip_suffix("|%") {
        (c, Operator::Between, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix("!%") {
        (c, Operator::Between, Connective::Or, true)
    } else if let Some(c) = key.strip_suffix('%') {
        (c, Operator::Between, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix('+') {
        (c, Operator::Asc, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix('-') {
        (c, Operator::Desc, Connective::Or, false)
    } else if let Some(c) = key.strip_suffix('!') {
        (c, Operator::Eq, Connective::Or, true)
    } else {
        (key, Operator::Eq, Connective::Or, false)
    };

    KeyMatch {
        column: column.trim().to_string(),
        op,
        connective,
        negated,
    }
}

/// Shape of a key at scope level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    /// A table name: queries one row per enclosing scope slot.
    Object,
    /// `[]` (or `name[]` without a dash): an ordered list of row templates.
    Array,
    /// `path-to-col[]`: a deduplicated projection of one column.
    FieldArray,
}

pub fn key_shape(key: &str) -> KeyShape {
    if key.len() < 2 || !key.ends_with("[]") {
        return KeyShape::Object;
    }
    if key.contains('-') {
        KeyShape::FieldArray
    } else {
        KeyShape::Array
    }
}

/// If `key` is an association (`column@`), return the bare column.
pub fn association_column(key: &str) -> Option<&str> {
    key.strip_suffix('@')
}

/// Dashed projection path of a field-array key, `[]` suffix removed.
pub fn field_array_path(key: &str) -> Vec<&str> {
    let path = if key.len() > 2 {
        key.strip_suffix("[]").unwrap_or(key)
    } else {
        key
    };
    path.split('-').collect()
}

/// Split one term of a `{}` comma group into its comparison and bare value.
///
/// Terms default to equality; `>`, `>=`, `<`, `<=` prefixes override it.
pub fn group_term(term: &str) -> (Operator, &str) {
    let (op, rest) = if let Some(r) = term.strip_prefix(">=") {
        (Operator::Gte, r)
    } else if let Some(r) = term.strip_prefix("<=") {
        (Operator::Lte, r)
    } else if let Some(r) = term.strip_prefix('>') {
        (Operator::Gt, r)
    } else if let Some(r) = term.strip_prefix('<') {
        (Operator::Lt, r)
    } else {
        (Operator::Eq, term)
    };
    (op, rest.trim())
}

/// Split a BETWEEN value of the form `"start,end"`.
///
/// Anything but exactly two parts yields empty bounds, which bind as empty
/// text and match nothing.
pub fn between_bounds(value: &str) -> (&str, &str) {
    let mut parts = value.splitn(3, ',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(start), Some(end), None) => (start, end),
        _ => ("", ""),
    }
}

/// Quote a column reference, splitting a dotted name into table and column.
pub fn column_quote(name: &str) -> String {
    match name.split_once('.') {
        Some((table, column)) => format!("`{}`.`{}`", table.trim(), column.trim()),
        None => format!("`{}`", name.trim()),
    }
}

/// Extract `"table(alias)"` into its parts.
pub fn table_alias(source: &str) -> (String, Option<String>) {
    if let Some(start) = source.find('(') {
        if let Some(end) = source.find(')') {
            if start < end {
                return (
                    source[..start].to_string(),
                    Some(source[start + 1..end].to_string()),
                );
            }
        }
    }
    (source.to_string(), None)
}
