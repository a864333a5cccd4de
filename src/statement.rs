//! Parameterized SQL statement builder.
//!
//! A [`Statement`] accumulates clauses through a small fluent surface and
//! renders one verb at the end: FIND, COUNT, INSERT, REPLACE, INSERT IGNORE,
//! INSERT ON DUPLICATE KEY UPDATE, UPDATE, or DELETE. The query engine
//! itself only renders FIND and COUNT; the write verbs serve callers that
//! use the builder directly.
//!
//! Conditions are collected as fragments with positional `?` placeholders
//! and joined with `AND`; every user-supplied value travels in the parameter
//! sequence, never in the SQL text. WHERE maps are interpreted through the
//! key grammar in [`crate::grammar`], with the `@column` and `@order` keys
//! consumed as directives.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as Json;

use crate::error::EngineError;
use crate::grammar::{self, Connective, Operator};
use crate::value::{Row, SqlValue};

/// Ordered column/value payload for the write verbs.
pub type SetMap = IndexMap<String, SqlValue>;

/// Join flavor keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Left,
    Right,
    Inner,
    Full,
    Outer,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Inner => "INNER",
            JoinKind::Full => "FULL",
            JoinKind::Outer => "OUTER",
        }
    }
}

/// How a joined table relates to the main table.
#[derive(Debug, Clone)]
pub enum JoinSpec {
    /// `USING` over one shared column.
    Using(String),
    /// `USING` over several shared columns.
    UsingColumns(Vec<String>),
    /// `ON` equalities from local column to foreign column. Local names
    /// containing a dot are taken as already qualified.
    On(IndexMap<String, String>),
}

/// Accumulated, parameterized description of one SQL statement.
#[derive(Debug, Clone)]
pub struct Statement {
    select_list: String,
    table: String,
    alias: Option<String>,
    joins: Vec<String>,
    conditions: Vec<String>,
    params: Vec<SqlValue>,
    set_clause: String,
    set_params: Vec<SqlValue>,
    orders: Vec<String>,
    limit: i64,
    offset: i64,
    group_by: String,
    having: String,
    distinct: bool,
    for_update: bool,
}

impl Default for Statement {
    fn default() -> Self {
        Statement {
            select_list: "*".to_string(),
            table: String::new(),
            alias: None,
            joins: Vec::new(),
            conditions: Vec::new(),
            params: Vec::new(),
            set_clause: String::new(),
            set_params: Vec::new(),
            orders: Vec::new(),
            limit: -1,
            offset: -1,
            group_by: String::new(),
            having: String::new(),
            distinct: false,
            for_update: false,
        }
    }
}

impl Statement {
    pub fn new() -> Statement {
        Statement::default()
    }

    /// Set the table, extracting an `"table(alias)"` alias if present.
    pub fn set_table(&mut self, source: &str) -> &mut Self {
        let (table, alias) = grammar::table_alias(source);
        self.table = table;
        self.alias = alias;
        self
    }

    /// Replace the SELECT list with a raw comma-separated column string.
    pub fn select(&mut self, columns: &str) -> &mut Self {
        self.select_list = columns.to_string();
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.distinct = true;
        self
    }

    pub fn limit(&mut self, limit: i64) -> &mut Self {
        if limit > 0 {
            self.limit = limit;
        }
        self
    }

    pub fn offset(&mut self, offset: i64) -> &mut Self {
        if offset >= 0 {
            self.offset = offset;
        }
        self
    }

    pub fn order(&mut self, field: &str, desc: bool) -> &mut Self {
        if desc {
            self.orders.push(format!("{} DESC", field));
        } else {
            self.orders.push(field.to_string());
        }
        self
    }

    /// Apply an `@order` directive: comma-separated fields, a trailing `+`
    /// meaning ASC and a trailing `-` meaning DESC.
    pub fn order_directive(&mut self, spec: &str) -> &mut Self {
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some(field) = part.strip_suffix('-') {
                self.orders.push(format!("{} DESC", field));
            } else if let Some(field) = part.strip_suffix('+') {
                self.orders.push(format!("{} ASC", field));
            } else {
                self.orders.push(part.to_string());
            }
        }
        self
    }

    pub fn group_by(&mut self, columns: &[&str]) -> &mut Self {
        match columns {
            [] => {}
            [single] => self.group_by = single.to_string(),
            many => self.group_by = format!("`{}`", many.join("`,`")),
        }
        self
    }

    /// HAVING conditions, built with the same grammar as WHERE; parameters
    /// are appended after the WHERE parameters.
    pub fn having(&mut self, conditions: &Row) -> &mut Self {
        let mut fragments = Vec::new();
        let mut params = Vec::new();
        for (key, value) in conditions {
            condition_fragment(key, value, &mut fragments, &mut params);
        }
        self.having = fragments.join(" AND ");
        self.params.extend(params);
        self
    }

    pub fn for_update(&mut self) -> &mut Self {
        self.for_update = true;
        self
    }

    /// Apply a WHERE map: each key runs through the operator grammar in
    /// order; `@column` and `@order` are consumed as directives.
    pub fn where_map(&mut self, conditions: &Row) -> &mut Self {
        for (key, value) in conditions {
            match key.as_str() {
                "@column" => {
                    if let Some(columns) = value.as_str() {
                        self.select(columns);
                    }
                }
                "@order" => {
                    if let Some(spec) = value.as_str() {
                        self.order_directive(spec);
                    }
                }
                _ => condition_fragment(key, value, &mut self.conditions, &mut self.params),
            }
        }
        self
    }

    pub fn join(&mut self, table: &str, spec: JoinSpec) -> &mut Self {
        self.add_join(None, table, spec)
    }

    pub fn left_join(&mut self, table: &str, spec: JoinSpec) -> &mut Self {
        self.add_join(Some(JoinKind::Left), table, spec)
    }

    pub fn right_join(&mut self, table: &str, spec: JoinSpec) -> &mut Self {
        self.add_join(Some(JoinKind::Right), table, spec)
    }

    pub fn inner_join(&mut self, table: &str, spec: JoinSpec) -> &mut Self {
        self.add_join(Some(JoinKind::Inner), table, spec)
    }

    pub fn full_join(&mut self, table: &str, spec: JoinSpec) -> &mut Self {
        self.add_join(Some(JoinKind::Full), table, spec)
    }

    /// Single-column equality join, qualified on both sides. This is the
    /// form container-level `join` directives compile into.
    pub fn join_on(&mut self, kind: JoinKind, table: &str, local: &str, foreign: &str) -> &mut Self {
        let mut map = IndexMap::new();
        map.insert(local.to_string(), foreign.to_string());
        self.add_join(Some(kind), table, JoinSpec::On(map))
    }

    /// Append a raw join clause verbatim.
    pub fn join_sql(&mut self, clause: &str) -> &mut Self {
        self.joins.push(clause.to_string());
        self
    }

    fn add_join(&mut self, kind: Option<JoinKind>, table: &str, spec: JoinSpec) -> &mut Self {
        let (table, join_alias) = grammar::table_alias(table);
        let mut clause = match kind {
            Some(k) => format!("{} JOIN `{}`", k.keyword(), table),
            None => format!("JOIN `{}`", table),
        };
        if let Some(alias) = &join_alias {
            clause.push_str(&format!(" AS `{}`", alias));
        }
        let right = join_alias.as_deref().unwrap_or(&table);
        match spec {
            JoinSpec::Using(column) => {
                clause.push_str(&format!(" USING (`{}`)", column));
            }
            JoinSpec::UsingColumns(columns) => {
                clause.push_str(&format!(" USING (`{}`)", columns.join("`, `")));
            }
            JoinSpec::On(pairs) => {
                let main = self.alias.as_deref().unwrap_or(&self.table);
                let equalities: Vec<String> = pairs
                    .iter()
                    .map(|(local, foreign)| {
                        let left = if local.contains('.') {
                            grammar::column_quote(local)
                        } else {
                            format!("`{}`.`{}`", main, local)
                        };
                        format!("{} = `{}`.`{}`", left, right, foreign)
                    })
                    .collect();
                clause.push_str(&format!(" ON {}", equalities.join(" AND ")));
            }
        }
        self.joins.push(clause);
        self
    }

    /// INSERT/REPLACE payload from an ordered column map.
    pub fn insert_map(&mut self, values: &SetMap) -> &mut Self {
        if values.is_empty() {
            return self;
        }
        let fields: Vec<String> = values.keys().map(|k| grammar::column_quote(k)).collect();
        let placeholders = vec!["?"; values.len()].join(", ");
        self.set_clause = format!("({}) VALUES ({})", fields.join(", "), placeholders);
        self.set_params.extend(values.values().cloned());
        self
    }

    pub fn replace_map(&mut self, values: &SetMap) -> &mut Self {
        self.insert_map(values)
    }

    /// UPDATE payload from an ordered column map. Set parameters precede
    /// the WHERE parameters in the rendered order.
    pub fn update_map(&mut self, values: &SetMap) -> &mut Self {
        if values.is_empty() {
            return self;
        }
        let assignments: Vec<String> = values
            .keys()
            .map(|k| format!("{} = ?", grammar::column_quote(k)))
            .collect();
        self.set_clause = assignments.join(", ");
        self.set_params.extend(values.values().cloned());
        self
    }

    /// INSERT payload from any serializable struct. Field skipping (zero
    /// values, renames) is the struct's own serde configuration.
    pub fn insert_struct<T: Serialize>(&mut self, payload: &T) -> Result<&mut Self, EngineError> {
        let values = struct_values(payload)?;
        Ok(self.insert_map(&values))
    }

    pub fn replace_struct<T: Serialize>(&mut self, payload: &T) -> Result<&mut Self, EngineError> {
        self.insert_struct(payload)
    }

    pub fn update_struct<T: Serialize>(&mut self, payload: &T) -> Result<&mut Self, EngineError> {
        let values = struct_values(payload)?;
        Ok(self.update_map(&values))
    }

    /// All positional parameters in bind order: write payload first, then
    /// condition and HAVING parameters.
    pub fn params(&self) -> Vec<&SqlValue> {
        self.set_params.iter().chain(self.params.iter()).collect()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The rendered WHERE condition, without the `WHERE` keyword.
    pub fn condition(&self) -> String {
        self.conditions.join(" AND ")
    }

    fn require_table(&self) -> Result<(), EngineError> {
        if self.table.is_empty() {
            return Err(EngineError::EmptyTable);
        }
        Ok(())
    }

    fn render_body(&self, select: &str) -> String {
        let mut sql = format!("SELECT {} FROM `{}`", select, self.table);
        if let Some(alias) = &self.alias {
            sql.push_str(&format!(" AS `{}`", alias));
        }
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.condition());
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by);
        }
        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.having);
        }
        sql
    }

    /// Render the FIND form.
    pub fn find_sql(&self) -> Result<String, EngineError> {
        self.require_table()?;
        let mut sql = self.render_body(&self.select_list);
        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.orders.join(", "));
        }
        if self.limit >= 0 {
            sql.push_str(&format!(" LIMIT {}", self.limit));
        }
        if self.offset >= 0 {
            sql.push_str(&format!(" OFFSET {}", self.offset));
        }
        if self.for_update {
            sql.push_str(" FOR UPDATE");
        }
        Ok(sql)
    }

    /// Render the COUNT form: the SELECT list is rewritten to a `count(...)`
    /// aggregate unless it already is one; ORDER/LIMIT/OFFSET are dropped.
    pub fn count_sql(&self) -> Result<String, EngineError> {
        self.require_table()?;
        let select = if self.select_list == "*" {
            "count(*)".to_string()
        } else {
            let trimmed = self.select_list.trim();
            if trimmed.to_lowercase().starts_with("count(") {
                trimmed.to_string()
            } else if self.distinct {
                format!("count(DISTINCT {})", trimmed)
            } else {
                format!("count({})", trimmed)
            }
        };
        Ok(self.render_body(&select))
    }

    pub fn insert_sql(&self) -> Result<String, EngineError> {
        self.require_table()?;
        Ok(format!("INSERT INTO `{}` {}", self.table, self.set_clause))
    }

    pub fn replace_sql(&self) -> Result<String, EngineError> {
        self.require_table()?;
        Ok(format!("REPLACE INTO `{}` {}", self.table, self.set_clause))
    }

    pub fn insert_ignore_sql(&self) -> Result<String, EngineError> {
        self.require_table()?;
        Ok(format!("INSERT IGNORE INTO `{}` {}", self.table, self.set_clause))
    }

    /// Render `INSERT ON DUPLICATE KEY UPDATE`. Update values are bound
    /// as parameters unless they start with `VALUES`, which passes through
    /// for the `VALUES(col)` form.
    pub fn insert_on_duplicate_sql(
        &mut self,
        update_keys: &IndexMap<String, String>,
    ) -> Result<String, EngineError> {
        self.require_table()?;
        let mut sql = format!(
            "INSERT INTO `{}` {} ON DUPLICATE KEY UPDATE ",
            self.table, self.set_clause
        );
        let mut first = true;
        for (column, value) in update_keys {
            let rendered = if value.starts_with("VALUES") || value.starts_with("values") {
                value.clone()
            } else {
                self.set_params.push(SqlValue::Text(value.clone()));
                "?".to_string()
            };
            if first {
                first = false;
            } else {
                sql.push_str(", ");
            }
            sql.push_str(&format!("`{}` = {}", column, rendered));
        }
        Ok(sql)
    }

    pub fn update_sql(&self) -> Result<String, EngineError> {
        self.require_table()?;
        let mut sql = format!("UPDATE `{}` SET {}", self.table, self.set_clause);
        self.push_tail(&mut sql);
        Ok(sql)
    }

    pub fn delete_sql(&self) -> Result<String, EngineError> {
        self.require_table()?;
        let mut sql = format!("DELETE FROM `{}`", self.table);
        self.push_tail(&mut sql);
        Ok(sql)
    }

    fn push_tail(&self, sql: &mut String) {
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.condition());
        }
        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.orders.join(", "));
        }
        if self.limit >= 0 {
            sql.push_str(&format!(" LIMIT {}", self.limit));
        }
        if self.offset >= 0 {
            sql.push_str(&format!(" OFFSET {}", self.offset));
        }
    }
}

fn struct_values<T: Serialize>(payload: &T) -> Result<SetMap, EngineError> {
    let json = serde_json::to_value(payload)?;
    let mut values = SetMap::new();
    if let Json::Object(fields) = json {
        for (key, value) in &fields {
            values.insert(key.clone(), SqlValue::from_json(value));
        }
    }
    Ok(values)
}

/// Translate one WHERE entry into a condition fragment plus parameters.
fn condition_fragment(
    key: &str,
    value: &Json,
    fragments: &mut Vec<String>,
    params: &mut Vec<SqlValue>,
) {
    let m = grammar::classify(key);
    if m.column.is_empty() {
        return;
    }
    let column = grammar::column_quote(&m.column);

    match m.op {
        Operator::Eq => {
            if value.is_null() {
                let check = if m.negated { "IS NOT NULL" } else { "IS NULL" };
                fragments.push(format!("{} {}", column, check));
            } else if let Some(items) = value.as_array() {
                push_in_list(&column, items, m.negated, fragments, params);
            } else {
                params.push(SqlValue::from_json(value));
                let op = if m.negated { "!=" } else { "=" };
                fragments.push(format!("{} {} ?", column, op));
            }
        }
        Operator::NotEq | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            params.push(SqlValue::from_json(value));
            let op = m.op.comparison_sql().unwrap_or("=");
            fragments.push(format!("{} {} ?", column, op));
        }
        Operator::In => {
            if let Some(items) = value.as_array() {
                push_in_list(&column, items, m.negated, fragments, params);
            } else if let Some(text) = value.as_str() {
                match text {
                    "=null" => fragments.push(format!("{} IS NULL", column)),
                    "!=null" => fragments.push(format!("{} IS NOT NULL", column)),
                    _ => push_group(&column, text, m.connective, m.negated, fragments, params),
                }
            }
        }
        Operator::Like | Operator::Regexp | Operator::NotRegexp => {
            let base = if m.op == Operator::Like { "LIKE" } else { "REGEXP" };
            let negated = m.negated || m.op == Operator::NotRegexp;
            if let Some(items) = value.as_array() {
                let mut terms = Vec::new();
                for item in items {
                    params.push(SqlValue::from_json(item));
                    terms.push(format!("{} {} ?", column, base));
                }
                let joined = terms.join(&format!(" {} ", m.connective.sql()));
                fragments.push(wrap_group(&joined, negated));
            } else {
                params.push(SqlValue::from_json(value));
                let op = if negated {
                    format!("NOT {}", base)
                } else {
                    base.to_string()
                };
                fragments.push(format!("{} {} ?", column, op));
            }
        }
        Operator::Between => {
            if let Some(items) = value.as_array() {
                let mut terms = Vec::new();
                for item in items {
                    if let Some(pair) = item.as_str() {
                        let (start, end) = grammar::between_bounds(pair);
                        params.push(SqlValue::from_term(start));
                        params.push(SqlValue::from_term(end));
                        terms.push(format!("{} BETWEEN ? AND ?", column));
                    }
                }
                if !terms.is_empty() {
                    let joined = terms.join(&format!(" {} ", m.connective.sql()));
                    fragments.push(wrap_group(&joined, m.negated));
                }
            } else if let Some(pair) = value.as_str() {
                let (start, end) = grammar::between_bounds(pair);
                params.push(SqlValue::from_term(start));
                params.push(SqlValue::from_term(end));
                fragments.push(wrap_group(&format!("{} BETWEEN ? AND ?", column), m.negated));
            }
        }
        // Ordering hints produce no condition.
        Operator::Asc | Operator::Desc => {}
    }
}

fn push_in_list(
    column: &str,
    items: &[Json],
    negated: bool,
    fragments: &mut Vec<String>,
    params: &mut Vec<SqlValue>,
) {
    let placeholders = vec!["?"; items.len()].join(", ");
    for item in items {
        params.push(SqlValue::from_json(item));
    }
    let keyword = if negated { "NOT IN" } else { "IN" };
    fragments.push(format!("{} {} ({})", column, keyword, placeholders));
}

/// Expand an OR/AND comma group: each term may carry its own comparison
/// prefix, defaulting to equality.
fn push_group(
    column: &str,
    group: &str,
    connective: Connective,
    negated: bool,
    fragments: &mut Vec<String>,
    params: &mut Vec<SqlValue>,
) {
    let mut terms = Vec::new();
    for term in group.split(',') {
        let term = term.trim();
        if term.is_empty() {
            continue;
        }
        let (op, raw) = grammar::group_term(term);
        let op_sql = op.comparison_sql().unwrap_or("=");
        params.push(SqlValue::from_term(raw));
        terms.push(format!("{} {} ?", column, op_sql));
    }
    if terms.is_empty() {
        return;
    }
    let joined = terms.join(&format!(" {} ", connective.sql()));
    fragments.push(wrap_group(&joined, negated));
}

fn wrap_group(group: &str, negated: bool) -> String {
    if negated {
        format!("NOT ({})", group)
    } else {
        format!("({})", group)
    }
}
