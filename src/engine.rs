//! Request evaluator.
//!
//! One request is one strictly sequential pre-order pass over the request
//! tree: siblings left to right, parent before child. Sequencing is load-
//! bearing. A later node's WHERE clause may reference an earlier node's
//! rows through an association path, so sibling queries cannot be
//! reordered or parallelized within a request.
//!
//! For each key the evaluator classifies its shape, links the node into the
//! tree, expands array containers once per parent row, resolves association
//! entries against already-executed nodes, builds a [`Statement`] and runs
//! it through the [`Database`], then encodes the response in request order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde_json::Value as Json;
use tracing::{debug, trace};

use crate::backend::Database;
use crate::encode::encode;
use crate::error::{EngineError, ResolveError};
use crate::grammar::{self, KeyShape};
use crate::statement::{JoinKind, Statement};
use crate::tree::{Join, NodeId, Tree};
use crate::value::Row;

/// Cooperative cancellation and deadline token.
///
/// Checked before every database call; once tripped, all remaining calls in
/// the request are skipped and the evaluator returns
/// [`EngineError::Canceled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Token that trips on its own once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> CancelToken {
        CancelToken {
            flag: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// The request-tree query engine.
///
/// Holds a borrowed database handle for the duration of one or more
/// requests; each request builds and discards its own tree.
pub struct Engine<'a> {
    db: &'a dyn Database,
    cancel: Option<CancelToken>,
}

impl<'a> Engine<'a> {
    pub fn new(db: &'a dyn Database) -> Engine<'a> {
        Engine { db, cancel: None }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Engine<'a> {
        self.cancel = Some(token);
        self
    }

    /// Execute a raw request body and return the serialized response.
    pub fn execute_str(&self, body: &str) -> Result<String, EngineError> {
        let value: Json = serde_json::from_str(body)?;
        let Json::Object(request) = value else {
            return Err(EngineError::NotAnObject);
        };
        let response = self.execute(&request)?;
        Ok(serde_json::to_string(&response)?)
    }

    /// Execute a parsed request and return the ordered response object.
    pub fn execute(&self, request: &Row) -> Result<Row, EngineError> {
        let mut tree = Tree::new();
        self.parse_node(&mut tree, request, 0, Tree::ROOT)?;
        Ok(encode(&tree, Tree::ROOT))
    }

    fn parse_node(
        &self,
        tree: &mut Tree,
        scope: &Row,
        index: usize,
        start: NodeId,
    ) -> Result<(), EngineError> {
        let mut node = start;
        for (key, value) in scope {
            // Only object-valued keys become nodes; scalar keys at this
            // level are directives consumed elsewhere (count, join).
            let Some(body) = value.as_object() else {
                continue;
            };

            if tree.node(node).key.is_empty() {
                tree.node_mut(node).key = key.clone();
            } else {
                node = tree.add_sibling(key, node);
            }

            match grammar::key_shape(key) {
                shape @ (KeyShape::Array | KeyShape::FieldArray) => {
                    tree.node_mut(node).is_array = true;
                    let parent = tree.node(node).parent;
                    let runs = match parent {
                        Some(p) if tree.node(p).is_array => tree.node(p).size,
                        _ => 1,
                    };
                    if shape == KeyShape::FieldArray {
                        tree.node_mut(node).field_data = vec![Vec::new(); runs];
                    }
                    for i in 0..runs {
                        self.parse_array(tree, shape, i, key, body, node)?;
                    }
                    if shape == KeyShape::FieldArray {
                        let n = tree.node_mut(node);
                        n.is_field_array = true;
                        n.children.clear();
                        n.data.clear();
                        n.size = n.field_data.len();
                    }
                }
                KeyShape::Object => {
                    let parent = tree.node(node).parent;
                    let container = parent.filter(|&p| tree.node(p).is_array);
                    match container {
                        Some(container) if tree.node(node).first.is_none() => {
                            // The first sibling runs one findAll; its row
                            // count becomes the container size for every
                            // later sibling.
                            let joins = compile_joins(tree, scope, container)?;
                            let cap = tree.node(container).row_cap;
                            let rows = self
                                .find_all(tree, key, body, index, node, &joins, cap)?
                                .unwrap_or_default();
                            tree.node_mut(container).size = rows.len();
                            tree.node_mut(node).data = rows.into_iter().map(Some).collect();
                        }
                        Some(container) => {
                            let size = tree.node(container).size;
                            for i in 0..size {
                                let row = self.find_one(tree, key, body, i, node)?;
                                tree.node_mut(node).data.push(row);
                            }
                        }
                        None => {
                            let row = self.find_one(tree, key, body, index, node)?;
                            tree.node_mut(node).data.push(row);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Run one array-container pass for parent row `index`.
    fn parse_array(
        &self,
        tree: &mut Tree,
        shape: KeyShape,
        index: usize,
        key: &str,
        body: &Row,
        node: NodeId,
    ) -> Result<(), EngineError> {
        let child = tree.alloc_child(node, index);

        if let Some(cap) = body.get("count").and_then(Json::as_f64) {
            tree.node_mut(node).row_cap = cap as usize;
        }
        if let Some(spec) = body.get("join").and_then(Json::as_str) {
            if !spec.is_empty() {
                tree.node_mut(node).joins = parse_joins(spec)?;
            }
        }

        self.parse_node(tree, body, index, child)?;

        if shape == KeyShape::FieldArray {
            match field_array_values(tree, key, child) {
                Ok(values) => tree.node_mut(node).field_data[index] = values,
                Err(err) => debug!(key, error = %err, "field array projection failed"),
            }
        }
        Ok(())
    }

    fn find_all(
        &self,
        tree: &Tree,
        table: &str,
        body: &Row,
        index: usize,
        node: NodeId,
        joins: &[Join],
        cap: usize,
    ) -> Result<Option<Vec<Row>>, EngineError> {
        self.check_cancel()?;
        let Some(mut stmt) = self.gen_statement(tree, table, body, index, node)? else {
            return Ok(None);
        };
        for join in joins {
            stmt.join_on(join.kind, &join.table, &join.field, &join.field);
        }
        if cap > 0 {
            stmt.limit(cap as i64);
        }
        Ok(Some(self.db.find_all(&stmt)?))
    }

    fn find_one(
        &self,
        tree: &Tree,
        table: &str,
        body: &Row,
        index: usize,
        node: NodeId,
    ) -> Result<Option<Row>, EngineError> {
        self.check_cancel()?;
        let Some(stmt) = self.gen_statement(tree, table, body, index, node)? else {
            return Ok(None);
        };
        self.db.find_one(&stmt)
    }

    /// Build the statement for one node query. `Ok(None)` means an
    /// association failed to resolve: no SQL is issued and the row slot
    /// stays null.
    fn gen_statement(
        &self,
        tree: &Tree,
        table: &str,
        body: &Row,
        index: usize,
        node: NodeId,
    ) -> Result<Option<Statement>, EngineError> {
        let mut stmt = Statement::new();
        stmt.set_table(table);
        let has_associations = body
            .keys()
            .any(|k| grammar::association_column(k).is_some());
        if has_associations {
            match self.resolve_associations(tree, body, index, node)? {
                Some(resolved) => {
                    stmt.where_map(&resolved);
                }
                None => return Ok(None),
            }
        } else {
            stmt.where_map(body);
        }
        Ok(Some(stmt))
    }

    /// Replace every `col@` entry with the value its path resolves to,
    /// keeping all other entries in request order. `Ok(None)` reports a
    /// soft path failure.
    fn resolve_associations(
        &self,
        tree: &Tree,
        body: &Row,
        index: usize,
        node: NodeId,
    ) -> Result<Option<Row>, EngineError> {
        let mut out = Row::new();
        for (key, value) in body {
            if key.is_empty() {
                continue;
            }
            if let Some(column) = grammar::association_column(key) {
                let Some(path) = value.as_str() else {
                    return Err(EngineError::AssociationNotString { key: key.clone() });
                };
                match resolve_path(tree, path, index, node) {
                    Ok(resolved) => {
                        trace!(path, "association resolved");
                        out.insert(column.to_string(), resolved);
                    }
                    Err(err) => {
                        debug!(path, error = %err, "association failed; row suppressed");
                        return Ok(None);
                    }
                }
            } else {
                out.insert(key.clone(), value.clone());
            }
        }
        Ok(Some(out))
    }

    fn check_cancel(&self) -> Result<(), EngineError> {
        if let Some(token) = &self.cancel {
            if token.is_canceled() {
                return Err(EngineError::Canceled);
            }
        }
        Ok(())
    }
}

/// Wire a container's `join` directives into clause specs for the first
/// child's statement. Every join entry must have its subject table in the
/// container body, carrying the join field.
fn compile_joins(tree: &Tree, scope: &Row, container: NodeId) -> Result<Vec<Join>, EngineError> {
    let joins = &tree.node(container).joins;
    if joins.is_empty() {
        return Ok(Vec::new());
    }
    let mut compiled = Vec::new();
    for (table, join) in joins {
        let Some(body) = scope.get(table).and_then(Json::as_object) else {
            return Err(EngineError::InvalidJoin {
                spec: format!("joined table '{}' is not in the container body", table),
            });
        };
        if !body.contains_key(&join.field) {
            return Err(EngineError::InvalidJoin {
                spec: format!("joined table '{}' does not carry field '{}'", table, join.field),
            });
        }
        compiled.push(join.clone());
    }
    Ok(compiled)
}

/// Parse a comma-separated `op/Table/field` join directive.
fn parse_joins(spec: &str) -> Result<IndexMap<String, Join>, EngineError> {
    let mut joins = IndexMap::new();
    for part in spec.split(',') {
        let join = parse_join(part.trim())?;
        joins.insert(join.table.clone(), join);
    }
    Ok(joins)
}

fn parse_join(spec: &str) -> Result<Join, EngineError> {
    let fields: Vec<&str> = spec.split('/').collect();
    if fields.len() != 3 {
        return Err(EngineError::InvalidJoin {
            spec: spec.to_string(),
        });
    }
    let kind = match fields[0] {
        "<" => JoinKind::Left,
        ">" => JoinKind::Right,
        "&" => JoinKind::Inner,
        "FULL" => JoinKind::Full,
        "!" => JoinKind::Outer,
        _ => {
            return Err(EngineError::InvalidJoin {
                spec: spec.to_string(),
            })
        }
    };
    Ok(Join {
        kind,
        table: fields[1].to_string(),
        field: fields[2].to_string(),
    })
}

/// Resolve an association path against the executed part of the tree.
///
/// Paths walk from the top-level scope; a leading `/` is the explicit
/// absolute form and its empty first segment is skipped. When the final
/// segment is a field-array key the whole deduplicated list resolves,
/// otherwise the final segment is a column of the walked-to node's row at
/// the matching slot.
fn resolve_path(
    tree: &Tree,
    path: &str,
    index: usize,
    node: NodeId,
) -> Result<Json, ResolveError> {
    let segments: Vec<&str> = path.split('/').collect();
    let field = *segments.last().unwrap_or(&"");
    if field.is_empty() {
        return Err(ResolveError::EmptySegment);
    }
    let field_is_projection = grammar::key_shape(field) == KeyShape::FieldArray;

    let mut i = usize::from(segments[0].is_empty());
    let mut cur = Tree::ROOT;
    loop {
        if i >= segments.len() {
            return Err(ResolveError::PathInterrupted);
        }
        let segment = segments[i];
        if segment.is_empty() {
            return Err(ResolveError::EmptySegment);
        }
        while tree.node(cur).key != segment {
            cur = tree
                .node(cur)
                .next
                .ok_or_else(|| ResolveError::SegmentNotFound(segment.to_string()))?;
        }
        i += 1;
        let at_target = if field_is_projection {
            i == segments.len()
        } else {
            i + 1 == segments.len()
        };
        if at_target {
            break;
        }
        let children = &tree.node(cur).children;
        cur = match children.len() {
            0 => return Err(ResolveError::PathInterrupted),
            1 => children[0],
            _ => {
                let slot = find_child_index(tree, node, cur, index)
                    .ok_or(ResolveError::NotInAncestorLayer)?;
                *children.get(slot).ok_or(ResolveError::NotInAncestorLayer)?
            }
        };
    }

    let target = tree.node(cur);
    let slot = find_child_index(tree, node, cur, index).ok_or(ResolveError::NotInAncestorLayer)?;
    if field_is_projection {
        if target.field_data.is_empty() {
            return Err(ResolveError::DataEmpty);
        }
        let values = target.field_data.get(slot).ok_or(ResolveError::DataEmpty)?;
        if values.is_empty() {
            return Err(ResolveError::DataEmpty);
        }
        Ok(Json::Array(values.clone()))
    } else {
        if target.data.is_empty() {
            return Err(ResolveError::DataEmpty);
        }
        let row = target.data.get(slot).ok_or(ResolveError::DataEmpty)?;
        let row = row
            .as_ref()
            .ok_or_else(|| ResolveError::FieldMissing(field.to_string()))?;
        row.get(field)
            .cloned()
            .ok_or_else(|| ResolveError::FieldMissing(field.to_string()))
    }
}

/// Row slot at which `target`'s data applies to `node`.
///
/// A target to the left of `node` itself is a parallel sibling: the current
/// row `index` applies. Otherwise ascend; the first ancestor with `target`
/// to its left pins the slot to the pre-ascent node's own index. `None`
/// means the target is in no reachable ancestor layer. Termination is
/// guaranteed: every ascent moves strictly toward the parentless root.
fn find_child_index(tree: &Tree, node: NodeId, target: NodeId, index: usize) -> Option<usize> {
    let mut prev = tree.node(node).prev;
    while let Some(p) = prev {
        if p == target {
            return Some(index);
        }
        prev = tree.node(p).prev;
    }

    let mut cur = node;
    loop {
        let parent = tree.node(cur).parent?;
        let mut prev = tree.node(parent).prev;
        while let Some(p) = prev {
            if p == target {
                return Some(tree.node(cur).index);
            }
            prev = tree.node(p).prev;
        }
        cur = parent;
    }
}

/// Collect the deduplicated projection for a field-array key, walking the
/// dashed path from the container's template node.
fn field_array_values(tree: &Tree, key: &str, start: NodeId) -> Result<Vec<Json>, ResolveError> {
    let segments = grammar::field_array_path(key);
    let mut out = Vec::new();
    collect_projection(tree, &segments, start, &mut out)?;
    Ok(out)
}

fn collect_projection(
    tree: &Tree,
    path: &[&str],
    start: NodeId,
    out: &mut Vec<Json>,
) -> Result<(), ResolveError> {
    let mut cur = start;
    let mut i = 0;
    loop {
        let segment = path[i];
        if segment.is_empty() {
            return Err(ResolveError::EmptySegment);
        }
        while tree.node(cur).key != segment {
            cur = tree
                .node(cur)
                .next
                .ok_or_else(|| ResolveError::SegmentNotFound(segment.to_string()))?;
        }
        i += 1;
        if i + 1 >= path.len() {
            break;
        }
        // Deeper levels follow the first template child only: array bodies
        // under a projection are single-child templates.
        let Some(&child) = tree.node(cur).children.first() else {
            return Err(ResolveError::PathInterrupted);
        };
        return collect_projection(tree, &path[1..], child, out);
    }

    let field = path[path.len() - 1];
    for row in tree.node(cur).data.iter().flatten() {
        if let Some(value) = row.get(field) {
            if !out.contains(value) {
                out.push(value.clone());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_specs_parse() {
        let joins = parse_joins("</User/id,&/Tag/momentId").unwrap();
        assert_eq!(joins.len(), 2);
        assert_eq!(joins["User"].kind, JoinKind::Left);
        assert_eq!(joins["User"].field, "id");
        assert_eq!(joins["Tag"].kind, JoinKind::Inner);
    }

    #[test]
    fn join_spec_operators() {
        assert_eq!(parse_join(">/T/f").unwrap().kind, JoinKind::Right);
        assert_eq!(parse_join("FULL/T/f").unwrap().kind, JoinKind::Full);
        assert_eq!(parse_join("!/T/f").unwrap().kind, JoinKind::Outer);
    }

    #[test]
    fn join_spec_errors() {
        assert!(matches!(
            parse_join("</User"),
            Err(EngineError::InvalidJoin { .. })
        ));
        assert!(matches!(
            parse_join("?/User/id"),
            Err(EngineError::InvalidJoin { .. })
        ));
    }

    #[test]
    fn cancel_token_trips() {
        let token = CancelToken::new();
        assert!(!token.is_canceled());
        token.cancel();
        assert!(token.is_canceled());

        let expired = CancelToken::with_timeout(Duration::from_secs(0));
        assert!(expired.is_canceled());
    }
}
