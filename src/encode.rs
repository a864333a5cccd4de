//! Response encoding.
//!
//! A second pass over the executed tree, walking each sibling chain in
//! request order and writing an ordered output object isomorphic to the
//! request: object nodes contribute their row map (or `null`), array
//! containers one object per row slot, field arrays their projected list.

use serde_json::Value as Json;

use crate::tree::{NodeId, Tree};
use crate::value::Row;

/// Encode the executed tree into the response object.
pub(crate) fn encode(tree: &Tree, head: NodeId) -> Row {
    let mut out = Row::new();
    let mut cur = Some(head);
    while let Some(id) = cur {
        let node = tree.node(id);
        if node.key.is_empty() {
            // Empty request body: nothing was ever parsed into the root.
            break;
        }
        if node.is_array {
            if node.is_field_array {
                let values = node.field_data.first().cloned().unwrap_or_default();
                out.insert(node.key.clone(), Json::Array(values));
            } else {
                let rows = node
                    .children
                    .first()
                    .map(|&c| encode_array(tree, c, node.size))
                    .unwrap_or_default();
                out.insert(node.key.clone(), Json::Array(rows));
            }
        } else {
            let row = node
                .data
                .first()
                .and_then(|r| r.clone())
                .map(Json::Object)
                .unwrap_or(Json::Null);
            out.insert(node.key.clone(), row);
        }
        cur = node.next;
    }
    out
}

/// Encode one array container: `size` ordered maps, each filled from the
/// sibling chain starting at the container's template node.
fn encode_array(tree: &Tree, first_child: NodeId, size: usize) -> Vec<Json> {
    let mut rows: Vec<Row> = vec![Row::new(); size];
    let mut cur = Some(first_child);
    while let Some(id) = cur {
        let node = tree.node(id);
        if node.is_array {
            if node.is_field_array {
                for (i, row) in rows.iter_mut().enumerate() {
                    let values = node.field_data.get(i).cloned().unwrap_or_default();
                    row.insert(node.key.clone(), Json::Array(values));
                }
            } else {
                for (i, row) in rows.iter_mut().enumerate() {
                    let sub = node
                        .children
                        .get(i)
                        .map(|&c| encode_array(tree, c, node.size))
                        .unwrap_or_default();
                    row.insert(node.key.clone(), Json::Array(sub));
                }
            }
        } else {
            for (i, row) in rows.iter_mut().enumerate() {
                let value = node
                    .data
                    .get(i)
                    .and_then(|r| r.clone())
                    .map(Json::Object)
                    .unwrap_or(Json::Null);
                row.insert(node.key.clone(), value);
            }
        }
        cur = node.next;
    }
    rows.into_iter().map(Json::Object).collect()
}
