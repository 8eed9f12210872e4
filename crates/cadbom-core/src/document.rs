//! Scope document: the persisted form of one scope graph.
//!
//! ```text
//! { "schema": 1, "kind": "cadbom.scope_graph.v1", "scope": {...},
//!   "updatedAt": "...", "nodes": { "A-001": { "parent": {...}, "children": [...] } } }
//! ```
//!
//! A bare `{ parentKey: node }` mapping (the shape older tooling wrote) is
//! accepted on read and upgraded on the next write.

use crate::graph::{AdjacencyNode, BomEdge, ScopeGraph};
use crate::part::{PartCode, normalize_part, normalize_quantity};
use crate::scope::Scope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SCOPE_DOCUMENT_SCHEMA: u64 = 1;
pub const SCOPE_DOCUMENT_KIND: &str = "cadbom.scope_graph.v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeDocument {
    pub schema: u64,
    pub kind: String,
    pub scope: Scope,
    pub updated_at: DateTime<Utc>,
    pub nodes: ScopeGraph,
}

impl ScopeDocument {
    pub fn new(scope: &Scope, graph: &ScopeGraph) -> Self {
        Self {
            schema: SCOPE_DOCUMENT_SCHEMA,
            kind: SCOPE_DOCUMENT_KIND.to_string(),
            scope: scope.clone(),
            updated_at: Utc::now(),
            nodes: graph.clone(),
        }
    }
}

/// Errors decoding a scope document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("unsupported schema {found} (expected {SCOPE_DOCUMENT_SCHEMA})")]
    Schema { found: String },

    #[error("corrupted document: {0}")]
    Corrupt(String),
}

/// A decoded graph plus a description of every row that could not be
/// read. Rows are decoded one by one so a single bad edge never hides the
/// rest of the scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedDocument {
    pub graph: ScopeGraph,
    pub skipped: Vec<String>,
}

impl DecodedDocument {
    /// Whether re-encoding the graph reproduces every stored edge.
    pub fn is_lossless(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Decode document bytes into a graph.
///
/// Structural failures (not JSON, not an object, NUL or non-UTF-8 bytes)
/// are errors. So is a wrapper whose `schema` is not the supported one.
/// Individual malformed nodes or edges are skipped and reported.
pub fn decode_scope_document(bytes: &[u8]) -> Result<DecodedDocument, DocumentError> {
    if bytes.contains(&0) {
        return Err(DocumentError::Corrupt("contains NUL byte(s)".to_string()));
    }
    let text = std::str::from_utf8(bytes).map_err(|_| {
        DocumentError::Corrupt("contains non-UTF-8 byte sequence(s)".to_string())
    })?;
    if text.trim().is_empty() {
        return Ok(DecodedDocument::default());
    }

    let value: Value = serde_json::from_str(text).map_err(|e| DocumentError::Parse(e.to_string()))?;
    let Value::Object(root) = value else {
        return Err(DocumentError::Parse("document root is not an object".to_string()));
    };

    let nodes = match root.get("schema").cloned() {
        None => root,
        Some(schema) => {
            if schema.as_u64() != Some(SCOPE_DOCUMENT_SCHEMA) {
                return Err(DocumentError::Schema {
                    found: schema.to_string(),
                });
            }
            match root.get("nodes") {
                Some(Value::Object(nodes)) => nodes.clone(),
                None | Some(Value::Null) => Map::new(),
                Some(_) => {
                    return Err(DocumentError::Parse("`nodes` is not an object".to_string()));
                }
            }
        }
    };

    let mut skipped = Vec::new();
    let decoded: Vec<AdjacencyNode> = nodes
        .iter()
        .filter_map(|(key, node)| decode_node(key, node, &mut skipped))
        .collect();
    Ok(DecodedDocument {
        graph: ScopeGraph::from_nodes(decoded),
        skipped,
    })
}

fn decode_node(key: &str, node: &Value, skipped: &mut Vec<String>) -> Option<AdjacencyNode> {
    if !node.is_object() {
        skipped.push(format!("node `{key}`: not an object"));
        return None;
    }
    let parent = node
        .get("parent")
        .and_then(|parent| normalize_part(parent).ok())
        .or_else(|| PartCode::parse(key).ok());
    let Some(parent) = parent else {
        let rows = node.get("children").and_then(Value::as_array).map_or(0, Vec::len);
        skipped.push(format!("node `{key}`: unreadable parent ({rows} edge(s))"));
        return None;
    };

    let rows = match node.get("children") {
        Some(Value::Array(rows)) => rows.as_slice(),
        None | Some(Value::Null) => &[],
        Some(_) => {
            skipped.push(format!("node `{key}`: `children` is not an array"));
            return Some(AdjacencyNode::new(parent));
        }
    };

    let mut children = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        match decode_edge(row) {
            Ok(edge) => children.push(edge),
            Err(reason) => skipped.push(format!("node `{key}` row {index}: {reason}")),
        }
    }
    Some(AdjacencyNode { parent, children })
}

fn decode_edge(row: &Value) -> Result<BomEdge, String> {
    let child = normalize_part(row).map_err(|e| e.to_string())?;
    let qty = normalize_quantity(row.get("qty").unwrap_or(&Value::Null)).map_err(|e| e.to_string())?;
    let note = row
        .get("note")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(BomEdge { child, qty, note })
}

/// Encode a graph as a pretty-printed document.
pub fn encode_scope_document(scope: &Scope, graph: &ScopeGraph) -> Result<Vec<u8>, DocumentError> {
    let mut bytes = serde_json::to_vec_pretty(&ScopeDocument::new(scope, graph))
        .map_err(|e| DocumentError::Parse(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}
