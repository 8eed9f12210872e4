//! Per-scope adjacency graph: parent node → ordered child edges.
//!
//! This is the in-memory form of one scope document. It owns the edge
//! invariants (one edge per ordered pair, positive quantities) and the graph
//! queries the engine needs: reachability for cycle prevention, reverse
//! "used in" scans and cascade removal.

use crate::error::BomError;
use crate::part::PartCode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One outgoing edge of an adjacency node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BomEdge {
    #[serde(flatten)]
    pub child: PartCode,
    pub qty: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

/// A parent part and the parts it is directly composed of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjacencyNode {
    pub parent: PartCode,
    #[serde(default)]
    pub children: Vec<BomEdge>,
}

impl AdjacencyNode {
    pub fn new(parent: PartCode) -> Self {
        Self {
            parent,
            children: Vec::new(),
        }
    }

    pub fn edge(&self, child: &PartCode) -> Option<&BomEdge> {
        self.children.iter().find(|edge| edge.child == *child)
    }
}

/// A direct parent of some part, with the quantity it uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsedIn {
    pub parent: PartCode,
    pub qty: u32,
}

/// Result of an edge upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeUpsert {
    Inserted,
    Updated { previous_qty: u32 },
}

/// Result of removing every reference to one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PurgeOutcome {
    pub edges_removed: usize,
    pub node_removed: bool,
}

impl PurgeOutcome {
    pub fn changed(&self) -> bool {
        self.edges_removed > 0 || self.node_removed
    }
}

/// Adjacency map for one scope, keyed by the parent's canonical key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeGraph {
    nodes: BTreeMap<String, AdjacencyNode>,
}

impl ScopeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from nodes of unknown provenance.
    ///
    /// Nodes are re-keyed by their own parent code, and duplicate parents or
    /// duplicate child rows are folded with last-write-wins quantities while
    /// keeping first-seen order.
    pub fn from_nodes(nodes: impl IntoIterator<Item = AdjacencyNode>) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            let parent = node.parent;
            graph.ensure_node(parent);
            for edge in node.children {
                let qty = edge.qty.max(1);
                graph.upsert_edge(parent, edge.child, qty);
                if !edge.note.is_empty()
                    && let Ok(existing) = graph.edge_mut(&parent, &edge.child)
                {
                    existing.note = edge.note;
                }
            }
        }
        graph
    }

    /// Number of adjacency nodes (including empty ones).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|node| node.children.len()).sum()
    }

    /// Iterate nodes in deterministic key order.
    pub fn nodes(&self) -> impl Iterator<Item = &AdjacencyNode> {
        self.nodes.values()
    }

    /// Iterate all edges as `(parent, edge)` in deterministic order.
    pub fn edges(&self) -> impl Iterator<Item = (PartCode, &BomEdge)> {
        self.nodes
            .values()
            .flat_map(|node| node.children.iter().map(move |edge| (node.parent, edge)))
    }

    pub fn node(&self, part: &PartCode) -> Option<&AdjacencyNode> {
        self.nodes.get(&part.key())
    }

    /// Outgoing edges of `part`; empty when the part has no node.
    pub fn children_of(&self, part: &PartCode) -> &[BomEdge] {
        self.node(part)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Lookup or lazily create the node for `parent`.
    pub fn ensure_node(&mut self, parent: PartCode) -> &mut AdjacencyNode {
        self.nodes
            .entry(parent.key())
            .or_insert_with(|| AdjacencyNode::new(parent))
    }

    /// Whether `target` can be reached from `from` by following child edges.
    ///
    /// A part trivially reaches itself. Traversal tracks visited nodes, so
    /// cyclic (corrupted) data still terminates.
    pub fn reaches(&self, from: &PartCode, target: &PartCode) -> bool {
        if from == target {
            return true;
        }
        let mut visited = BTreeSet::new();
        let mut stack = vec![*from];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for edge in self.children_of(&current) {
                if edge.child == *target {
                    return true;
                }
                if !visited.contains(&edge.child) {
                    stack.push(edge.child);
                }
            }
        }
        false
    }

    /// Insert `parent → child` or overwrite its quantity. Notes survive an
    /// overwrite. Does not check for cycles.
    pub fn upsert_edge(&mut self, parent: PartCode, child: PartCode, qty: u32) -> EdgeUpsert {
        let node = self.ensure_node(parent);
        match node.children.iter_mut().find(|edge| edge.child == child) {
            Some(edge) => {
                let previous_qty = edge.qty;
                edge.qty = qty;
                EdgeUpsert::Updated { previous_qty }
            }
            None => {
                node.children.push(BomEdge {
                    child,
                    qty,
                    note: String::new(),
                });
                EdgeUpsert::Inserted
            }
        }
    }

    /// Existing edge, distinguishing a missing parent node from a missing
    /// child link.
    pub fn edge_mut(
        &mut self,
        parent: &PartCode,
        child: &PartCode,
    ) -> Result<&mut BomEdge, BomError> {
        let node = self
            .nodes
            .get_mut(&parent.key())
            .ok_or_else(|| BomError::ParentNotFound(parent.key()))?;
        node.children
            .iter_mut()
            .find(|edge| edge.child == *child)
            .ok_or_else(|| BomError::ChildLinkNotFound {
                parent: parent.key(),
                child: child.key(),
            })
    }

    /// Swap in a new child list for `parent`, returning the old one. Does
    /// not check for cycles.
    pub fn replace_children(&mut self, parent: PartCode, children: Vec<BomEdge>) -> Vec<BomEdge> {
        std::mem::replace(&mut self.ensure_node(parent).children, children)
    }

    /// Remove `parent → child` if present. The parent node is kept even when
    /// it becomes empty.
    pub fn remove_edge(&mut self, parent: &PartCode, child: &PartCode) -> bool {
        let Some(node) = self.nodes.get_mut(&parent.key()) else {
            return false;
        };
        let before = node.children.len();
        node.children.retain(|edge| edge.child != *child);
        node.children.len() != before
    }

    /// Every node holding a direct edge to `part`, in node-key order.
    pub fn used_in(&self, part: &PartCode) -> Vec<UsedIn> {
        self.edges()
            .filter(|(_, edge)| edge.child == *part)
            .map(|(parent, edge)| UsedIn {
                parent,
                qty: edge.qty,
            })
            .collect()
    }

    /// Drop `part`'s own node and every edge that points at it.
    pub fn purge(&mut self, part: &PartCode) -> PurgeOutcome {
        let mut outcome = PurgeOutcome::default();
        if let Some(node) = self.nodes.remove(&part.key()) {
            outcome.node_removed = true;
            outcome.edges_removed += node.children.len();
        }
        for node in self.nodes.values_mut() {
            let before = node.children.len();
            node.children.retain(|edge| edge.child != *part);
            outcome.edges_removed += before - node.children.len();
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(raw: &str) -> PartCode {
        PartCode::parse(raw).expect("fixture code should parse")
    }

    fn chain() -> ScopeGraph {
        let mut graph = ScopeGraph::new();
        graph.upsert_edge(code("A-001"), code("B-002"), 2);
        graph.upsert_edge(code("B-002"), code("C-003"), 3);
        graph
    }

    #[test]
    fn reaches_follows_edges_transitively() {
        let graph = chain();
        assert!(graph.reaches(&code("A-001"), &code("C-003")));
        assert!(!graph.reaches(&code("C-003"), &code("A-001")));
        assert!(graph.reaches(&code("C-003"), &code("C-003")));
    }

    #[test]
    fn reaches_terminates_on_corrupted_cycle() {
        let mut graph = chain();
        graph.upsert_edge(code("C-003"), code("B-002"), 1);
        assert!(!graph.reaches(&code("B-002"), &code("A-001")));
    }

    #[test]
    fn replace_children_swaps_the_whole_list() {
        let mut graph = chain();
        let previous = graph.replace_children(
            code("A-001"),
            vec![BomEdge {
                child: code("D-004"),
                qty: 4,
                note: String::new(),
            }],
        );
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].child, code("B-002"));
        assert_eq!(graph.children_of(&code("A-001"))[0].child, code("D-004"));
        assert_eq!(graph.children_of(&code("B-002")).len(), 1);
    }

    #[test]
    fn upsert_overwrites_quantity_and_keeps_note() {
        let mut graph = chain();
        graph
            .edge_mut(&code("A-001"), &code("B-002"))
            .expect("edge")
            .note = "press fit".to_string();

        let outcome = graph.upsert_edge(code("A-001"), code("B-002"), 5);
        assert_eq!(outcome, EdgeUpsert::Updated { previous_qty: 2 });
        let children = graph.children_of(&code("A-001"));
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].qty, 5);
        assert_eq!(children[0].note, "press fit");
    }

    #[test]
    fn remove_edge_keeps_empty_node() {
        let mut graph = chain();
        assert!(graph.remove_edge(&code("A-001"), &code("B-002")));
        assert!(!graph.remove_edge(&code("A-001"), &code("B-002")));
        assert!(graph.node(&code("A-001")).is_some());
        assert!(graph.children_of(&code("A-001")).is_empty());
    }

    #[test]
    fn edge_mut_distinguishes_missing_parent_and_child() {
        let mut graph = chain();
        assert!(matches!(
            graph.edge_mut(&code("Z-999"), &code("B-002")),
            Err(BomError::ParentNotFound(_))
        ));
        assert!(matches!(
            graph.edge_mut(&code("A-001"), &code("Z-999")),
            Err(BomError::ChildLinkNotFound { .. })
        ));
    }

    #[test]
    fn purge_removes_node_and_inbound_edges() {
        let mut graph = chain();
        graph.upsert_edge(code("S-010"), code("B-002"), 4);

        let outcome = graph.purge(&code("B-002"));
        assert_eq!(outcome.edges_removed, 3);
        assert!(outcome.node_removed);
        assert!(graph.node(&code("B-002")).is_none());
        assert!(graph.used_in(&code("B-002")).is_empty());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn from_nodes_folds_duplicates() {
        let a = code("A-001");
        let b = code("B-002");
        let node = AdjacencyNode {
            parent: a,
            children: vec![
                BomEdge {
                    child: b,
                    qty: 1,
                    note: String::new(),
                },
                BomEdge {
                    child: b,
                    qty: 4,
                    note: "second".to_string(),
                },
            ],
        };
        let graph = ScopeGraph::from_nodes(vec![node]);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.children_of(&a)[0].qty, 4);
        assert_eq!(graph.children_of(&a)[0].note, "second");
    }

    #[test]
    fn edge_serializes_flat() {
        let edge = BomEdge {
            child: code("B-002"),
            qty: 2,
            note: String::new(),
        };
        let value = serde_json::to_value(&edge).expect("serialize edge");
        assert_eq!(
            value,
            serde_json::json!({ "typePrefix": "B", "partNumber": "002", "qty": 2 })
        );
    }
}
