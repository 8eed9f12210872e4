//! Read-side queries: direct listing, quantity explosion, literal trees and
//! flat summaries.

use super::{AssemblyListing, BomEngine, ChildRow, EdgeRow, ExplodedRow, ScopeSummary, TreeNode};
use crate::catalog::PartDescriptions;
use crate::error::BomError;
use crate::graph::ScopeGraph;
use crate::part::{PartCode, normalize_part};
use crate::scope::Scope;
use crate::store::ScopeStore;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::{debug, warn};

/// Everything below one unit of a part.
#[derive(Debug, Default)]
struct Rollup {
    totals: BTreeMap<PartCode, u64>,
    /// Longest chain of edges below the part.
    height: usize,
}

impl<S: ScopeStore> BomEngine<S> {
    /// Direct children of `part` and every part that directly uses it.
    pub fn list_assembly(&self, scope: &Scope, part: &Value) -> Result<AssemblyListing, BomError> {
        let part = normalize_part(part)?;
        let graph = self.store.load(scope)?;
        Ok(self.listing(scope, &graph, part))
    }

    /// Multi-level quantity rollup below `root`, one row per distinct part,
    /// ordered by part code.
    pub fn explode(&self, scope: &Scope, root: &Value) -> Result<Vec<ExplodedRow>, BomError> {
        let root = normalize_part(root)?;
        let graph = self.store.load(scope)?;
        let descriptions = self.catalog.descriptions(scope);

        let mut path = BTreeSet::from([root]);
        let mut memo = BTreeMap::new();
        let rollup = self.rollup(&graph, &root, &mut path, &mut memo)?;
        debug!(scope = %scope, %root, parts = rollup.totals.len(), "exploded assembly");

        Ok(rollup
            .totals
            .iter()
            .map(|(code, qty)| ExplodedRow {
                code: *code,
                qty: *qty,
                description: descriptions.get(code).cloned(),
            })
            .collect())
    }

    /// Nested tree below `root` with cumulative quantities.
    ///
    /// Fails with [`BomError::CycleDetected`] if the stored graph loops back
    /// onto the current path, and with [`BomError::DepthExceeded`] past the
    /// configured nesting limit.
    pub fn build_tree(&self, scope: &Scope, root: &Value) -> Result<TreeNode, BomError> {
        let root = normalize_part(root)?;
        let graph = self.store.load(scope)?;
        let descriptions = self.catalog.descriptions(scope);
        let mut path = Vec::new();
        self.tree_node(&graph, &descriptions, root, 1, None, &mut path)
    }

    /// Every edge in the scope in parent-key order.
    pub fn summary(&self, scope: &Scope) -> Result<ScopeSummary, BomError> {
        let graph = self.store.load(scope)?;
        let edges: Vec<EdgeRow> = graph
            .edges()
            .map(|(parent, edge)| EdgeRow {
                parent,
                child: edge.child,
                qty: edge.qty,
                note: edge.note.clone(),
            })
            .collect();
        Ok(ScopeSummary {
            scope: scope.clone(),
            node_count: graph.len(),
            edge_count: edges.len(),
            edges,
        })
    }

    pub(super) fn listing(&self, scope: &Scope, graph: &ScopeGraph, part: PartCode) -> AssemblyListing {
        let descriptions = self.catalog.descriptions(scope);
        let children = graph
            .children_of(&part)
            .iter()
            .map(|edge| ChildRow {
                code: edge.child,
                qty: edge.qty,
                note: edge.note.clone(),
                description: descriptions.get(&edge.child).cloned(),
            })
            .collect();
        AssemblyListing {
            parent: part,
            children,
            used_in: graph.used_in(&part),
        }
    }

    /// Quantities below one unit of `current`, computed once per part.
    ///
    /// `path` holds the parts on the current branch. An edge back onto it
    /// can only come from corrupted data and is skipped.
    fn rollup(
        &self,
        graph: &ScopeGraph,
        current: &PartCode,
        path: &mut BTreeSet<PartCode>,
        memo: &mut BTreeMap<PartCode, Rc<Rollup>>,
    ) -> Result<Rc<Rollup>, BomError> {
        // Root is on the path, so the path length is depth + 1.
        if let Some(done) = memo.get(current) {
            if done.height > 0 && path.len() + done.height - 1 > self.max_depth {
                return Err(BomError::DepthExceeded {
                    limit: self.max_depth,
                });
            }
            return Ok(Rc::clone(done));
        }

        let edges = graph.children_of(current);
        if !edges.is_empty() && path.len() > self.max_depth {
            return Err(BomError::DepthExceeded {
                limit: self.max_depth,
            });
        }

        let mut rollup = Rollup::default();
        for edge in edges {
            if path.contains(&edge.child) {
                warn!(parent = %current, child = %edge.child, "skipping edge that closes a stored cycle");
                continue;
            }
            path.insert(edge.child);
            let below = self.rollup(graph, &edge.child, path, memo);
            path.remove(&edge.child);
            let below = below?;

            let qty = u64::from(edge.qty);
            add_quantity(&mut rollup.totals, edge.child, qty);
            for (part, each) in &below.totals {
                add_quantity(&mut rollup.totals, *part, qty.saturating_mul(*each));
            }
            rollup.height = rollup.height.max(below.height + 1);
        }

        let rollup = Rc::new(rollup);
        memo.insert(*current, Rc::clone(&rollup));
        Ok(rollup)
    }

    fn tree_node(
        &self,
        graph: &ScopeGraph,
        descriptions: &PartDescriptions,
        code: PartCode,
        qty: u64,
        edge_qty: Option<u32>,
        path: &mut Vec<PartCode>,
    ) -> Result<TreeNode, BomError> {
        if path.contains(&code) {
            let mut cycle: Vec<String> = path.iter().map(PartCode::key).collect();
            cycle.push(code.key());
            return Err(BomError::CycleDetected { path: cycle });
        }

        let edges = graph.children_of(&code);
        if !edges.is_empty() && path.len() >= self.max_depth {
            return Err(BomError::DepthExceeded {
                limit: self.max_depth,
            });
        }

        path.push(code);
        let mut children = Vec::with_capacity(edges.len());
        for edge in edges {
            let child_qty = qty.saturating_mul(u64::from(edge.qty));
            match self.tree_node(graph, descriptions, edge.child, child_qty, Some(edge.qty), path) {
                Ok(node) => children.push(node),
                Err(err) => {
                    path.pop();
                    return Err(err);
                }
            }
        }
        path.pop();

        Ok(TreeNode {
            code: code.key(),
            part: code,
            qty,
            edge_qty,
            description: descriptions.get(&code).cloned(),
            children,
        })
    }
}

fn add_quantity(totals: &mut BTreeMap<PartCode, u64>, part: PartCode, qty: u64) {
    let total = totals.entry(part).or_insert(0);
    *total = total.saturating_add(qty);
}
