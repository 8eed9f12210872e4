//! The BOM engine: graph mutation, exploration and the part-deletion hook
//! over a pluggable [`ScopeStore`].
//!
//! Every public operation normalizes its raw inputs first, so a malformed
//! request never reaches the store. Mutations run as one locked
//! load → check → mutate → save cycle per scope; reads load the last
//! committed document without locking.

mod explore;
mod mutate;

use crate::catalog::{NoCatalog, PartCatalog};
use crate::error::BomError;
use crate::graph::{ScopeGraph, UsedIn};
use crate::lock::ScopeLocks;
use crate::part::PartCode;
use crate::policy::LinkPolicy;
use crate::scope::Scope;
use crate::store::ScopeStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default bound on assembly nesting for explode and tree traversal.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// One direct child of a listed part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRow {
    #[serde(flatten)]
    pub code: PartCode,
    pub qty: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Children and direct parents of one part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyListing {
    pub parent: PartCode,
    pub children: Vec<ChildRow>,
    pub used_in: Vec<UsedIn>,
}

/// Aggregated multi-level quantity of one part below an explode root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplodedRow {
    #[serde(flatten)]
    pub code: PartCode,
    pub qty: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A literal assembly tree node. `qty` is the cumulative multiplier from
/// the root; `edge_qty` is the quantity on the edge into this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub code: String,
    #[serde(flatten)]
    pub part: PartCode,
    pub qty: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_qty: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRow {
    pub parent: PartCode,
    pub child: PartCode,
    pub qty: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

/// Flat view of every edge in a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSummary {
    pub scope: Scope,
    pub node_count: usize,
    pub edge_count: usize,
    pub edges: Vec<EdgeRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    pub removed: usize,
}

/// BOM graph engine over a scope store.
pub struct BomEngine<S> {
    store: S,
    catalog: Arc<dyn PartCatalog>,
    policy: LinkPolicy,
    max_depth: usize,
    locks: ScopeLocks,
}

impl<S: ScopeStore> BomEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            catalog: Arc::new(NoCatalog),
            policy: LinkPolicy::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            locks: ScopeLocks::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: impl PartCatalog + 'static) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_policy(mut self, policy: LinkPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> LinkPolicy {
        self.policy
    }

    /// Run one serialized read-modify-write against `scope`.
    ///
    /// The mutation returns `(value, changed)`; the graph is saved only when
    /// `changed` is true. An error from the mutation leaves the stored
    /// document untouched.
    fn mutate_scope<T>(
        &self,
        scope: &Scope,
        mutation: impl FnOnce(&mut ScopeGraph) -> Result<(T, bool), BomError>,
    ) -> Result<(T, ScopeGraph), BomError> {
        self.locks.with_scope(scope, || {
            let _store_lock = self.store.lock_scope(scope)?;
            let mut graph = self.store.load(scope)?;
            let (value, changed) = mutation(&mut graph)?;
            if changed {
                self.store.save(scope, &graph)?;
            }
            Ok((value, graph))
        })
    }
}
