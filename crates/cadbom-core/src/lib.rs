//! # cadbom-core
//!
//! Bill-of-materials graph layer for CAD projects.
//!
//! This crate provides:
//! - `PartCode` and the normalizer that resolves loose part references
//! - `ScopeGraph`, the per-project adjacency map (parent → child edges)
//! - `ScopeStore` substrates (directory-backed and in-memory)
//! - `BomEngine`: link/unlink/update with cycle prevention, used-in lookup,
//!   quantity explosion, literal trees and the part-deletion hook
//!
//! It does not route requests or render output. Those concerns live in
//! adapter crates (`cadbom-http`, `cadbom-cli`).
//!
//! ## Data model
//!
//! ```text
//! scope document (on disk, one JSON file per project)
//!     ↕  load / save (atomic rename)
//! ScopeGraph (in memory, one read-modify-write per mutation)
//! ```

pub mod catalog;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod graph;
pub mod lock;
pub mod part;
pub mod policy;
pub mod scope;
pub mod store;

pub use catalog::{CadDirCatalog, NoCatalog, PartCatalog, PartDescriptions, StaticCatalog};
pub use config::{
    Config, DEFAULT_BIND, DEFAULT_CONFIG_PATH, DEFAULT_LOG_LEVEL, DEFAULT_STORE_DIR,
};
pub use document::{
    DecodedDocument, DocumentError, SCOPE_DOCUMENT_KIND, SCOPE_DOCUMENT_SCHEMA, ScopeDocument,
    decode_scope_document, encode_scope_document,
};
pub use engine::{
    AssemblyListing, BomEngine, ChildRow, DEFAULT_MAX_DEPTH, EdgeRow, ExplodedRow, PurgeReport,
    ScopeSummary, TreeNode,
};
pub use error::BomError;
pub use graph::{AdjacencyNode, BomEdge, EdgeUpsert, PurgeOutcome, ScopeGraph, UsedIn};
pub use lock::{ScopeFileLock, ScopeLocks, scope_lock_path};
pub use part::{PartCode, normalize_part, normalize_quantity};
pub use policy::LinkPolicy;
pub use scope::Scope;
pub use store::{DEFAULT_LOCK_TIMEOUT, FsScopeStore, MemoryScopeStore, ScopeStore, StoreLock};
