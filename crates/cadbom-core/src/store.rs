//! Scope stores: persistence substrates holding one graph document per scope.
//!
//! `load` of an absent scope is an empty graph, never an error. `save` is a
//! total overwrite that is durable before it returns. A stored document that
//! does not decode losslessly is set aside before it is overwritten.

use crate::document::{DocumentError, decode_scope_document, encode_scope_document};
use crate::error::BomError;
use crate::graph::ScopeGraph;
use crate::lock::ScopeFileLock;
use crate::scope::Scope;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use chrono::Utc;
use tracing::{debug, warn};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2000);

/// Substrate-level lock held for the duration of one read-modify-write.
#[derive(Debug)]
pub struct StoreLock(Option<ScopeFileLock>);

impl StoreLock {
    /// A lock that guards nothing, for substrates with no cross-process
    /// sharing.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn file(lock: ScopeFileLock) -> Self {
        Self(Some(lock))
    }
}

/// Atomic get/put of one named graph document per scope.
pub trait ScopeStore {
    fn load(&self, scope: &Scope) -> Result<ScopeGraph, BomError>;

    fn save(&self, scope: &Scope, graph: &ScopeGraph) -> Result<(), BomError>;

    /// Take the substrate's write lock for `scope`.
    fn lock_scope(&self, _scope: &Scope) -> Result<StoreLock, BomError> {
        Ok(StoreLock::none())
    }
}

/// In-process store. Documents are kept in encoded form so loads and saves
/// exercise the same codec as the filesystem store.
#[derive(Debug, Default)]
pub struct MemoryScopeStore {
    documents: Mutex<BTreeMap<String, Vec<u8>>>,
    displaced: Mutex<BTreeMap<String, Vec<Vec<u8>>>>,
}

impl MemoryScopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw document bytes for `scope`, if it was ever written.
    pub fn raw_document(&self, scope: &Scope) -> Option<Vec<u8>> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&scope.key())
            .cloned()
    }

    /// Install raw bytes for `scope`, bypassing validation.
    pub fn put_raw_document(&self, scope: &Scope, bytes: Vec<u8>) {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scope.key(), bytes);
    }

    /// Documents set aside by `save` because they did not decode
    /// losslessly, oldest first.
    pub fn displaced_documents(&self, scope: &Scope) -> Vec<Vec<u8>> {
        self.displaced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&scope.key())
            .cloned()
            .unwrap_or_default()
    }
}

impl ScopeStore for MemoryScopeStore {
    fn load(&self, scope: &Scope) -> Result<ScopeGraph, BomError> {
        let Some(bytes) = self.raw_document(scope) else {
            return Ok(ScopeGraph::new());
        };
        decode_for_load(scope, &bytes, "memory")
    }

    fn save(&self, scope: &Scope, graph: &ScopeGraph) -> Result<(), BomError> {
        let bytes = encode_scope_document(scope, graph)
            .map_err(|e| BomError::Storage(format!("encode {scope}: {e}")))?;
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = documents.insert(scope.key(), bytes)
            && needs_preserving(&previous)
        {
            warn!(scope = %scope, "set aside undecodable scope document before overwrite");
            self.displaced
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(scope.key())
                .or_default()
                .push(previous);
        }
        Ok(())
    }
}

/// Directory-backed store: `{root}/{scope.file_stem()}.json`.
#[derive(Debug, Clone)]
pub struct FsScopeStore {
    root: PathBuf,
    lock_timeout: Duration,
}

impl FsScopeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_path(&self, scope: &Scope) -> PathBuf {
        self.root.join(format!("{}.json", scope.file_stem()))
    }
}

impl ScopeStore for FsScopeStore {
    fn load(&self, scope: &Scope) -> Result<ScopeGraph, BomError> {
        let path = self.document_path(scope);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(scope = %scope, path = %path.display(), "scope document absent");
                return Ok(ScopeGraph::new());
            }
            Err(err) => return Err(BomError::Storage(format!("{}: {err}", path.display()))),
        };
        let graph = decode_for_load(scope, &bytes, &path.display().to_string())?;
        debug!(
            scope = %scope,
            nodes = graph.len(),
            edges = graph.edge_count(),
            "loaded scope graph"
        );
        Ok(graph)
    }

    fn save(&self, scope: &Scope, graph: &ScopeGraph) -> Result<(), BomError> {
        let path = self.document_path(scope);
        let bytes = encode_scope_document(scope, graph)
            .map_err(|e| BomError::Storage(format!("encode {scope}: {e}")))?;
        preserve_undecodable(scope, &path)?;
        write_atomically(&path, &bytes)?;
        debug!(
            scope = %scope,
            nodes = graph.len(),
            edges = graph.edge_count(),
            "saved scope graph"
        );
        Ok(())
    }

    fn lock_scope(&self, scope: &Scope) -> Result<StoreLock, BomError> {
        let lock = ScopeFileLock::acquire(&self.document_path(scope), self.lock_timeout)?;
        Ok(StoreLock::file(lock))
    }
}

/// Skipped rows are logged and dropped from the in-memory graph. A document
/// that fails to parse reads as empty. A document written under another
/// schema is refused so that no mutation can overwrite it.
fn decode_for_load(scope: &Scope, bytes: &[u8], origin: &str) -> Result<ScopeGraph, BomError> {
    match decode_scope_document(bytes) {
        Ok(decoded) => {
            for reason in &decoded.skipped {
                warn!(scope = %scope, origin, %reason, "skipped unreadable scope document entry");
            }
            Ok(decoded.graph)
        }
        Err(err @ DocumentError::Schema { .. }) => {
            Err(BomError::Storage(format!("{origin}: {err}")))
        }
        Err(err) => {
            warn!(scope = %scope, origin, error = %err, "unreadable scope document treated as empty");
            Ok(ScopeGraph::new())
        }
    }
}

/// Whether overwriting `bytes` would lose stored data.
fn needs_preserving(bytes: &[u8]) -> bool {
    !matches!(decode_scope_document(bytes), Ok(decoded) if decoded.is_lossless())
}

/// Rename the current document to `{path}.corrupt-{utc}` when it does not
/// decode losslessly.
fn preserve_undecodable(scope: &Scope, path: &Path) -> Result<(), BomError> {
    let existing = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(BomError::Storage(format!("{}: {err}", path.display()))),
    };
    if !needs_preserving(&existing) {
        return Ok(());
    }

    let backup = preserved_path(path);
    fs::rename(path, &backup).map_err(|e| {
        BomError::Storage(format!("{} -> {}: {e}", path.display(), backup.display()))
    })?;
    warn!(
        scope = %scope,
        backup = %backup.display(),
        "set aside undecodable scope document before overwrite"
    );
    Ok(())
}

fn preserved_path(path: &Path) -> PathBuf {
    let mut backup: OsString = path.as_os_str().to_os_string();
    backup.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.9fZ")));
    PathBuf::from(backup)
}

/// Write to a sibling temp file, fsync, rename over `path`, fsync the
/// directory.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), BomError> {
    let io_err = |target: &Path, e: std::io::Error| {
        BomError::Storage(format!("{}: {e}", target.display()))
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    let tmp_path = tmp_write_path(path);
    let write_result = (|| -> Result<(), BomError> {
        let mut file = File::create(&tmp_path).map_err(|e| io_err(&tmp_path, e))?;
        file.write_all(bytes).map_err(|e| io_err(&tmp_path, e))?;
        file.flush().map_err(|e| io_err(&tmp_path, e))?;
        file.sync_all().map_err(|e| io_err(&tmp_path, e))?;
        Ok(())
    })();

    if let Err(error) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        BomError::Storage(format!(
            "{} -> {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        let dir = File::open(parent).map_err(|e| io_err(parent, e))?;
        dir.sync_all().map_err(|e| io_err(parent, e))?;
    }

    Ok(())
}

fn tmp_write_path(path: &Path) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut tmp: OsString = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp.{}.{}", std::process::id(), unique));
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::PartCode;

    fn code(raw: &str) -> PartCode {
        PartCode::parse(raw).expect("fixture code should parse")
    }

    fn scope() -> Scope {
        Scope::new("P001", "Gearbox").expect("scope")
    }

    #[test]
    fn absent_document_is_empty_graph() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsScopeStore::new(dir.path().join("scopes"));
        let graph = store.load(&scope()).expect("absent scope should load");
        assert!(graph.is_empty());
    }

    #[test]
    fn save_then_load_sees_update() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsScopeStore::new(dir.path());
        let mut graph = ScopeGraph::new();
        graph.upsert_edge(code("A-001"), code("B-002"), 2);

        store.save(&scope(), &graph).expect("save");
        let reloaded = store.load(&scope()).expect("load");
        assert_eq!(reloaded, graph);

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "temp files must not linger");
    }

    #[test]
    fn unparsable_document_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsScopeStore::new(dir.path());
        fs::write(store.document_path(&scope()), b"{ not json").expect("fixture");

        let graph = store.load(&scope()).expect("garbage should read as empty");
        assert!(graph.is_empty());
    }

    #[test]
    fn unparsable_document_is_set_aside_on_save() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsScopeStore::new(dir.path());
        let path = store.document_path(&scope());
        fs::write(&path, b"{ not json").expect("fixture");

        let mut graph = ScopeGraph::new();
        graph.upsert_edge(code("A-001"), code("B-002"), 2);
        store.save(&scope(), &graph).expect("save");

        let backups: Vec<PathBuf> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.to_string_lossy().contains(".corrupt-"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read(&backups[0]).expect("backup"), b"{ not json");
        assert_eq!(store.load(&scope()).expect("load"), graph);

        // A clean document is overwritten in place.
        store.save(&scope(), &graph).expect("save again");
        let count = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".corrupt-"))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn newer_schema_refuses_to_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsScopeStore::new(dir.path());
        fs::write(
            store.document_path(&scope()),
            br#"{ "schema": 2, "kind": "cadbom.scope_graph.v2", "nodes": {} }"#,
        )
        .expect("fixture");

        let err = store.load(&scope()).expect_err("unknown schema must not load");
        assert!(matches!(err, BomError::Storage(ref msg) if msg.contains("unsupported schema 2")));
    }

    #[test]
    fn lossy_memory_document_is_displaced_on_save() {
        let store = MemoryScopeStore::new();
        let raw = br#"{ "A-001": { "children": [
            { "code": "B-002", "qty": 2 },
            { "code": "C-003", "qty": 1.5 }
        ] } }"#
            .to_vec();
        store.put_raw_document(&scope(), raw.clone());

        let graph = store.load(&scope()).expect("lenient load");
        assert_eq!(graph.edge_count(), 1);
        store.save(&scope(), &graph).expect("save");

        assert_eq!(store.displaced_documents(&scope()), vec![raw]);
    }

    #[test]
    fn non_not_found_io_errors_propagate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsScopeStore::new(dir.path());
        fs::create_dir_all(store.document_path(&scope())).expect("directory in place of file");

        let err = store.load(&scope()).expect_err("directory is not a document");
        assert!(matches!(err, BomError::Storage(_)));
    }

    #[test]
    fn scopes_are_isolated() {
        let store = MemoryScopeStore::new();
        let other = Scope::new("P002", "Winch").expect("scope");
        let mut graph = ScopeGraph::new();
        graph.upsert_edge(code("A-001"), code("B-002"), 2);

        store.save(&scope(), &graph).expect("save");
        assert!(store.load(&other).expect("load other").is_empty());
        assert_eq!(store.load(&scope()).expect("load"), graph);
    }
}
