//! Part metadata lookup used to enrich listings, explosions and trees.
//!
//! The graph never depends on a catalog entry existing: an unknown part
//! simply has no description.

use crate::part::PartCode;
use crate::scope::Scope;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::debug;

pub type PartDescriptions = BTreeMap<PartCode, String>;

/// Read-only source of part descriptions, one snapshot per operation.
pub trait PartCatalog: Send + Sync {
    fn descriptions(&self, scope: &Scope) -> PartDescriptions;
}

/// Catalog with no entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCatalog;

impl PartCatalog for NoCatalog {
    fn descriptions(&self, _scope: &Scope) -> PartDescriptions {
        PartDescriptions::new()
    }
}

/// In-memory catalog keyed by scope key.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: BTreeMap<String, PartDescriptions>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scope: &Scope, code: PartCode, description: impl Into<String>) {
        self.entries
            .entry(scope.key())
            .or_default()
            .insert(code, description.into());
    }

    pub fn with(mut self, scope: &Scope, code: PartCode, description: impl Into<String>) -> Self {
        self.insert(scope, code, description);
        self
    }
}

impl PartCatalog for StaticCatalog {
    fn descriptions(&self, scope: &Scope) -> PartDescriptions {
        self.entries.get(&scope.key()).cloned().unwrap_or_default()
    }
}

/// Catalog derived from canonical CAD filenames under
/// `{root}/{projectNumber}_{projectName}/CAD`, e.g.
/// `P001_A001_RevB_Main-Frame.step`. The highest revision wins.
#[derive(Debug, Clone)]
pub struct CadDirCatalog {
    root: PathBuf,
}

impl CadDirCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `{root}/{projectNumber}_{projectName}/CAD`. Scope parts never hold a
    /// separator or a bare `..`, so this stays one level below `root`.
    pub fn cad_dir(&self, scope: &Scope) -> PathBuf {
        self.root
            .join(format!("{}_{}", scope.project_number(), scope.project_name()))
            .join("CAD")
    }
}

impl PartCatalog for CadDirCatalog {
    fn descriptions(&self, scope: &Scope) -> PartDescriptions {
        let dir = self.cad_dir(scope);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "CAD directory unreadable; no descriptions");
                return PartDescriptions::new();
            }
        };

        let mut latest: BTreeMap<PartCode, (char, String)> = BTreeMap::new();
        for entry in entries.filter_map(Result::ok) {
            let file_name = entry.file_name();
            let Some((code, rev, description)) = parse_cad_file_name(&file_name.to_string_lossy())
            else {
                continue;
            };
            match latest.get(&code) {
                Some((seen_rev, _)) if *seen_rev >= rev => {}
                _ => {
                    latest.insert(code, (rev, description));
                }
            }
        }

        latest
            .into_iter()
            .map(|(code, (_, description))| (code, description))
            .collect()
    }
}

fn cad_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[^_]+_([PSAHO])(\d{3})_Rev([A-Z])_(.*)\.step$")
            .expect("CAD filename regex must compile")
    })
}

/// `(code, revision letter, description)` from a canonical CAD file name.
fn parse_cad_file_name(name: &str) -> Option<(PartCode, char, String)> {
    let caps = cad_file_re().captures(name)?;
    let code = PartCode::new(&caps[1], &caps[2]).ok()?;
    let rev = caps[3].chars().next()?.to_ascii_uppercase();
    let description = caps[4].replace('-', " ").trim().to_string();
    Some((code, rev, description))
}
