//! `cadbom.toml` configuration.
//!
//! Every key is optional. Unknown keys are rejected so typos surface.

use crate::catalog::{CadDirCatalog, NoCatalog};
use crate::engine::{BomEngine, DEFAULT_MAX_DEPTH};
use crate::error::BomError;
use crate::policy::LinkPolicy;
use crate::store::FsScopeStore;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "cadbom.toml";
pub const DEFAULT_STORE_DIR: &str = ".cadbom/scopes";
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
pub const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store_dir: PathBuf,
    pub lock_timeout_ms: u64,
    pub max_depth: usize,
    pub link_policy: LinkPolicy,
    pub cad_dir: Option<PathBuf>,
    pub log_level: String,
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            max_depth: DEFAULT_MAX_DEPTH,
            link_policy: LinkPolicy::Open,
            cad_dir: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, BomError> {
        let config: Config = toml::from_str(raw).map_err(|e| BomError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file that must exist.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, BomError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| BomError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw).map_err(|e| match e {
            BomError::Config(msg) => BomError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Load a config file, falling back to defaults when it does not exist.
    pub fn load_optional(path: impl AsRef<Path>) -> Result<Self, BomError> {
        let path = path.as_ref();
        match fs::metadata(path) {
            Ok(_) => Self::load_file(path),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(BomError::Config(format!("{}: {err}", path.display()))),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    fn validate(&self) -> Result<(), BomError> {
        if self.max_depth == 0 {
            return Err(BomError::Config("max_depth must be at least 1".to_string()));
        }
        if self.store_dir.as_os_str().is_empty() {
            return Err(BomError::Config("store_dir must not be empty".to_string()));
        }
        Ok(())
    }

    /// Engine over the configured directory store, policy and catalog.
    pub fn open_engine(&self) -> BomEngine<FsScopeStore> {
        let store = FsScopeStore::new(&self.store_dir).with_lock_timeout(self.lock_timeout());
        let engine = BomEngine::new(store)
            .with_policy(self.link_policy)
            .with_max_depth(self.max_depth);
        match &self.cad_dir {
            Some(dir) => engine.with_catalog(CadDirCatalog::new(dir)),
            None => engine.with_catalog(NoCatalog),
        }
    }
}
