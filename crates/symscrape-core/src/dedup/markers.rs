use dashmap::DashSet;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::config::{AppConfig, MarkerStoreKind};
use crate::error::Error;
use crate::storage::SqliteMarkerStore;
use crate::symbols::{is_safe_component, SymbolKey};

/// Remembers symbols already submitted, so later runs can skip them without
/// asking the server. Markers are never removed.
pub trait MarkerStore: Send + Sync {
    fn contains(&self, key: &SymbolKey) -> Result<bool, Error>;
    fn mark(&self, key: &SymbolKey) -> Result<(), Error>;
}

/// Open the store selected in the configuration, if any.
pub fn open_marker_store(config: &AppConfig) -> Result<Option<Arc<dyn MarkerStore>>, Error> {
    let store: Arc<dyn MarkerStore> = match config.marker_store {
        MarkerStoreKind::None => return Ok(None),
        MarkerStoreKind::Directory => Arc::new(DirMarkerStore::open(&config.marker_path)?),
        MarkerStoreKind::Sqlite => Arc::new(SqliteMarkerStore::open(&config.marker_path)?),
    };
    debug!(
        "Using {:?} marker store at {}",
        config.marker_store,
        config.marker_path.display()
    );
    Ok(Some(store))
}

/// Zero-byte sentinel files at `root/<debug_file>/<debug_id>`.
#[derive(Debug, Clone)]
pub struct DirMarkerStore {
    root: PathBuf,
}

impl DirMarkerStore {
    pub fn open(root: &Path) -> Result<Self, Error> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn marker_path(&self, key: &SymbolKey) -> Result<PathBuf, Error> {
        Ok(self
            .root
            .join(path_component(&key.debug_file)?)
            .join(path_component(&key.debug_id)?))
    }
}

/// Keys come from tool output, so refuse anything that would escape the root.
fn path_component(part: &str) -> Result<&str, Error> {
    if !is_safe_component(part) {
        return Err(Error::Other(format!("unsafe marker key component {:?}", part)));
    }
    Ok(part)
}

impl MarkerStore for DirMarkerStore {
    fn contains(&self, key: &SymbolKey) -> Result<bool, Error> {
        match fs::metadata(self.marker_path(key)?) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn mark(&self, key: &SymbolKey) -> Result<(), Error> {
        let path = self.marker_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(())
    }
}

/// Markers kept for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    keys: DashSet<SymbolKey>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkerStore for MemoryMarkerStore {
    fn contains(&self, key: &SymbolKey) -> Result<bool, Error> {
        Ok(self.keys.contains(key))
    }

    fn mark(&self, key: &SymbolKey) -> Result<(), Error> {
        self.keys.insert(key.clone());
        Ok(())
    }
}
