use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use log::debug;

use crate::blob::BlobDatastore;
use crate::datastore::Datastore;
use crate::error::{Error, Result};
use crate::flatfs::FlatFsDatastore;
use crate::leveldb::LevelDbDatastore;
use crate::memory::MemoryDatastore;

/// Opens a datastore of one kind at the given path.
pub type Opener = fn(&Path) -> Result<Box<dyn Datastore>>;

/// Registry of datastore kinds the shell can open, keyed by kind name.
#[derive(Clone)]
pub struct Registry {
    openers: BTreeMap<String, Opener>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            openers: BTreeMap::new(),
        }
    }

    /// Registers (or replaces) the opener for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, opener: Opener) -> &mut Self {
        self.openers.insert(kind.into(), opener);
        self
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        self.openers.keys().map(String::as_str).collect()
    }

    pub fn open(&self, kind: &str, path: &Path) -> Result<Box<dyn Datastore>> {
        let opener = self
            .openers
            .get(kind)
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))?;
        debug!("opening {kind} datastore at {}", path.display());
        opener(path)
    }
}

impl Default for Registry {
    /// A registry with every built-in kind.
    fn default() -> Self {
        let mut registry = Self::new();
        registry
            .register("blob", |path| Ok(Box::new(BlobDatastore::open_path(path)?)))
            .register("flatfs", |path| Ok(Box::new(FlatFsDatastore::open(path)?)))
            .register("hexfs", |path| {
                Ok(Box::new(FlatFsDatastore::open_hex(path)?))
            })
            .register("leveldb", |path| {
                Ok(Box::new(LevelDbDatastore::open(path)?))
            })
            .register("memory", |_| Ok(Box::new(MemoryDatastore::new())));
        registry
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("kinds", &self.kinds()).finish()
    }
}
