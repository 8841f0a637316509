use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};

use ds_query::{Entry, EntrySource, Key, Query};
use log::{debug, trace};
use rusty_leveldb::{LdbIterator, Options, DB};

use crate::datastore::{found, Datastore};
use crate::error::Result;

/// Datastore over a LevelDB database directory.
///
/// Keys are stored as their canonical UTF-8 bytes, so LevelDB's bytewise
/// ordering matches [`Key`] ordering.
pub struct LevelDbDatastore {
    path: PathBuf,
    // reads take `&mut DB`
    db: RefCell<DB>,
}

impl LevelDbDatastore {
    /// Opens the database at `path`, creating it if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = DB::open(path, Options::default())?;
        debug!("opened leveldb datastore at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            db: RefCell::new(db),
        })
    }

    fn lookup(&self, key: &Key) -> Option<Vec<u8>> {
        self.db.borrow_mut().get(key.as_bytes()).map(|v| v.to_vec())
    }
}

impl fmt::Debug for LevelDbDatastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelDbDatastore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Datastore for LevelDbDatastore {
    fn get(&self, key: &Key) -> Result<Vec<u8>> {
        found(key, self.lookup(key))
    }

    fn put(&mut self, key: &Key, value: &[u8]) -> Result<()> {
        self.db.get_mut().put(key.as_bytes(), value)?;
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        self.db.get_mut().delete(key.as_bytes())?;
        Ok(())
    }

    fn has(&self, key: &Key) -> Result<bool> {
        Ok(self.lookup(key).is_some())
    }

    fn get_size(&self, key: &Key) -> Result<usize> {
        found(key, self.lookup(key).map(|v| v.len()))
    }

    fn sync(&mut self, prefix: &Key) -> Result<()> {
        // the memtable holds every key, so a flush covers any prefix
        self.db.get_mut().flush()?;
        debug!("flushed leveldb at {} for {prefix}", self.path.display());
        Ok(())
    }

    fn query_raw(&self, query: &Query) -> Result<EntrySource<'_>> {
        trace!("leveldb scan from {:?}", query.prefix);
        let prefix = query.prefix.clone();
        let with_values = query.needs_values();

        let mut iter = self.db.borrow_mut().new_iter()?;
        let scan = std::iter::from_fn(move || LdbIterator::next(&mut iter))
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .skip_while({
                let prefix = prefix.clone();
                move |(k, _)| k.as_slice() < prefix.as_bytes()
            })
            .take_while(move |(k, _)| k.starts_with(prefix.as_bytes()))
            .filter_map(move |(k, v)| {
                // bytes written by other programs may not be a key
                let key = Key::new(std::str::from_utf8(&k).ok()?);
                Some(Ok(if with_values {
                    Entry::new(key, v)
                } else {
                    Entry::key_only(key, Some(v.len()))
                }))
            });
        Ok(Box::new(scan))
    }

    fn close(&mut self) -> Result<()> {
        self.db.get_mut().flush()?;
        Ok(())
    }
}
