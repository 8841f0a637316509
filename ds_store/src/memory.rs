use std::collections::BTreeMap;
use std::ops::Bound;

use ds_query::{Entry, EntrySource, Key, Query};
use log::trace;

use crate::datastore::{found, Datastore};
use crate::error::Result;

/// In-memory datastore backed by an ordered map.
///
/// Enumeration follows key byte order. Nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryDatastore {
    entries: BTreeMap<Key, Vec<u8>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FromIterator<(Key, Vec<u8>)> for MemoryDatastore {
    fn from_iter<T: IntoIterator<Item = (Key, Vec<u8>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Datastore for MemoryDatastore {
    fn get(&self, key: &Key) -> Result<Vec<u8>> {
        found(key, self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &Key, value: &[u8]) -> Result<()> {
        self.entries.insert(key.clone(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn has(&self, key: &Key) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }

    fn get_size(&self, key: &Key) -> Result<usize> {
        found(key, self.entries.get(key).map(Vec::len))
    }

    fn sync(&mut self, _prefix: &Key) -> Result<()> {
        // Nothing to do for memory storage
        Ok(())
    }

    fn query_raw(&self, query: &Query) -> Result<EntrySource<'_>> {
        trace!("memory scan from {:?}", query.prefix);
        let prefix = query.prefix.clone();
        let with_values = query.needs_values();

        // keys sharing a string prefix are contiguous in byte order
        let start = Key::new(&prefix);
        let scan = self
            .entries
            .range((Bound::Included(start), Bound::Unbounded))
            .take_while(move |(key, _)| key.as_str().starts_with(prefix.as_str()))
            .map(move |(key, value)| {
                Ok(if with_values {
                    Entry::new(key.clone(), value.clone())
                } else {
                    Entry::key_only(key.clone(), Some(value.len()))
                })
            });
        Ok(Box::new(scan))
    }
}
