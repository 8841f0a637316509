use ds_query::{execute, EntrySource, Key, Query, Results};

use crate::error::{Error, Result};

/// The uniform key-value interface every backend implements.
pub trait Datastore {
    /// Get the value stored under `key`
    fn get(&self, key: &Key) -> Result<Vec<u8>>;

    /// Store `value` under `key`, replacing any previous value
    fn put(&mut self, key: &Key, value: &[u8]) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn delete(&mut self, key: &Key) -> Result<()>;

    fn has(&self, key: &Key) -> Result<bool>;

    /// Size in bytes of the value stored under `key`
    fn get_size(&self, key: &Key) -> Result<usize>;

    /// Flush pending writes for every key under `prefix` to durable storage
    fn sync(&mut self, prefix: &Key) -> Result<()>;

    /// Enumerate the entries within the prefix scope of `query`.
    ///
    /// Only the prefix has to be honoured; filters, orders and pagination are
    /// applied by the query engine. A backend may leave values out when
    /// [`Query::needs_values`] is false.
    fn query_raw(&self, query: &Query) -> Result<EntrySource<'_>>;

    /// Run `query` against this store.
    fn query(&self, query: Query) -> Result<Results<'_>> {
        query.validate()?;
        let source = self.query_raw(&query)?;
        Ok(execute(query, source)?)
    }

    /// Release any resources held by the store
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Maps a missing-key lookup result to [`Error::NotFound`].
pub(crate) fn found<T>(key: &Key, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| Error::NotFound(key.clone()))
}
