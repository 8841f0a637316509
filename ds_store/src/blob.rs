use std::fs;
use std::path::Path as FsPath;

use ds_query::{Entry, EntrySource, Error as QueryError, Key, Query};
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, trace};
use object_store::local::LocalFileSystem;
use object_store::path::{Path, PathPart};
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use tokio::runtime::{Builder, Runtime};
use url::Url;

use crate::datastore::Datastore;
use crate::error::{Error, Result};

/// Datastore over an object store: a local directory, `memory:///`, or a
/// cloud bucket URL when built with the `cloud` feature.
///
/// Each key is one object, named by the key's segments under a base path.
/// Object store calls are async and are driven by a private current-thread
/// runtime.
#[derive(Debug)]
pub struct BlobDatastore {
    store: Box<dyn ObjectStore>,
    base: Path,
    runtime: Runtime,
}

impl BlobDatastore {
    /// Opens `location`, either a URL such as `file:///srv/blobs` or
    /// `memory:///`, or a local directory which is created if missing.
    pub fn open(location: &str) -> Result<Self> {
        let (store, base): (Box<dyn ObjectStore>, Path) = if location.contains("://") {
            let url = Url::parse(location)
                .map_err(|e| Error::InvalidStore(format!("{location}: {e}")))?;
            object_store::parse_url(&url)?
        } else {
            fs::create_dir_all(location)?;
            (
                Box::new(LocalFileSystem::new_with_prefix(location)?),
                Path::default(),
            )
        };
        let runtime = Builder::new_current_thread().enable_all().build()?;
        debug!("opened blob datastore {store} at {location}");
        Ok(Self {
            store,
            base,
            runtime,
        })
    }

    /// Opens the blob store behind a filesystem path handed over by the
    /// registry.
    pub fn open_path(path: &FsPath) -> Result<Self> {
        let location = path
            .to_str()
            .ok_or_else(|| Error::InvalidStore(format!("{} is not UTF-8", path.display())))?;
        Self::open(location)
    }

    /// Object path for `key`, or `None` when a segment would have to be
    /// escaped to become a path part.
    fn location(&self, key: &Key) -> Option<Path> {
        key.as_str()
            .split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self.base.clone(), |path, segment| {
                let part = PathPart::from(segment);
                (part.as_ref() == segment).then(|| path.child(part))
            })
    }

    fn object(&self, key: &Key) -> Option<Path> {
        self.location(key).filter(|_| !key.is_root())
    }

    fn key_for(&self, location: &Path) -> Option<Key> {
        let parts: Vec<String> = location
            .prefix_match(&self.base)?
            .map(|part| part.as_ref().to_string())
            .collect();
        // escaped names were not written through a key
        if parts.is_empty() || parts.iter().any(|p| p.contains('%')) {
            return None;
        }
        Some(Key::new(&parts.join("/")))
    }

    fn read(&self, location: &Path) -> object_store::Result<Vec<u8>> {
        self.runtime.block_on(async {
            let got = self.store.get(location).await?;
            got.bytes().await.map(|b| b.to_vec())
        })
    }
}

fn not_found_as(err: object_store::Error, key: &Key) -> Error {
    match err {
        object_store::Error::NotFound { .. } => Error::NotFound(key.clone()),
        e => Error::ObjectStore(e),
    }
}

/// Blocking view of an object listing.
struct Listing<'a> {
    runtime: &'a Runtime,
    stream: BoxStream<'a, object_store::Result<ObjectMeta>>,
}

impl Iterator for Listing<'_> {
    type Item = object_store::Result<ObjectMeta>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.stream.next())
    }
}

impl Datastore for BlobDatastore {
    fn get(&self, key: &Key) -> Result<Vec<u8>> {
        let location = self
            .object(key)
            .ok_or_else(|| Error::NotFound(key.clone()))?;
        self.read(&location).map_err(|e| not_found_as(e, key))
    }

    fn put(&mut self, key: &Key, value: &[u8]) -> Result<()> {
        let location = self.object(key).ok_or_else(|| {
            Error::InvalidKey(format!("{key} cannot be stored as a blob object name"))
        })?;
        let payload = PutPayload::from(value.to_vec());
        self.runtime.block_on(self.store.put(&location, payload))?;
        trace!("put {} bytes to {location}", value.len());
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        let Some(location) = self.object(key) else {
            return Ok(());
        };
        match self.runtime.block_on(self.store.delete(&location)) {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(Error::ObjectStore(e)),
        }
    }

    fn has(&self, key: &Key) -> Result<bool> {
        let Some(location) = self.object(key) else {
            return Ok(false);
        };
        match self.runtime.block_on(self.store.head(&location)) {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(Error::ObjectStore(e)),
        }
    }

    fn get_size(&self, key: &Key) -> Result<usize> {
        let location = self
            .object(key)
            .ok_or_else(|| Error::NotFound(key.clone()))?;
        let meta = self
            .runtime
            .block_on(self.store.head(&location))
            .map_err(|e| not_found_as(e, key))?;
        Ok(meta.size)
    }

    fn sync(&mut self, _prefix: &Key) -> Result<()> {
        // puts are durable once they return
        Ok(())
    }

    fn query_raw(&self, query: &Query) -> Result<EntrySource<'_>> {
        let prefix = query.prefix.clone();
        let with_values = query.needs_values();

        // list the deepest directory that can hold every match
        let Some(dir) = self.location(&Key::new(&prefix).parent()) else {
            return Ok(Box::new(std::iter::empty()));
        };
        trace!("blob listing of {dir} for {prefix:?}");

        let listing = Listing {
            runtime: &self.runtime,
            stream: self.store.list(Some(&dir)),
        };
        let scan = listing.filter_map(move |item| {
            let meta = match item {
                Ok(meta) => meta,
                Err(e) => return Some(Err(QueryError::backend(e))),
            };
            let key = self.key_for(&meta.location)?;
            if !key.as_str().starts_with(prefix.as_str()) {
                return None;
            }
            if !with_values {
                return Some(Ok(Entry::key_only(key, Some(meta.size))));
            }
            match self.read(&meta.location) {
                Ok(value) => Some(Ok(Entry::new(key, value))),
                // deleted between listing and reading
                Err(object_store::Error::NotFound { .. }) => None,
                Err(e) => Some(Err(QueryError::backend(e))),
            }
        });
        Ok(Box::new(scan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_object_names() {
        let store = BlobDatastore::open("memory:///").unwrap();
        let location = store.object(&Key::new("/fruit/apple")).unwrap();
        assert_eq!(location.as_ref(), "fruit/apple");
        assert_eq!(store.key_for(&location), Some(Key::new("/fruit/apple")));

        assert_eq!(store.object(&Key::root()), None);
        assert_eq!(store.object(&Key::new("/50%")), None);
        assert_eq!(store.object(&Key::new("/a#b")), None);
    }

    #[test]
    fn test_bad_url() {
        let err = BlobDatastore::open("nope://bucket").unwrap_err();
        assert!(matches!(err, Error::ObjectStore(_)), "{err:?}");
        assert!(BlobDatastore::open("://").is_err());
    }
}
