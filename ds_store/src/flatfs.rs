use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ds_query::{Entry, EntrySource, Error as QueryError, Key, Query};
use log::{debug, trace};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::datastore::Datastore;
use crate::error::{Error, Result};

/// Extension of files holding values
const EXTENSION: &str = "data";

/// File in the store root naming the shard function
const SHARDING_FILE: &str = "SHARDING";

const SHARD_ID_PREFIX: &str = "/repo/flatfs/shard/v1/";

/// Longest file name most filesystems accept
const MAX_FILE_NAME: usize = 255;

/// Picks the directory a file name lives in, as recorded in `SHARDING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shard {
    /// The first `n` characters, right-padded with `_`
    Prefix(usize),
    /// The last `n` characters, left-padded with `_`
    Suffix(usize),
    /// The `n` characters before the last one, left-padded with `_`
    NextToLast(usize),
}

impl Shard {
    const DEFAULT: Shard = Shard::NextToLast(2);

    fn dir(&self, name: &str) -> String {
        match *self {
            Shard::Prefix(n) => format!("{name:_<n$}")[..n].to_string(),
            Shard::Suffix(n) => {
                let padded = format!("{name:_>n$}");
                padded[padded.len() - n..].to_string()
            }
            Shard::NextToLast(n) => {
                let padded = format!("{name:_>width$}", width = n + 1);
                let offset = padded.len() - n - 1;
                padded[offset..offset + n].to_string()
            }
        }
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, n) = match self {
            Shard::Prefix(n) => ("prefix", n),
            Shard::Suffix(n) => ("suffix", n),
            Shard::NextToLast(n) => ("next-to-last", n),
        };
        write!(f, "{SHARD_ID_PREFIX}{name}/{n}")
    }
}

impl FromStr for Shard {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidStore(format!("unrecognised shard function '{s}'"));
        let (name, n) = s
            .trim()
            .strip_prefix(SHARD_ID_PREFIX)
            .and_then(|rest| rest.split_once('/'))
            .ok_or_else(invalid)?;
        let n: usize = n.parse().map_err(|_| invalid())?;
        match name {
            _ if n == 0 => Err(invalid()),
            "prefix" => Ok(Shard::Prefix(n)),
            "suffix" => Ok(Shard::Suffix(n)),
            "next-to-last" => Ok(Shard::NextToLast(n)),
            _ => Err(invalid()),
        }
    }
}

/// How keys become file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Naming {
    /// `/NAME` is stored as `NAME.data`. Only single-segment keys made of
    /// `0-9 A-Z + - _ =` can be stored.
    Plain,
    /// Any key, hex-encoded.
    Hex,
}

impl Naming {
    fn encode(&self, key: &Key) -> Option<String> {
        match self {
            Naming::Plain => {
                let name = &key.as_str()[1..];
                plain_name_is_valid(name).then(|| name.to_string())
            }
            Naming::Hex => Some(hex::encode(key.as_bytes())),
        }
    }

    fn decode(&self, stem: &str) -> Option<Key> {
        match self {
            Naming::Plain => plain_name_is_valid(stem).then(|| Key::new(stem)),
            Naming::Hex => {
                let raw = String::from_utf8(hex::decode(stem).ok()?).ok()?;
                Some(Key::new(&raw))
            }
        }
    }
}

fn plain_name_is_valid(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase() || b"+-_=".contains(&b))
}

/// Datastore keeping one file per key under a root directory.
///
/// A key is stored as `<root>/<shard>/<name>.data`, where the shard
/// directory comes from the function recorded in the root `SHARDING` file.
/// Writes land in a temporary file first and are renamed into place.
#[derive(Debug)]
pub struct FlatFsDatastore {
    root: PathBuf,
    shard: Shard,
    naming: Naming,
    sync_writes: bool,
}

impl FlatFsDatastore {
    /// Opens a flatfs store, creating it with the default shard function if
    /// the directory holds no `SHARDING` file yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path.as_ref(), Naming::Plain)
    }

    /// Like [`FlatFsDatastore::open`], but with hex-encoded file names so any
    /// key can be stored.
    pub fn open_hex(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path.as_ref(), Naming::Hex)
    }

    fn open_with(root: &Path, naming: Naming) -> Result<Self> {
        fs::create_dir_all(root)?;
        if !root.is_dir() {
            return Err(Error::InvalidStore(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let sharding = root.join(SHARDING_FILE);
        let shard = match fs::read_to_string(&sharding) {
            Ok(id) => id.parse()?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::write(&sharding, format!("{}\n", Shard::DEFAULT))?;
                Shard::DEFAULT
            }
            Err(e) => return Err(Error::Io(e)),
        };
        debug!(
            "opened flatfs datastore at {} ({shard}, {naming:?} names)",
            root.display()
        );
        Ok(Self {
            root: root.to_path_buf(),
            shard,
            naming,
            sync_writes: false,
        })
    }

    /// Fsync every value file as it is written.
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    fn path_for(&self, key: &Key) -> Option<PathBuf> {
        let stem = self.naming.encode(key)?;
        let dir = self.shard.dir(&stem);
        Some(self.root.join(dir).join(format!("{stem}.{EXTENSION}")))
    }

    /// Recovers the key from a value file name, if it is one of ours.
    fn decode_file_name(&self, name: &str) -> Option<Key> {
        let stem = name.strip_suffix(EXTENSION)?.strip_suffix('.')?;
        self.naming.decode(stem)
    }
}

fn not_found_as(err: io::Error, key: &Key) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::NotFound(key.clone())
    } else {
        Error::Io(err)
    }
}

impl Datastore for FlatFsDatastore {
    fn get(&self, key: &Key) -> Result<Vec<u8>> {
        let path = self
            .path_for(key)
            .ok_or_else(|| Error::NotFound(key.clone()))?;
        fs::read(path).map_err(|e| not_found_as(e, key))
    }

    fn put(&mut self, key: &Key, value: &[u8]) -> Result<()> {
        let path = self.path_for(key).ok_or_else(|| {
            Error::InvalidKey(format!(
                "{key}: flatfs keys are a single segment of 0-9, A-Z, '+', '-', '_' or '='"
            ))
        })?;
        let too_long = path
            .file_name()
            .is_some_and(|name| name.len() > MAX_FILE_NAME);
        if too_long {
            return Err(Error::InvalidKey(format!(
                "{key} is too long for the flatfs datastore"
            )));
        }
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(value)?;
        if self.sync_writes {
            tmp.as_file().sync_all()?;
        }
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
        trace!("wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        let Some(path) = self.path_for(key) else {
            return Ok(());
        };
        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(Error::Io(e)),
            _ => Ok(()),
        }
    }

    fn has(&self, key: &Key) -> Result<bool> {
        let Some(path) = self.path_for(key) else {
            return Ok(false);
        };
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn get_size(&self, key: &Key) -> Result<usize> {
        let path = self
            .path_for(key)
            .ok_or_else(|| Error::NotFound(key.clone()))?;
        let meta = fs::metadata(path).map_err(|e| not_found_as(e, key))?;
        Ok(meta.len() as usize)
    }

    fn sync(&mut self, prefix: &Key) -> Result<()> {
        let mut synced = 0;
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(2) {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_dir() {
                File::open(entry.path())?.sync_all()?;
                continue;
            }
            let in_scope = entry.depth() == 2
                && entry
                    .file_name()
                    .to_str()
                    .and_then(|name| self.decode_file_name(name))
                    .is_some_and(|key| key.as_str().starts_with(prefix.as_str()));
            if in_scope {
                File::open(entry.path())?.sync_all()?;
                synced += 1;
            }
        }
        File::open(&self.root)?.sync_all()?;
        debug!("synced {synced} files under {prefix}");
        Ok(())
    }

    fn query_raw(&self, query: &Query) -> Result<EntrySource<'_>> {
        let with_values = query.needs_values();
        let prefix = query.prefix.clone();
        trace!("flatfs scan of {} for {prefix:?}", self.root.display());

        let walk = WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |item| {
                let entry = match item {
                    Ok(entry) => entry,
                    Err(e) => return Some(Err(QueryError::backend(e))),
                };
                if !entry.file_type().is_file() {
                    return None;
                }
                // temp files from in-flight writes start with a dot
                let key = entry
                    .file_name()
                    .to_str()
                    .filter(|name| !name.starts_with('.'))
                    .and_then(|name| self.decode_file_name(name))?;
                if !key.as_str().starts_with(prefix.as_str()) {
                    return None;
                }
                let read = if with_values {
                    fs::read(entry.path()).map(|value| Entry::new(key, value))
                } else {
                    entry
                        .metadata()
                        .map_err(io::Error::from)
                        .map(|meta| Entry::key_only(key, Some(meta.len() as usize)))
                };
                match read {
                    Ok(entry) => Some(Ok(entry)),
                    // deleted between listing and reading
                    Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                    Err(e) => Some(Err(QueryError::backend(e))),
                }
            });
        Ok(Box::new(walk))
    }
}
