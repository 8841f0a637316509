//! Key-value datastore capability and backends.
//!
//! [`Datastore`] is the uniform interface the shell drives: get, put, delete,
//! has, size, sync and query. Queries are evaluated by [`ds_query`], so a
//! backend only has to enumerate the entries under a prefix.
//!
//! Backends are selected by kind name through a [`Registry`]. Built in:
//!
//! - `memory`: an ordered in-process map, lost on close
//! - `flatfs`: one file per key in the go-ds-flatfs directory layout
//! - `hexfs`: the flatfs layout with hex-encoded names, for arbitrary keys
//! - `leveldb`: a LevelDB database directory
//! - `blob`: objects in a local directory or an object store URL

mod blob;
mod datastore;
pub mod error;
mod flatfs;
mod leveldb;
mod memory;
mod registry;

pub use blob::BlobDatastore;

pub use datastore::Datastore;
pub use error::{Error, Result};
pub use flatfs::FlatFsDatastore;
pub use leveldb::LevelDbDatastore;
pub use memory::MemoryDatastore;
pub use registry::{Opener, Registry};

pub use ds_query::{Entry, Key, Query, Results};
