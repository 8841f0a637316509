//! Key-value datastores with a filter/order/paginate query engine.
//!
//! The query engine lives in [`ds_query`], the store trait and its backends
//! in [`ds_store`]. The `dshell` binary in the `cli` crate drives both.

pub use ds_query;
pub use ds_store;

pub use ds_query::{Entry, Filter, FilterSpec, Key, Operator, Order, OrderSpec, Query, Results};
pub use ds_store::{
    BlobDatastore, Datastore, FlatFsDatastore, LevelDbDatastore, MemoryDatastore, Registry,
};
