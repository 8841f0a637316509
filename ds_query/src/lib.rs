//! Query engine for key-value datastores.
//!
//! A [`Query`] describes what to read from a store: a key prefix, filters
//! over keys and values, sort orders, offset/limit pagination and a keys-only
//! projection. [`execute`] evaluates a query over any lazy [`EntrySource`] a
//! backend supplies, so the same semantics hold regardless of which storage
//! engine produced the entries.
//!
//! ```
//! use ds_query::{apply_query, Entry, FilterSpec, OrderSpec, Query};
//!
//! let entries = vec![Entry::new("/a", "1"), Entry::new("/ab", "2"), Entry::new("/b", "3")];
//! let query = Query::build(
//!     "/a",
//!     &[FilterSpec::new("key", "prefix", "/a")],
//!     &[OrderSpec::new("key")],
//!     0,
//!     10,
//!     false,
//! )?;
//! let keys: Vec<String> = apply_query(query, entries)?
//!     .rest()?
//!     .into_iter()
//!     .map(|e| e.key.into_string())
//!     .collect();
//! assert_eq!(keys, vec!["/a", "/ab"]);
//! # Ok::<(), ds_query::Error>(())
//! ```

mod entry;
pub mod error;
mod filter;
mod key;
mod order;
mod query;
mod results;

pub use entry::Entry;
pub use error::{Error, Result, SourceError};
pub use filter::{Filter, FilterSpec, Operator};
pub use key::{Key, SEPARATOR};
pub use order::{compare_entries, sort_entries, Order, OrderSpec};
pub use query::Query;
pub use results::{apply_query, execute, EntrySource, Results};

pub use fallible_streaming_iterator::FallibleStreamingIterator;
