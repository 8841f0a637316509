use fallible_streaming_iterator::FallibleStreamingIterator;
use log::{debug, trace, warn};

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::order::{sort_entries, Order};
use crate::query::Query;

/// A lazy, prefix-scoped stream of entries supplied by a backend.
///
/// Dropping the source must release whatever cursor it holds.
pub type EntrySource<'a> = Box<dyn Iterator<Item = Result<Entry>> + 'a>;

/// Evaluates `query` over `source`.
///
/// The prefix is assumed to have been applied by the source; filters are
/// always re-checked here. The returned [`Results`] is pull-based: nothing is
/// read from the source until the caller advances to the first entry.
pub fn execute<'a, I>(query: Query, source: I) -> Result<Results<'a>>
where
    I: IntoIterator<Item = Result<Entry>>,
    I::IntoIter: 'a,
{
    query.validate()?;
    debug!("executing query: {query}");

    let filtered = Filtered {
        source: source.into_iter(),
        filters: query.filters().to_vec(),
    };
    let pipeline: EntrySource<'a> = match &query.orders {
        Some(orders) => Box::new(Sorted::new(filtered, orders.clone())),
        None => Box::new(filtered),
    };

    Ok(Results {
        query,
        source: Some(pipeline),
        current: None,
        skipped: 0,
        yielded: 0,
    })
}

/// Runs `query` over an in-memory list of entries, applying the prefix scope
/// as well.
pub fn apply_query(query: Query, entries: Vec<Entry>) -> Result<Results<'static>> {
    let scoped: Vec<Result<Entry>> = entries
        .into_iter()
        .filter(|entry| query.in_scope(&entry.key))
        .map(Ok)
        .collect();
    execute(query, scoped)
}

struct Filtered<I> {
    source: I,
    filters: Vec<Filter>,
}

impl<I: Iterator<Item = Result<Entry>>> Iterator for Filtered<I> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.source.next()? {
                Ok(entry) if !self.filters.iter().all(|f| f.matches(&entry)) => continue,
                item => return Some(item),
            }
        }
    }
}

/// Sorting needs the whole filtered sequence, so the source is drained on the
/// first pull.
struct Sorted<I> {
    source: Option<I>,
    orders: Vec<Order>,
    buffer: std::vec::IntoIter<Entry>,
}

impl<I> Sorted<I> {
    fn new(source: I, orders: Vec<Order>) -> Self {
        Self {
            source: Some(source),
            orders,
            buffer: Vec::new().into_iter(),
        }
    }
}

impl<I: Iterator<Item = Result<Entry>>> Iterator for Sorted<I> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(source) = self.source.take() {
            let mut entries = Vec::new();
            for item in source {
                match item {
                    Ok(entry) => entries.push(entry),
                    Err(e) => return Some(Err(e)),
                }
            }
            trace!("sorting {} entries by {:?}", entries.len(), self.orders);
            sort_entries(&self.orders, &mut entries);
            self.buffer = entries.into_iter();
        }
        self.buffer.next().map(Ok)
    }
}

/// The result sequence of an executed query.
///
/// A [`FallibleStreamingIterator`] over entries. If the backend fails,
/// `advance` returns `Err(Error::BackendUnavailable)` exactly once and the
/// stream then ends, so an early failure is never confused with normal
/// exhaustion. The source is released as soon as the stream ends, on
/// [`Results::close`], or on drop.
pub struct Results<'a> {
    query: Query,
    source: Option<EntrySource<'a>>,
    current: Option<Entry>,
    skipped: usize,
    yielded: usize,
}

impl Results<'_> {
    /// Drains the remaining entries, stopping at the first error.
    pub fn rest(mut self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.pull()? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Stops consuming and releases the source.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.source.take().is_some() {
            trace!(
                "released query source after {} results ({} skipped)",
                self.yielded,
                self.skipped
            );
        }
    }

    fn limit_reached(&self) -> bool {
        self.query.limit != 0 && self.yielded >= self.query.limit
    }

    fn pull(&mut self) -> Result<Option<Entry>> {
        if self.limit_reached() {
            self.release();
            return Ok(None);
        }
        loop {
            let Some(source) = self.source.as_mut() else {
                return Ok(None);
            };
            match Iterator::next(source) {
                None => {
                    self.release();
                    return Ok(None);
                }
                Some(Err(e)) => {
                    warn!("query source failed after {} results: {e}", self.yielded);
                    self.release();
                    return Err(e);
                }
                Some(Ok(_)) if self.skipped < self.query.offset => {
                    self.skipped += 1;
                }
                Some(Ok(entry)) => {
                    self.yielded += 1;
                    return Ok(Some(if self.query.keys_only {
                        entry.without_value()
                    } else {
                        entry
                    }));
                }
            }
        }
    }
}

impl FallibleStreamingIterator for Results<'_> {
    type Item = Entry;
    type Error = Error;

    fn advance(&mut self) -> Result<()> {
        self.current = None;
        self.current = self.pull()?;
        Ok(())
    }

    fn get(&self) -> Option<&Entry> {
        self.current.as_ref()
    }
}

impl std::fmt::Debug for Results<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Results")
            .field("query", &self.query)
            .field("open", &self.source.is_some())
            .field("skipped", &self.skipped)
            .field("yielded", &self.yielded)
            .finish()
    }
}
