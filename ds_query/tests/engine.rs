use std::cell::Cell;
use std::collections::BTreeSet;
use std::io;
use std::rc::Rc;

use anyhow::Result;
use ds_query::{
    apply_query, execute, Entry, Error, Filter, FilterSpec, Operator, Order, OrderSpec, Query,
};
use fallible_streaming_iterator::FallibleStreamingIterator;
use pretty_assertions::assert_eq;

fn store() -> Vec<Entry> {
    vec![
        Entry::new("/a", "1"),
        Entry::new("/ab", "2"),
        Entry::new("/b", "3"),
    ]
}

fn pairs(entries: &[Entry]) -> Vec<(String, Option<String>)> {
    entries
        .iter()
        .map(|e| {
            (
                e.key.to_string(),
                e.value().map(|v| String::from_utf8_lossy(v).into_owned()),
            )
        })
        .collect()
}

fn keys(entries: &[Entry]) -> Vec<&str> {
    entries.iter().map(|e| e.key.as_str()).collect()
}

/// Source that counts how many entries were pulled and flags when dropped.
struct TrackedSource {
    entries: std::vec::IntoIter<Entry>,
    pulled: Rc<Cell<usize>>,
    dropped: Rc<Cell<bool>>,
    fail_after: Option<usize>,
}

impl TrackedSource {
    fn new(entries: Vec<Entry>) -> (Self, Rc<Cell<usize>>, Rc<Cell<bool>>) {
        let pulled = Rc::new(Cell::new(0));
        let dropped = Rc::new(Cell::new(false));
        let source = Self {
            entries: entries.into_iter(),
            pulled: pulled.clone(),
            dropped: dropped.clone(),
            fail_after: None,
        };
        (source, pulled, dropped)
    }
}

impl Iterator for TrackedSource {
    type Item = ds_query::Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fail_after == Some(self.pulled.get()) {
            self.pulled.set(self.pulled.get() + 1);
            return Some(Err(Error::backend(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "cursor lost",
            ))));
        }
        let entry = self.entries.next()?;
        self.pulled.set(self.pulled.get() + 1);
        Some(Ok(entry))
    }
}

impl Drop for TrackedSource {
    fn drop(&mut self) {
        self.dropped.set(true);
    }
}

#[test]
fn test_prefix_filter_and_key_order() -> Result<()> {
    let query = Query::build(
        "/a",
        &[FilterSpec::new("key", "prefix", "/a")],
        &[OrderSpec::new("key")],
        0,
        10,
        false,
    )?;
    let results = apply_query(query, store())?.rest()?;
    assert_eq!(
        pairs(&results),
        vec![
            ("/a".to_string(), Some("1".to_string())),
            ("/ab".to_string(), Some("2".to_string())),
        ]
    );
    Ok(())
}

#[test]
fn test_value_filter_without_order() -> Result<()> {
    let query = Query::build("/", &[FilterSpec::new("value", ">", "1")], &[], 0, 0, false)?;
    let results = apply_query(query, store())?.rest()?;
    let found: BTreeSet<&str> = keys(&results).into_iter().collect();
    assert_eq!(found, BTreeSet::from(["/ab", "/b"]));
    Ok(())
}

#[test]
fn test_offset_and_limit_over_ordered_store() -> Result<()> {
    let query = Query::build("/", &[], &[OrderSpec::new("key")], 1, 1, false)?;
    let results = apply_query(query, store())?.rest()?;
    assert_eq!(
        pairs(&results),
        vec![("/ab".to_string(), Some("2".to_string()))]
    );
    Ok(())
}

#[test]
fn test_no_filters_is_identity_pagination() -> Result<()> {
    let source: Vec<Entry> = (0..10)
        .map(|i| Entry::new(format!("/k/{}", 9 - i).as_str(), vec![i as u8]))
        .collect();

    for (offset, limit) in [(0, 0), (0, 3), (2, 0), (4, 4), (9, 5), (12, 1)] {
        let query = Query::build("/", &[], &[], offset, limit, false)?;
        let results = execute(query, source.clone().into_iter().map(Ok))?.rest()?;

        let limit = if limit == 0 { usize::MAX } else { limit as usize };
        let expected: Vec<Entry> = source
            .iter()
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .collect();
        assert_eq!(results, expected, "offset={offset} limit={limit}");
    }
    Ok(())
}

#[test]
fn test_filter_order_does_not_change_membership() -> Result<()> {
    let entries: Vec<Entry> = ["/a", "/b", "/c", "/d", "/e"]
        .iter()
        .zip(["5", "1", "4", "2", "3"])
        .map(|(k, v)| Entry::new(*k, v))
        .collect();
    let f1 = FilterSpec::new("key", ">", "/a");
    let f2 = FilterSpec::new("value", "<=", "4");

    let forward = Query::build("/", &[f1.clone(), f2.clone()], &[], 0, 0, false)?;
    let backward = Query::build("/", &[f2, f1], &[], 0, 0, false)?;

    let forward: BTreeSet<String> = apply_query(forward, entries.clone())?
        .rest()?
        .into_iter()
        .map(|e| e.key.into_string())
        .collect();
    let backward: BTreeSet<String> = apply_query(backward, entries)?
        .rest()?
        .into_iter()
        .map(|e| e.key.into_string())
        .collect();
    assert_eq!(forward, backward);
    assert_eq!(forward.len(), 3);
    Ok(())
}

#[test]
fn test_multi_order_is_non_decreasing() -> Result<()> {
    let entries = vec![
        Entry::new("/d", "x"),
        Entry::new("/a", "y"),
        Entry::new("/c", "x"),
        Entry::new("/b", "y"),
    ];
    let query = Query::build(
        "/",
        &[],
        &[OrderSpec::new("value"), OrderSpec::new("key")],
        0,
        0,
        false,
    )?;
    let orders = query.orders().to_vec();
    let results = apply_query(query, entries)?.rest()?;

    assert_eq!(keys(&results), vec!["/c", "/d", "/a", "/b"]);
    for pair in results.windows(2) {
        assert!(ds_query::compare_entries(&orders, &pair[0], &pair[1]).is_le());
    }
    Ok(())
}

#[test]
fn test_keys_only_never_yields_values() -> Result<()> {
    for orders in [vec![], vec![OrderSpec::new("value")]] {
        let query = Query::build("/", &[FilterSpec::new("value", ">=", "2")], &orders, 0, 0, true)?;
        let results = apply_query(query, store())?.rest()?;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|e| e.value.is_none()));
        // size survives the projection
        assert!(results.iter().all(|e| e.size == Some(1)));
    }
    Ok(())
}

#[test]
fn test_pagination_is_a_slice_of_the_full_result() -> Result<()> {
    let entries: Vec<Entry> = (0..20)
        .map(|i| Entry::new(format!("/n/{:02}", (i * 7) % 20).as_str(), format!("{}", i % 3)))
        .collect();
    let filters = [FilterSpec::new("key", ">=", "/n/03")];
    let orders = [OrderSpec::new("value"), OrderSpec::new("key")];

    let full = apply_query(Query::build("/", &filters, &orders, 0, 0, false)?, entries.clone())?
        .rest()?;
    for (offset, limit) in [(0, 5), (3, 4), (10, 100), (16, 1)] {
        let page = apply_query(
            Query::build("/", &filters, &orders, offset, limit, false)?,
            entries.clone(),
        )?
        .rest()?;
        let expected: Vec<Entry> = full
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        assert_eq!(page, expected);
    }
    Ok(())
}

#[test]
fn test_hand_built_descriptor_is_validated() {
    let query = Query {
        filters: Some(Vec::new()),
        ..Query::default()
    };
    let err = execute(query, Vec::new()).unwrap_err();
    assert!(err.is_invalid_spec());

    let query = Query {
        prefix: "no-slash".to_string(),
        ..Query::default()
    };
    assert!(execute(query, Vec::new()).unwrap_err().is_invalid_spec());
}

#[test]
fn test_filters_are_rechecked_when_source_ignores_prefix() -> Result<()> {
    let query = Query {
        prefix: "/a".to_string(),
        filters: Some(vec![Filter::KeyCompare(Operator::Lt, "/b".to_string())]),
        ..Query::default()
    };
    // the source hands over everything; only the prefix is trusted to the backend
    let results = execute(query, store().into_iter().map(Ok))?.rest()?;
    assert_eq!(keys(&results), vec!["/a", "/ab"]);
    Ok(())
}

#[test]
fn test_source_is_pulled_lazily_and_released_at_limit() -> Result<()> {
    let entries: Vec<Entry> = (0..100)
        .map(|i| Entry::new(format!("/k/{i:03}").as_str(), "v"))
        .collect();
    let (source, pulled, dropped) = TrackedSource::new(entries);

    let query = Query::build("/", &[], &[], 0, 3, false)?;
    let mut results = execute(query, source)?;
    assert_eq!(pulled.get(), 0);
    assert!(results.get().is_none());

    results.advance()?;
    assert_eq!(results.get().map(|e| e.key.as_str()), Some("/k/000"));
    assert_eq!(pulled.get(), 1);
    results.advance()?;
    results.advance()?;
    assert_eq!(results.get().map(|e| e.key.as_str()), Some("/k/002"));
    assert!(results.next()?.is_none());
    assert_eq!(pulled.get(), 3);
    assert!(dropped.get());
    Ok(())
}

#[test]
fn test_abandoned_results_release_source() -> Result<()> {
    let entries = store();
    let (source, _pulled, dropped) = TrackedSource::new(entries.clone());
    let mut results = execute(Query::default(), source)?;
    results.advance()?;
    assert!(!dropped.get());
    drop(results);
    assert!(dropped.get());

    let (source, _pulled, dropped) = TrackedSource::new(entries);
    let results = execute(Query::default(), source)?;
    results.close();
    assert!(dropped.get());
    Ok(())
}

#[test]
fn test_backend_failure_is_distinguishable_from_exhaustion() -> Result<()> {
    let (mut source, _pulled, dropped) = TrackedSource::new(store());
    source.fail_after = Some(2);

    let mut results = execute(Query::default(), source)?;
    assert_eq!(results.next()?.map(|e| e.key.as_str()), Some("/a"));
    assert_eq!(results.next()?.map(|e| e.key.as_str()), Some("/ab"));
    match results.advance() {
        Err(err) => assert!(err.is_backend_unavailable()),
        Ok(()) => panic!("expected backend failure, got {:?}", results.get()),
    }
    assert!(results.get().is_none());
    assert!(results.next()?.is_none());
    assert!(dropped.get());
    Ok(())
}

#[test]
fn test_backend_failure_while_sorting() -> Result<()> {
    let (mut source, _pulled, _dropped) = TrackedSource::new(store());
    source.fail_after = Some(1);

    let query = Query {
        orders: Some(vec![Order::ByKey]),
        ..Query::default()
    };
    let err = execute(query, source)?.rest().unwrap_err();
    assert!(err.is_backend_unavailable());
    Ok(())
}
