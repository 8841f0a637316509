use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::entry::Entry;
use crate::error::{Error, Result};

/// Sort directive for query results. Both orders are ascending byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    ByKey,
    ByValue,
}

impl Order {
    pub fn compare(&self, a: &Entry, b: &Entry) -> Ordering {
        match self {
            Order::ByKey => a.key.as_bytes().cmp(b.key.as_bytes()),
            // entries without a value sort first
            Order::ByValue => a.value().cmp(&b.value()),
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::ByKey => f.write_str("KEY"),
            Order::ByValue => f.write_str("VALUE"),
        }
    }
}

/// Compares two entries by each order in turn; later orders break ties.
pub fn compare_entries(orders: &[Order], a: &Entry, b: &Entry) -> Ordering {
    orders
        .iter()
        .map(|order| order.compare(a, b))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Stable sort of `entries` under the composite comparator of `orders`.
pub fn sort_entries(orders: &[Order], entries: &mut [Entry]) {
    entries.sort_by(|a, b| compare_entries(orders, a, b));
}

/// Textual description of an order: `key` or `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec(pub String);

impl OrderSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn to_order(&self) -> Result<Order> {
        match self.0.as_str() {
            "key" => Ok(Order::ByKey),
            "value" => Ok(Order::ByValue),
            other => Err(Error::invalid(format!(
                "unsupported order '{other}', expected 'key' or 'value'"
            ))),
        }
    }
}

impl FromStr for OrderSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let spec = OrderSpec::new(s.trim());
        spec.to_order()?;
        Ok(spec)
    }
}
