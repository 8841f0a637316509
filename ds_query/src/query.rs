use std::fmt;

use crate::error::{Error, Result};
use crate::filter::{Filter, FilterSpec};
use crate::key::Key;
use crate::order::{Order, OrderSpec};

/// A declarative query over a key-value store.
///
/// `filters` and `orders` are `None` when nothing was requested. Some backends
/// treat a present-but-empty list differently from an absent one, so an empty
/// list must never be handed over; [`Query::validate`] rejects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Key prefix the backend restricts enumeration to.
    pub prefix: String,
    /// Filters combined with AND.
    pub filters: Option<Vec<Filter>>,
    /// Sort orders, first one is the primary key.
    pub orders: Option<Vec<Order>>,
    /// Number of results to skip.
    pub offset: usize,
    /// Maximum number of results, 0 for unbounded.
    pub limit: usize,
    /// Strip values from the results.
    pub keys_only: bool,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            prefix: Key::root().into_string(),
            filters: None,
            orders: None,
            offset: 0,
            limit: 0,
            keys_only: false,
        }
    }
}

impl Query {
    /// Builds a query from textual filter and order specs.
    ///
    /// Fails with [`Error::InvalidQuerySpec`] on a negative offset or limit,
    /// or on any spec naming an unsupported operation.
    pub fn build(
        prefix: &str,
        filter_specs: &[FilterSpec],
        order_specs: &[OrderSpec],
        offset: i64,
        limit: i64,
        keys_only: bool,
    ) -> Result<Self> {
        let offset = usize::try_from(offset)
            .map_err(|_| Error::invalid(format!("offset must be non-negative, got {offset}")))?;
        let limit = usize::try_from(limit)
            .map_err(|_| Error::invalid(format!("limit must be non-negative, got {limit}")))?;

        let filters = filter_specs
            .iter()
            .map(FilterSpec::to_filter)
            .collect::<Result<Vec<_>>>()?;
        let orders = order_specs
            .iter()
            .map(OrderSpec::to_order)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            prefix: Key::new(prefix).into_string(),
            filters: non_empty(filters),
            orders: non_empty(orders),
            offset,
            limit,
            keys_only,
        })
    }

    /// Checks a (possibly hand-built) query for contradictory fields.
    pub fn validate(&self) -> Result<()> {
        if !Key::is_canonical(&self.prefix) {
            return Err(Error::invalid(format!(
                "prefix {:?} is not a canonical key",
                self.prefix
            )));
        }
        if self.filters.as_ref().is_some_and(Vec::is_empty) {
            return Err(Error::invalid("filters must be absent rather than empty"));
        }
        if self.orders.as_ref().is_some_and(Vec::is_empty) {
            return Err(Error::invalid("orders must be absent rather than empty"));
        }
        Ok(())
    }

    /// Returns true if `key` falls within the prefix scope of this query.
    pub fn in_scope(&self, key: &Key) -> bool {
        key.as_str().starts_with(self.prefix.as_str())
    }

    /// Whether evaluating this query needs entry values, even in keys-only
    /// mode. Backends may skip reading values when this is false.
    pub fn needs_values(&self) -> bool {
        !self.keys_only
            || self
                .filters()
                .iter()
                .any(|f| matches!(f, Filter::ValueCompare(..)))
            || self.orders().contains(&Order::ByValue)
    }

    pub fn filters(&self) -> &[Filter] {
        self.filters.as_deref().unwrap_or_default()
    }

    pub fn orders(&self) -> &[Order] {
        self.orders.as_deref().unwrap_or_default()
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.keys_only {
            f.write_str("SELECT keys")?;
        } else {
            f.write_str("SELECT keys,vals")?;
        }
        write!(f, " FROM {:?}", self.prefix)?;

        if let Some(filters) = &self.filters {
            f.write_str(" FILTER [")?;
            for (i, filter) in filters.iter().enumerate() {
                if i > 0 {
                    f.write_str(" AND ")?;
                }
                write!(f, "{filter}")?;
            }
            f.write_str("]")?;
        }
        if let Some(orders) = &self.orders {
            f.write_str(" ORDER [")?;
            for (i, order) in orders.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{order}")?;
            }
            f.write_str("]")?;
        }
        if self.offset > 0 {
            write!(f, " OFFSET {}", self.offset)?;
        }
        if self.limit > 0 {
            write!(f, " LIMIT {}", self.limit)?;
        }
        Ok(())
    }
}
