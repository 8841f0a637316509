use crate::key::Key;

/// A key/value pair yielded by a datastore or a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Key,
    /// The value bytes. `None` when the value was not materialized (keys-only).
    pub value: Option<Vec<u8>>,
    /// Size of the value in bytes, when the source knows it.
    pub size: Option<usize>,
}

impl Entry {
    pub fn new(key: impl Into<Key>, value: impl Into<Vec<u8>>) -> Self {
        let value = value.into();
        Self {
            key: key.into(),
            size: Some(value.len()),
            value: Some(value),
        }
    }

    /// An entry carrying only its key (and optionally the size of its value).
    pub fn key_only(key: impl Into<Key>, size: Option<usize>) -> Self {
        Self {
            key: key.into(),
            value: None,
            size,
        }
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Drops the value, keeping the key and size.
    pub fn without_value(self) -> Self {
        Self {
            value: None,
            ..self
        }
    }
}
