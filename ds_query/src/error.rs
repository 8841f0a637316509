use thiserror::Error;

/// Boxed error reported by an entry source.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while building or executing a query.
#[derive(Error, Debug)]
pub enum Error {
    /// The query descriptor or one of its filter/order specs is malformed.
    #[error("invalid query spec: {0}")]
    InvalidQuerySpec(String),

    /// The entry source failed while it was being read.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[source] SourceError),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidQuerySpec(msg.into())
    }

    /// Wraps a backend failure so it can travel through an entry source.
    pub fn backend<E: Into<SourceError>>(err: E) -> Self {
        Error::BackendUnavailable(err.into())
    }

    pub fn is_invalid_spec(&self) -> bool {
        matches!(self, Error::InvalidQuerySpec(_))
    }

    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Error::BackendUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
