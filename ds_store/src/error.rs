use ds_query::Key;
use thiserror::Error;

/// Error types for datastore operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("datastore: key not found: {0}")]
    NotFound(Key),

    #[error("unknown datastore kind: {0}")]
    UnknownKind(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid datastore: {0}")]
    InvalidStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("leveldb error: {0}")]
    LevelDb(String),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error(transparent)]
    Query(#[from] ds_query::Error),
}

impl Error {
    /// A missing key is an expected outcome for get/size, not a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<rusty_leveldb::Status> for Error {
    fn from(status: rusty_leveldb::Status) -> Self {
        Error::LevelDb(status.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
