//! Error taxonomy.
//!
//! Three layers of errors exist: [`StoreError`] for the durable store, [`CacheError`] for the cache client and
//! [`Error`], the only kind surfaced to callers of the crate. Cache errors never leave the core; store errors are
//! folded into [`Error`] with [`From`].

use thiserror::Error as ThisError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    /// A record is missing from the store.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Requested page starts past the end of the collection. Callers treat this as "no more pages".
    #[error("offset {offset} is out of range, collection holds {total} record(s)")]
    OutOfRange { offset: usize, total: usize },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Status code the transport layer answers with.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound(_) | Error::OutOfRange { .. } => 404,
            Error::InvalidArgument(_) => 400,
            Error::Cancelled => 499,
            Error::Unavailable(_) | Error::Internal(_) => 500,
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub(crate) fn invalid<S: ToString>(msg: S) -> Self {
        Error::InvalidArgument(msg.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("store is unreachable: {0}")]
    Unavailable(String),

    #[error("stream aborted: {0}")]
    StreamAborted(String),

    #[error("store operation cancelled")]
    Cancelled,

    /// The store refused the change, e.g. a uniqueness constraint.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    Other(String),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Error::NotFound(what),
            StoreError::Unavailable(msg) | StoreError::StreamAborted(msg) => Error::Unavailable(msg),
            StoreError::Cancelled => Error::Cancelled,
            StoreError::Rejected(msg) => Error::InvalidArgument(msg),
            StoreError::Other(msg) => Error::Unavailable(msg),
        }
    }
}

/// Errors of the cache client. A miss is reported as [`CacheError::Miss`] and is the only "expected" variant.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum CacheError {
    #[error("no cache entry for '{0}'")]
    Miss(String),

    #[error("cache is unreachable: {0}")]
    Unavailable(String),

    #[error("entry '{key}' holds {found}, not {expected}")]
    WrongType {
        key:      String,
        expected: &'static str,
        found:    &'static str,
    },
}

impl CacheError {
    #[inline]
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum CodecError {
    #[error("failed to encode {what}: {msg}")]
    Encode { what: &'static str, msg: String },

    #[error("failed to decode {what}: {msg}")]
    Decode { what: &'static str, msg: String },
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        Error::Internal(err.to_string())
    }
}
