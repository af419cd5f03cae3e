use std::fmt;

/// Result type for ctxmem-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the store layer.
#[derive(Debug)]
pub enum Error {
    /// Database operation failed.
    Database(rusqlite::Error),

    /// A `ctxmem_types::Error` raised by validation inside a query (e.g. an
    /// empty `SOPData`, a parent-type violation).
    Validation(ctxmem_types::Error),

    /// Query-specific error (not found, bad request, conflict).
    Query(ctxmem_types::ErrorKind, String),

    /// JSON (de)serialization failed.
    Serialization(serde_json::Error),
}

impl Error {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::Query(ctxmem_types::ErrorKind::NotFound, msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Error::Query(ctxmem_types::ErrorKind::BadRequest, msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Query(ctxmem_types::ErrorKind::Conflict, msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Database(err) => write!(f, "database error: {}", err),
            Error::Validation(err) => write!(f, "validation error: {}", err),
            Error::Query(kind, msg) => write!(f, "{:?}: {}", kind, msg),
            Error::Serialization(err) => write!(f, "serialization error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(err) => Some(err),
            Error::Validation(err) => Some(err),
            Error::Query(_, _) => None,
            Error::Serialization(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err)
    }
}

impl From<ctxmem_types::Error> for Error {
    fn from(err: ctxmem_types::Error) -> Self {
        Error::Validation(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err)
    }
}

/// Maps a store error onto the uniform `ctxmem_types::Error` carrier used at
/// component boundaries above the store (§4.A).
impl From<Error> for ctxmem_types::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Database(e) => ctxmem_types::Error::internal(e.to_string()),
            Error::Validation(e) => e,
            Error::Query(kind, msg) => ctxmem_types::Error::new(kind, msg),
            Error::Serialization(e) => ctxmem_types::Error::internal(e.to_string()),
        }
    }
}
