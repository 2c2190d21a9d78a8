//! Error types and handling for the sheet store
//!
//! Every failure carries enough context (error kind plus, where relevant, the
//! collection name) for the caller to tell "no match" apart from "backend down".
//! Absent documents are never errors; they surface as `None`.

use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sheet store
#[derive(Error, Debug)]
pub enum Error {
    /// A store operation was attempted before the transport handle was installed.
    #[error("Store not initialized: call Database::connect first")]
    NotInitialized,

    /// The transport handle was installed twice.
    #[error("Store already initialized")]
    AlreadyInitialized,

    /// The remote call failed. Propagated unchanged, never retried here.
    #[error("Transport error on collection '{collection}': {source}")]
    Transport {
        /// Collection the failing call targeted
        collection: String,
        /// Underlying transport failure
        #[source]
        source: TransportError,
    },

    /// The remote header row is not an append-only extension of what the
    /// caller last observed.
    #[error("Schema growth conflict on collection '{collection}': expected headers {expected:?} to prefix {found:?}")]
    SchemaGrowthConflict {
        /// Collection whose header row changed underneath us
        collection: String,
        /// Header snapshot the caller grew from
        expected: Vec<String>,
        /// Header row found on the remote table
        found: Vec<String>,
    },

    /// Filter term the store cannot evaluate
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Insert with an `_id` already present in the collection
    #[error("Duplicate _id '{id}' in collection '{collection}'")]
    DuplicateId {
        /// Target collection
        collection: String,
        /// Colliding identifier
        id: String,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures raised by a [`Transport`](crate::storage::Transport) implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Backend could not be reached (network down, timeout, offline)
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Credentials rejected
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Rate limit or quota exceeded
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// The named table does not exist on the backend
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    /// Row index outside the table
    #[error("row {row} out of range (table has {rows} rows)")]
    RowOutOfRange {
        /// Requested 1-based row
        row: usize,
        /// Rows currently in the table, header included
        rows: usize,
    },

    /// Any other non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code returned by the backend
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Response could not be decoded
    #[error("malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Stable lowercase label
    pub fn label(&self) -> &'static str {
        match self {
            TransportError::Unavailable(_) => "unavailable",
            TransportError::Auth(_) => "auth",
            TransportError::Quota(_) => "quota",
            TransportError::UnknownCollection(_) => "unknown_collection",
            TransportError::RowOutOfRange { .. } => "row_out_of_range",
            TransportError::Http { .. } => "http",
            TransportError::Decode(_) => "decode",
        }
    }
}

/// Coarse classification of an [`Error`], stable for logging and matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::NotInitialized`]
    NotInitialized,
    /// See [`Error::AlreadyInitialized`]
    AlreadyInitialized,
    /// See [`Error::Transport`]
    Transport,
    /// See [`Error::SchemaGrowthConflict`]
    SchemaGrowthConflict,
    /// See [`Error::UnsupportedFilter`]
    UnsupportedFilter,
    /// See [`Error::DuplicateId`]
    DuplicateId,
    /// See [`Error::InvalidInput`]
    InvalidInput,
    /// See [`Error::Config`]
    Config,
    /// See [`Error::Io`]
    Io,
}

impl ErrorKind {
    /// Stable lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotInitialized => "not_initialized",
            ErrorKind::AlreadyInitialized => "already_initialized",
            ErrorKind::Transport => "transport",
            ErrorKind::SchemaGrowthConflict => "schema_growth_conflict",
            ErrorKind::UnsupportedFilter => "unsupported_filter",
            ErrorKind::DuplicateId => "duplicate_id",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an unsupported filter error
    pub fn unsupported_filter(msg: impl Into<String>) -> Self {
        Self::UnsupportedFilter(msg.into())
    }

    /// Wrap a transport failure with the collection it targeted
    pub fn transport(collection: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            collection: collection.into(),
            source,
        }
    }

    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotInitialized => ErrorKind::NotInitialized,
            Error::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::SchemaGrowthConflict { .. } => ErrorKind::SchemaGrowthConflict,
            Error::UnsupportedFilter(_) => ErrorKind::UnsupportedFilter,
            Error::DuplicateId { .. } => ErrorKind::DuplicateId,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Collection the failure relates to, when there is one
    pub fn collection(&self) -> Option<&str> {
        match self {
            Error::Transport { collection, .. }
            | Error::SchemaGrowthConflict { collection, .. }
            | Error::DuplicateId { collection, .. } => Some(collection),
            _ => None,
        }
    }

    /// Check if this is a client error (4xx equivalent)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedFilter(_) | Error::InvalidInput(_) | Error::DuplicateId { .. }
        )
    }

    /// Check if this is a server error (5xx equivalent)
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_keeps_collection_and_kind() {
        let err = Error::transport("Events", TransportError::Quota("429".into()));
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.collection(), Some("Events"));
        assert!(err.is_server_error());
        assert!(err.to_string().contains("Events"));
    }

    #[test]
    fn filter_errors_are_client_errors() {
        let err = Error::unsupported_filter("$gt");
        assert!(err.is_client_error());
        assert_eq!(err.collection(), None);
        assert_eq!(err.kind().as_str(), "unsupported_filter");
    }
}
