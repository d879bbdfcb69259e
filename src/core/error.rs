//! Error types for the queue and pipeline.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// The main error type for the queue and pipeline.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A queue was constructed with a capacity that cannot hold anything
    #[error("Invalid queue capacity {capacity}: capacity must be greater than 0")]
    InvalidCapacity { capacity: usize },

    /// A timed queue operation ran past its deadline
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The queue was closed while an operation waited on it
    #[error("Queue was closed")]
    Closed,

    /// A source failed while producing an item
    #[error("Source error: {0}")]
    Source(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// A sink failed to accept an item
    #[error("Sink error: {0}")]
    Sink(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// The pipeline was cancelled before it drained
    #[error("Pipeline was shut down")]
    Shutdown,

    /// A producer or consumer unit panicked
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

// Convenience constructors
impl Error {
    /// Create a source error from any error type
    pub fn source<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Source(Arc::new(error))
    }

    /// Create a sink error from any error type
    pub fn sink<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Sink(Arc::new(error))
    }

    /// Create a timeout error
    pub fn timeout(duration_ms: u64) -> Self {
        Error::Timeout { duration_ms }
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Whether the caller may retry the failed operation with a fresh deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// Error returned by a failed put. The rejected item is handed back.
#[derive(Debug, PartialEq, Eq)]
pub enum PutError<T> {
    /// The deadline passed before space became available
    Timeout(T),
    /// The queue was closed
    Closed(T),
}

impl<T> fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutError::Timeout(_) => f.write_str("put timed out waiting for space in the queue"),
            PutError::Closed(_) => f.write_str("put on a closed queue"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for PutError<T> {}

impl<T> PutError<T> {
    /// Returns the item that failed to be enqueued.
    pub fn into_inner(self) -> T {
        match self {
            PutError::Timeout(item) | PutError::Closed(item) => item,
        }
    }

    /// Converts into the crate error, dropping the item.
    pub fn into_error(self, waited_ms: u64) -> Error {
        match self {
            PutError::Timeout(_) => Error::timeout(waited_ms),
            PutError::Closed(_) => Error::Closed,
        }
    }
}

impl<T> From<PutError<T>> for Error {
    fn from(e: PutError<T>) -> Self {
        e.into_error(0)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Panicked(e.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for Error {
    fn from(e: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Error::Custom(e.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Helper trait for converting errors into our Error type
pub trait IntoError<T> {
    fn into_source_error(self) -> Result<T>;
    fn into_sink_error(self) -> Result<T>;
}

impl<T, E> IntoError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_source_error(self) -> Result<T> {
        self.map_err(Error::source)
    }

    fn into_sink_error(self) -> Result<T> {
        self.map_err(Error::sink)
    }
}
