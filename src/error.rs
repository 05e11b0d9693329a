//! Error types for influxdb-async.

use thiserror::Error;

/// Structured error returned by the InfluxDB server.
///
/// Produced from non-2xx responses. `status` is the HTTP status code, or 0
/// when the error did not carry one. `retry_after` holds the value of the
/// `Retry-After` header (decimal seconds) when the server sent it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct HttpError {
    /// HTTP status code of the response.
    pub status: u16,
    /// Server error code, or the status line when the body carried none.
    pub code: String,
    /// Human readable error message.
    pub message: String,
    /// Value of the `Retry-After` header in seconds, if present.
    pub retry_after: Option<u64>,
}

/// Cause of a single cell conversion failure.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// Integer parsing failed.
    #[error("{0}")]
    Int(#[from] std::num::ParseIntError),

    /// Float parsing failed.
    #[error("{0}")]
    Float(#[from] std::num::ParseFloatError),

    /// Parsed value does not fit the destination type.
    #[error("overflow")]
    Overflow,

    /// Value is not `true` or `false`.
    #[error("invalid bool value")]
    Bool,

    /// Duration literal could not be parsed.
    #[error("invalid duration: {0}")]
    Duration(String),

    /// Timestamp parsing failed.
    #[error("{0}")]
    Time(#[from] chrono::ParseError),

    /// Base64 decoding failed.
    #[error("{0}")]
    Base64(#[from] base64::DecodeError),
}

/// Error type for influxdb-async operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid client or writer configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A point could not be serialized to line protocol.
    #[error("point encoding error: {0}")]
    Encoding(String),

    /// Network-level failure. Always retryable.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with an error status.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The decode target is incompatible with the current section schema.
    #[error("{0}")]
    DecodeSetup(String),

    /// A cell could not be converted to the destination type.
    #[error("cannot convert value \"{value}\" to type \"{column_type}\" at line {line}: {source}")]
    DecodeValue {
        /// Cell text after default substitution.
        value: String,
        /// Declared column type.
        column_type: String,
        /// 1-based line the row started on.
        line: u64,
        /// Underlying parse failure.
        source: ConversionError,
    },

    /// The annotated CSV stream violates the section schema.
    #[error("csv schema error at line {line}: {message}")]
    Schema {
        /// 1-based line of the offending row.
        line: u64,
        /// What went wrong.
        message: String,
    },

    /// I/O failure while reading a response stream.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The write API has been closed.
    #[error("writer is closed")]
    Closed,

    /// A new batch arrived while the retry queue must drain first.
    #[error("cannot write before emptying retry queue")]
    RetryQueueBusy,

    /// Writing is paused until the retry delay expires.
    #[error("cannot write yet, {0} ms to wait")]
    BackoffActive(u64),

    /// A batch write failed; `attempts` counts the tries so far.
    #[error("write failed (attempts {attempts}): {source}")]
    WriteFailed {
        /// Retry attempts performed for the batch, 0 for the first write.
        attempts: u32,
        /// The transport or HTTP failure.
        source: Box<Error>,
    },
}

impl Error {
    /// Whether the failure class permits re-sending the same batch.
    ///
    /// Transport errors are always retryable; HTTP errors are retryable for
    /// status 429 and above (and for status 0, which marks errors without a
    /// response). Everything else is fatal for the batch.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Http(e) => e.status == 0 || e.status >= 429,
            Error::WriteFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// `Retry-After` value carried by the server response, if any.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Error::Http(e) => e.retry_after,
            Error::WriteFailed { source, .. } => source.retry_after(),
            _ => None,
        }
    }
}

/// Result type alias for influxdb-async operations.
pub type Result<T> = std::result::Result<T, Error>;
