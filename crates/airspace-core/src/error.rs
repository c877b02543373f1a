//! Error types for the airspace core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! Every error also carries an [`ErrorKind`] so the pipeline loops can decide
//! whether to stop the process, skip the current item, or leave state intact
//! for the next attempt.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for airspace operations.
pub type Result<T> = std::result::Result<T, Error>;

/// How a loop boundary should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The process must terminate.
    Fatal,
    /// Logged; the loop continues with the next tick or message.
    Transient,
    /// Logged; state is left unchanged so the next cycle retries it.
    Retryable,
}

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token acquisition error
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// State-vector API error
    #[error("OpenSky API error: {0}")]
    Api(#[from] ApiError),

    /// Kafka-related error
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// Analytical store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid state vector
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

impl Error {
    /// Classify the error for loop-boundary handling.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) | Error::Auth(_) | Error::Io(_) | Error::Shutdown => ErrorKind::Fatal,
            Error::Api(_) | Error::Record(_) | Error::Serialization(_) => ErrorKind::Transient,
            Error::Kafka(e) => e.kind(),
            Error::Store(e) => e.kind(),
        }
    }

    /// Whether this error must terminate the process.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

/// Errors from the OAuth client-credentials exchange.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Client id or secret not configured
    #[error("Missing client credentials: {0} is not set")]
    MissingCredentials(&'static str),

    /// Network or transport failure
    #[error("Token request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Token endpoint answered with a non-2xx status
    #[error("Token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be interpreted as a token grant
    #[error("Malformed token response: {0}")]
    MalformedResponse(String),
}

/// Errors from the state-vector API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Network, transport or timeout failure
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx status other than the ones below
    #[error("Server returned error status: {status}")]
    Status { status: u16 },

    /// Call-volume quota exhausted
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Bearer token rejected
    #[error("Bearer token rejected ({status})")]
    Unauthorized { status: u16 },

    /// Body is not a states document
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Server-requested delay before the next call, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Kafka-specific errors.
#[derive(Error, Debug)]
pub enum KafkaError {
    /// Failed to create a client for the brokers
    #[error("Connection failed to {broker}: {message}")]
    ConnectionFailed { broker: String, message: String },

    /// Consumer group or subscription error
    #[error("Consumer group error: {0}")]
    ConsumerGroup(String),

    /// Offset commit failed
    #[error("Offset commit failed: {0}")]
    OffsetCommit(String),

    /// Partition assignment error
    #[error("Partition assignment error: {0}")]
    PartitionAssignment(String),

    /// A record could not be enqueued or was not acknowledged
    #[error("Publish failed for key {key}: {message}")]
    Publish { key: String, message: String },

    /// Flushing the producer queue failed or timed out
    #[error("Producer flush failed: {0}")]
    Flush(String),

    /// Topic creation failed
    #[error("Topic administration failed: {0}")]
    TopicAdmin(String),
}

impl KafkaError {
    fn kind(&self) -> ErrorKind {
        match self {
            KafkaError::ConnectionFailed { .. } | KafkaError::TopicAdmin(_) => ErrorKind::Fatal,
            KafkaError::OffsetCommit(_) => ErrorKind::Retryable,
            _ => ErrorKind::Transient,
        }
    }
}

/// Analytical store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection could not be opened
    #[error("Failed to open store at {path}: {message}")]
    Open { path: String, message: String },

    /// Table bootstrap failed
    #[error("Failed to create airspace table: {0}")]
    Schema(String),

    /// Bulk upsert failed; nothing from the batch was written
    #[error("Bulk upsert of {rows} rows failed: {message}")]
    Write { rows: usize, message: String },

    /// Read query failed
    #[error("Query failed: {0}")]
    Query(String),
}

impl StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Open { .. } | StoreError::Schema(_) => ErrorKind::Fatal,
            StoreError::Write { .. } => ErrorKind::Retryable,
            StoreError::Query(_) => ErrorKind::Transient,
        }
    }
}

/// Reasons a raw state vector cannot become a record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    /// Positional array is shorter than the fixed field list
    #[error("Expected at least {expected} fields, got {actual}")]
    Arity { expected: usize, actual: usize },

    /// Required field is null or absent
    #[error("Missing required field {0}")]
    MissingField(&'static str),

    /// Field has the wrong type or shape
    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

// Conversion implementations for external error types

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
