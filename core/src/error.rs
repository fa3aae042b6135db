//! Error types for the networking layer.
//!
//! # Design
//! Three families, one per place an error can surface:
//! - `ConfigError` is raised while configuring or binding services. It is a
//!   programmer error and is returned immediately at the call site.
//! - `TransportError` is what a single call can fail with before a usable
//!   response exists. The outcome adapter always captures it into
//!   `NetworkResult::Exception`; it never escapes an adapted call.
//! - `CallError` describes the lifecycle of a pending call (already executed,
//!   cancelled, unsupported execution mode).

use http::StatusCode;
use thiserror::Error;

/// Boxed error used as the source of opaque transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while building clients, gateways and services.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("base URL is required")]
    MissingBaseUrl,

    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("invalid header {name:?}: {source}")]
    InvalidHeader {
        name: String,
        #[source]
        source: http::Error,
    },

    #[error("invalid request URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("endpoint {endpoint:?} declares unsupported return shape {shape}")]
    UnsupportedReturnShape { endpoint: String, shape: String },

    #[error("service {service:?} declares endpoint {endpoint:?} more than once")]
    DuplicateEndpoint { service: String, endpoint: String },

    #[error("service {service:?} has no endpoint named {endpoint:?}")]
    UnknownEndpoint { service: String, endpoint: String },

    #[error("endpoint {endpoint:?} is {actual}, not {requested}")]
    AdaptationMismatch {
        endpoint: String,
        actual: &'static str,
        requested: &'static str,
    },

    #[error("endpoint {endpoint:?} declares payload {declared}, requested {requested}")]
    PayloadMismatch {
        endpoint: String,
        declared: &'static str,
        requested: &'static str,
    },

    #[error("endpoint {endpoint:?} is missing path parameter {name:?}")]
    MissingPathParameter { endpoint: String, name: String },

    #[error("request body serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("network layer is not initialized; call init() first")]
    Uninitialized,

    #[error("transport construction failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures that prevented a call from obtaining a usable response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(#[source] BoxError),

    #[error("timed out: {0}")]
    Timeout(#[source] BoxError),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Raised by an interceptor that rejects a response by status, before the
    /// response reaches the outcome adapter.
    #[error("HTTP {status}: {message}")]
    UnexpectedStatus { status: StatusCode, message: String },

    #[error("too many follow-up requests: {0}")]
    TooManyFollowUps(usize),

    #[error("{0}")]
    Other(#[source] BoxError),
}

impl TransportError {
    /// Wrap any error as an opaque transport failure.
    pub fn other(err: impl Into<BoxError>) -> Self {
        TransportError::Other(err.into())
    }

    /// The HTTP status carried by a status-bearing failure, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify a reqwest failure, keeping the original error as the source.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(Box::new(err))
        } else if err.is_connect() {
            TransportError::Connect(Box::new(err))
        } else {
            TransportError::Other(Box::new(err))
        }
    }
}

/// Lifecycle errors of a pending call. None of these is an outcome.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("call already executed")]
    AlreadyExecuted,

    #[error("call canceled")]
    Canceled,

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("no tokio runtime to run the call on")]
    NoRuntime,

    /// Only returned by plain `Call`s; adapted calls fold this into an outcome.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
