//! Three-way call outcome and the rules that produce it.
//!
//! # Design
//! Every completed or failed call attempt maps to exactly one variant, by
//! precedence:
//!
//! 1. No usable response (transport failure) -> `Exception`, carrying the
//!    original failure. A status-carrying failure keeps its status in `code`
//!    but is still an `Exception`, never an `Error`.
//! 2. 2xx with a body -> `Success`.
//! 3. Otherwise, an error body that is a JSON object -> `Error` with the HTTP
//!    status as `code` and the object's `message`. The record's own `code`
//!    is discarded.
//! 4. Otherwise -> `Error` with the HTTP status and `"Unknown error"`.
//!    Malformed or non-object error JSON lands here too.

use std::future::Future;

use serde::de::Unexpected;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::call::Response;
use crate::error::TransportError;

pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Error record servers return on failure. Every field is optional and a
/// scalar `code` is kept as its string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default, deserialize_with = "scalar_string")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub success: bool,
}

impl ErrorResponse {
    /// Parse an error body. Anything but a JSON object is not a record.
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        match serde_json::from_slice::<Value>(raw)? {
            value @ Value::Object(_) => serde_json::from_value(value),
            other => Err(serde::de::Error::invalid_type(
                unexpected(&other),
                &"an error record object",
            )),
        }
    }
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::invalid_type(
            unexpected(&other),
            &"a string or number",
        )),
    }
}

/// Outcome of a single call.
#[derive(Debug)]
pub enum NetworkResult<T> {
    Success(T),
    Error {
        code: String,
        message: Option<String>,
    },
    Exception {
        code: Option<String>,
        cause: TransportError,
    },
}

impl<T> NetworkResult<T> {
    /// Normalise a terminal response.
    pub fn from_response(response: Response<T>) -> Self {
        let status = response.status();
        let code = status.as_u16().to_string();
        let (body, error_body) = response.into_parts();

        if status.is_success() {
            if let Some(body) = body {
                return NetworkResult::Success(body);
            }
        }

        let parsed = error_body.and_then(|raw| match ErrorResponse::parse(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                debug!(%status, error = %err, "error body is not an error record");
                None
            }
        });
        let message = match parsed {
            Some(record) => record.message,
            None => Some(UNKNOWN_ERROR.to_string()),
        };
        warn!(%status, message = message.as_deref().unwrap_or_default(), "call returned an error");
        NetworkResult::Error { code, message }
    }

    /// Normalise a failure that produced no usable response.
    pub fn from_failure(cause: TransportError) -> Self {
        let code = cause.status().map(|status| status.as_u16().to_string());
        warn!(error = %cause, code = code.as_deref().unwrap_or_default(), "call failed");
        NetworkResult::Exception { code, cause }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, NetworkResult::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, NetworkResult::Error { .. })
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, NetworkResult::Exception { .. })
    }

    /// The payload, dropping any other variant.
    pub fn success(self) -> Option<T> {
        match self {
            NetworkResult::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Run `f` with the payload if this is a success.
    pub fn on_success(self, f: impl FnOnce(&T)) -> Self {
        if let NetworkResult::Success(data) = &self {
            f(data);
        }
        self
    }

    /// Run `f` with the status code and message if this is an error.
    pub fn on_error(self, f: impl FnOnce(&str, Option<&str>)) -> Self {
        if let NetworkResult::Error { code, message } = &self {
            f(code, message.as_deref());
        }
        self
    }

    /// Run `f` with the failure if this is an exception.
    pub fn on_exception(self, f: impl FnOnce(&TransportError)) -> Self {
        if let NetworkResult::Exception { cause, .. } = &self {
            f(cause);
        }
        self
    }

    pub async fn on_success_async<F, Fut>(self, f: F) -> Self
    where
        F: FnOnce(&T) -> Fut,
        Fut: Future<Output = ()>,
    {
        if let NetworkResult::Success(data) = &self {
            f(data).await;
        }
        self
    }

    pub async fn on_error_async<F, Fut>(self, f: F) -> Self
    where
        F: FnOnce(&str, Option<&str>) -> Fut,
        Fut: Future<Output = ()>,
    {
        if let NetworkResult::Error { code, message } = &self {
            f(code, message.as_deref()).await;
        }
        self
    }

    pub async fn on_exception_async<F, Fut>(self, f: F) -> Self
    where
        F: FnOnce(&TransportError) -> Fut,
        Fut: Future<Output = ()>,
    {
        if let NetworkResult::Exception { cause, .. } = &self {
            f(cause).await;
        }
        self
    }
}
