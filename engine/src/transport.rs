//! Transport abstraction for remote calls.
//!
//! The engine never opens sockets itself. Hosts inject a [`Transport`] that
//! performs one network exchange per call; the engine decides when to call it
//! again, when to give up and when to queue.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::operation::{Method, RequestOptions};

/// Error type for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not reach the remote side.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The exchange did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The exchange failed after the connection was made.
    #[error("i/o failure: {0}")]
    Io(String),

    /// The target could not be turned into a request.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// A single request handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportRequest {
    pub method: Method,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl From<&RequestOptions> for TransportRequest {
    fn from(options: &RequestOptions) -> Self {
        Self {
            method: options.method,
            headers: options.headers.clone(),
            body: options.body.clone(),
        }
    }
}

/// The raw response of a single exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Response body bytes, usually JSON.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Create a response from a status and a JSON value.
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            body: value.to_string().into_bytes(),
        }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON. An empty body decodes to `null`.
    pub fn body_json(&self) -> serde_json::Result<serde_json::Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&self.body)
    }

    /// The `message` field of a JSON error body, if there is one.
    pub fn error_message(&self) -> Option<String> {
        self.body_json()
            .ok()?
            .get("message")?
            .as_str()
            .map(str::to_string)
    }
}

/// Performs the actual network exchange.
///
/// Implementations should return `Ok` for every response they receive,
/// whatever its status; the engine classifies non-2xx responses itself.
pub trait Transport: Send + Sync + 'static {
    /// Send one request to `target` and wait for its response.
    fn call<'a>(
        &'a self,
        target: &'a str,
        request: &'a TransportRequest,
    ) -> BoxFuture<'a, TransportResult<TransportResponse>>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn call<'a>(
        &'a self,
        target: &'a str,
        request: &'a TransportRequest,
    ) -> BoxFuture<'a, TransportResult<TransportResponse>> {
        (**self).call(target, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_range() {
        assert!(TransportResponse::json(200, &json!({})).is_success());
        assert!(TransportResponse::json(204, &json!(null)).is_success());
        assert!(!TransportResponse::json(302, &json!({})).is_success());
        assert!(!TransportResponse::json(404, &json!({})).is_success());
        assert!(!TransportResponse::json(500, &json!({})).is_success());
    }

    #[test]
    fn empty_body_is_null() {
        let response = TransportResponse {
            status: 204,
            body: Vec::new(),
        };
        assert_eq!(response.body_json().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn error_message_extraction() {
        let response = TransportResponse::json(422, &json!({"message": "shift already open"}));
        assert_eq!(
            response.error_message().as_deref(),
            Some("shift already open")
        );

        let response = TransportResponse {
            status: 500,
            body: b"<html>oops</html>".to_vec(),
        };
        assert_eq!(response.error_message(), None);
    }
}
