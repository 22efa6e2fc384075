//! Request and pending-operation types.
//!
//! A call is described by a target plus [`RequestOptions`]. When a call cannot
//! complete it is captured as a [`PendingOperation`] and kept in the queue
//! until a replay pass delivers it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{OperationKey, Timestamp};

/// HTTP-style request method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for a single call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl RequestOptions {
    /// Options for the given method, no headers and no body.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// A `GET` with no body.
    pub fn get() -> Self {
        Self::new(Method::Get)
    }

    /// A `POST` carrying `body`.
    pub fn post(body: serde_json::Value) -> Self {
        Self::new(Method::Post).with_body(body)
    }

    /// A `PUT` carrying `body`.
    pub fn put(body: serde_json::Value) -> Self {
        Self::new(Method::Put).with_body(body)
    }

    /// A `DELETE` with no body.
    pub fn delete() -> Self {
        Self::new(Method::Delete)
    }

    /// Set the body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header, replacing any previous value for the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The operation key for sending these options to `target`.
    pub fn key_for(&self, target: &str) -> OperationKey {
        OperationKey::derive(self.method, target, self.body.as_ref())
    }
}

/// An operation waiting for a successful replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    /// Identity of the logical operation
    pub key: OperationKey,
    /// Where the call goes
    pub target: String,
    /// Request method
    pub method: Method,
    /// Request headers captured at enqueue time
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// When the operation entered the queue
    pub enqueued_at: Timestamp,
}

impl PendingOperation {
    /// Capture a call for later replay.
    pub fn new(
        target: impl Into<String>,
        options: &RequestOptions,
        enqueued_at: Timestamp,
    ) -> Self {
        let target = target.into();
        Self {
            key: options.key_for(&target),
            target,
            method: options.method,
            headers: options.headers.clone(),
            body: options.body.clone(),
            enqueued_at,
        }
    }

    /// Rebuild the options the operation was queued with.
    pub fn options(&self) -> RequestOptions {
        RequestOptions {
            method: self.method,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn builders() {
        let opts = RequestOptions::post(json!({"a": 1})).with_header("x-device", "kiosk-1");
        assert_eq!(opts.method, Method::Post);
        assert_eq!(opts.body, Some(json!({"a": 1})));
        assert_eq!(opts.headers.get("x-device").map(String::as_str), Some("kiosk-1"));

        assert_eq!(RequestOptions::get().method, Method::Get);
        assert_eq!(RequestOptions::delete().body, None);
    }

    #[test]
    fn method_serialization() {
        assert_eq!(serde_json::to_string(&Method::Patch).unwrap(), "\"PATCH\"");
        let parsed: Method = serde_json::from_str("\"DELETE\"").unwrap();
        assert_eq!(parsed, Method::Delete);
        assert_eq!(Method::Put.to_string(), "PUT");
    }

    #[test]
    fn options_default_to_get() {
        let opts: RequestOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, RequestOptions::get());
    }

    #[test]
    fn pending_captures_call() {
        let at = Utc.timestamp_millis_opt(1_706_745_600_000).unwrap();
        let opts = RequestOptions::post(json!({"employeeId": "EMP001"}))
            .with_header("authorization", "Bearer t");
        let pending = PendingOperation::new("/attendance/clock-in", &opts, at);

        assert_eq!(pending.key, opts.key_for("/attendance/clock-in"));
        assert_eq!(pending.options(), opts);
        assert_eq!(pending.enqueued_at, at);
    }

    #[test]
    fn pending_serialization_format() {
        let at = Utc.timestamp_millis_opt(1_706_745_600_000).unwrap();
        let pending = PendingOperation::new("/leads", &RequestOptions::post(json!({})), at);
        let json = serde_json::to_string(&pending).unwrap();
        assert!(json.contains("\"enqueuedAt\""));
        assert!(json.contains("\"method\":\"POST\""));

        let parsed: PendingOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, pending);
    }
}
