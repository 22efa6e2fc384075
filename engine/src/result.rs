//! The caller-facing result of a remote call.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Marker returned in place of data when a call was parked in the offline
/// queue. Serializes as `{"offline": true, "queued": true}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMarker {
    pub offline: bool,
    pub queued: bool,
}

impl Default for QueuedMarker {
    fn default() -> Self {
        Self {
            offline: true,
            queued: true,
        }
    }
}

/// Payload of a [`CallResult`].
///
/// Untagged: on its own, a value shaped like the marker reads back as
/// `Queued`. [`CallResult`] only looks for the marker when `success` is
/// false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallData<T> {
    /// The call was queued for replay instead of completing.
    Queued(QueuedMarker),
    /// The decoded response body.
    Value(T),
}

/// The only shape ever handed back to callers of the client.
///
/// `success == false` with `data` holding a [`QueuedMarker`] means the call
/// will be retried automatically; `success == false` without it means the
/// call failed for good.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CallData<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for CallResult<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            success: bool,
            #[serde(default)]
            data: Option<Value>,
            #[serde(default)]
            error: Option<String>,
            #[serde(default)]
            message: Option<String>,
        }

        let raw = Raw::deserialize(deserializer)?;
        let data = match raw.data {
            None => None,
            Some(value) if !raw.success => Some(
                serde_json::from_value(value).map_err(D::Error::custom)?,
            ),
            Some(value) => Some(CallData::Value(
                serde_json::from_value(value).map_err(D::Error::custom)?,
            )),
        };

        Ok(Self {
            success: raw.success,
            data,
            error: raw.error,
            message: raw.message,
        })
    }
}

impl<T> CallResult<T> {
    /// A successful call carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(CallData::Value(data)),
            error: None,
            message: None,
        }
    }

    /// A call that was queued without being attempted.
    pub fn queued() -> Self {
        Self {
            success: false,
            data: Some(CallData::Queued(QueuedMarker::default())),
            error: None,
            message: None,
        }
    }

    /// A call that failed and was queued for replay.
    pub fn queued_after(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::queued()
        }
    }

    /// A call that failed for good.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }

    /// Attach a human-readable message.
    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    /// Whether the call is parked in the offline queue.
    pub fn is_queued(&self) -> bool {
        matches!(self.data, Some(CallData::Queued(_)))
    }

    /// The decoded data of a successful call.
    pub fn value(&self) -> Option<&T> {
        match &self.data {
            Some(CallData::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Consume the result, returning the decoded data if there is any.
    pub fn into_value(self) -> Option<T> {
        match self.data {
            Some(CallData::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Transform the decoded data, keeping the outcome flags.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallResult<U> {
        CallResult {
            success: self.success,
            data: self.data.map(|data| match data {
                CallData::Queued(marker) => CallData::Queued(marker),
                CallData::Value(value) => CallData::Value(f(value)),
            }),
            error: self.error,
            message: self.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_shape() {
        let result = CallResult::ok(json!({"id": 7}));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"success": true, "data": {"id": 7}})
        );
        assert_eq!(result.value(), Some(&json!({"id": 7})));
        assert!(!result.is_queued());
    }

    #[test]
    fn queued_shape() {
        let result: CallResult<serde_json::Value> = CallResult::queued();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"success": false, "data": {"offline": true, "queued": true}})
        );
        assert!(result.is_queued());
        assert_eq!(result.value(), None);
    }

    #[test]
    fn queued_after_failure_shape() {
        let result: CallResult<()> = CallResult::queued_after("remote returned status 503");
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "success": false,
                "error": "remote returned status 503",
                "data": {"offline": true, "queued": true}
            })
        );
    }

    #[test]
    fn failed_shape() {
        let result: CallResult<()> =
            CallResult::failed("boom").with_message(Some("try later".into()));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"success": false, "error": "boom", "message": "try later"})
        );
    }

    #[test]
    fn queued_marker_deserializes_first() {
        let result: CallResult<serde_json::Value> =
            serde_json::from_value(json!({"success": false, "data": {"offline": true, "queued": true}}))
                .unwrap();
        assert!(result.is_queued());
    }

    #[test]
    fn marker_shaped_data_of_a_success_stays_data() {
        let result: CallResult<serde_json::Value> =
            serde_json::from_value(json!({"success": true, "data": {"offline": true, "queued": true}}))
                .unwrap();
        assert!(result.success);
        assert!(!result.is_queued());
        assert_eq!(result.value(), Some(&json!({"offline": true, "queued": true})));
    }

    #[test]
    fn map_keeps_flags() {
        let result = CallResult::ok(2).map(|n| n * 10);
        assert_eq!(result.into_value(), Some(20));

        let queued: CallResult<i32> = CallResult::queued();
        assert!(queued.map(|n| n + 1).is_queued());
    }
}
