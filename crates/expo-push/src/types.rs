//! Wire types for the push service.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Delivery priority hint forwarded to APNs/FCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushPriority {
    Default,
    Normal,
    High,
}

/// A single outbound push message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Destination push token.
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Arbitrary JSON object delivered to the app alongside the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<PushPriority>,
    /// Seconds the message may be held for redelivery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

impl PushMessage {
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            title: None,
            body: None,
            data: None,
            sound: None,
            priority: None,
            ttl: None,
            channel_id: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    pub fn with_priority(mut self, priority: PushPriority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Status carried by tickets and receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushStatus {
    Ok,
    Error,
}

/// Error codes reported in ticket and receipt details.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PushErrorCode {
    /// The device can no longer receive notifications; its token should be dropped.
    DeviceNotRegistered,
    MessageTooBig,
    MessageRateExceeded,
    MismatchSenderId,
    InvalidCredentials,
    Other(String),
}

impl PushErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DeviceNotRegistered => "DeviceNotRegistered",
            Self::MessageTooBig => "MessageTooBig",
            Self::MessageRateExceeded => "MessageRateExceeded",
            Self::MismatchSenderId => "MismatchSenderId",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::Other(code) => code,
        }
    }

    /// Whether the code means the device registration is gone for good.
    pub fn is_permanent_device_failure(&self) -> bool {
        matches!(self, Self::DeviceNotRegistered)
    }
}

impl From<String> for PushErrorCode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "DeviceNotRegistered" => Self::DeviceNotRegistered,
            "MessageTooBig" => Self::MessageTooBig,
            "MessageRateExceeded" => Self::MessageRateExceeded,
            "MismatchSenderId" => Self::MismatchSenderId,
            "InvalidCredentials" => Self::InvalidCredentials,
            _ => Self::Other(value),
        }
    }
}

impl From<PushErrorCode> for String {
    fn from(value: PushErrorCode) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PushErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushErrorDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PushErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expo_push_token: Option<String>,
}

/// Per-message answer to a send request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTicket {
    pub status: PushStatus,
    /// Receipt id; only present when `status` is `ok`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<PushErrorDetails>,
}

impl PushTicket {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            status: PushStatus::Ok,
            id: Some(id.into()),
            message: None,
            details: None,
        }
    }

    pub fn error(message: impl Into<String>, code: Option<PushErrorCode>) -> Self {
        Self {
            status: PushStatus::Error,
            id: None,
            message: Some(message.into()),
            details: code.map(|code| PushErrorDetails {
                error: Some(code),
                expo_push_token: None,
            }),
        }
    }

    /// The id to poll a receipt with, if the message was accepted.
    pub fn receipt_id(&self) -> Option<&str> {
        match self.status {
            PushStatus::Ok => self.id.as_deref().filter(|id| !id.is_empty()),
            PushStatus::Error => None,
        }
    }

    pub fn error_code(&self) -> Option<&PushErrorCode> {
        self.details.as_ref().and_then(|d| d.error.as_ref())
    }
}

/// Delivery verdict for a previously accepted ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReceipt {
    pub status: PushStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<PushErrorDetails>,
}

impl PushReceipt {
    pub fn ok() -> Self {
        Self {
            status: PushStatus::Ok,
            message: None,
            details: None,
        }
    }

    pub fn error(message: impl Into<String>, code: PushErrorCode) -> Self {
        Self {
            status: PushStatus::Error,
            message: Some(message.into()),
            details: Some(PushErrorDetails {
                error: Some(code),
                expo_push_token: None,
            }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == PushStatus::Ok
    }

    pub fn error_code(&self) -> Option<&PushErrorCode> {
        self.details.as_ref().and_then(|d| d.error.as_ref())
    }
}

/// Request-level error entry.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RequestError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendResponse {
    #[serde(default)]
    pub data: Option<Vec<PushTicket>>,
    #[serde(default)]
    pub errors: Option<Vec<RequestError>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReceiptsRequest<'a> {
    pub ids: &'a [String],
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReceiptsResponse {
    #[serde(default)]
    pub data: Option<HashMap<String, PushReceipt>>,
    #[serde(default)]
    pub errors: Option<Vec<RequestError>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serialization_skips_empty_fields() {
        let message = PushMessage::new("ExponentPushToken[abc]")
            .with_title("Alice lit a beacon")
            .with_sound("default")
            .with_priority(PushPriority::High);

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "to": "ExponentPushToken[abc]",
                "title": "Alice lit a beacon",
                "sound": "default",
                "priority": "high"
            })
        );
    }

    #[test]
    fn test_ticket_decoding() {
        let tickets: Vec<PushTicket> = serde_json::from_value(json!([
            { "status": "ok", "id": "XXXX-1" },
            {
                "status": "error",
                "message": "\"ExponentPushToken[dead]\" is not a registered push notification recipient",
                "details": { "error": "DeviceNotRegistered", "expoPushToken": "ExponentPushToken[dead]" }
            }
        ]))
        .unwrap();

        assert_eq!(tickets[0].receipt_id(), Some("XXXX-1"));
        assert_eq!(tickets[1].receipt_id(), None);
        assert_eq!(
            tickets[1].error_code(),
            Some(&PushErrorCode::DeviceNotRegistered)
        );
    }

    #[test]
    fn test_ok_ticket_with_blank_id_has_no_receipt() {
        let ticket = PushTicket {
            status: PushStatus::Ok,
            id: Some(String::new()),
            message: None,
            details: None,
        };
        assert_eq!(ticket.receipt_id(), None);
    }

    #[test]
    fn test_unknown_error_code_round_trips_as_string() {
        let receipt: PushReceipt = serde_json::from_value(json!({
            "status": "error",
            "message": "boom",
            "details": { "error": "SomethingNew" }
        }))
        .unwrap();

        let code = receipt.error_code().unwrap();
        assert_eq!(code, &PushErrorCode::Other("SomethingNew".to_string()));
        assert!(!code.is_permanent_device_failure());
        assert_eq!(code.to_string(), "SomethingNew");
    }

    #[test]
    fn test_only_device_not_registered_is_permanent() {
        assert!(PushErrorCode::DeviceNotRegistered.is_permanent_device_failure());
        assert!(!PushErrorCode::MessageTooBig.is_permanent_device_failure());
        assert!(!PushErrorCode::MessageRateExceeded.is_permanent_device_failure());
        assert!(!PushErrorCode::InvalidCredentials.is_permanent_device_failure());
    }
}
