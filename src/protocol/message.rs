use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message type whose priority is forced to at least [`ALERT_MIN_PRIORITY`].
pub const TYPE_ALERT: &str = "hAlert";
/// Message type carrying a conversation status in `payload.status`.
pub const TYPE_CONV_STATE: &str = "hConvState";

pub const ALERT_MIN_PRIORITY: u8 = 2;

/// Ordered header entry. Recognized keys are defined in
/// [`crate::protocol::channel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: Value,
}

impl Header {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Structured location attached to channels and messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
}

/// A published message.
///
/// Publishers submit a partially-filled message; the pipeline assigns
/// identity (`msgid`, `convid`), inherits channel defaults, and stamps
/// `published`. Persisted messages are immutable once saved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msgid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chid: Option<String>,
    /// Thread identifier; defaults to `msgid`, establishing a new thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convid: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// Expiry timestamp after which the message is no longer current.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Transient (false) messages exist only as live events.
    #[serde(default)]
    pub persistent: bool,
}

impl Message {
    pub fn header(&self, key: &str) -> Option<&Value> {
        self.headers.iter().find(|h| h.key == key).map(|h| &h.value)
    }

    /// `payload.status` for conversation-state messages.
    pub fn payload_status(&self) -> Option<&str> {
        self.payload.as_ref()?.get("status")?.as_str()
    }

    pub fn is_alert(&self) -> bool {
        self.kind.as_deref() == Some(TYPE_ALERT)
    }

    pub fn is_conv_state(&self) -> bool {
        self.kind.as_deref() == Some(TYPE_CONV_STATE)
    }
}
