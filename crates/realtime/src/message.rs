use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(crate) const PHX_JOIN: &str = "phx_join";
pub(crate) const PHX_LEAVE: &str = "phx_leave";
pub(crate) const PHX_REPLY: &str = "phx_reply";
pub(crate) const PHX_ERROR: &str = "phx_error";
pub(crate) const PHX_CLOSE: &str = "phx_close";
pub(crate) const HEARTBEAT: &str = "heartbeat";
pub(crate) const POSTGRES_CHANGES: &str = "postgres_changes";

/// One frame on the socket, in either direction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub message_ref: Option<String>,
}

impl RealtimeMessage {
    pub fn new(topic: &str, event: &str, payload: Value, message_ref: Option<String>) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            message_ref,
        }
    }
}

/// Kind of row change to listen for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeEventType {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "*")]
    All,
}

impl ChangeEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeEventType::Insert => "INSERT",
            ChangeEventType::Update => "UPDATE",
            ChangeEventType::Delete => "DELETE",
            ChangeEventType::All => "*",
        }
    }

    /// Whether a binding for `self` should see an event of kind `other`
    pub fn accepts(&self, other: ChangeEventType) -> bool {
        *self == ChangeEventType::All || *self == other
    }
}

/// A row change delivered by the feed
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
    #[serde(rename = "type")]
    pub event_type: ChangeEventType,
    #[serde(default)]
    pub record: Value,
    #[serde(default)]
    pub old_record: Value,
}

impl ChangeEvent {
    /// Extract the change from a `postgres_changes` payload (`{"data": {...}, "ids": [...]}`)
    pub(crate) fn from_payload(payload: &Value) -> Result<Self, serde_json::Error> {
        let data = payload.get("data").cloned().unwrap_or(Value::Null);
        serde_json::from_value(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_postgres_change_payload() {
        let payload = json!({
            "data": {
                "schema": "public",
                "table": "collection_requests",
                "commit_timestamp": "2024-05-01T10:00:00Z",
                "type": "UPDATE",
                "record": { "id": "r1", "status": "accepted" },
                "old_record": { "id": "r1" },
                "columns": []
            },
            "ids": [42]
        });

        let event = ChangeEvent::from_payload(&payload).unwrap();
        assert_eq!(event.table, "collection_requests");
        assert_eq!(event.event_type, ChangeEventType::Update);
        assert_eq!(event.record["status"], "accepted");
    }

    #[test]
    fn wildcard_accepts_everything() {
        assert!(ChangeEventType::All.accepts(ChangeEventType::Delete));
        assert!(ChangeEventType::Insert.accepts(ChangeEventType::Insert));
        assert!(!ChangeEventType::Insert.accepts(ChangeEventType::Update));
    }

    #[test]
    fn message_ref_may_be_null() {
        let raw = r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok"},"ref":null}"#;
        let msg: RealtimeMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.event, PHX_REPLY);
        assert!(msg.message_ref.is_none());
    }
}
