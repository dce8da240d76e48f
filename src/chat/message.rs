//! Chat payloads carried on `chat.user.{id}` routing keys.
//!
//! Two JSON shapes share the exchange, told apart by their `type` field:
//!
//! ```text
//! DIRECT_MESSAGE  {"msg_id","type","from","to","content","timestamp":"<ISO-8601>"}
//! TYPING_STATUS   {"type","from","to","isTyping","timestamp":<epoch ms>}
//! ```
//!
//! Inbound bodies are classified with [`Payload::decode`]. Anything that is
//! valid JSON but not a typing signal is treated as a message, even when it
//! does not match the [`ChatMessage`] shape.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{DIRECT_MESSAGE_TYPE, TYPING_STATUS_TYPE};

/// A direct chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message id.
    #[serde(default)]
    pub msg_id: String,
    /// Payload discriminator (`DIRECT_MESSAGE`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Sender user id.
    pub from: String,
    /// Recipient user id.
    pub to: String,
    /// Message text.
    pub content: String,
    /// ISO-8601 send time.
    pub timestamp: String,
}

impl ChatMessage {
    /// New `DIRECT_MESSAGE` from `from` to `to`, stamped now.
    pub fn direct(
        from: impl Into<String>,
        to: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            msg_id: uuid::Uuid::new_v4().to_string(),
            kind: DIRECT_MESSAGE_TYPE.to_string(),
            from: from.into(),
            to: to.into(),
            content: content.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Ephemeral "is typing" signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingStatus {
    /// Payload discriminator (`TYPING_STATUS`).
    #[serde(rename = "type")]
    pub kind: String,
    /// User who is typing.
    pub from: String,
    /// User being typed to.
    pub to: String,
    /// Whether typing started (`true`) or stopped.
    #[serde(rename = "isTyping")]
    pub is_typing: bool,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl TypingStatus {
    /// New signal stamped with `timestamp`.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        is_typing: bool,
        timestamp: i64,
    ) -> Self {
        Self {
            kind: TYPING_STATUS_TYPE.to_string(),
            from: from.into(),
            to: to.into(),
            is_typing,
            timestamp,
        }
    }
}

/// Inbound message body handed to `on_message`.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Typed view, when the body matches [`ChatMessage`].
    pub message: Option<ChatMessage>,
    /// Decoded JSON body.
    pub raw: Value,
}

/// Inbound typing signal handed to `on_typing_status`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypingEvent {
    /// Typed view, when the body matches [`TypingStatus`].
    pub status: Option<TypingStatus>,
    /// Decoded JSON body.
    pub raw: Value,
}

/// Classified inbound body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `type` is `TYPING_STATUS`.
    Typing(TypingEvent),
    /// Any other JSON.
    Message(InboundMessage),
}

impl Payload {
    /// Strip NUL bytes, trim, decode JSON, and classify by `type`.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let cleaned = text.replace('\0', "");
        let raw: Value = serde_json::from_str(cleaned.trim())?;

        if raw.get("type").and_then(Value::as_str) == Some(TYPING_STATUS_TYPE) {
            let status = serde_json::from_value(raw.clone()).ok();
            Ok(Self::Typing(TypingEvent { status, raw }))
        } else {
            let message = serde_json::from_value(raw.clone()).ok();
            Ok(Self::Message(InboundMessage { message, raw }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_message_wire_names() {
        let message = ChatMessage::direct("42", "7", "hello");
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["type"], "DIRECT_MESSAGE");
        assert_eq!(value["from"], "42");
        assert_eq!(value["to"], "7");
        assert_eq!(value["content"], "hello");
        assert!(value["msg_id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(chrono::DateTime::parse_from_rfc3339(value["timestamp"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_typing_status_wire_names() {
        let status = TypingStatus::new("42", "7", true, 1_700_000_000_000);
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({
                "type": "TYPING_STATUS",
                "from": "42",
                "to": "7",
                "isTyping": true,
                "timestamp": 1_700_000_000_000_i64,
            })
        );
    }

    #[test]
    fn test_decode_typing_status() {
        let text = r#"{"type":"TYPING_STATUS","from":"7","to":"42","isTyping":false,"timestamp":5}"#;
        let Payload::Typing(event) = Payload::decode(text).unwrap() else {
            panic!("expected typing");
        };
        let status = event.status.unwrap();
        assert_eq!(status.from, "7");
        assert!(!status.is_typing);
    }

    #[test]
    fn test_decode_strips_nul_and_whitespace() {
        let text = "  \0{\"type\":\"DIRECT_MESSAGE\",\"msg_id\":\"m1\",\"from\":\"7\",\"to\":\"42\",\"content\":\"hi\",\"timestamp\":\"2024-01-01T00:00:00.000Z\"}\0\n";
        let Payload::Message(inbound) = Payload::decode(text).unwrap() else {
            panic!("expected message");
        };
        assert_eq!(inbound.message.unwrap().content, "hi");
    }

    #[test]
    fn test_decode_foreign_shape_is_still_a_message() {
        let Payload::Message(inbound) = Payload::decode(r#"{"type":"GROUP_INVITE","room":"r1"}"#)
            .unwrap()
        else {
            panic!("expected message");
        };
        assert!(inbound.message.is_none());
        assert_eq!(inbound.raw["room"], "r1");
    }

    #[test]
    fn test_decode_missing_msg_id_defaults() {
        let text = r#"{"type":"DIRECT_MESSAGE","from":"7","to":"42","content":"hi","timestamp":"t"}"#;
        let Payload::Message(inbound) = Payload::decode(text).unwrap() else {
            panic!("expected message");
        };
        assert_eq!(inbound.message.unwrap().msg_id, "");
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        assert!(Payload::decode("not json").is_err());
        assert!(Payload::decode("").is_err());
    }
}
