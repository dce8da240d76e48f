//! Chat messaging on top of the STOMP session.
//!
//! # Architecture
//!
//! ```text
//! ChatSession ── publish() ──► /exchange/{publish_exchange}/{routing_key}
//!      │                  └──► /exchange/{db_exchange}/db.message.save
//!      │
//!      │ process_next(handler)
//!      ▼
//! ChatHandler::{on_connect, on_message, on_typing_status, on_error,
//!               on_connection_event}
//! ```
//!
//! Inbound paths never return errors: broker ERROR frames and failed
//! resubscribes go to [`ChatHandler::on_error`], undecodable bodies are
//! logged and dropped. Outbound calls return [`ChatError`].

pub mod message;
pub mod session;

pub use message::{ChatMessage, InboundMessage, Payload, TypingEvent, TypingStatus};
pub use session::ChatSession;

use crate::stomp::{Headers, StompError};
use crate::transport::ConnectionEvent;

/// Errors reported by the chat layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The session is not connected to the broker.
    NotConnected,
    /// `publish` was called with an empty routing key.
    MissingRoutingKey,
    /// The session was disconnected and cannot be reused.
    Closed,
    /// The configuration cannot produce a session.
    InvalidConfig(String),
    /// The broker sent an ERROR frame.
    Broker {
        /// ERROR `message` header, or the body when the header is absent.
        message: String,
        /// All ERROR frame headers.
        headers: Headers,
    },
    /// The STOMP session rejected an operation.
    Stomp(StompError),
    /// A payload could not be serialized.
    Serialization(String),
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "Not connected to the message broker"),
            Self::MissingRoutingKey => write!(f, "Routing key is required to publish a message"),
            Self::Closed => write!(f, "Chat session is closed"),
            Self::InvalidConfig(msg) => write!(f, "Invalid configuration: {msg}"),
            Self::Broker { message, .. } => write!(f, "Broker error: {message}"),
            Self::Stomp(err) => write!(f, "STOMP error: {err}"),
            Self::Serialization(msg) => write!(f, "Serialization failed: {msg}"),
        }
    }
}

impl std::error::Error for ChatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Stomp(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StompError> for ChatError {
    fn from(err: StompError) -> Self {
        match err {
            StompError::NotConnected => Self::NotConnected,
            other => Self::Stomp(other),
        }
    }
}

/// Application callbacks driven by [`ChatSession::process_next`].
///
/// Every method has a no-op default.
pub trait ChatHandler {
    /// Handshake complete and routing keys subscribed.
    fn on_connect(&mut self) {}

    /// A chat message (anything decodable that is not a typing signal).
    fn on_message(&mut self, _message: InboundMessage) {}

    /// A typing signal.
    fn on_typing_status(&mut self, _status: TypingEvent) {}

    /// Broker ERROR frame or failed resubscribe.
    fn on_error(&mut self, _error: ChatError) {}

    /// Transport connection change (connected, lost, reconnecting).
    fn on_connection_event(&mut self, _event: &ConnectionEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stomp_not_connected_maps_to_chat_not_connected() {
        assert_eq!(
            ChatError::from(StompError::NotConnected),
            ChatError::NotConnected
        );
        assert_eq!(
            ChatError::from(StompError::EmptyBody),
            ChatError::Stomp(StompError::EmptyBody)
        );
    }

    #[test]
    fn test_broker_error_display() {
        let err = ChatError::Broker {
            message: "Access refused".to_string(),
            headers: Headers::new(),
        };
        assert_eq!(err.to_string(), "Broker error: Access refused");
    }
}
