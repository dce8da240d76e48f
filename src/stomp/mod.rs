//! STOMP 1.2 protocol session over the reconnecting transport.
//!
//! # Architecture
//!
//! ```text
//! StompSession
//!     │  connect() / subscribe() / publish() / disconnect()
//!     │
//!     ├── frame      - text codec (COMMAND, ordered headers, body, NUL)
//!     ├── session    - handshake, subscription table, heartbeat
//!     │
//!     └── Transport  - one socket, fixed-interval reconnect
//! ```
//!
//! Inbound traffic surfaces as [`SessionEvent`]s pulled with
//! [`StompSession::next_event`]: connection changes, the CONNECTED
//! handshake, MESSAGE deliveries and broker ERROR frames.

pub mod frame;
pub mod session;

pub use frame::{Body, Command, Frame, Headers};
pub use session::{
    Credentials, MessageEvent, SessionEvent, SessionState, StompConfig, StompSession,
    Subscription,
};

use crate::transport::TransportError;

/// Errors returned by [`StompSession`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompError {
    /// The handshake has not completed (or the socket is gone).
    NotConnected,
    /// `publish` was called with an empty destination.
    MissingDestination,
    /// `publish` was called with an empty body.
    EmptyBody,
    /// A typed body could not be serialized to JSON.
    Serialization(String),
    /// The transport refused the frame.
    Transport(TransportError),
}

impl std::fmt::Display for StompError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "Not connected"),
            Self::MissingDestination => write!(f, "Destination is required"),
            Self::EmptyBody => write!(f, "Message body is required"),
            Self::Serialization(msg) => write!(f, "Serialization failed: {msg}"),
            Self::Transport(err) => write!(f, "Transport error: {err}"),
        }
    }
}

impl std::error::Error for StompError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for StompError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}
