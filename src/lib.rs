//! stomp-chat - real-time chat over STOMP on WebSocket.
//!
//! This crate provides a layered client for a STOMP broker (such as
//! RabbitMQ Web-STOMP) and a small chat protocol on top of it.
//!
//! # Architecture
//!
//! Each layer is a plain struct driven through `&mut self` and exposes a
//! cancel-safe `next_event()`:
//!
//! - **Transport** - one socket, fixed-interval reconnect
//! - **StompSession** - CONNECT handshake, subscriptions, heartbeat
//! - **ChatSession** - routing-key subscriptions, message fan-out,
//!   persistence copy, [`ChatHandler`] callbacks
//!
//! # Modules
//!
//! - [`ws`] - socket seam, WebSocket and in-memory connectors
//! - [`transport`] - reconnecting socket owner
//! - [`stomp`] - frame codec and protocol session
//! - [`chat`] - chat payloads and messaging session
//! - [`config`] - configuration loading/saving

pub mod chat;
pub mod config;
pub mod constants;
pub mod stomp;
pub mod transport;
pub mod ws;

// Re-export commonly used types
pub use chat::{ChatError, ChatHandler, ChatMessage, ChatSession, TypingStatus};
pub use config::ChatConfig;
pub use stomp::{Frame, StompError, StompSession};
pub use transport::{ConnectionEvent, Transport, TransportError};
pub use ws::WsConnector;
