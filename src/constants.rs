//! Protocol and routing constants for stomp-chat.
//!
//! This module centralizes the defaults and well-known names shared by the
//! transport, STOMP session, and chat session layers.
//!
//! # Categories
//!
//! - **Transport**: Reconnection timing
//! - **STOMP**: Protocol version and heartbeat defaults
//! - **Routing**: Exchange names, destinations, and routing key prefixes

use std::time::Duration;

// ============================================================================
// Transport
// ============================================================================

/// Fixed delay between a socket loss and the next connection attempt.
///
/// There is no backoff and no attempt cap: the transport retries at this
/// interval until `disconnect()` is called.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// WebSocket close code sent on a client-initiated disconnect.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// Close code reported when the stream ends without a close frame.
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

// ============================================================================
// STOMP
// ============================================================================

/// Protocol version advertised in the CONNECT `accept-version` header.
pub const STOMP_VERSION: &str = "1.2";

/// Default outgoing heartbeat interval in milliseconds.
pub const DEFAULT_HEARTBEAT_OUTGOING_MS: u64 = 10_000;

/// Default incoming heartbeat interval in milliseconds.
pub const DEFAULT_HEARTBEAT_INCOMING_MS: u64 = 10_000;

/// Destination that receives presence heartbeats.
pub const DEFAULT_HEARTBEAT_DESTINATION: &str = "/exchange/ex_presence";

/// Content type stamped on every SEND frame.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Destination used for routing-key bind/unbind requests.
pub const BINDING_DESTINATION: &str = "/exchange/amq.direct";

// ============================================================================
// Routing
// ============================================================================

/// Default shared topic exchange for chat traffic.
pub const DEFAULT_PUBLISH_EXCHANGE: &str = "ex_common";

/// Default exchange consumed by the persistence service.
pub const DEFAULT_DB_EXCHANGE: &str = "db_ex";

/// Routing key the persistence consumer binds to.
pub const DB_SAVE_ROUTING_KEY: &str = "db.message.save";

/// Prefix of per-user routing keys (`chat.user.{user_id}`).
pub const USER_ROUTING_KEY_PREFIX: &str = "chat.user.";

/// Prefix of per-session queue names (`chat_queue_{user_id}_{epoch_ms}`).
pub const QUEUE_NAME_PREFIX: &str = "chat_queue_";

/// Payload discriminator for chat messages.
pub const DIRECT_MESSAGE_TYPE: &str = "DIRECT_MESSAGE";

/// Payload discriminator for typing-presence signals.
pub const TYPING_STATUS_TYPE: &str = "TYPING_STATUS";

/// Build the routing key addressing a single user.
#[must_use]
pub fn user_routing_key(user_id: &str) -> String {
    format!("{USER_ROUTING_KEY_PREFIX}{user_id}")
}

/// Build an exchange destination (`/exchange/{exchange}/{routing_key}`).
#[must_use]
pub fn exchange_destination(exchange: &str, routing_key: &str) -> String {
    format!("/exchange/{exchange}/{routing_key}")
}
