//! Socket lifecycle with fixed-interval reconnection.
//!
//! [`Transport`] owns at most one socket at a time. It opens sockets through
//! a [`Connector`], forwards inbound text verbatim, writes outbound text
//! verbatim, and reconnects on its own after any loss the caller did not ask
//! for. It knows nothing about STOMP.
//!
//! # Event Delivery
//!
//! Events are pulled with [`Transport::next_event`]. The reconnect timer and
//! the in-flight socket open live in the `Transport` itself, so the future
//! is cancel-safe and can sit in a `tokio::select!` next to other branches.
//!
//! ```text
//!   connect() ──► Connecting ──open ok──► Open ──socket lost──► Closed
//!                     │                                           │
//!                     └──open failed──► Closed ◄──────────────────┘
//!                                          │
//!                               wait reconnect_interval
//!                                          │
//!                                          └──► Connecting (attempt + 1)
//! ```
//!
//! # Known Limitation
//!
//! The retry interval is fixed: no backoff, no jitter, no attempt cap. Many
//! clients losing the same broker retry in lockstep. The interval is
//! configurable so deployments can spread it out.

// Rust guideline compliant 2026-02

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Sleep;

use crate::constants::ABNORMAL_CLOSE_CODE;
use crate::ws::{Connector, SocketPair, SocketReader, SocketWriter, WsMessage};

/// Lifecycle state of the transport's socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket; possibly waiting for a scheduled reconnect.
    #[default]
    Closed,
    /// A socket open is in flight.
    Connecting,
    /// The socket is open and writable.
    Open,
    /// A client-initiated close is in progress.
    Disconnecting,
}

/// Connection-level notification emitted by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A socket was opened.
    Connected,
    /// The socket closed without the client asking for it.
    Disconnected {
        /// WebSocket close code (1006 when the stream just ended).
        code: u16,
        /// Close reason reported by the remote, if any.
        reason: String,
    },
    /// Opening, reading, or writing the socket failed.
    Error(String),
    /// A reconnect attempt has been scheduled.
    Reconnecting {
        /// Number of the attempt that will run when the timer fires.
        attempt: u32,
        /// Delay before that attempt.
        next_attempt_in: Duration,
    },
}

/// Event pulled from [`Transport::next_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection state change.
    Connection(ConnectionEvent),
    /// Raw inbound text, uninterpreted.
    Message(String),
}

/// Errors returned by [`Transport::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The socket is not open.
    NotConnected,
    /// The socket rejected the write.
    SendFailed(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "WebSocket not connected"),
            Self::SendFailed(msg) => write!(f, "Send failed: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Owner of one reconnecting socket.
#[derive(Debug)]
pub struct Transport {
    url: String,
    connector: Arc<dyn Connector>,
    reconnect_interval: Duration,
    state: ConnectionState,
    /// Attempts since the last successful open.
    reconnect_attempts: u32,
    /// Set by `disconnect()`; suppresses every automatic reconnect.
    closed_by_client: bool,
    /// In-flight socket open.
    opening: Option<JoinHandle<anyhow::Result<SocketPair>>>,
    /// Pending reconnect; at most one exists at a time.
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    writer: Option<Box<dyn SocketWriter>>,
    reader: Option<Box<dyn SocketReader>>,
    /// Events produced synchronously, delivered before any socket read.
    pending: VecDeque<TransportEvent>,
}

impl Transport {
    /// Create a closed transport for `url`.
    pub fn new(
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
        reconnect_interval: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            connector,
            reconnect_interval,
            state: ConnectionState::Closed,
            reconnect_attempts: 0,
            closed_by_client: true,
            opening: None,
            reconnect_timer: None,
            writer: None,
            reader: None,
            pending: VecDeque::new(),
        }
    }

    /// Socket endpoint.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the socket is open and writable.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Connection attempts made since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Fixed delay between a loss and the next attempt.
    #[must_use]
    pub fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    /// Start connecting. No-op while already connecting or open.
    ///
    /// A scheduled reconnect is superseded by this immediate attempt.
    pub fn connect(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            log::debug!("[Transport] connect() ignored, state={:?}", self.state);
            return;
        }

        self.closed_by_client = false;
        self.reconnect_timer = None;
        self.attempt_connection();
    }

    /// Write `text` to the socket verbatim.
    ///
    /// Nothing is queued: text sent while the socket is not open is rejected.
    pub async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        if self.state != ConnectionState::Open {
            return Err(TransportError::NotConnected);
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        match writer.send_text(text).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let msg = format!("{e:#}");
                log::warn!("[Transport] Send failed: {}", msg);
                self.pending
                    .push_back(TransportEvent::Connection(ConnectionEvent::Error(
                        msg.clone(),
                    )));
                Err(TransportError::SendFailed(msg))
            }
        }
    }

    /// Close the socket and stop reconnecting.
    ///
    /// Timers and the in-flight open are cancelled before the socket close
    /// is awaited.
    pub async fn disconnect(&mut self) {
        self.closed_by_client = true;
        self.reconnect_timer = None;
        if let Some(opening) = self.opening.take() {
            opening.abort();
        }
        self.pending.clear();
        self.reader = None;

        if let Some(mut writer) = self.writer.take() {
            self.state = ConnectionState::Disconnecting;
            if let Err(e) = writer.close().await {
                log::debug!("[Transport] Close failed: {:#}", e);
            }
        }

        self.state = ConnectionState::Closed;
        log::info!("[Transport] Disconnected from {}", self.url);
    }

    /// Wait for the next transport event.
    ///
    /// Returns `None` once the transport is idle: closed, with no open in
    /// flight and no reconnect scheduled.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            if let Some(reader) = self.reader.as_mut() {
                match reader.recv().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        return Some(TransportEvent::Message(text));
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        return Some(TransportEvent::Message(
                            String::from_utf8_lossy(&data).into_owned(),
                        ));
                    }
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                        // Pings are auto-replied by tungstenite; ignore pongs
                    }
                    Some(Ok(WsMessage::Close { code, reason })) => {
                        self.handle_socket_loss(ConnectionEvent::Disconnected { code, reason });
                    }
                    Some(Err(e)) => {
                        self.handle_socket_loss(ConnectionEvent::Error(format!("{e:#}")));
                    }
                    None => {
                        self.handle_socket_loss(ConnectionEvent::Disconnected {
                            code: ABNORMAL_CLOSE_CODE,
                            reason: "stream ended".to_string(),
                        });
                    }
                }
                continue;
            }

            if let Some(opening) = self.opening.as_mut() {
                let result = opening.await;
                self.opening = None;
                match result {
                    Ok(Ok((writer, reader))) => {
                        self.writer = Some(writer);
                        self.reader = Some(reader);
                        self.state = ConnectionState::Open;
                        self.reconnect_attempts = 0;
                        log::info!("[Transport] Connected to {}", self.url);
                        return Some(TransportEvent::Connection(ConnectionEvent::Connected));
                    }
                    Ok(Err(e)) => {
                        self.handle_socket_loss(ConnectionEvent::Error(format!("{e:#}")));
                    }
                    Err(e) => {
                        self.handle_socket_loss(ConnectionEvent::Error(format!(
                            "connect task failed: {e}"
                        )));
                    }
                }
                continue;
            }

            if let Some(timer) = self.reconnect_timer.as_mut() {
                timer.as_mut().await;
                self.reconnect_timer = None;
                self.attempt_connection();
                continue;
            }

            return None;
        }
    }

    /// Spawn a socket open unless one is already in flight.
    fn attempt_connection(&mut self) {
        if self.closed_by_client || self.opening.is_some() {
            return;
        }

        self.writer = None;
        self.reader = None;
        self.state = ConnectionState::Connecting;
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);

        log::info!(
            "[Transport] Connecting to {} (attempt {})",
            self.url,
            self.reconnect_attempts
        );

        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        self.opening = Some(tokio::spawn(async move { connector.connect(&url).await }));
    }

    /// Record a lost or failed socket and schedule the retry.
    fn handle_socket_loss(&mut self, event: ConnectionEvent) {
        self.writer = None;
        self.reader = None;
        self.state = ConnectionState::Closed;

        log::warn!("[Transport] Connection lost: {:?}", event);
        self.pending.push_back(TransportEvent::Connection(event));
        self.schedule_reconnect();
    }

    /// Arm the reconnect timer. Never arms a second one.
    fn schedule_reconnect(&mut self) {
        if self.closed_by_client || self.reconnect_timer.is_some() || self.opening.is_some() {
            return;
        }

        log::info!(
            "[Transport] Reconnecting in {}ms",
            self.reconnect_interval.as_millis()
        );
        self.pending
            .push_back(TransportEvent::Connection(ConnectionEvent::Reconnecting {
                attempt: self.reconnect_attempts.saturating_add(1),
                next_attempt_in: self.reconnect_interval,
            }));
        self.reconnect_timer = Some(Box::pin(tokio::time::sleep(self.reconnect_interval)));
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(opening) = self.opening.take() {
            opening.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::memory::{MemoryConnector, MemoryPeer};

    const INTERVAL: Duration = Duration::from_millis(3000);

    fn transport() -> (Transport, MemoryPeer) {
        let (connector, peer) = MemoryConnector::new();
        (
            Transport::new("ws://broker.test/ws", Arc::new(connector), INTERVAL),
            peer,
        )
    }

    async fn open(transport: &mut Transport) {
        transport.connect();
        assert_eq!(
            transport.next_event().await,
            Some(TransportEvent::Connection(ConnectionEvent::Connected))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_opens_and_resets_attempts() {
        let (mut transport, peer) = transport();
        assert_eq!(transport.state(), ConnectionState::Closed);

        transport.connect();
        assert_eq!(transport.state(), ConnectionState::Connecting);
        assert_eq!(transport.reconnect_attempts(), 1);

        assert_eq!(
            transport.next_event().await,
            Some(TransportEvent::Connection(ConnectionEvent::Connected))
        );
        assert!(transport.is_open());
        assert_eq!(transport.reconnect_attempts(), 0);
        assert_eq!(peer.connect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let (mut transport, peer) = transport();
        transport.connect();
        transport.connect();
        transport.next_event().await;
        transport.connect();

        assert_eq!(peer.connect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_open_socket() {
        let (mut transport, peer) = transport();
        assert_eq!(
            transport.send("SEND\n\n\0").await,
            Err(TransportError::NotConnected)
        );
        assert!(peer.take_sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_and_receive_are_verbatim() {
        let (mut transport, peer) = transport();
        open(&mut transport).await;

        transport.send("CONNECT\nhost:/\n\n\0").await.unwrap();
        assert_eq!(peer.take_sent(), vec!["CONNECT\nhost:/\n\n\0".to_string()]);

        peer.push_text("CONNECTED\nversion:1.2\n\n\0");
        assert_eq!(
            transport.next_event().await,
            Some(TransportEvent::Message("CONNECTED\nversion:1.2\n\n\0".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_close_reconnects_once_after_interval() {
        let (mut transport, peer) = transport();
        open(&mut transport).await;

        peer.close(1011, "broker restart");
        assert_eq!(
            transport.next_event().await,
            Some(TransportEvent::Connection(ConnectionEvent::Disconnected {
                code: 1011,
                reason: "broker restart".to_string(),
            }))
        );
        assert_eq!(
            transport.next_event().await,
            Some(TransportEvent::Connection(ConnectionEvent::Reconnecting {
                attempt: 1,
                next_attempt_in: INTERVAL,
            }))
        );

        // Nothing happens before the interval elapses.
        let early = tokio::time::timeout(
            INTERVAL - Duration::from_millis(1),
            transport.next_event(),
        )
        .await;
        assert!(early.is_err());
        assert_eq!(peer.connect_attempts(), 1);

        assert_eq!(
            transport.next_event().await,
            Some(TransportEvent::Connection(ConnectionEvent::Connected))
        );
        assert_eq!(peer.connect_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_connections_retry_one_attempt_per_interval() {
        let (mut transport, peer) = transport();
        peer.refuse_connections(3);
        transport.connect();

        let mut errors = 0;
        loop {
            match transport.next_event().await {
                Some(TransportEvent::Connection(ConnectionEvent::Connected)) => break,
                Some(TransportEvent::Connection(ConnectionEvent::Error(_))) => errors += 1,
                Some(_) => {}
                None => panic!("transport went idle while retrying"),
            }
        }

        assert_eq!(errors, 3);
        assert_eq!(peer.connect_attempts(), 4);
        assert_eq!(transport.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let (mut transport, peer) = transport();
        open(&mut transport).await;

        peer.drop_connection();
        transport.next_event().await; // Disconnected
        transport.disconnect().await;

        tokio::time::advance(INTERVAL * 3).await;
        assert_eq!(transport.next_event().await, None);
        assert_eq!(peer.connect_attempts(), 1);
        assert_eq!(transport.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_closes_open_socket() {
        let (mut transport, peer) = transport();
        open(&mut transport).await;

        transport.disconnect().await;

        assert_eq!(peer.client_closes(), 1);
        assert_eq!(
            transport.send("late").await,
            Err(TransportError::NotConnected)
        );
    }
}
