//! In-memory loopback sockets.
//!
//! [`MemoryConnector`] hands out sockets whose far end is a [`MemoryPeer`].
//! The peer plays the broker: it scripts inbound text (CONNECTED, MESSAGE,
//! ERROR frames), drops or closes the connection, refuses connection
//! attempts, and records every frame the client writes.
//!
//! ```ignore
//! let (connector, peer) = MemoryConnector::new();
//! let mut transport = Transport::new("ws://broker/ws", Arc::new(connector), interval);
//! transport.connect();
//! transport.next_event().await; // Connected
//! peer.push_text("CONNECTED\nversion:1.2\n\n\0");
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Connector, SocketPair, SocketReader, SocketWriter, WsMessage};

/// State shared between the connector, its sockets, and the peer handle.
#[derive(Debug, Default)]
struct Shared {
    /// Total `connect()` calls, successful or refused.
    connect_attempts: usize,
    /// Number of upcoming attempts to refuse.
    refuse_next: usize,
    /// Identifier of the connection the peer currently serves.
    live_connection: Option<u64>,
    /// Counter for connection identifiers.
    next_connection: u64,
    /// Sender feeding the live connection's reader.
    inbound: Option<mpsc::UnboundedSender<WsMessage>>,
    /// Text frames written by the client, oldest first.
    sent: VecDeque<String>,
    /// Number of client-initiated closes.
    client_closes: usize,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`Connector`] producing in-memory sockets.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
}

/// Broker-side handle for sockets created by a [`MemoryConnector`].
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryConnector {
    /// Create a connector and the peer handle that scripts it.
    #[must_use]
    pub fn new() -> (Self, MemoryPeer) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MemoryPeer { shared },
        )
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<SocketPair> {
        let mut shared = lock(&self.shared);
        shared.connect_attempts += 1;

        if shared.refuse_next > 0 {
            shared.refuse_next -= 1;
            bail!("connection to {url} refused");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let connection = shared.next_connection;
        shared.next_connection += 1;
        shared.live_connection = Some(connection);
        shared.inbound = Some(tx);

        let writer = MemoryWriter {
            shared: Arc::clone(&self.shared),
            connection,
            closed: false,
        };
        Ok((Box::new(writer), Box::new(MemoryReader { rx })))
    }
}

/// Client write half of an in-memory socket.
#[derive(Debug)]
struct MemoryWriter {
    shared: Arc<Mutex<Shared>>,
    connection: u64,
    closed: bool,
}

#[async_trait]
impl SocketWriter for MemoryWriter {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        let mut shared = lock(&self.shared);
        if self.closed || shared.live_connection != Some(self.connection) {
            bail!("memory socket is closed");
        }
        shared.sent.push_back(text.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            let mut shared = lock(&self.shared);
            shared.client_closes += 1;
            if shared.live_connection == Some(self.connection) {
                shared.live_connection = None;
                shared.inbound = None;
            }
        }
        Ok(())
    }
}

/// Client read half of an in-memory socket.
#[derive(Debug)]
struct MemoryReader {
    rx: mpsc::UnboundedReceiver<WsMessage>,
}

#[async_trait]
impl SocketReader for MemoryReader {
    async fn recv(&mut self) -> Option<Result<WsMessage>> {
        self.rx.recv().await.map(Ok)
    }
}

impl MemoryPeer {
    /// Deliver a text frame to the live connection.
    ///
    /// Returns `false` when no connection is live.
    pub fn push_text(&self, text: &str) -> bool {
        self.push(WsMessage::Text(text.to_string()))
    }

    /// Deliver an arbitrary socket message to the live connection.
    pub fn push(&self, message: WsMessage) -> bool {
        let shared = lock(&self.shared);
        shared
            .inbound
            .as_ref()
            .is_some_and(|tx| tx.send(message).is_ok())
    }

    /// Close the live connection with a close frame.
    pub fn close(&self, code: u16, reason: &str) {
        let mut shared = lock(&self.shared);
        if let Some(tx) = shared.inbound.take() {
            let _ = tx.send(WsMessage::Close {
                code,
                reason: reason.to_string(),
            });
        }
        shared.live_connection = None;
    }

    /// Drop the live connection without a close frame (stream just ends).
    pub fn drop_connection(&self) {
        let mut shared = lock(&self.shared);
        shared.inbound = None;
        shared.live_connection = None;
    }

    /// Refuse the next `count` connection attempts.
    pub fn refuse_connections(&self, count: usize) {
        lock(&self.shared).refuse_next = count;
    }

    /// Total number of connection attempts seen so far.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        lock(&self.shared).connect_attempts
    }

    /// Whether a connection is currently live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        lock(&self.shared).live_connection.is_some()
    }

    /// Number of times the client closed its socket.
    #[must_use]
    pub fn client_closes(&self) -> usize {
        lock(&self.shared).client_closes
    }

    /// Drain every text frame the client has written so far.
    pub fn take_sent(&self) -> Vec<String> {
        lock(&self.shared).sent.drain(..).collect()
    }
}
