//! STOMP session: handshake, subscriptions, publishing, heartbeat.
//!
//! # State Machine
//!
//! ```text
//! Idle ──connect()──► Connecting ──socket open──► AwaitingHandshake
//!  ▲                                                   │ CONNECTED
//!  │                                                   ▼
//!  └───────── socket lost / disconnect() ◄──────── Connected
//! ```
//!
//! Every time the transport (re)opens a socket the session sends a fresh
//! CONNECT. Losing the socket clears the subscription table and stops the
//! heartbeat; callers resubscribe when the next CONNECTED arrives.
//!
//! # Heartbeat
//!
//! With a non-zero outgoing period the session publishes
//! `{"type":"heartbeat","timestamp":<ms>}` to the presence destination once
//! per period, starting one full period after CONNECTED. It also subscribes
//! to that destination with an exclusive, auto-deleted queue.

// Rust guideline compliant 2026-02

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::frame::{json_send_frame, Body, Command, Frame, Headers};
use super::StompError;
use crate::constants::{
    BINDING_DESTINATION, DEFAULT_HEARTBEAT_DESTINATION, DEFAULT_HEARTBEAT_INCOMING_MS,
    DEFAULT_HEARTBEAT_OUTGOING_MS, STOMP_VERSION,
};
use crate::transport::{ConnectionEvent, Transport, TransportEvent};

/// Handshake and heartbeat settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompConfig {
    /// Virtual host sent as the CONNECT `host` header.
    pub vhost: String,
    /// Broker login.
    pub login: String,
    /// Broker passcode.
    pub passcode: String,
    /// Client heartbeat period; zero disables it.
    pub heartbeat_outgoing: Duration,
    /// Heartbeat period requested from the broker.
    pub heartbeat_incoming: Duration,
    /// Destination for heartbeat publishes and the presence subscription.
    pub heartbeat_destination: String,
}

impl Default for StompConfig {
    fn default() -> Self {
        Self {
            vhost: "/".to_string(),
            login: "guest".to_string(),
            passcode: "guest".to_string(),
            heartbeat_outgoing: Duration::from_millis(DEFAULT_HEARTBEAT_OUTGOING_MS),
            heartbeat_incoming: Duration::from_millis(DEFAULT_HEARTBEAT_INCOMING_MS),
            heartbeat_destination: DEFAULT_HEARTBEAT_DESTINATION.to_string(),
        }
    }
}

/// Credentials overriding the configured login at connect time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Replacement login.
    pub login: Option<String>,
    /// Replacement passcode.
    pub passcode: Option<String>,
}

/// Protocol-level session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No handshake in progress.
    #[default]
    Idle,
    /// Waiting for the transport to open.
    Connecting,
    /// CONNECT sent, waiting for CONNECTED.
    AwaitingHandshake,
    /// Handshake complete.
    Connected,
}

/// An active subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Session-unique subscription id.
    pub id: String,
    /// Subscribed destination.
    pub destination: String,
    /// Headers sent with the SUBSCRIBE frame.
    pub headers: Headers,
}

/// A MESSAGE frame delivered by the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// `destination` header (empty when missing).
    pub destination: String,
    /// Subscription named by the `subscription` header, if still known.
    pub subscription: Option<Subscription>,
    /// All frame headers.
    pub headers: Headers,
    /// Frame body.
    pub body: Body,
}

/// Event pulled from [`StompSession::next_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Transport-level change, forwarded unchanged.
    Connection(ConnectionEvent),
    /// CONNECTED received; the session may subscribe and publish.
    Connected {
        /// CONNECTED frame headers (version, server, heart-beat...).
        headers: Headers,
    },
    /// MESSAGE received.
    Message(MessageEvent),
    /// ERROR frame received. The socket stays open.
    Error {
        /// ERROR frame headers (`message` carries the summary).
        headers: Headers,
        /// ERROR frame body.
        body: Body,
    },
}

/// Result of one `select!` round in [`StompSession::next_event`].
enum Step {
    Transport(Option<TransportEvent>),
    Heartbeat,
}

/// STOMP client session over one [`Transport`].
#[derive(Debug)]
pub struct StompSession {
    transport: Transport,
    config: StompConfig,
    state: SessionState,
    subscriptions: HashMap<String, Subscription>,
    heartbeat: Option<Interval>,
    next_subscription: u64,
}

impl StompSession {
    /// Wrap `transport`. Nothing is sent until [`StompSession::connect`].
    pub fn new(transport: Transport, config: StompConfig) -> Self {
        Self {
            transport,
            config,
            state: SessionState::Idle,
            subscriptions: HashMap::new(),
            heartbeat: None,
            next_subscription: 0,
        }
    }

    /// Current protocol state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the handshake is complete and the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected && self.transport.is_open()
    }

    /// Handshake settings in effect.
    #[must_use]
    pub fn config(&self) -> &StompConfig {
        &self.config
    }

    /// Underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Active subscriptions, in no particular order.
    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    /// Look up a subscription by id.
    #[must_use]
    pub fn subscription(&self, id: &str) -> Option<&Subscription> {
        self.subscriptions.get(id)
    }

    /// Whether the heartbeat timer is running.
    #[must_use]
    pub fn heartbeat_active(&self) -> bool {
        self.heartbeat.is_some()
    }

    /// Start the handshake.
    ///
    /// `credentials` replace the configured login and passcode. CONNECT is
    /// sent once the transport reports the socket open.
    pub fn connect(&mut self, credentials: Option<Credentials>) {
        if let Some(credentials) = credentials {
            if let Some(login) = credentials.login {
                self.config.login = login;
            }
            if let Some(passcode) = credentials.passcode {
                self.config.passcode = passcode;
            }
        }

        if self.state == SessionState::Idle {
            self.state = SessionState::Connecting;
        }
        log::info!("[Stomp] Connecting to {}", self.transport.url());
        self.transport.connect();
    }

    /// Wait for the next session event.
    ///
    /// Heartbeats are sent from inside this future, so it must be polled
    /// continuously while connected. Cancel-safe. Returns `None` once the
    /// transport is idle.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let step = tokio::select! {
                event = self.transport.next_event() => Step::Transport(event),
                () = next_heartbeat(self.heartbeat.as_mut()) => Step::Heartbeat,
            };

            match step {
                Step::Transport(None) => return None,
                Step::Transport(Some(TransportEvent::Connection(event))) => {
                    self.handle_connection_event(&event).await;
                    return Some(SessionEvent::Connection(event));
                }
                Step::Transport(Some(TransportEvent::Message(raw))) => {
                    if let Some(event) = self.handle_raw(&raw).await {
                        return Some(event);
                    }
                }
                Step::Heartbeat => self.send_heartbeat().await,
            }
        }
    }

    /// Subscribe to `destination`, returning the new subscription id.
    ///
    /// Frame headers are `id`, `destination`, `ack:auto`, then `headers`
    /// (which may override `ack`).
    pub async fn subscribe(
        &mut self,
        destination: &str,
        headers: Headers,
    ) -> Result<String, StompError> {
        self.ensure_connected()?;

        let id = self.next_subscription_id();
        let mut frame_headers = Headers::new()
            .with("id", id.as_str())
            .with("destination", destination)
            .with("ack", "auto");
        frame_headers.merge(headers);
        frame_headers.insert("id", id.as_str());
        frame_headers.insert("destination", destination);

        let frame = Frame::new(Command::Subscribe).with_headers(frame_headers.clone());
        self.send_frame(&frame).await?;

        log::debug!("[Stomp] Subscribed {} to {}", id, destination);
        self.subscriptions.insert(
            id.clone(),
            Subscription {
                id: id.clone(),
                destination: destination.to_string(),
                headers: frame_headers,
            },
        );
        Ok(id)
    }

    /// Drop subscription `id`. Unknown ids are ignored.
    pub async fn unsubscribe(&mut self, id: &str) -> Result<(), StompError> {
        if self.subscriptions.remove(id).is_none() {
            return Ok(());
        }

        log::debug!("[Stomp] Unsubscribing {}", id);
        let frame = Frame::new(Command::Unsubscribe).with_header("id", id);
        self.send_frame(&frame).await
    }

    /// Publish `body` to `destination` as a JSON SEND frame.
    ///
    /// Text bodies are sent as-is; JSON bodies are serialized compactly.
    pub async fn publish(
        &mut self,
        destination: &str,
        body: impl Into<Body>,
        headers: Headers,
    ) -> Result<(), StompError> {
        self.ensure_connected()?;
        if destination.is_empty() {
            return Err(StompError::MissingDestination);
        }
        let body = body.into();
        if body.is_empty() {
            return Err(StompError::EmptyBody);
        }

        let frame = json_send_frame(destination, body.to_text(), headers);
        self.send_frame(&frame).await
    }

    /// Serialize `value` with serde and publish it to `destination`.
    pub async fn publish_json<T: Serialize>(
        &mut self,
        destination: &str,
        value: &T,
        headers: Headers,
    ) -> Result<(), StompError> {
        let text =
            serde_json::to_string(value).map_err(|e| StompError::Serialization(e.to_string()))?;
        self.publish(destination, text, headers).await
    }

    /// Write an arbitrary frame. Requires an open socket, not a handshake.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), StompError> {
        log::debug!("[Stomp] Sending {}", frame.command);
        self.transport.send(&frame.encode()).await?;
        Ok(())
    }

    /// Ask the broker to bind `queue` to `exchange` for each routing key.
    pub async fn bind_routing_keys(
        &mut self,
        queue: &str,
        exchange: &str,
        routing_keys: &[String],
    ) -> Result<(), StompError> {
        self.send_bindings(queue, exchange, routing_keys, false).await
    }

    /// Ask the broker to remove the bindings made by [`Self::bind_routing_keys`].
    pub async fn unbind_routing_keys(
        &mut self,
        queue: &str,
        exchange: &str,
        routing_keys: &[String],
    ) -> Result<(), StompError> {
        self.send_bindings(queue, exchange, routing_keys, true).await
    }

    /// End the session and close the socket. No reconnect follows.
    pub async fn disconnect(&mut self) {
        self.heartbeat = None;
        if self.is_connected() {
            if let Err(e) = self.send_frame(&Frame::new(Command::Disconnect)).await {
                log::debug!("[Stomp] DISCONNECT not sent: {}", e);
            }
        }
        self.state = SessionState::Idle;
        self.subscriptions.clear();
        self.transport.disconnect().await;
        log::info!("[Stomp] Session closed");
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    async fn handle_connection_event(&mut self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                self.reset();
                self.state = SessionState::AwaitingHandshake;
                self.send_connect().await;
            }
            ConnectionEvent::Disconnected { .. } | ConnectionEvent::Error(_) => {
                // A failed write leaves the socket open; only a real loss resets.
                if !self.transport.is_open() && self.state != SessionState::Idle {
                    log::info!("[Stomp] Socket lost in state {:?}", self.state);
                    self.reset();
                    self.state = SessionState::Idle;
                }
            }
            ConnectionEvent::Reconnecting { .. } => {}
        }
    }

    async fn handle_raw(&mut self, raw: &str) -> Option<SessionEvent> {
        let Some(frame) = Frame::parse(raw) else {
            log::trace!("[Stomp] Broker heart-beat");
            return None;
        };
        let Frame {
            command,
            headers,
            body,
        } = frame;

        match command {
            Command::Connected => {
                log::info!(
                    "[Stomp] Connected (version {})",
                    headers.get("version").unwrap_or("?")
                );
                self.state = SessionState::Connected;
                self.start_heartbeat().await;
                Some(SessionEvent::Connected { headers })
            }
            Command::Message => {
                let destination = headers.get("destination").unwrap_or_default().to_string();
                let subscription = headers
                    .get("subscription")
                    .and_then(|id| self.subscriptions.get(id))
                    .cloned();
                log::debug!("[Stomp] MESSAGE on {}", destination);
                Some(SessionEvent::Message(MessageEvent {
                    destination,
                    subscription,
                    headers,
                    body,
                }))
            }
            Command::Error => {
                log::warn!(
                    "[Stomp] Broker error: {}",
                    headers.get("message").unwrap_or("(no message)")
                );
                Some(SessionEvent::Error { headers, body })
            }
            other => {
                log::debug!("[Stomp] Ignoring {} frame", other);
                None
            }
        }
    }

    // ========================================================================
    // Outbound helpers
    // ========================================================================

    async fn send_connect(&mut self) {
        let frame = Frame::new(Command::Connect)
            .with_header("accept-version", STOMP_VERSION)
            .with_header("host", self.config.vhost.as_str())
            .with_header("login", self.config.login.as_str())
            .with_header("passcode", self.config.passcode.as_str())
            .with_header(
                "heart-beat",
                format!(
                    "{},{}",
                    self.config.heartbeat_outgoing.as_millis(),
                    self.config.heartbeat_incoming.as_millis()
                ),
            );

        log::debug!(
            "[Stomp] Sending CONNECT (host={}, login={})",
            self.config.vhost,
            self.config.login
        );
        if let Err(e) = self.transport.send(&frame.encode()).await {
            log::warn!("[Stomp] CONNECT not sent: {}", e);
        }
    }

    async fn start_heartbeat(&mut self) {
        self.heartbeat = None;
        let period = self.config.heartbeat_outgoing;
        if period.is_zero() {
            log::debug!("[Stomp] Heartbeat disabled");
            return;
        }

        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.heartbeat = Some(interval);

        let destination = self.config.heartbeat_destination.clone();
        let headers = Headers::new()
            .with("x-queue-name", format!("heartbeat-{}", epoch_millis()))
            .with("durable", "false")
            .with("auto-delete", "true")
            .with("exclusive", "true");
        if let Err(e) = self.subscribe(&destination, headers).await {
            log::warn!("[Stomp] Presence subscribe failed: {}", e);
        }
    }

    async fn send_heartbeat(&mut self) {
        if !self.is_connected() {
            self.heartbeat = None;
            return;
        }

        let body = serde_json::json!({
            "type": "heartbeat",
            "timestamp": epoch_millis(),
        });
        let frame = json_send_frame(
            &self.config.heartbeat_destination,
            body.to_string(),
            Headers::new(),
        );

        log::trace!("[Stomp] Heartbeat");
        if let Err(e) = self.transport.send(&frame.encode()).await {
            log::debug!("[Stomp] Heartbeat not sent: {}", e);
        }
    }

    async fn send_bindings(
        &mut self,
        queue: &str,
        exchange: &str,
        routing_keys: &[String],
        unbind: bool,
    ) -> Result<(), StompError> {
        self.ensure_connected()?;

        for routing_key in routing_keys {
            let mut body = serde_json::Map::new();
            if unbind {
                body.insert("command".to_string(), "unbind".into());
            }
            body.insert("queue".to_string(), queue.into());
            body.insert("exchange".to_string(), exchange.into());
            body.insert("routingKey".to_string(), routing_key.as_str().into());

            let text = serde_json::Value::Object(body).to_string();
            let frame = json_send_frame(BINDING_DESTINATION, text, Headers::new());
            self.send_frame(&frame).await?;
        }

        log::info!(
            "[Stomp] {} {} routing key(s) for queue {} on {}",
            if unbind { "Unbound" } else { "Bound" },
            routing_keys.len(),
            queue,
            exchange
        );
        Ok(())
    }

    fn ensure_connected(&self) -> Result<(), StompError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StompError::NotConnected)
        }
    }

    fn next_subscription_id(&mut self) -> String {
        self.next_subscription += 1;
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("sub-{}-{}", self.next_subscription, &suffix[..8])
    }

    /// Forget per-connection state.
    fn reset(&mut self) {
        self.heartbeat = None;
        self.subscriptions.clear();
    }
}

/// Tick `interval`, or never resolve when there is none.
async fn next_heartbeat(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
