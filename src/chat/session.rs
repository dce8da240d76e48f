//! Chat session: routing-key subscriptions, message fan-out, persistence copy.
//!
//! A [`ChatSession`] owns one [`StompSession`] (and through it one
//! transport). The caller drives it with [`ChatSession::process_next`] or
//! [`ChatSession::run`], passing a [`ChatHandler`] that receives callbacks.
//!
//! On every CONNECTED (first connect and each reconnect) the session
//! subscribes each group routing key on the publish exchange with the
//! session's queue name, then calls `on_connect`.

// Rust guideline compliant 2026-02

use std::sync::Arc;

use serde::Serialize;

use super::message::{Payload, TypingStatus};
use super::{ChatError, ChatHandler};
use crate::config::ChatConfig;
use crate::constants::{
    exchange_destination, user_routing_key, DB_SAVE_ROUTING_KEY, QUEUE_NAME_PREFIX,
};
use crate::stomp::session::epoch_millis;
use crate::stomp::{Body, Headers, MessageEvent, SessionEvent, StompSession};
use crate::transport::Transport;
use crate::ws::Connector;

/// One user's chat connection.
#[derive(Debug)]
pub struct ChatSession {
    session: StompSession,
    user_id: String,
    queue_name: String,
    routing_key: String,
    group_routing_keys: Vec<String>,
    publish_exchange: String,
    db_exchange: String,
    closed: bool,
}

impl ChatSession {
    /// Build a session from `config`. Nothing connects until
    /// [`ChatSession::connect`].
    pub fn new(config: &ChatConfig, connector: Arc<dyn Connector>) -> Result<Self, ChatError> {
        if config.user_id.trim().is_empty() {
            return Err(ChatError::InvalidConfig("userId is required".to_string()));
        }
        if config.url.trim().is_empty() {
            return Err(ChatError::InvalidConfig("url is required".to_string()));
        }
        if config.publish_queue.trim().is_empty() {
            return Err(ChatError::InvalidConfig("publishQueue is required".to_string()));
        }

        let user_id = config.user_id.clone();
        let queue_name = config
            .subscribe_queue
            .clone()
            .filter(|queue| !queue.is_empty())
            .unwrap_or_else(|| format!("{QUEUE_NAME_PREFIX}{user_id}_{}", epoch_millis()));
        let routing_key = config
            .routing_key
            .clone()
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| user_routing_key(&user_id));
        let group_routing_keys = if config.group_routing_keys.is_empty() {
            vec![routing_key.clone()]
        } else {
            config.group_routing_keys.clone()
        };

        let transport = Transport::new(
            config.url.clone(),
            connector,
            config.reconnect_interval(),
        );

        Ok(Self {
            session: StompSession::new(transport, config.stomp_config()),
            user_id,
            queue_name,
            routing_key,
            group_routing_keys,
            publish_exchange: config.publish_queue.clone(),
            db_exchange: config.db_exchange_name.clone(),
            closed: false,
        })
    }

    /// Local user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Queue name used for every routing-key subscription.
    #[must_use]
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Own routing key.
    #[must_use]
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Routing keys subscribed on every connect.
    #[must_use]
    pub fn group_routing_keys(&self) -> &[String] {
        &self.group_routing_keys
    }

    /// Underlying STOMP session.
    #[must_use]
    pub fn stomp(&self) -> &StompSession {
        &self.session
    }

    /// Whether the broker handshake is complete.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Whether [`ChatSession::disconnect`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Start connecting to the broker.
    pub fn connect(&mut self) -> Result<(), ChatError> {
        if self.closed {
            return Err(ChatError::Closed);
        }
        log::info!("[Chat] Connecting as {}", self.user_id);
        self.session.connect(None);
        Ok(())
    }

    /// Pull one event and dispatch it to `handler`.
    ///
    /// Returns `false` once the session has ended.
    pub async fn process_next<H: ChatHandler + ?Sized>(&mut self, handler: &mut H) -> bool {
        let Some(event) = self.next_event().await else {
            return false;
        };
        self.dispatch(event, handler).await;
        true
    }

    /// Wait for the next protocol event without dispatching it.
    ///
    /// Cancel-safe, for use inside `tokio::select!`. Pass the result to
    /// [`ChatSession::dispatch`].
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.session.next_event().await
    }

    /// Handle one event from [`ChatSession::next_event`].
    pub async fn dispatch<H: ChatHandler + ?Sized>(&mut self, event: SessionEvent, handler: &mut H) {
        match event {
            SessionEvent::Connection(event) => handler.on_connection_event(&event),
            SessionEvent::Connected { .. } => self.handle_connected(handler).await,
            SessionEvent::Message(message) => self.dispatch_message(message, handler),
            SessionEvent::Error { headers, body } => {
                let message = headers
                    .get("message")
                    .map(str::to_string)
                    .or_else(|| Some(body.to_text()).filter(|text| !text.is_empty()))
                    .unwrap_or_else(|| "STOMP error occurred".to_string());
                handler.on_error(ChatError::Broker { message, headers });
            }
        }
    }

    /// Dispatch events to `handler` until the session ends.
    pub async fn run<H: ChatHandler + ?Sized>(&mut self, handler: &mut H) {
        while self.process_next(handler).await {}
        log::info!("[Chat] Session ended");
    }

    /// Publish `message` to `routing_key` and mirror it to the persistence
    /// exchange.
    ///
    /// Fails before writing anything when not connected or when
    /// `routing_key` is empty. The body is serialized once and both frames
    /// carry identical bytes.
    pub async fn publish<T: Serialize + ?Sized>(
        &mut self,
        message: &T,
        routing_key: &str,
    ) -> Result<(), ChatError> {
        self.ensure_ready()?;
        if routing_key.is_empty() {
            return Err(ChatError::MissingRoutingKey);
        }

        let body =
            serde_json::to_string(message).map_err(|e| ChatError::Serialization(e.to_string()))?;

        let destination = exchange_destination(&self.publish_exchange, routing_key);
        self.session
            .publish(&destination, body.as_str(), Headers::new())
            .await?;

        let db_destination = exchange_destination(&self.db_exchange, DB_SAVE_ROUTING_KEY);
        self.session
            .publish(&db_destination, body, Headers::new())
            .await?;

        log::debug!("[Chat] Published to {}", routing_key);
        Ok(())
    }

    /// Tell `to_user` whether this user is typing.
    pub async fn publish_typing_status(
        &mut self,
        is_typing: bool,
        to_user: &str,
    ) -> Result<(), ChatError> {
        self.ensure_ready()?;

        let status = TypingStatus::new(self.user_id.as_str(), to_user, is_typing, epoch_millis());
        let destination = exchange_destination(&self.publish_exchange, &user_routing_key(to_user));
        self.session
            .publish_json(&destination, &status, Headers::new())
            .await?;
        Ok(())
    }

    /// Close the session. Later `connect`/`publish` calls return
    /// [`ChatError::Closed`].
    pub async fn disconnect(&mut self) {
        if self.closed {
            return;
        }
        self.session.disconnect().await;
        self.closed = true;
        log::info!("[Chat] Disconnected {}", self.user_id);
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    async fn handle_connected<H: ChatHandler + ?Sized>(&mut self, handler: &mut H) {
        let headers = Headers::new()
            .with("x-queue-name", self.queue_name.as_str())
            .with("durable", "true")
            .with("auto-delete", "true");

        for routing_key in self.group_routing_keys.clone() {
            let destination = exchange_destination(&self.publish_exchange, &routing_key);
            match self.session.subscribe(&destination, headers.clone()).await {
                Ok(id) => log::info!("[Chat] Subscribed {} ({})", routing_key, id),
                Err(e) => {
                    log::warn!("[Chat] Subscribe to {} failed: {}", routing_key, e);
                    handler.on_error(e.into());
                }
            }
        }

        handler.on_connect();
    }

    fn dispatch_message<H: ChatHandler + ?Sized>(&self, message: MessageEvent, handler: &mut H) {
        let prefix = format!("/exchange/{}/", self.publish_exchange);
        if !message.destination.starts_with(&prefix) {
            log::debug!("[Chat] Ignoring message on {}", message.destination);
            return;
        }

        let text = match &message.body {
            Body::Text(text) => text.clone(),
            Body::Json(value) => value.to_string(),
        };

        match Payload::decode(&text) {
            Ok(Payload::Typing(status)) => handler.on_typing_status(status),
            Ok(Payload::Message(inbound)) => handler.on_message(inbound),
            Err(e) => log::warn!(
                "[Chat] Dropping undecodable message on {}: {}",
                message.destination,
                e
            ),
        }
    }

    fn ensure_ready(&self) -> Result<(), ChatError> {
        if self.closed {
            return Err(ChatError::Closed);
        }
        if !self.session.is_connected() {
            return Err(ChatError::NotConnected);
        }
        Ok(())
    }
}
