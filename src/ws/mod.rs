//! Socket seam and WebSocket implementation.
//!
//! The transport layer never talks to `tokio-tungstenite` directly. It opens
//! sockets through a [`Connector`] and drives the resulting
//! ([`SocketWriter`], [`SocketReader`]) halves. Two connectors ship with the
//! crate:
//!
//! - [`WsConnector`] - real WebSocket client over `tokio-tungstenite`
//! - [`memory::MemoryConnector`] - in-memory loopback for tests and demos
//!
//! # Architecture
//!
//! A single [`connect`] function handles URL→request building, header
//! insertion, and TLS negotiation. It returns a ([`WsWriter`], [`WsReader`])
//! pair ready for use in `tokio::select!` loops.

// Rust guideline compliant 2026-02

pub mod memory;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use crate::constants::NORMAL_CLOSE_CODE;

/// Concrete WebSocket stream type (avoids repeating the 6-line generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Received socket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Ping frame with payload.
    Ping(Vec<u8>),
    /// Pong frame with payload.
    Pong(Vec<u8>),
    /// Close frame with status code and reason.
    Close {
        /// WebSocket close code (1000 = normal, 1005 = no code).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
}

/// Write half of an open socket.
#[async_trait]
pub trait SocketWriter: Send + std::fmt::Debug {
    /// Send a UTF-8 text frame verbatim.
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Send a close frame and shut the write half down.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of an open socket.
#[async_trait]
pub trait SocketReader: Send + std::fmt::Debug {
    /// Receive the next message, returning `None` when the stream ends.
    ///
    /// Must be cancel-safe: dropping the future loses no message.
    async fn recv(&mut self) -> Option<Result<WsMessage>>;
}

/// An opened socket split into its two halves.
pub type SocketPair = (Box<dyn SocketWriter>, Box<dyn SocketReader>);

/// Opens sockets for the transport layer.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Open a socket to `url`.
    async fn connect(&self, url: &str) -> Result<SocketPair>;
}

/// Write half of a WebSocket connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

#[async_trait]
impl SocketWriter for WsWriter {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .context("WebSocket send_text failed")
    }

    async fn close(&mut self) -> Result<()> {
        let frame = tungstenite::protocol::CloseFrame {
            code: NORMAL_CLOSE_CODE.into(),
            reason: "client disconnect".into(),
        };
        self.sink
            .send(tungstenite::Message::Close(Some(frame)))
            .await
            .context("WebSocket close failed")
    }
}

/// Read half of a WebSocket connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

#[async_trait]
impl SocketReader for WsReader {
    async fn recv(&mut self) -> Option<Result<WsMessage>> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Some(Ok(WsMessage::Text(text.to_string())));
                }
                Some(Ok(tungstenite::Message::Binary(data))) => {
                    return Some(Ok(WsMessage::Binary(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Ping(data))) => {
                    return Some(Ok(WsMessage::Ping(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Pong(data))) => {
                    return Some(Ok(WsMessage::Pong(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Close(close_frame))) => {
                    let (code, reason) = close_frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    return Some(Ok(WsMessage::Close { code, reason }));
                }
                Some(Ok(tungstenite::Message::Frame(_))) => {
                    // Raw frames, skip
                    continue;
                }
                Some(Err(e)) => {
                    return Some(Err(anyhow::anyhow!("WebSocket read error: {e}")));
                }
                None => return None,
            }
        }
    }
}

/// Connect to a WebSocket URL with optional headers.
///
/// Builds an HTTP request from `url`, inserts each `(name, value)` header,
/// then performs the WebSocket handshake. Returns split (writer, reader)
/// halves for independent use in `tokio::select!` loops.
///
/// # Errors
///
/// Returns an error if the URL is invalid, header values are malformed,
/// or the WebSocket handshake fails.
pub async fn connect(url: &str, headers: &[(&str, &str)]) -> Result<(WsWriter, WsReader)> {
    use tungstenite::client::IntoClientRequest;

    let mut request = url
        .into_client_request()
        .with_context(|| format!("invalid WebSocket URL: {url}"))?;

    for &(name, value) in headers {
        let header_name = tungstenite::http::HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("invalid header name: {name}"))?;
        let header_value = tungstenite::http::HeaderValue::from_str(value)
            .with_context(|| format!("invalid header value for {name}"))?;
        request.headers_mut().insert(header_name, header_value);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .context("WebSocket connect failed")?;

    let (sink, stream) = ws_stream.split();

    Ok((WsWriter { sink }, WsReader { stream }))
}

/// [`Connector`] backed by a real WebSocket client.
///
/// Brokers such as RabbitMQ Web-STOMP expect the `stomp` subprotocol; extra
/// handshake headers can be added with [`WsConnector::with_header`].
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    headers: Vec<(String, String)>,
}

impl WsConnector {
    /// Create a connector that sends no extra handshake headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header to every WebSocket handshake request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<SocketPair> {
        let url = http_to_ws_scheme(url);
        let header_refs: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let (writer, reader) = connect(&url, &header_refs).await?;
        Ok((Box::new(writer), Box::new(reader)))
    }
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if url.starts_with("wss://") || url.starts_with("ws://") {
        url.to_string()
    } else {
        url.replace("https://", "wss://")
            .replace("http://", "ws://")
    }
}
