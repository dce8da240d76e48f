//! STOMP text frame codec.
//!
//! Wire format (one frame per WebSocket text message):
//!
//! ```text
//! COMMAND\n
//! header1:value1\n
//! header2:value2\n
//! \n
//! BODY\0
//! ```
//!
//! Header order is preserved exactly as inserted. Frames without a body
//! still carry the blank separator line and the trailing NUL.
//!
//! Header keys and values are escaped (`\\`, `\r`, `\n`, `:`) on every
//! frame except CONNECT and CONNECTED, so any value survives a round trip,
//! including empty and padded ones.
//!
//! Parsing is lenient: leading heart-beat EOLs are skipped, CRLF line ends
//! are accepted, CONNECTED header values are trimmed, and a body is
//! JSON-decoded only when `content-type` mentions `json`. A body that fails
//! to decode stays as text. Text bodies are kept exactly as sent.

use crate::constants::JSON_CONTENT_TYPE;

/// STOMP frame command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client handshake.
    Connect,
    /// Broker handshake reply.
    Connected,
    /// Register a subscription.
    Subscribe,
    /// Drop a subscription.
    Unsubscribe,
    /// Publish to a destination.
    Send,
    /// Broker delivery for a subscription.
    Message,
    /// Broker-reported failure.
    Error,
    /// Client goodbye.
    Disconnect,
    /// Broker receipt for a client frame.
    Receipt,
    /// Any other command word.
    Other(String),
}

impl Command {
    /// Wire spelling of the command.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Message => "MESSAGE",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
            Self::Receipt => "RECEIPT",
            Self::Other(word) => word,
        }
    }

    /// Whether header keys and values are escaped on the wire.
    #[must_use]
    pub fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl From<&str> for Command {
    fn from(word: &str) -> Self {
        match word {
            "CONNECT" => Self::Connect,
            "CONNECTED" => Self::Connected,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "SEND" => Self::Send,
            "MESSAGE" => Self::Message,
            "ERROR" => Self::Error,
            "DISCONNECT" => Self::Disconnect,
            "RECEIPT" => Self::Receipt,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered header mapping with unique keys.
///
/// Inserting an existing key replaces its value in place, so the first
/// position is kept for serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Empty header set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Builder-style [`Headers::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Value of `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Insert every entry of `other`, overriding existing keys.
    pub fn merge(&mut self, other: Headers) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (key, value) in iter {
            headers.insert(key, value);
        }
        headers
    }
}

/// Frame body: raw text or decoded JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Text body (also used when JSON decoding fails).
    Text(String),
    /// Decoded JSON body.
    Json(serde_json::Value),
}

impl Body {
    /// Body as wire text. JSON bodies are serialized compactly.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => value.to_string(),
        }
    }

    /// Whether the body serializes to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Json(_) => false,
        }
    }

    /// Decoded JSON, if this body was decoded.
    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// One STOMP frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order.
    pub headers: Headers,
    /// Frame body (empty text for body-less frames).
    pub body: Body,
}

impl Frame {
    /// Frame with no headers and an empty body.
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Headers::new(),
            body: Body::default(),
        }
    }

    /// Builder-style header insert.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Builder-style header merge.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers.merge(headers);
        self
    }

    /// Builder-style body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of header `key`.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Serialize to `COMMAND\nk:v\n\nBODY\0`.
    ///
    /// Header keys and values are escaped except on CONNECT and CONNECTED.
    #[must_use]
    pub fn encode(&self) -> String {
        let body = self.body.to_text();
        let escape = self.command.escapes_headers();
        let headers_len: usize = self.headers.iter().map(|(k, v)| k.len() + v.len() + 2).sum();
        let mut out =
            String::with_capacity(self.command.as_str().len() + headers_len + body.len() + 3);

        out.push_str(self.command.as_str());
        out.push('\n');
        for (key, value) in self.headers.iter() {
            if escape {
                push_escaped(&mut out, key);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(key);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&body);
        out.push('\0');
        out
    }

    /// Parse one inbound frame.
    ///
    /// Returns `None` for blank input (broker heart-beat EOLs).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw
            .trim_end_matches(['\r', '\n'])
            .strip_suffix('\0')
            .unwrap_or(raw);
        let raw = raw.trim_start_matches(['\r', '\n']);
        let mut lines = raw.split('\n');

        let command = lines.next()?.trim();
        if command.is_empty() {
            return None;
        }
        let command = Command::from(command);
        let unescape = command.escapes_headers();

        let mut headers = Headers::new();
        let mut body_lines: Vec<&str> = Vec::new();
        let mut in_body = false;
        for line in lines {
            if in_body {
                body_lines.push(line);
                continue;
            }
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                in_body = true;
            } else if let Some((key, value)) = line.split_once(':') {
                let (key, value) = if unescape {
                    (unescape_header(key), unescape_header(value))
                } else {
                    // Handshake headers are never escaped; brokers may pad them.
                    (key.trim().to_string(), value.trim().to_string())
                };
                // First occurrence wins for repeated headers.
                if !key.is_empty() && !headers.contains_key(&key) {
                    headers.insert(key, value);
                }
            }
        }

        let text = body_lines.join("\n");
        let is_json = headers
            .get("content-type")
            .is_some_and(|content_type| content_type.contains("json"));
        let body = if is_json {
            serde_json::from_str(text.trim()).map_or(Body::Text(text), Body::Json)
        } else {
            Body::Text(text)
        };

        Some(Self {
            command,
            headers,
            body,
        })
    }

    /// Whether the `content-type` header names JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .is_some_and(|content_type| content_type.contains("json"))
    }
}

/// Append `raw` with `\\`, `\r`, `\n` and `:` escaped.
fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
}

/// Reverse [`push_escaped`]. Unknown escapes are kept verbatim.
fn unescape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Build a SEND frame for an already-serialized JSON body.
///
/// Headers: `destination`, `content-type`, `content-length` (UTF-8 bytes),
/// then `extra` (which may override any of them).
#[must_use]
pub fn json_send_frame(destination: &str, body: String, extra: Headers) -> Frame {
    Frame::new(Command::Send)
        .with_header("destination", destination)
        .with_header("content-type", JSON_CONTENT_TYPE)
        .with_header("content-length", body.len().to_string())
        .with_headers(extra)
        .with_body(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_exact_wire_format() {
        let frame = Frame::new(Command::Send)
            .with_header("destination", "/exchange/ex_common/chat.user.7")
            .with_header("content-type", "application/json")
            .with_body("{\"a\":1}");

        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/exchange/ex_common/chat.user.7\ncontent-type:application/json\n\n{\"a\":1}\0"
        );
    }

    #[test]
    fn test_encode_bodyless_frame() {
        assert_eq!(Frame::new(Command::Disconnect).encode(), "DISCONNECT\n\n\0");
    }

    #[test]
    fn test_header_order_is_insertion_order() {
        let frame = Frame::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", "/")
            .with_header("login", "guest")
            .with_header("host", "vhost-b");

        assert_eq!(
            frame.encode(),
            "CONNECT\naccept-version:1.2\nhost:vhost-b\nlogin:guest\n\n\0"
        );
    }

    #[test]
    fn test_parse_message_with_json_body() {
        let raw = "MESSAGE\ndestination:/exchange/ex_common/chat.user.42\nsubscription:sub-1\ncontent-type:application/json\n\n{\"type\":\"DIRECT_MESSAGE\",\"content\":\"hi\"}\0";
        let frame = Frame::parse(raw).unwrap();

        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("subscription"), Some("sub-1"));
        assert_eq!(
            frame.body,
            Body::Json(json!({"type": "DIRECT_MESSAGE", "content": "hi"}))
        );
    }

    #[test]
    fn test_parse_invalid_json_keeps_text() {
        let raw = "MESSAGE\ncontent-type:application/json\n\nnot json\0";
        let frame = Frame::parse(raw).unwrap();
        assert_eq!(frame.body, Body::Text("not json".to_string()));
    }

    #[test]
    fn test_parse_non_json_content_type_keeps_text() {
        let raw = "MESSAGE\ncontent-type:text/plain\n\n{\"a\":1}\0";
        let frame = Frame::parse(raw).unwrap();
        assert_eq!(frame.body, Body::Text("{\"a\":1}".to_string()));
    }

    #[test]
    fn test_parse_value_containing_colon() {
        let raw = "ERROR\nmessage:Bad CONNECT: access refused\n\n\0";
        let frame = Frame::parse(raw).unwrap();
        assert_eq!(frame.header("message"), Some("Bad CONNECT: access refused"));
    }

    #[test]
    fn test_parse_skips_leading_eols_and_crlf() {
        let raw = "\n\nCONNECTED\r\nversion:1.2\r\nheart-beat:10000,10000\r\n\r\n\0";
        let frame = Frame::parse(raw).unwrap();
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.header("version"), Some("1.2"));
        assert_eq!(frame.header("heart-beat"), Some("10000,10000"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_parse_repeated_header_keeps_first() {
        let raw = "MESSAGE\nfoo:first\nfoo:second\n\n\0";
        let frame = Frame::parse(raw).unwrap();
        assert_eq!(frame.header("foo"), Some("first"));
        assert_eq!(frame.headers.len(), 1);
    }

    #[test]
    fn test_parse_blank_is_heartbeat() {
        assert!(Frame::parse("\n").is_none());
        assert!(Frame::parse("").is_none());
        assert!(Frame::parse("\r\n\0").is_none());
    }

    #[test]
    fn test_parse_unknown_command() {
        let frame = Frame::parse("NACK\nid:1\n\n\0").unwrap();
        assert_eq!(frame.command, Command::Other("NACK".to_string()));
    }

    #[test]
    fn test_round_trip_preserves_headers_and_json_body() {
        let body = json!({"msg_id": "m-1", "content": "multi\nline", "n": 3});
        let frame = json_send_frame(
            "/exchange/ex_common/chat.user.7",
            body.to_string(),
            Headers::new().with("x-trace", "abc").with("priority", "4"),
        );

        let parsed = Frame::parse(&frame.encode()).unwrap();

        assert_eq!(parsed.command, Command::Send);
        let mut expected: Vec<_> = frame.headers.iter().collect();
        let mut actual: Vec<_> = parsed.headers.iter().collect();
        expected.sort_unstable();
        actual.sort_unstable();
        assert_eq!(actual, expected);
        assert_eq!(parsed.body, Body::Json(body));
    }

    #[test]
    fn test_round_trip_keeps_empty_and_padded_values() {
        let frame = Frame::new(Command::Send)
            .with_header("destination", "/q/a")
            .with_header("x-empty", "")
            .with_header("x-pad", " spaced ");

        let parsed = Frame::parse(&frame.encode()).unwrap();

        assert_eq!(parsed.header("destination"), Some("/q/a"));
        assert_eq!(parsed.header("x-empty"), Some(""));
        assert_eq!(parsed.header("x-pad"), Some(" spaced "));
        assert_eq!(parsed.headers.len(), 3);
    }

    #[test]
    fn test_encode_escapes_reserved_header_chars() {
        let frame = Frame::new(Command::Send).with_header("x:key", "a\\b\nc:d\r");

        assert_eq!(frame.encode(), "SEND\nx\\ckey:a\\\\b\\nc\\cd\\r\n\n\0");
        let parsed = Frame::parse(&frame.encode()).unwrap();
        assert_eq!(parsed.header("x:key"), Some("a\\b\nc:d\r"));
    }

    #[test]
    fn test_parse_unknown_escape_kept_verbatim() {
        let frame = Frame::parse("MESSAGE\nx-path:C:\\tmp\n\n\0").unwrap();
        assert_eq!(frame.header("x-path"), Some("C:\\tmp"));
    }

    #[test]
    fn test_parse_text_body_keeps_surrounding_whitespace() {
        let raw = "MESSAGE\ncontent-type:text/plain\n\n  two\nlines \n\0\n";
        let frame = Frame::parse(raw).unwrap();
        assert_eq!(frame.body, Body::Text("  two\nlines \n".to_string()));
    }

    #[test]
    fn test_parse_connected_values_are_trimmed() {
        let frame = Frame::parse("CONNECTED\nversion: 1.2\nserver: RabbitMQ/3.12 \n\n\0").unwrap();
        assert_eq!(frame.header("version"), Some("1.2"));
        assert_eq!(frame.header("server"), Some("RabbitMQ/3.12"));
    }

    #[test]
    fn test_json_send_frame_content_length_counts_bytes() {
        let frame = json_send_frame("/queue/a", "\"héllo\"".to_string(), Headers::new());
        assert_eq!(frame.header("content-length"), Some("8"));
        assert_eq!(frame.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_headers_merge_overrides_in_place() {
        let mut headers = Headers::new().with("id", "sub-1").with("ack", "auto");
        headers.merge(Headers::new().with("ack", "client").with("durable", "true"));

        let entries: Vec<_> = headers.iter().collect();
        assert_eq!(
            entries,
            vec![("id", "sub-1"), ("ack", "client"), ("durable", "true")]
        );
        assert_eq!(headers.remove("ack"), Some("client".to_string()));
        assert!(!headers.contains_key("ack"));
    }
}
