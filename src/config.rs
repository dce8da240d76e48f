//! Configuration loading and persistence.
//!
//! Settings come from `{config_dir}/config.json` (camelCase keys), fall back
//! to defaults when the file is missing or unreadable, and are then
//! overridden by `STOMP_CHAT_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_DB_EXCHANGE, DEFAULT_HEARTBEAT_DESTINATION, DEFAULT_HEARTBEAT_INCOMING_MS,
    DEFAULT_HEARTBEAT_OUTGOING_MS, DEFAULT_PUBLISH_EXCHANGE, DEFAULT_RECONNECT_INTERVAL,
};
use crate::stomp::StompConfig;

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "STOMP_CHAT_CONFIG_DIR";

/// Configuration for a chat session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatConfig {
    /// Broker WebSocket endpoint.
    pub url: String,
    /// Virtual host sent in CONNECT.
    pub vhost: String,
    /// Broker login.
    pub login: String,
    /// Broker passcode. Never logged.
    pub passcode: String,
    /// Heartbeat period requested from the broker, in milliseconds.
    pub heartbeat_incoming: u64,
    /// Client heartbeat period in milliseconds; 0 disables it.
    pub heartbeat_outgoing: u64,
    /// Presence destination for heartbeats.
    pub heartbeat_queue: String,
    /// Queue name for chat subscriptions; generated per session when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe_queue: Option<String>,
    /// Exchange chat messages are published to and consumed from.
    pub publish_queue: String,
    /// Exchange receiving the persistence copy of each message.
    pub db_exchange_name: String,
    /// Own routing key; `chat.user.{user_id}` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_key: Option<String>,
    /// Routing keys to subscribe on connect; the own key when empty.
    pub group_routing_keys: Vec<String>,
    /// Local user id.
    pub user_id: String,
    /// Fixed delay between reconnect attempts, in milliseconds.
    pub reconnect_interval_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:15674/ws".to_string(),
            vhost: "/".to_string(),
            login: "myuser".to_string(),
            passcode: "mypassword".to_string(),
            heartbeat_incoming: DEFAULT_HEARTBEAT_INCOMING_MS,
            heartbeat_outgoing: DEFAULT_HEARTBEAT_OUTGOING_MS,
            heartbeat_queue: DEFAULT_HEARTBEAT_DESTINATION.to_string(),
            subscribe_queue: None,
            publish_queue: DEFAULT_PUBLISH_EXCHANGE.to_string(),
            db_exchange_name: DEFAULT_DB_EXCHANGE.to_string(),
            routing_key: None,
            group_routing_keys: Vec::new(),
            user_id: String::new(),
            reconnect_interval_ms: u64::try_from(DEFAULT_RECONNECT_INTERVAL.as_millis())
                .unwrap_or(3000),
        }
    }
}

impl ChatConfig {
    /// Returns the configuration directory path.
    ///
    /// `STOMP_CHAT_CONFIG_DIR` when set, otherwise the platform config dir
    /// (Linux: `~/.config/stomp-chat`).
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("stomp-chat"))
    }

    /// Path of the default config file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads the default config file (or defaults), then env overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable config {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads an explicit config file. No env overrides are applied.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Persists the configuration as pretty JSON, owner read/write only.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;

        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Applies `STOMP_CHAT_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`. Unparsable numbers are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("STOMP_CHAT_URL") {
            self.url = url;
        }
        if let Some(vhost) = lookup("STOMP_CHAT_VHOST") {
            self.vhost = vhost;
        }
        if let Some(login) = lookup("STOMP_CHAT_LOGIN") {
            self.login = login;
        }
        if let Some(passcode) = lookup("STOMP_CHAT_PASSCODE") {
            self.passcode = passcode;
        }
        if let Some(user_id) = lookup("STOMP_CHAT_USER_ID") {
            self.user_id = user_id;
        }
        if let Some(exchange) = lookup("STOMP_CHAT_EXCHANGE") {
            self.publish_queue = exchange;
        }
        if let Some(db_exchange) = lookup("STOMP_CHAT_DB_EXCHANGE") {
            self.db_exchange_name = db_exchange;
        }

        if let Some(ms) = lookup("STOMP_CHAT_HEARTBEAT_OUTGOING") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.heartbeat_outgoing = ms;
            }
        }
        if let Some(ms) = lookup("STOMP_CHAT_HEARTBEAT_INCOMING") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.heartbeat_incoming = ms;
            }
        }
        if let Some(ms) = lookup("STOMP_CHAT_RECONNECT_INTERVAL_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.reconnect_interval_ms = ms;
            }
        }

        if let Some(keys) = lookup("STOMP_CHAT_GROUP_ROUTING_KEYS") {
            match serde_json::from_str::<Vec<String>>(&keys) {
                Ok(keys) => self.group_routing_keys = keys,
                Err(e) => log::warn!("Ignoring STOMP_CHAT_GROUP_ROUTING_KEYS: {}", e),
            }
        }
    }

    /// Reconnect interval as a [`Duration`].
    #[must_use]
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Handshake and heartbeat settings for the STOMP session.
    #[must_use]
    pub fn stomp_config(&self) -> StompConfig {
        StompConfig {
            vhost: self.vhost.clone(),
            login: self.login.clone(),
            passcode: self.passcode.clone(),
            heartbeat_outgoing: Duration::from_millis(self.heartbeat_outgoing),
            heartbeat_incoming: Duration::from_millis(self.heartbeat_incoming),
            heartbeat_destination: self.heartbeat_queue.clone(),
        }
    }

    /// Copy with the passcode masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.passcode.is_empty() {
            config.passcode = "********".to_string();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ChatConfig::default();
        assert_eq!(config.url, "ws://localhost:15674/ws");
        assert_eq!(config.vhost, "/");
        assert_eq!(config.heartbeat_outgoing, 10_000);
        assert_eq!(config.heartbeat_incoming, 10_000);
        assert_eq!(config.heartbeat_queue, "/exchange/ex_presence");
        assert_eq!(config.publish_queue, "ex_common");
        assert_eq!(config.db_exchange_name, "db_ex");
        assert_eq!(config.reconnect_interval(), Duration::from_millis(3000));
        assert!(config.group_routing_keys.is_empty());
    }

    #[test]
    fn test_camel_case_keys_and_partial_file() {
        let config: ChatConfig = serde_json::from_str(
            r#"{"userId":"42","publishQueue":"ex_team","groupRoutingKeys":["chat.user.42","chat.group.1"],"heartbeatOutgoing":0}"#,
        )
        .unwrap();

        assert_eq!(config.user_id, "42");
        assert_eq!(config.publish_queue, "ex_team");
        assert_eq!(config.group_routing_keys, vec!["chat.user.42", "chat.group.1"]);
        assert_eq!(config.heartbeat_outgoing, 0);
        assert_eq!(config.vhost, "/");

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"dbExchangeName\":\"db_ex\""));
        assert!(json.contains("\"reconnectIntervalMs\":3000"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ChatConfig::default();
        config.apply_overrides(env(&[
            ("STOMP_CHAT_URL", "wss://broker.example.com/ws"),
            ("STOMP_CHAT_USER_ID", "7"),
            ("STOMP_CHAT_EXCHANGE", "ex_other"),
            ("STOMP_CHAT_HEARTBEAT_OUTGOING", "2500"),
            ("STOMP_CHAT_RECONNECT_INTERVAL_MS", "500"),
            ("STOMP_CHAT_GROUP_ROUTING_KEYS", r#"["a","b"]"#),
        ]));

        assert_eq!(config.url, "wss://broker.example.com/ws");
        assert_eq!(config.user_id, "7");
        assert_eq!(config.publish_queue, "ex_other");
        assert_eq!(config.heartbeat_outgoing, 2500);
        assert_eq!(config.reconnect_interval_ms, 500);
        assert_eq!(config.group_routing_keys, vec!["a", "b"]);
    }

    #[test]
    fn test_env_overrides_ignore_bad_values() {
        let mut config = ChatConfig::default();
        config.apply_overrides(env(&[
            ("STOMP_CHAT_HEARTBEAT_INCOMING", "soon"),
            ("STOMP_CHAT_RECONNECT_INTERVAL_MS", "-1"),
            ("STOMP_CHAT_GROUP_ROUTING_KEYS", "chat.user.1"),
        ]));

        assert_eq!(config, ChatConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");

        let config = ChatConfig {
            user_id: "42".to_string(),
            subscribe_queue: Some("chat_queue_fixed".to_string()),
            ..ChatConfig::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(ChatConfig::load_from(&path).unwrap(), config);

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_load_from_invalid_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        assert!(ChatConfig::load_from(&path).is_err());
        assert!(ChatConfig::load_from(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_stomp_config_and_redaction() {
        let config = ChatConfig::default();
        let stomp = config.stomp_config();
        assert_eq!(stomp.heartbeat_outgoing, Duration::from_millis(10_000));
        assert_eq!(stomp.heartbeat_destination, "/exchange/ex_presence");
        assert_eq!(stomp.login, "myuser");

        let shown = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("mypassword"));
    }
}
