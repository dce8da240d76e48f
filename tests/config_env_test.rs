//! Integration tests for configuration loading from the config directory
//! and `STOMP_CHAT_*` environment variables.

use std::env;
use std::fs;
use std::sync::Mutex;

use stomp_chat::config::CONFIG_DIR_ENV;
use stomp_chat::ChatConfig;
use tempfile::TempDir;

// Global lock to prevent env var pollution between tests
static ENV_LOCK: Mutex<()> = Mutex::new(());

const OVERRIDE_VARS: &[&str] = &[
    "STOMP_CHAT_URL",
    "STOMP_CHAT_VHOST",
    "STOMP_CHAT_LOGIN",
    "STOMP_CHAT_PASSCODE",
    "STOMP_CHAT_USER_ID",
    "STOMP_CHAT_EXCHANGE",
    "STOMP_CHAT_DB_EXCHANGE",
    "STOMP_CHAT_HEARTBEAT_OUTGOING",
    "STOMP_CHAT_HEARTBEAT_INCOMING",
    "STOMP_CHAT_RECONNECT_INTERVAL_MS",
    "STOMP_CHAT_GROUP_ROUTING_KEYS",
];

/// Point the config dir at a fresh temp dir and clear overrides.
fn setup_test_env() -> (TempDir, std::sync::MutexGuard<'static, ()>) {
    let guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let temp_dir = TempDir::new().unwrap();

    for var in OVERRIDE_VARS {
        env::remove_var(var);
    }
    env::set_var(CONFIG_DIR_ENV, temp_dir.path());

    (temp_dir, guard)
}

#[test]
fn test_load_without_file_uses_defaults() {
    let (_dir, _guard) = setup_test_env();

    let config = ChatConfig::load().unwrap();

    assert_eq!(config, ChatConfig::default());
}

#[test]
fn test_load_reads_file_then_env_wins() {
    let (dir, _guard) = setup_test_env();
    fs::write(
        dir.path().join("config.json"),
        r#"{"userId":"42","url":"ws://file-broker/ws","publishQueue":"ex_file"}"#,
    )
    .unwrap();
    env::set_var("STOMP_CHAT_URL", "ws://env-broker/ws");
    env::set_var("STOMP_CHAT_RECONNECT_INTERVAL_MS", "1500");

    let config = ChatConfig::load().unwrap();

    assert_eq!(config.user_id, "42");
    assert_eq!(config.publish_queue, "ex_file");
    assert_eq!(config.url, "ws://env-broker/ws");
    assert_eq!(config.reconnect_interval_ms, 1500);

    for var in OVERRIDE_VARS {
        env::remove_var(var);
    }
}

#[test]
fn test_load_with_corrupt_file_falls_back_to_defaults() {
    let (dir, _guard) = setup_test_env();
    fs::write(dir.path().join("config.json"), "{ definitely not json").unwrap();

    let config = ChatConfig::load().unwrap();

    assert_eq!(config, ChatConfig::default());
}

#[test]
fn test_saved_config_is_loaded_back() {
    let (_dir, _guard) = setup_test_env();
    let path = ChatConfig::config_path().unwrap();

    let config = ChatConfig {
        user_id: "7".to_string(),
        group_routing_keys: vec!["chat.user.7".to_string(), "chat.group.3".to_string()],
        ..ChatConfig::default()
    };
    config.save_to(&path).unwrap();

    assert_eq!(ChatConfig::load().unwrap(), config);
}
