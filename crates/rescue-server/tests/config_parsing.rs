use std::{env, fs};

use rescue_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("rescue.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
body_limit_bytes = 4096

[logging]
level = "debug"

[assignment]
tie_tolerance_km = 0.01
compensation_attempts = 3

[notifications]
reconnect_base_delay_ms = 100
reconnect_max_delay_ms = 400
reconnect_max_attempts = 4
queue_capacity = 32

[geocoding]
enabled = true
base_url = "http://localhost:9999/v1"
api_key = "pk.test"

[seed]
path = "seed.json"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses; unspecified keys keep their defaults
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.server.body_limit_bytes, 4096);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    assert_eq!(cfg.assignment.tie_tolerance_km, 0.01);
    assert_eq!(cfg.assignment.compensation_attempts, 3);
    assert_eq!(cfg.notifications.reconnect_max_attempts, 4);
    assert_eq!(cfg.notifications.queue_capacity, 32);
    assert_eq!(cfg.notifications.handler_timeout_ms, 5000);
    assert_eq!(cfg.notifications.session_buffer, 64);
    assert!(cfg.geocoding.enabled);
    assert_eq!(cfg.geocoding.api_key.as_deref(), Some("pk.test"));
    assert_eq!(cfg.seed.path.as_deref(), Some("seed.json"));
    assert_eq!(cfg.addr().to_string(), "127.0.0.1:8081");

    // 2) Env override should win over file
    unsafe {
        env::set_var("RESCUE__NOTIFICATIONS__QUEUE_CAPACITY", "7");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.notifications.queue_capacity, 7);
    unsafe {
        env::remove_var("RESCUE__NOTIFICATIONS__QUEUE_CAPACITY");
    }

    // 3) Invalid config (base delay above cap) should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[notifications]
reconnect_base_delay_ms = 9000
reconnect_max_delay_ms = 1000
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("reconnect_base_delay_ms must be <="));

    // 4) A missing file falls back to defaults
    let missing = dir.path().join("missing.toml");
    let cfg_default = load_config(missing.to_str()).expect("defaults should load");
    assert_eq!(cfg_default.server.port, 8080);
    assert!(!cfg_default.geocoding.enabled);
}
