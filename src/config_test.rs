use super::*;

#[test]
fn defaults_apply_when_only_url_given() {
    let cli = Cli::try_parse_from(["tether", "--url", "ws://127.0.0.1:3000/ws?cHJvamVjdA=="]).unwrap();
    let cfg = cli.into_config().unwrap();
    assert_eq!(cfg.target, "ws://127.0.0.1:3000/ws?cHJvamVjdA==");
    assert_eq!(cfg.heartbeat, Duration::from_millis(DEFAULT_HEARTBEAT_MS));
    assert_eq!(cfg.user_agent, DEFAULT_USER_AGENT);
}

#[test]
fn flags_override_defaults() {
    let cli = Cli::try_parse_from([
        "tether",
        "--url",
        "wss://hub.test/ws?$cHJvamVjdA==",
        "--heartbeat-ms",
        "250",
        "--user-agent",
        "probe/1",
    ])
    .unwrap();
    let cfg = cli.into_config().unwrap();
    assert_eq!(cfg.heartbeat, Duration::from_millis(250));
    assert_eq!(cfg.user_agent, "probe/1");
}

#[test]
fn rejects_non_websocket_target() {
    let err = ClientConfig::new("http://hub.test/ws").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidTarget(_)));
}

#[test]
fn rejects_zero_heartbeat() {
    let cli = Cli::try_parse_from(["tether", "--url", "ws://h/ws", "--heartbeat-ms", "0"]).unwrap();
    assert!(matches!(cli.into_config(), Err(ConfigError::ZeroHeartbeat)));
}

#[test]
fn default_user_agent_names_crate_version() {
    assert!(DEFAULT_USER_AGENT.starts_with("tether/"));
}
