mod common;

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use message_intake::config::{AckConfig, Config};
use message_intake::error::IntakeError;

use common::{test_config, PRIMARY, SECONDARY};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn minimal_file_uses_defaults() {
    let file = write_config(&format!(
        r#"{{
            "server": {{ "base_url": "https://chat.example.org" }},
            "identities": {{ "primary": "{PRIMARY}" }}
        }}"#
    ));

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.ack_config(), AckConfig::default());
    assert_eq!(config.ack_config().max_concurrent, 5);
    assert_eq!(config.ack_config().max_attempts, 3);
    assert_eq!(config.server.connect_timeout(), Duration::from_secs(3));
    assert_eq!(config.server.timeout(), Duration::from_secs(10));
    assert_eq!(config.push_drain_timeout(), None);
    assert_eq!(config.local_identities().secondary, None);
}

#[test]
fn full_file_round_trips_every_section() {
    let file = write_config(&format!(
        r#"{{
            "server": {{
                "base_url": "https://chat.example.org",
                "username": "acct.2",
                "password": "secret",
                "connect_timeout_secs": 1,
                "timeout_secs": 4
            }},
            "identities": {{ "primary": "{PRIMARY}", "secondary": "{SECONDARY}" }},
            "ack": {{ "max_concurrent": 2 }},
            "push": {{ "drain_timeout_secs": 30 }}
        }}"#
    ));

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.server.username.as_deref(), Some("acct.2"));
    assert_eq!(config.server.timeout(), Duration::from_secs(4));
    assert_eq!(
        config.ack_config(),
        AckConfig {
            max_concurrent: 2,
            max_attempts: 3,
            initial_backoff_ms: 250,
        }
    );
    assert_eq!(config.push_drain_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(
        config.local_identities().secondary.map(|id| id.to_string()),
        Some(SECONDARY.to_string())
    );
}

#[test]
fn missing_or_malformed_file_is_a_config_error() {
    assert!(matches!(
        Config::from_file("/nonexistent/message-intake.json"),
        Err(IntakeError::Config(_))
    ));
    let file = write_config("{ not json");
    assert!(matches!(
        Config::from_file(file.path()),
        Err(IntakeError::Config(_))
    ));
    let file = write_config(r#"{ "server": { "base_url": "x" }, "identities": { "primary": "nope" } }"#);
    assert!(matches!(
        Config::from_file(file.path()),
        Err(IntakeError::Config(_))
    ));
}

#[test]
fn validate_rejects_unusable_settings() {
    let mut config = test_config("  ");
    assert!(matches!(config.validate(), Err(IntakeError::Config(_))));

    config = test_config("http://localhost");
    assert!(config.validate().is_ok());

    config.ack = Some(AckConfig {
        max_concurrent: 0,
        ..AckConfig::default()
    });
    assert!(matches!(config.validate(), Err(IntakeError::Config(_))));

    config.ack = Some(AckConfig {
        max_attempts: 0,
        ..AckConfig::default()
    });
    assert!(matches!(config.validate(), Err(IntakeError::Config(_))));

    config = test_config("http://localhost");
    config.identities.secondary = Some(config.identities.primary);
    assert!(matches!(config.validate(), Err(IntakeError::Config(_))));
}
