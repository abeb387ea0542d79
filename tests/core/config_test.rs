use std::time::Duration;

use tempfile::tempdir;
use warden_core::config::{TimeoutConfig, WardenConfig, DEFAULT_HOST_FEATURES};

#[test]
fn test_defaults_validate() {
    let config = WardenConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.distribution.target_version, 2);
    assert_eq!(config.network_name, "warden-net");
    assert_eq!(config.required_features, DEFAULT_HOST_FEATURES);
    assert!(config.service("qdrant").is_some());
    assert!(config.service("nonexistent").is_none());
}

#[test]
fn test_save_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("warden.toml");

    let mut config = WardenConfig::default();
    config.distribution.name = "analysis".to_string();
    config.resources.memory_gb = Some(8);
    config.save(&path).unwrap();

    let loaded = WardenConfig::from_file(&path).unwrap();
    assert_eq!(loaded.distribution.name, "analysis");
    assert_eq!(loaded.resources.memory_gb, Some(8));
    assert_eq!(loaded.services.len(), config.services.len());
}

#[test]
fn test_partial_file_keeps_defaults() {
    let config = WardenConfig::from_toml(
        r#"
network_name = "lab-net"

[distribution]
name = "lab"

[timeouts]
command_secs = 12
"#,
    )
    .unwrap();

    assert_eq!(config.distribution.name, "lab");
    assert_eq!(config.distribution.default_user, "analyst");
    assert_eq!(config.network_name, "lab-net");
    assert_eq!(config.timeouts.command(), Duration::from_secs(12));
    assert_eq!(config.timeouts.install(), Duration::from_secs(300));
}

#[test]
fn test_validation_failures() {
    let mut config = WardenConfig::default();
    config.distribution.name = "two words".to_string();
    assert!(config.validate().is_err());

    let mut config = WardenConfig::default();
    config.distribution.default_user = "Root User".to_string();
    assert!(config.validate().is_err());

    let mut config = WardenConfig::default();
    config.timeouts.probe_ms = 0;
    assert!(config.validate().is_err());

    let mut config = WardenConfig::default();
    let duplicate = config.services[0].clone();
    config.services.push(duplicate);
    assert!(config.validate().is_err());
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "distribution = [").unwrap();

    let err = WardenConfig::load(Some(path.as_path())).unwrap_err();
    assert!(err.to_string().to_lowercase().contains("config"));
}

#[test]
fn test_immediate_timeouts() {
    let timeouts = TimeoutConfig::immediate();
    assert!(timeouts.settle().is_zero());
    assert!(timeouts.restart_delay().is_zero());
    assert_eq!(timeouts.probe(), Duration::from_millis(200));
}
