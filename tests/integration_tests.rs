use remote_uart::domain::config::{FlowControlConfig, ParityConfig};
use remote_uart::infrastructure::config::ConfigManager;
use remote_uart::{ConnectionParams, DeviceId, RemoteUartConfig, RemoteUartError};

/// Integration tests for the Remote UART library
#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = RemoteUartConfig::default();
        let toml_str = toml::to_string(&config).expect("Failed to serialize config");
        let deserialized: RemoteUartConfig = toml::from_str(&toml_str).expect("Failed to deserialize config");

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_config_file() {
        let config: RemoteUartConfig = toml::from_str(
            r#"
            log_level = "debug"

            [server]
            poll_delay_ms = 10

            [serial]
            parity = "even"
            flow_control = "hardware"
            "#,
        )
        .expect("Failed to parse config");

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.server.poll_delay_ms, 10);
        assert_eq!(config.server.port, 8765);
        assert_eq!(config.serial.parity, ParityConfig::Even);
        assert_eq!(config.serial.flow_control, FlowControlConfig::Hardware);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.client.exit_key, 0x1D);
    }

    #[test]
    fn test_project_config_replaces_global() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.toml");
        std::fs::write(&global, "log_level = \"warn\"\n[server]\nport = 9000\n").unwrap();

        let manager = ConfigManager::with_paths(global.clone(), None);
        let config = manager.load_config().unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.log_level, "warn");

        let project_dir = dir.path().join("bench");
        let project = manager.init_project_config(&project_dir).unwrap();
        let manager = ConfigManager::with_paths(global, Some(project));
        let config = manager.load_config().unwrap();
        assert_eq!(config, RemoteUartConfig::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\npoll_delay_ms = 0\n").unwrap();

        let manager = ConfigManager::with_paths(path.clone(), None);
        let error = manager.load_config_from_path(&path).unwrap_err();
        assert!(matches!(error, RemoteUartError::Config { .. }));
    }

    #[test]
    fn test_client_url_matches_listener_parsing() {
        let params = ConnectionParams::new("/dev/tty.usbserial 1", 921600).unwrap();
        let url = params.to_url("raspberrypi.local", 8765).unwrap();

        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.host_str(), Some("raspberrypi.local"));

        let target = format!("{}?{}", url.path(), url.query().unwrap_or_default());
        let parsed = ConnectionParams::from_request_target(&target).unwrap();
        assert_eq!(parsed, params);
        assert_eq!(parsed.device, DeviceId::new("/dev/tty.usbserial 1"));
    }

    #[test]
    fn test_error_display() {
        let error = RemoteUartError::Config {
            message: "Invalid configuration".to_string(),
        };
        assert!(error.to_string().contains("Configuration error"));
        assert!(error.to_string().contains("Invalid configuration"));
    }
}
