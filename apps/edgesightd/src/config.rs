//! Daemon configuration.
//!
//! Stored as TOML at `~/.config/edgesight/edgesightd.toml` (created with
//! defaults on first run). `EDGESIGHT_PORT` and `EDGESIGHT_TARGET`
//! override the file for quick redeploys without editing it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use edgesight_server::ResultMode;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Device id reported in status telemetry (hostname by default).
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Session server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// What the server writes back for processed frames.
    #[serde(default = "default_result_mode")]
    pub result_mode: ResultMode,

    /// JPEG quality for encoded frames.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Optional target for the loopback heartbeat client,
    /// e.g. `ws://127.0.0.1:50051`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

fn default_device_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "device_001".into())
}

fn default_port() -> u16 {
    50051
}

fn default_result_mode() -> ResultMode {
    ResultMode::Detections
}

fn default_jpeg_quality() -> u8 {
    85
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            port: default_port(),
            result_mode: default_result_mode(),
            jpeg_quality: default_jpeg_quality(),
            target: None,
        }
    }
}

impl Config {
    /// Loads configuration from disk (creating a default file if missing),
    /// then applies environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            let config = Config::default();
            config.save(&path)?;
            config
        };

        config.apply_overrides(
            std::env::var("EDGESIGHT_PORT").ok(),
            std::env::var("EDGESIGHT_TARGET").ok(),
        );
        Ok(config)
    }

    /// Saves the configuration to the given path.
    pub fn save(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies port/target overrides; non-numeric ports are ignored.
    fn apply_overrides(&mut self, port: Option<String>, target: Option<String>) {
        if let Some(port) = port.and_then(|p| p.parse::<u16>().ok()) {
            self.port = port;
        }
        if let Some(target) = target {
            if !target.is_empty() {
                self.target = Some(target);
            }
        }
    }
}

/// Returns the platform configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    Ok(PathBuf::from(home)
        .join(".config")
        .join("edgesight")
        .join("edgesightd.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(!config.device_id.is_empty());
        assert_eq!(config.port, 50051);
        assert_eq!(config.result_mode, ResultMode::Detections);
        assert_eq!(config.jpeg_quality, 85);
        assert!(config.target.is_none());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = Config {
            device_id: "cam-unit-7".into(),
            port: 6000,
            result_mode: ResultMode::AnnotatedFrame,
            jpeg_quality: 70,
            target: Some("ws://127.0.0.1:6000".into()),
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.device_id, "cam-unit-7");
        assert_eq!(parsed.port, 6000);
        assert_eq!(parsed.result_mode, ResultMode::AnnotatedFrame);
        assert_eq!(parsed.target.as_deref(), Some("ws://127.0.0.1:6000"));
    }

    #[test]
    fn config_partial_toml() {
        // Only specify the port, rest should use defaults.
        let config: Config = toml::from_str("port = 9000").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.result_mode, ResultMode::Detections);
        assert!(config.target.is_none());
    }

    #[test]
    fn overrides_apply() {
        let mut config = Config::default();
        config.apply_overrides(Some("7070".into()), Some("ws://host:1".into()));
        assert_eq!(config.port, 7070);
        assert_eq!(config.target.as_deref(), Some("ws://host:1"));

        // Bad port and empty target leave the config untouched.
        config.apply_overrides(Some("not-a-port".into()), Some(String::new()));
        assert_eq!(config.port, 7070);
        assert_eq!(config.target.as_deref(), Some("ws://host:1"));
    }

    #[test]
    fn config_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("edgesightd.toml");

        let config = Config {
            device_id: "save-test".into(),
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded: Config = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.device_id, "save-test");
    }
}
