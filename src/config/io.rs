//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;

use super::types::BridgeConfig;
use crate::core::Identity;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file at the default path if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<BridgeConfig> {
    load_config_layered(&super::paths::config_path(), false)
}

/// Load configuration from an explicit file, then apply env overrides.
///
/// Unlike [`load_config`], a missing file is an error here.
pub fn load_config_from(path: &Path) -> Result<BridgeConfig> {
    load_config_layered(path, true)
}

fn load_config_layered(path: &Path, required: bool) -> Result<BridgeConfig> {
    let mut config = if path.exists() {
        load_config_from_path(path)?
    } else if required {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    } else {
        BridgeConfig::default()
    };

    // Environment has the highest precedence
    apply_env_overrides(&mut config)?;

    Ok(config)
}

/// Load configuration from a specific path, without env overrides
pub fn load_config_from_path(path: &Path) -> Result<BridgeConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    // Detect format by extension
    let config: BridgeConfig = if path.extension().map_or(false, |ext| ext == "json") {
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().map_or(false, |ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads `.env` first, then overlays any set `MIRAI_*` / `LOG_*` variables.
pub fn apply_env_overrides(config: &mut BridgeConfig) -> Result<()> {
    dotenvy::dotenv().ok();
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

/// Apply overrides from an arbitrary key lookup
pub(crate) fn apply_overrides_from<F>(config: &mut BridgeConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("MIRAI_HOST") {
        config.host = host;
    }
    if let Some(port) = lookup("MIRAI_PORT") {
        config.port = port
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid MIRAI_PORT '{}': {}", port, e)))?;
    }
    if let Some(key) = lookup("MIRAI_VERIFY_KEY") {
        config.verify_key = SecretString::from(key);
    }
    if let Some(ids) = lookup("MIRAI_QQ") {
        config.identities = ids
            .split(',')
            .filter(|id| !id.trim().is_empty())
            .map(str::parse::<Identity>)
            .collect::<Result<Vec<_>>>()?;
    }
    if let Some(timeout) = lookup("MIRAI_API_TIMEOUT") {
        config.api_timeout = parse_duration("MIRAI_API_TIMEOUT", &timeout)?;
    }
    if let Some(interval) = lookup("MIRAI_RECONNECT_INTERVAL") {
        config.reconnect_interval = parse_duration("MIRAI_RECONNECT_INTERVAL", &interval)?;
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.log.level = level;
    }
    if let Some(format) = lookup("LOG_FORMAT") {
        config.log.format = format;
    }

    Ok(())
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim())
        .map_err(|e| Error::Config(format!("Invalid {} '{}': {}", key, value, e)))
}

/// Save configuration to a file (the verify key is never written)
pub fn save_config(config: &BridgeConfig, path: &Path) -> Result<()> {
    let content = if path.extension().map_or(false, |ext| ext == "toml") {
        toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = BridgeConfig::default();
        config.identities = vec![Identity::new(123456)];
        config.api_timeout = Duration::from_secs(12);
        save_config(&config, &path).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.identities, config.identities);
        assert_eq!(loaded.api_timeout, Duration::from_secs(12));
        assert_eq!(loaded.verify_key.expose_secret(), "");
    }

    #[test]
    fn test_load_toml_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        std::fs::write(
            &path,
            r#"
host = "mirai.local"
port = 8765
verify_key = "INITKEY"
identities = [1, 2]
reconnect_interval = "1s"
"#,
        )
        .unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.host, "mirai.local");
        assert_eq!(config.port, 8765);
        assert_eq!(config.verify_key.expose_secret(), "INITKEY");
        assert_eq!(config.identities.len(), 2);
        assert_eq!(config.reconnect_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_missing_required_file() {
        let dir = tempdir().unwrap();
        let err = load_config_from(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MIRAI_HOST", "example.org"),
            ("MIRAI_PORT", "9000"),
            ("MIRAI_VERIFY_KEY", "k"),
            ("MIRAI_QQ", "123456, 654321,"),
            ("MIRAI_API_TIMEOUT", "2s"),
            ("MIRAI_RECONNECT_INTERVAL", "250ms"),
        ]);

        let mut config = BridgeConfig::default();
        apply_overrides_from(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.host, "example.org");
        assert_eq!(config.port, 9000);
        assert_eq!(config.verify_key.expose_secret(), "k");
        assert_eq!(
            config.identities,
            vec![Identity::new(123456), Identity::new(654321)]
        );
        assert_eq!(config.api_timeout, Duration::from_secs(2));
        assert_eq!(config.reconnect_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_bad_override_is_error() {
        let mut config = BridgeConfig::default();
        let err = apply_overrides_from(&mut config, |k| {
            (k == "MIRAI_PORT").then(|| "not-a-port".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
