//! Configuration management for pathwarden.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{EngineSettings, Escalation};
use crate::enforcer::SystemType;
use crate::error::GuardError;
use crate::matcher::{default_patterns, default_whitelist};
use crate::validation::{parse_interval, parse_network};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/pathwarden/config.yaml";
pub const DEFAULT_STORAGE_FILE: &str = "/var/lib/pathwarden/blocked_ips.json";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Block store file
    pub storage_file: PathBuf,

    /// Suspicious requests tolerated before the first block
    pub grace_period: u32,

    /// Timed blocks (true) or permanent bans (false) past the grace period
    pub timeout_enabled: bool,

    /// Base timeout, e.g. "24h"
    pub timeout_duration: String,

    /// How repeated timeouts grow (linear, geometric)
    pub escalation: Escalation,

    /// Periodically remove expired blocks
    pub cleanup_enabled: bool,

    /// Interval between sweeps, e.g. "1h"
    pub cleanup_interval: String,

    /// Packet filter to drive (auto, linux, darwin, windows, noop)
    pub system_type: String,

    /// Suspicious path prefixes (case-insensitive)
    pub patterns: Vec<String>,

    /// Addresses or CIDRs that are never blocked
    pub whitelist: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_file: PathBuf::from(DEFAULT_STORAGE_FILE),
            grace_period: 3,
            timeout_enabled: true,
            timeout_duration: "24h".to_string(),
            escalation: Escalation::Linear,
            cleanup_enabled: true,
            cleanup_interval: "1h".to_string(),
            system_type: "auto".to_string(),
            patterns: default_patterns(),
            whitelist: default_whitelist(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path.as_ref()))?;

        Ok(config)
    }

    /// Load `path` if it exists, the built-in defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config file at {:?}, using defaults", path.as_ref());
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), GuardError> {
        if self.storage_file.as_os_str().is_empty() {
            return Err(GuardError::Config("storage_file cannot be empty".to_string()));
        }

        let timeout = parse_interval(&self.timeout_duration).map_err(|e| {
            GuardError::Config(format!(
                "Invalid timeout_duration '{}': {}. Use format like '30m', '24h', '7d'",
                self.timeout_duration, e
            ))
        })?;
        if timeout.is_zero() {
            return Err(GuardError::Config("timeout_duration must be greater than zero".to_string()));
        }

        let interval = parse_interval(&self.cleanup_interval).map_err(|e| {
            GuardError::Config(format!(
                "Invalid cleanup_interval '{}': {}. Use format like '15m', '1h'",
                self.cleanup_interval, e
            ))
        })?;
        if interval.is_zero() {
            return Err(GuardError::Config("cleanup_interval must be greater than zero".to_string()));
        }

        for pattern in &self.patterns {
            if pattern.trim().is_empty() {
                return Err(GuardError::Config("Empty entry in patterns".to_string()));
            }
            if !pattern.starts_with('/') {
                return Err(GuardError::Config(format!(
                    "Pattern '{}' must start with '/'",
                    pattern
                )));
            }
        }

        for entry in &self.whitelist {
            parse_network(entry)
                .map_err(|e| GuardError::Config(format!("Invalid whitelist entry: {}", e)))?;
        }

        Ok(())
    }

    /// Save configuration to YAML file atomically
    ///
    /// Uses tempfile + rename pattern to prevent corruption on crash.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let path = path.as_ref();
        let content = serde_yaml::to_string(self).with_context(|| "Failed to serialize config")?;

        let parent_dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .context("Failed to create temporary file for config")?;

        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file().sync_all()?;

        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist config file: {:?}", path))?;

        Ok(())
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_interval(&self.timeout_duration)
    }

    pub fn cleanup_period(&self) -> Result<Duration> {
        parse_interval(&self.cleanup_interval)
    }

    pub fn system(&self) -> SystemType {
        SystemType::parse(&self.system_type)
    }

    pub fn engine_settings(&self) -> Result<EngineSettings> {
        Ok(EngineSettings {
            grace_period: self.grace_period,
            timeout_enabled: self.timeout_enabled,
            timeout_duration: self.timeout()?,
            escalation: self.escalation,
        })
    }

    /// Generate default config with comments
    pub fn generate_default_yaml() -> String {
        include_str!("../templates/config.yaml").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.grace_period, 3);
        assert!(config.timeout_enabled);
        assert_eq!(config.timeout().unwrap(), Duration::from_secs(86_400));
        assert_eq!(config.cleanup_period().unwrap(), Duration::from_secs(3600));
        assert_eq!(config.escalation, Escalation::Linear);
        assert!(config.patterns.contains(&"/.env".to_string()));
        assert_eq!(config.whitelist, vec!["127.0.0.1", "::1"]);
        config.validate().unwrap();
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config: Config = serde_yaml::from_str(&Config::generate_default_yaml()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_yaml::from_str("grace_period: 0\nescalation: geometric\n").unwrap();
        assert_eq!(config.grace_period, 0);
        assert_eq!(config.escalation, Escalation::Geometric);
        assert_eq!(config.cleanup_interval, "1h");
        assert_eq!(config.storage_file, PathBuf::from(DEFAULT_STORAGE_FILE));
    }

    #[test]
    fn test_unknown_escalation_rejected() {
        assert!(serde_yaml::from_str::<Config>("escalation: exponential\n").is_err());
    }

    #[test]
    fn test_validation_invalid_interval() {
        let config = Config {
            timeout_duration: "24x".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_duration"));

        let config = Config {
            cleanup_interval: "soon".to_string(),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("cleanup_interval"));
    }

    #[test]
    fn test_validation_zero_durations() {
        let config = Config {
            timeout_duration: "0h".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            cleanup_interval: "0s".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_patterns() {
        let config = Config {
            patterns: vec!["wp-admin".to_string()],
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("must start with '/'"));

        let config = Config {
            patterns: vec![" ".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_whitelist() {
        let config = Config {
            whitelist: vec!["10.0.0.0/8".to_string(), "192.0.2.1".to_string()],
            ..Default::default()
        };
        config.validate().unwrap();

        let config = Config {
            whitelist: vec!["10.0.0.0/40".to_string()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(GuardError::Config(_))));
    }

    #[test]
    fn test_validation_empty_storage_file() {
        let config = Config {
            storage_file: PathBuf::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_system_type_is_not_a_validation_error() {
        let config = Config {
            system_type: "plan9".to_string(),
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.system(), SystemType::Unknown("plan9".to_string()));
    }

    #[test]
    fn test_engine_settings() {
        let config = Config {
            grace_period: 1,
            timeout_enabled: false,
            timeout_duration: "30m".to_string(),
            ..Default::default()
        };
        let settings = config.engine_settings().unwrap();
        assert_eq!(settings.grace_period, 1);
        assert!(!settings.timeout_enabled);
        assert_eq!(settings.timeout_duration, Duration::from_secs(1800));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let config = Config {
            grace_period: 7,
            system_type: "noop".to_string(),
            whitelist: vec!["10.0.0.0/8".to_string()],
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "cleanup_interval: forever\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("cleanup_interval"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
