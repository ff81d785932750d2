//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/sensorlink/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/sensorlink/` (~/.config/sensorlink/)
//! - Data: `$XDG_DATA_HOME/sensorlink/` (~/.local/share/sensorlink/)
//! - State/Logs: `$XDG_STATE_HOME/sensorlink/` (~/.local/state/sensorlink/)

use crate::error::{Error, Result};
use crate::types::{Mode, SensorIdentity};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Sensor identity and collector endpoint
    #[serde(default)]
    pub sensor: SensorConfig,

    /// Local store settings (standalone deployments)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// HTTP channel settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the router picks between the local store and the collector
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModeSetting {
    /// Local when the host is a loopback name, remote otherwise
    #[default]
    Auto,
    Local,
    Remote,
}

/// Sensor identity and the collector it reports to
#[derive(Debug, Deserialize, Clone)]
pub struct SensorConfig {
    /// Collector host; `localhost`/`127.0.0.1` means standalone
    #[serde(default = "default_host")]
    pub host: String,

    /// Collector port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Sensor name used for login and stat attribution
    #[serde(default = "default_username")]
    pub username: String,

    /// Sensor password for the login handshake
    #[serde(default)]
    pub password: String,

    /// Use https instead of http
    #[serde(default)]
    pub ssl: bool,

    /// Mask captured passwords before local storage
    #[serde(default = "default_anonymize")]
    pub anonymize: bool,

    /// Transport selection
    #[serde(default)]
    pub mode: ModeSetting,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: default_username(),
            password: String::new(),
            ssl: false,
            anonymize: default_anonymize(),
            mode: ModeSetting::default(),
        }
    }
}

impl SensorConfig {
    /// Build the immutable identity handed to the router
    pub fn identity(&self) -> SensorIdentity {
        SensorIdentity {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            anonymize: self.anonymize,
            ssl: self.ssl,
        }
    }

    /// Mode the router will use for this sensor
    pub fn resolved_mode(&self) -> Mode {
        match self.mode {
            ModeSetting::Auto => Mode::detect(&self.host),
            ModeSetting::Local => Mode::Local,
            ModeSetting::Remote => Mode::Remote,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_username() -> String {
    "sensor".to_string()
}

fn default_anonymize() -> bool {
    true
}

/// Local SQLite store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Database file; a `sqlite:///` URL prefix is accepted and stripped
    pub path: Option<String>,

    /// Maximum idle connections kept by the pool
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// How long a writer waits on a locked database, in milliseconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl DatabaseConfig {
    /// Resolved database file path, falling back to the XDG data dir
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(raw) => PathBuf::from(raw.strip_prefix("sqlite:///").unwrap_or(raw.as_str())),
            None => Config::database_path(),
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_pool_size() -> usize {
    4
}

fn default_busy_timeout() -> u64 {
    5000
}

/// HTTP channel configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// Concurrent in-flight requests
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// TCP/TLS connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Retry attempts for blocking calls (login, services)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Grace period for in-flight requests when the client is dropped
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_retries: default_max_retries(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

fn default_workers() -> usize {
    10
}

fn default_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_retries() -> usize {
    3
}

fn default_drain_timeout() -> u64 {
    5
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.sensor.host.trim().is_empty() {
            return Err(Error::Config("sensor.host must not be empty".to_string()));
        }
        if self.sensor.port == 0 {
            return Err(Error::Config("sensor.port must not be 0".to_string()));
        }
        if self.sensor.username.trim().is_empty() {
            return Err(Error::Config(
                "sensor.username must not be empty".to_string(),
            ));
        }
        if self.transport.workers == 0 || self.transport.workers > 64 {
            return Err(Error::Config(
                "transport.workers must be between 1 and 64".to_string(),
            ));
        }
        if self.database.pool_size == 0 {
            return Err(Error::Config(
                "database.pool_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/sensorlink/config.toml` (~/.config/sensorlink/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("sensorlink").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/sensorlink/` (~/.local/share/sensorlink/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("sensorlink")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/sensorlink/` (~/.local/state/sensorlink/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("sensorlink")
    }

    /// Returns the default database file path
    ///
    /// `$XDG_DATA_HOME/sensorlink/sensor.db` (~/.local/share/sensorlink/sensor.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("sensor.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/sensorlink/sensorlink.log` (~/.local/state/sensorlink/sensorlink.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("sensorlink.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sensor.host, "127.0.0.1");
        assert_eq!(config.sensor.port, 8080);
        assert!(config.sensor.anonymize);
        assert!(!config.sensor.ssl);
        assert_eq!(config.sensor.mode, ModeSetting::Auto);
        assert_eq!(config.transport.workers, 10);
        assert_eq!(config.transport.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[sensor]
host = "collector.example.net"
port = 8443
username = "edge-01"
password = "hunter2"
ssl = true
anonymize = false
mode = "remote"

[database]
path = "sqlite:////var/lib/sensorlink/sensor.db"
pool_size = 2

[transport]
workers = 4
timeout_secs = 5

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.sensor.host, "collector.example.net");
        assert_eq!(config.sensor.port, 8443);
        assert!(config.sensor.ssl);
        assert!(!config.sensor.anonymize);
        assert_eq!(config.sensor.mode, ModeSetting::Remote);
        assert_eq!(
            config.database.resolved_path(),
            PathBuf::from("/var/lib/sensorlink/sensor.db")
        );
        assert_eq!(config.database.pool_size, 2);
        assert_eq!(config.transport.workers, 4);
        assert_eq!(config.transport.timeout_secs, 5);
        assert_eq!(config.transport.connect_timeout_secs, 10);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_identity_from_sensor_config() {
        let sensor = SensorConfig {
            host: "10.0.0.5".to_string(),
            username: "edge-02".to_string(),
            ssl: true,
            ..Default::default()
        };
        let identity = sensor.identity();
        assert_eq!(identity.host, "10.0.0.5");
        assert_eq!(identity.username, "edge-02");
        assert!(identity.ssl);
        assert!(identity.anonymize);
    }

    #[test]
    fn test_resolved_mode() {
        let mut sensor = SensorConfig::default();
        assert_eq!(sensor.resolved_mode(), Mode::Local);

        sensor.host = "collector.lan".to_string();
        assert_eq!(sensor.resolved_mode(), Mode::Remote);

        sensor.mode = ModeSetting::Local;
        assert_eq!(sensor.resolved_mode(), Mode::Local);

        sensor.host = "localhost".to_string();
        sensor.mode = ModeSetting::Remote;
        assert_eq!(sensor.resolved_mode(), Mode::Remote);
    }

    #[test]
    fn test_plain_database_path() {
        let database = DatabaseConfig {
            path: Some("/tmp/sensor.db".to_string()),
            ..Default::default()
        };
        assert_eq!(database.resolved_path(), PathBuf::from("/tmp/sensor.db"));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.transport.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sensor.username = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sensor.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[transport]\nworkers = 100\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
