//! Configuration management for the FileLite daemon.
//!
//! This module provides JSON configuration file loading and saving. The
//! configuration lives in `config.json` inside the data directory, which
//! defaults to `~/.local/share/filelite` (overridable with
//! `FILELITE_DATA_DIR` or `--data-dir`).
//!
//! The file shape ([`Config`]) is what users edit. At startup it is resolved
//! into an immutable [`RuntimeConfig`] that is handed to each component.

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::files::guard::normalize;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3100;

/// Default listen host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("port must be between 1 and 65535, got {0}")]
    InvalidPort(u16),

    #[error("host must be an IP address, got {0}")]
    InvalidHost(String),

    #[error("sslKey and sslCert must be set together")]
    IncompleteTls,

    #[error("maxAuthAttempts must be greater than 0, got {0}")]
    InvalidMaxAuthAttempts(u32),

    #[error("banMinutes must be between 1 and 1440, got {0}")]
    InvalidBanMinutes(u64),

    #[error("logLevel must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// On-disk configuration for the FileLite daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Listen address. `127.0.0.1` keeps the server local-only.
    pub host: String,

    /// Listen port. Accepts a number or a numeric string; empty means default.
    #[serde(deserialize_with = "deserialize_port")]
    pub port: u16,

    /// Disable the token check entirely.
    pub no_auth: bool,

    /// Shared token. Empty means a random token is generated at each start.
    pub password: String,

    /// Confinement root, absolute or relative to the working directory.
    /// Empty disables confinement.
    pub safe_base_dir: String,

    /// Write logs to `<data dir>/logs` in addition to stderr.
    pub enable_log: bool,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// TLS private key, relative to the data directory.
    pub ssl_key: String,

    /// TLS certificate, relative to the data directory.
    pub ssl_cert: String,

    /// Failed token attempts tolerated per IP before a ban.
    pub max_auth_attempts: u32,

    /// Ban length in minutes.
    pub ban_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            no_auth: false,
            password: String::new(),
            safe_base_dir: "./".to_string(),
            enable_log: true,
            log_level: "info".to_string(),
            ssl_key: String::new(),
            ssl_cert: String::new(),
            max_auth_attempts: 5,
            ban_minutes: 15,
        }
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u16),
        Text(String),
    }

    match PortValue::deserialize(deserializer)? {
        PortValue::Number(port) => Ok(port),
        PortValue::Text(text) if text.trim().is_empty() => Ok(DEFAULT_PORT),
        PortValue::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {text}"))),
    }
}

/// Returns the default data directory path.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FILELITE_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filelite")
}

/// Returns the configuration file path inside a data directory.
pub fn config_path_in(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported variables:
    /// - HOST: Override the listen host
    /// - PORT: Override the listen port
    /// - FILELITE_LOG_LEVEL: Override log level
    ///
    /// Runs before logging is set up, so it returns a note per applied (or
    /// ignored) variable for the caller to log.
    pub fn apply_env_overrides(&mut self) -> Vec<String> {
        let mut notes = Vec::new();

        if let Ok(host) = std::env::var("HOST") {
            if !host.is_empty() {
                notes.push(format!("Overriding host from environment: {}", host));
                self.host = host;
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    notes.push(format!("Overriding port from environment: {}", port));
                    self.port = port;
                }
                Err(_) if port.is_empty() => {}
                Err(_) => notes.push(format!("Ignoring invalid PORT value: {}", port)),
            }
        }

        if let Ok(level) = std::env::var("FILELITE_LOG_LEVEL") {
            if !level.is_empty() {
                notes.push(format!("Overriding log_level from environment: {}", level));
                self.log_level = level;
            }
        }

        notes
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if !self.host.is_empty() && self.host.parse::<IpAddr>().is_err() {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }

        if self.ssl_key.is_empty() != self.ssl_cert.is_empty() {
            return Err(ConfigError::IncompleteTls);
        }

        if self.max_auth_attempts == 0 {
            return Err(ConfigError::InvalidMaxAuthAttempts(self.max_auth_attempts));
        }

        if self.ban_minutes == 0 || self.ban_minutes > 1440 {
            return Err(ConfigError::InvalidBanMinutes(self.ban_minutes));
        }

        let level = self.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_json(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json).map_err(|e| {
            anyhow::anyhow!(
                "Invalid JSON configuration: {} (at line {}, column {})",
                e,
                e.line(),
                e.column()
            )
        })
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_json()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a pretty JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize configuration to JSON")
    }

    /// Resolve into the immutable runtime view.
    ///
    /// Relative `safeBaseDir` values are resolved against `cwd`, TLS files
    /// against `data_dir`. A missing password yields a random token.
    pub fn resolve(&self, data_dir: &Path, cwd: &Path) -> Result<RuntimeConfig> {
        self.validate()?;

        let safe_base_dir = if self.safe_base_dir.is_empty() {
            None
        } else {
            let raw = Path::new(&self.safe_base_dir);
            let absolute = if raw.is_absolute() {
                raw.to_path_buf()
            } else {
                cwd.join(raw)
            };
            Some(normalize(&absolute.to_string_lossy()))
        };

        let auth_token = if self.no_auth {
            None
        } else if self.password.is_empty() {
            Some(generate_token())
        } else {
            Some(self.password.clone())
        };

        let host = if self.host.is_empty() {
            DEFAULT_HOST
        } else {
            self.host.as_str()
        };
        let host: IpAddr = host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.host.clone()))?;

        let tls = if self.ssl_key.is_empty() {
            None
        } else {
            Some(TlsFiles {
                key: data_dir.join(&self.ssl_key),
                cert: data_dir.join(&self.ssl_cert),
            })
        };

        Ok(RuntimeConfig {
            data_dir: data_dir.to_path_buf(),
            safe_base_dir,
            auth_token,
            listen_addr: SocketAddr::new(host, self.port),
            tls,
            enable_log: self.enable_log,
            log_level: self.log_level.to_lowercase(),
            limiter: LimiterSettings {
                max_attempts: self.max_auth_attempts,
                ban_duration: Duration::from_secs(self.ban_minutes * 60),
            },
        })
    }
}

/// Generate an 8 hex character token.
fn generate_token() -> String {
    hex::encode(rand::random::<[u8; 4]>())
}

/// TLS certificate and key locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub key: PathBuf,
    pub cert: PathBuf,
}

/// Brute-force lockout settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSettings {
    /// Failures tolerated before the next one bans.
    pub max_attempts: u32,
    /// How long a ban lasts.
    pub ban_duration: Duration,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            ban_duration: Duration::from_secs(15 * 60),
        }
    }
}

/// Resolved configuration, immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Directory holding `config.json`, logs and default uploads.
    pub data_dir: PathBuf,
    /// Normalized confinement root, if any.
    pub safe_base_dir: Option<String>,
    /// Token required by `/api/files`; `None` disables auth.
    pub auth_token: Option<String>,
    pub listen_addr: SocketAddr,
    pub tls: Option<TlsFiles>,
    pub enable_log: bool,
    pub log_level: String,
    pub limiter: LimiterSettings,
}

impl RuntimeConfig {
    /// A runtime configuration suitable for tests and embedding.
    ///
    /// Binds to localhost on an ephemeral port with no TLS and file logging off.
    pub fn for_root(data_dir: &Path, safe_base_dir: Option<&Path>, token: Option<&str>) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            safe_base_dir: safe_base_dir.map(|p| normalize(&p.to_string_lossy())),
            auth_token: token.map(str::to_string),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            tls: None,
            enable_log: false,
            log_level: "info".to_string(),
            limiter: LimiterSettings::default(),
        }
    }

    /// Default upload directory used when no target path is given.
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Directory for rolling log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Query string clients append to authenticate, empty when auth is off.
    pub fn auth_param(&self) -> String {
        match &self.auth_token {
            Some(token) => format!("auth={token}"),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3100);
        assert!(!config.no_auth);
        assert!(config.password.is_empty());
        assert_eq!(config.safe_base_dir, "./");
        assert!(config.enable_log);
        assert_eq!(config.max_auth_attempts, 5);
        assert_eq!(config.ban_minutes, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_empty() {
        let config = Config::from_json("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_json_original_shape() {
        let json = r#"{
  "host": "",
  "port": "",
  "noAuth": false,
  "password": "secret",
  "safeBaseDir": "/srv/data",
  "enableLog": true,
  "sslKey": "",
  "sslCert": ""
}"#;
        let config = Config::from_json(json).unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.password, "secret");
        assert_eq!(config.safe_base_dir, "/srv/data");
        assert_eq!(config.host, "");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_port_number_or_string() {
        let config = Config::from_json(r#"{"port": 8080}"#).unwrap();
        assert_eq!(config.port, 8080);

        let config = Config::from_json(r#"{"port": "8081"}"#).unwrap();
        assert_eq!(config.port, 8081);

        assert!(Config::from_json(r#"{"port": "eighty"}"#).is_err());
    }

    #[test]
    fn test_from_json_invalid_syntax() {
        let result = Config::from_json(r#"{"port": "#);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid JSON"));
    }

    #[test]
    fn test_from_json_wrong_type() {
        assert!(Config::from_json(r#"{"noAuth": "yes"}"#).is_err());
    }

    #[test]
    fn test_roundtrip() {
        let mut original = Config::default();
        original.password = "hunter2".to_string();
        original.ban_minutes = 30;

        let json = original.to_json().unwrap();
        assert!(json.contains("\"safeBaseDir\""));
        assert!(json.contains("\"maxAuthAttempts\""));

        let loaded = Config::from_json(&json).unwrap();
        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.json").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut original = Config::default();
        original.port = 4000;
        original.no_auth = true;

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "{ not json").unwrap();

        let err = Config::load(&config_path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_validate_port_zero() {
        let config = Config {
            port: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidPort(0)));
    }

    #[test]
    fn test_validate_host() {
        let config = Config {
            host: "not-an-ip".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidHost("not-an-ip".to_string()))
        );
    }

    #[test]
    fn test_validate_incomplete_tls() {
        let config = Config {
            ssl_key: "key.pem".to_string(),
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::IncompleteTls));
    }

    #[test]
    fn test_validate_limiter_values() {
        let config = Config {
            max_auth_attempts: 0,
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMaxAuthAttempts(0))
        );

        let config = Config {
            ban_minutes: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidBanMinutes(0)));
    }

    #[test]
    fn test_validate_log_level_case_insensitive() {
        let config = Config {
            log_level: "DEBUG".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());

        let config = Config {
            log_level: "verbose".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    fn test_resolve_relative_root() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            safe_base_dir: "./shared//files".to_string(),
            password: "pw".to_string(),
            ..Config::default()
        };

        let runtime = config.resolve(temp_dir.path(), Path::new("/work")).unwrap();
        assert_eq!(runtime.safe_base_dir.as_deref(), Some("/work/shared/files"));
        assert_eq!(runtime.auth_token.as_deref(), Some("pw"));
        assert_eq!(runtime.auth_param(), "auth=pw");
        assert_eq!(runtime.listen_addr.port(), 3100);
        assert_eq!(runtime.limiter.ban_duration, Duration::from_secs(900));
    }

    #[test]
    fn test_resolve_without_root_or_auth() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            safe_base_dir: String::new(),
            no_auth: true,
            ..Config::default()
        };

        let runtime = config.resolve(temp_dir.path(), Path::new("/work")).unwrap();
        assert!(runtime.safe_base_dir.is_none());
        assert!(runtime.auth_token.is_none());
        assert!(runtime.auth_param().is_empty());
    }

    #[test]
    fn test_resolve_generates_token() {
        let temp_dir = TempDir::new().unwrap();
        let runtime = Config::default()
            .resolve(temp_dir.path(), Path::new("/work"))
            .unwrap();

        let token = runtime.auth_token.unwrap();
        assert_eq!(token.len(), 8);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_resolve_tls_paths() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            ssl_key: "key.pem".to_string(),
            ssl_cert: "cert.pem".to_string(),
            ..Config::default()
        };

        let runtime = config.resolve(temp_dir.path(), Path::new("/work")).unwrap();
        let tls = runtime.tls.unwrap();
        assert_eq!(tls.key, temp_dir.path().join("key.pem"));
        assert_eq!(tls.cert, temp_dir.path().join("cert.pem"));
    }

    #[test]
    #[serial]
    fn test_env_override_port_and_host() {
        std::env::set_var("PORT", "9000");
        std::env::set_var("HOST", "127.0.0.1");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");

        std::env::remove_var("PORT");
        std::env::remove_var("HOST");
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_port_ignored() {
        std::env::set_var("PORT", "not-a-port");

        let mut config = Config::default();
        let notes = config.apply_env_overrides();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(notes, vec!["Ignoring invalid PORT value: not-a-port".to_string()]);

        std::env::remove_var("PORT");
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::set_var("FILELITE_LOG_LEVEL", "warn");

        let mut config = Config::default();
        let notes = config.apply_env_overrides();
        assert_eq!(config.log_level, "warn");
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains("log_level"));

        std::env::remove_var("FILELITE_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_default_data_dir_env() {
        std::env::set_var("FILELITE_DATA_DIR", "/opt/filelite");
        assert_eq!(default_data_dir(), PathBuf::from("/opt/filelite"));
        std::env::remove_var("FILELITE_DATA_DIR");

        assert!(default_data_dir().to_string_lossy().contains("filelite"));
    }
}
