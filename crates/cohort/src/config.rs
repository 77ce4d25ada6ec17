//! Configuration management for cohort.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::diagnostic::{EndpointCheck, ProbeMethod};
use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "cohort";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "cohort.db";

/// Default offline store file name.
const OFFLINE_FILE_NAME: &str = "offline.json";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `COHORT_`, sections split on `__`)
/// 2. TOML config file at `~/.config/cohort/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// API client configuration.
    pub client: ClientConfig,
    /// Endpoint diagnostic configuration.
    pub diagnostic: DiagnosticConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/cohort/cohort.db`
    pub database_path: Option<PathBuf>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
}

/// API client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the REST API, including the `/api` prefix.
    pub api_url: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Serve and record changes locally when the API is unreachable.
    pub offline_fallback: bool,
    /// Path to the offline store.
    /// Defaults to `~/.local/share/cohort/offline.json`
    pub offline_path: Option<PathBuf>,
}

/// Endpoint diagnostic configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticConfig {
    /// Endpoints to probe, in order.
    pub endpoints: Vec<EndpointCheck>,
    /// Per-probe timeout in milliseconds.
    pub timeout_ms: u64,
    /// Skip the remaining probes after the first failure.
    pub stop_on_failure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_origins: Vec::new(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000/api".to_string(),
            timeout_ms: 5000,
            offline_fallback: true,
            offline_path: None, // Will be resolved to default at runtime
        }
    }
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            timeout_ms: 3000,
            stop_on_failure: false,
        }
    }
}

/// Endpoints probed when none are configured.
fn default_endpoints() -> Vec<EndpointCheck> {
    vec![
        EndpointCheck::new("health", "/health", ProbeMethod::Get),
        EndpointCheck::new("participants", "/participants?limit=1", ProbeMethod::Get),
        EndpointCheck::new("diagnostic domains", "/diagnostic-domains", ProbeMethod::Get),
        EndpointCheck::new("stats", "/stats", ProbeMethod::Get),
    ]
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("COHORT_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::ConfigValidation {
                message: "server.port must be greater than 0".to_string(),
            });
        }

        if self.client.timeout_ms == 0 || self.diagnostic.timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "timeout_ms must be greater than 0".to_string(),
            });
        }

        if let Err(e) = reqwest::Url::parse(&self.client.api_url) {
            return Err(Error::ConfigValidation {
                message: format!("invalid client.api_url '{}': {e}", self.client.api_url),
            });
        }

        for endpoint in &self.diagnostic.endpoints {
            if !endpoint.path.starts_with('/') {
                return Err(Error::ConfigValidation {
                    message: format!(
                        "diagnostic endpoint '{}' path must start with '/': {}",
                        endpoint.name, endpoint.path
                    ),
                });
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the offline store path, resolving defaults if not set.
    #[must_use]
    pub fn offline_path(&self) -> PathBuf {
        self.client
            .offline_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(OFFLINE_FILE_NAME))
    }

    /// Address the server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get the client request timeout as a Duration.
    #[must_use]
    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client.timeout_ms)
    }

    /// Get the per-probe diagnostic timeout as a Duration.
    #[must_use]
    pub fn diagnostic_timeout(&self) -> Duration {
        Duration::from_millis(self.diagnostic.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.client.api_url, "http://localhost:5000/api");
        assert!(config.client.offline_fallback);
        assert!(!config.diagnostic.stop_on_failure);
    }

    #[test]
    fn test_default_endpoints_order() {
        let endpoints = default_endpoints();
        let names: Vec<&str> = endpoints.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["health", "participants", "diagnostic domains", "stats"]
        );
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("server.port"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.diagnostic.timeout_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("timeout_ms"));
    }

    #[test]
    fn test_validate_bad_api_url() {
        let mut config = Config::default();
        config.client.api_url = "not a url".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("api_url"));
    }

    #[test]
    fn test_validate_relative_endpoint_path() {
        let mut config = Config::default();
        config.diagnostic.endpoints = vec![EndpointCheck::new("bad", "health", ProbeMethod::Get)];

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("must start with '/'"));
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("cohort.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_offline_path_default() {
        let path = Config::default().offline_path();
        assert!(path.to_string_lossy().contains("offline.json"));
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(Config::default().bind_address(), "127.0.0.1:5000");
    }

    #[test]
    fn test_timeouts() {
        let config = Config::default();
        assert_eq!(config.client_timeout(), Duration::from_millis(5000));
        assert_eq!(config.diagnostic_timeout(), Duration::from_millis(3000));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("cohort"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 8080

[client]
api_url = "http://api.internal:8080/api"
offline_fallback = false

[[diagnostic.endpoints]]
name = "health"
path = "/health"
method = "get"
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(!config.client.offline_fallback);
        assert_eq!(config.diagnostic.endpoints.len(), 1);
    }

    #[test]
    fn test_server_config_deserialize() {
        let json = r#"{"port": 9000}"#;
        let server: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(server.port, 9000);
        assert_eq!(server.max_body_bytes, 1024 * 1024);
    }
}
