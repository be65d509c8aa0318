//! Client configuration.
//!
//! Loaded from YAML files and environment variables. Every call made through
//! one client shares the configured timeout, wire format and concurrency cap.

use std::time::Duration;

use serde::Deserialize;

use crate::rpc::{RequestOptions, WireFormat};
use crate::transport::TransportConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "rep-rpc.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "REP_RPC_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "REP_RPC";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "REP_RPC_LOG";

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("timeout_ms must be greater than zero")]
    ZeroTimeout,

    #[error("max_concurrency must be greater than zero when set")]
    ZeroConcurrency,
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bus transport configuration.
    pub transport: TransportConfig,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
    /// Cap on in-flight calls per fan-out; unset means one call per target.
    pub max_concurrency: Option<usize>,
    /// Reply format spoken by the reps.
    pub wire_format: WireFormat,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_concurrency: None,
            wire_format: WireFormat::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `rep-rpc.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ClientConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no client can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_concurrency == Some(0) {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Request settings derived from this configuration.
    pub fn request_options(&self) -> Result<RequestOptions, ConfigError> {
        self.validate()?;
        Ok(RequestOptions {
            timeout: self.timeout(),
            wire_format: self.wire_format,
            max_concurrency: self.max_concurrency,
        })
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self {
            timeout_ms: 100,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout_ms, 1000);
        assert_eq!(config.max_concurrency, None);
        assert_eq!(config.wire_format, WireFormat::Sentinel);
        assert_eq!(config.transport.amqp.url, "amqp://localhost:5672");
    }

    #[test]
    fn test_request_options_from_config() {
        let config = ClientConfig {
            timeout_ms: 250,
            max_concurrency: Some(4),
            wire_format: WireFormat::Tagged,
            ..ClientConfig::default()
        };

        let options = config.request_options().unwrap();
        assert_eq!(options.timeout, Duration::from_millis(250));
        assert_eq!(options.max_concurrency, Some(4));
        assert_eq!(options.wire_format, WireFormat::Tagged);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = ClientConfig {
            timeout_ms: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = ClientConfig {
            max_concurrency: Some(0),
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.request_options(),
            Err(ConfigError::ZeroConcurrency)
        ));
    }

    #[test]
    #[serial]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "timeout_ms: 250\nwire_format: tagged\nmax_concurrency: 8\ntransport:\n  amqp:\n    url: amqp://rabbit:5672\n    exchange: auction.reps"
        )
        .unwrap();

        let config = ClientConfig::load(Some(file.path().to_str().unwrap())).unwrap();

        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.wire_format, WireFormat::Tagged);
        assert_eq!(config.max_concurrency, Some(8));
        assert_eq!(config.transport.amqp.url, "amqp://rabbit:5672");
        assert_eq!(config.transport.amqp.exchange, "auction.reps");
    }

    #[test]
    #[serial]
    fn test_load_env_overrides() {
        std::env::set_var("REP_RPC__TIMEOUT_MS", "750");
        let config = ClientConfig::load(None);
        std::env::remove_var("REP_RPC__TIMEOUT_MS");

        assert_eq!(config.unwrap().timeout_ms, 750);
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_ms: 0").unwrap();

        let result = ClientConfig::load(Some(file.path().to_str().unwrap()));
        assert!(matches!(result, Err(ConfigError::ZeroTimeout)));
    }
}
