//! Configuration for the investments API
//!
//! Loaded from a TOML, YAML or JSON file. Environment variables with the
//! `INVESTMENTS__` prefix override file settings, using `__` between nested
//! keys (e.g. `INVESTMENTS__OAUTH__REQUIRED_SCOPE=investments`).

use std::path::{Path, PathBuf};

use oauth_claims::OAuthConfig;
use serde::Deserialize;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "INVESTMENTS";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// HTTP listener
    #[serde(default)]
    pub api: ApiSettings,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Token validation and claims caching
    pub oauth: OAuthConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    /// Bind address
    pub bind_address: String,
    /// Port
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ApiSettings {
    /// `address:port` to listen on
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Log settings
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON records instead of human-readable lines
    pub structured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,oauth_claims=debug".to_string(),
            structured: false,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// Settings that parse but cannot work
    #[error("Invalid OAuth configuration: {0}")]
    OAuth(#[from] oauth_claims::ConfigError),
}

impl ApiConfig {
    /// Load configuration from a file plus environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, has an unknown extension,
    /// fails to parse, or holds an invalid OAuth section.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.oauth.validate()?;
        Ok(config)
    }
}
