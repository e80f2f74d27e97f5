//! Configuration for the authorization pipeline

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Configuration errors, reported before the API starts serving
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Introspection needs client credentials
    #[error("Introspection requires both client_id and client_secret")]
    MissingClientCredentials,

    /// A duration was configured as zero
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// Issuer metadata lacks an endpoint the strategy needs
    #[error("Issuer metadata has no {0}")]
    MissingEndpoint(&'static str),

    /// The HTTP client could not be built
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),
}

/// How access tokens are validated
///
/// Exactly one strategy is used per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStrategy {
    /// Verify JWT signatures locally against the issuer's JWKS
    #[default]
    Jwt,
    /// Ask the authorization server about each token (RFC 7662)
    Introspection,
}

/// OAuth settings for a resource server
///
/// # Example
///
/// ```toml
/// authority = "https://login.example.com"
/// strategy = "jwt"
/// expected_audience = "api.example.com"
/// required_scope = "investments"
/// max_claims_cache_seconds = 1800
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    /// Base URL used for OpenID Connect discovery
    pub authority: Url,

    /// Validation strategy
    #[serde(default)]
    pub strategy: ValidationStrategy,

    /// Client id used to call the introspection endpoint
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret used to call the introspection endpoint
    #[serde(default)]
    pub client_secret: Option<SecretString>,

    /// Expected `iss`; defaults to the issuer from the discovery document
    #[serde(default)]
    pub expected_issuer: Option<String>,

    /// Expected `aud`; not checked when absent
    #[serde(default)]
    pub expected_audience: Option<String>,

    /// Scope every token must carry
    #[serde(default)]
    pub required_scope: Option<String>,

    /// JWKS endpoint overriding the discovered `jwks_uri`
    #[serde(default)]
    pub jwks_endpoint: Option<Url>,

    /// Look up user info after validation
    #[serde(default = "default_user_info")]
    pub user_info: bool,

    /// Upper bound on how long claims stay cached
    #[serde(default = "default_max_claims_cache_seconds")]
    pub max_claims_cache_seconds: u64,

    /// Maximum number of cached claims entries
    #[serde(default = "default_claims_cache_capacity")]
    pub claims_cache_capacity: u64,

    /// Timeout for every call to the identity provider
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_user_info() -> bool {
    true
}

fn default_max_claims_cache_seconds() -> u64 {
    1800
}

fn default_claims_cache_capacity() -> u64 {
    10_000
}

fn default_request_timeout_seconds() -> u64 {
    10
}

impl OAuthConfig {
    /// Create a configuration with defaults for everything but the authority
    pub fn new(authority: Url) -> Self {
        Self {
            authority,
            strategy: ValidationStrategy::default(),
            client_id: None,
            client_secret: None,
            expected_issuer: None,
            expected_audience: None,
            required_scope: None,
            jwks_endpoint: None,
            user_info: default_user_info(),
            max_claims_cache_seconds: default_max_claims_cache_seconds(),
            claims_cache_capacity: default_claims_cache_capacity(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }

    /// Check settings that serde cannot
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if introspection lacks credentials or a
    /// duration is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.strategy == ValidationStrategy::Introspection
            && (self.client_id.is_none() || self.client_secret.is_none())
        {
            return Err(ConfigError::MissingClientCredentials);
        }
        if self.max_claims_cache_seconds == 0 {
            return Err(ConfigError::ZeroDuration("max_claims_cache_seconds"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(ConfigError::ZeroDuration("request_timeout_seconds"));
        }
        Ok(())
    }

    /// Maximum claims cache duration
    pub fn max_claims_cache_duration(&self) -> Duration {
        Duration::from_secs(self.max_claims_cache_seconds)
    }

    /// Timeout for identity provider calls
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Build the HTTP client shared by every identity provider call
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the TLS backend cannot start.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout())
            .user_agent(concat!("oauth-claims/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))
    }
}
