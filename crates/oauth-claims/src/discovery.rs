//! OpenID Connect discovery
//!
//! [`IssuerMetadataResolver::load`] downloads
//! `{authority}/.well-known/openid-configuration` once at startup. A failure is
//! meant to stop the process: the API must not serve traffic without issuer
//! metadata.
//!
//! Endpoint URLs are only required to be valid URLs. They are not required to
//! share the authority's host, since several identity providers publish
//! discovery and token endpoints on different hostnames.

use serde::Deserialize;
use tracing::{error, info};
use url::Url;

use crate::error::{ApiError, ErrorKind};

const AREA: &str = "Metadata";

/// Discovery document fields used by this crate
#[derive(Debug, Clone, Deserialize)]
struct DiscoveryDocument {
    issuer: String,
    #[serde(default)]
    introspection_endpoint: Option<String>,
    #[serde(default)]
    userinfo_endpoint: Option<String>,
    #[serde(default)]
    jwks_uri: Option<String>,
}

/// OAuth error body returned by identity providers
#[derive(Debug, Default, Deserialize)]
pub(crate) struct OAuthErrorBody {
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) error_description: Option<String>,
}

impl OAuthErrorBody {
    /// Parse an error body, tolerating non-JSON responses
    pub(crate) fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// `error: description` for logs, if the provider sent an OAuth error
    pub(crate) fn summary(&self) -> Option<String> {
        match (&self.error, &self.error_description) {
            (Some(error), Some(description)) => Some(format!("{error}: {description}")),
            (Some(error), None) => Some(error.clone()),
            (None, Some(description)) => Some(description.clone()),
            (None, None) => None,
        }
    }
}

/// Issuer endpoints, loaded once and read-only afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerMetadata {
    /// Issuer identifier tokens must carry in `iss`
    pub issuer: String,
    /// RFC 7662 introspection endpoint
    pub introspection_endpoint: Option<Url>,
    /// OpenID Connect user info endpoint
    pub userinfo_endpoint: Option<Url>,
    /// JWKS endpoint
    pub jwks_endpoint: Option<Url>,
}

impl IssuerMetadata {
    /// Validate the raw document
    fn from_document(document: DiscoveryDocument, url: &str) -> Result<Self, ApiError> {
        if document.issuer.trim().is_empty() {
            return Err(metadata_error(url, "the discovery document has no issuer"));
        }

        Ok(Self {
            issuer: document.issuer,
            introspection_endpoint: parse_endpoint(
                "introspection_endpoint",
                document.introspection_endpoint,
                url,
            )?,
            userinfo_endpoint: parse_endpoint("userinfo_endpoint", document.userinfo_endpoint, url)?,
            jwks_endpoint: parse_endpoint("jwks_uri", document.jwks_uri, url)?,
        })
    }
}

fn parse_endpoint(field: &str, value: Option<String>, url: &str) -> Result<Option<Url>, ApiError> {
    value
        .map(|value| {
            Url::parse(&value)
                .map_err(|e| metadata_error(url, &format!("{field} is not a valid URL: {e}")))
        })
        .transpose()
}

fn metadata_error(url: &str, reason: &str) -> ApiError {
    ApiError::new(
        ErrorKind::MetadataLookupFailure,
        AREA,
        "Problem downloading OpenID Connect metadata",
    )
    .with_details(format!("{reason} (url: {url})"))
}

/// Loads issuer metadata through OpenID Connect discovery
#[derive(Debug, Clone)]
pub struct IssuerMetadataResolver {
    http_client: reqwest::Client,
}

impl IssuerMetadataResolver {
    /// Create a resolver using the shared HTTP client
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Build the discovery URL for an authority
    pub fn discovery_url(authority: &Url) -> String {
        format!(
            "{}/.well-known/openid-configuration",
            authority.as_str().trim_end_matches('/')
        )
    }

    /// Download and validate the discovery document
    ///
    /// # Errors
    ///
    /// Returns a `metadata_lookup_failure` [`ApiError`] whose details carry the
    /// URL attempted and any OAuth error code or description.
    pub async fn load(&self, authority: &Url) -> Result<IssuerMetadata, ApiError> {
        let url = Self::discovery_url(authority);
        info!(discovery_url = %url, "Downloading OpenID Connect metadata");

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            error!(discovery_url = %url, error = %e, "Metadata request failed");
            metadata_error(&url, &format!("request failed: {e}"))
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| metadata_error(&url, &format!("failed to read response: {e}")))?;

        if !status.is_success() {
            let oauth = OAuthErrorBody::parse(&body);
            let reason = match oauth.summary() {
                Some(summary) => format!("status {status}, {summary}"),
                None => format!("status {status}, body: {body}"),
            };
            return Err(metadata_error(&url, &reason));
        }

        let document: DiscoveryDocument = serde_json::from_str(&body)
            .map_err(|e| metadata_error(&url, &format!("invalid discovery document: {e}")))?;

        let metadata = IssuerMetadata::from_document(document, &url)?;
        info!(
            issuer = %metadata.issuer,
            jwks_uri = ?metadata.jwks_endpoint.as_ref().map(Url::as_str),
            "Loaded OpenID Connect metadata"
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(json: &str) -> DiscoveryDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_discovery_url() {
        let authority = Url::parse("https://login.example.com/oauth2/").unwrap();
        assert_eq!(
            IssuerMetadataResolver::discovery_url(&authority),
            "https://login.example.com/oauth2/.well-known/openid-configuration"
        );
    }

    #[test]
    fn test_divergent_hosts_are_accepted() {
        let metadata = IssuerMetadata::from_document(
            document(
                r#"{
                    "issuer": "https://login.example.com",
                    "jwks_uri": "https://keys.example-cdn.net/jwks",
                    "userinfo_endpoint": "https://api.example.org/userinfo"
                }"#,
            ),
            "https://login.example.com/.well-known/openid-configuration",
        )
        .unwrap();

        assert_eq!(
            metadata.jwks_endpoint.unwrap().as_str(),
            "https://keys.example-cdn.net/jwks"
        );
        assert!(metadata.introspection_endpoint.is_none());
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let error = IssuerMetadata::from_document(
            document(r#"{"issuer": "https://login.example.com", "jwks_uri": "not a url"}"#),
            "https://login.example.com/.well-known/openid-configuration",
        )
        .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::MetadataLookupFailure);
        assert!(error.details().unwrap().contains("jwks_uri"));
    }

    #[test]
    fn test_empty_issuer_is_rejected() {
        let error = IssuerMetadata::from_document(document(r#"{"issuer": " "}"#), "u").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MetadataLookupFailure);
    }

    #[test]
    fn test_oauth_error_summary() {
        let body = OAuthErrorBody::parse(r#"{"error":"invalid_client","error_description":"bad"}"#);
        assert_eq!(body.summary().unwrap(), "invalid_client: bad");
        assert!(OAuthErrorBody::parse("<html>").summary().is_none());
    }
}
