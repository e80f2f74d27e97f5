//! OAuth 2.0 Token Introspection (RFC 7662)
//!
//! Each uncached token is POSTed to the issuer's introspection endpoint with
//! the API's client credentials. Opaque tokens work the same as JWTs, and
//! revocation takes effect as soon as the claims cache entry expires.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

use crate::claims::TokenClaims;
use crate::discovery::OAuthErrorBody;
use crate::error::{ApiError, AuthError, ClientError, ErrorKind};
use crate::validator::TokenValidator;

const AREA: &str = "Introspection";

/// Introspection response per RFC 7662 Section 2.2
#[derive(Debug, Clone, Default, Deserialize)]
struct IntrospectionResponse {
    #[serde(default)]
    active: bool,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl IntrospectionResponse {
    fn into_claims(self, now: i64) -> Result<TokenClaims, ClientError> {
        let subject = self
            .sub
            .filter(|sub| !sub.is_empty())
            .ok_or_else(|| ClientError::missing_claim("sub"))?;
        let client_id = self
            .client_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::missing_claim("client_id"))?;
        let scopes = self
            .scope
            .map(|scope| TokenClaims::parse_scopes(&scope))
            .filter(|scopes| !scopes.is_empty())
            .ok_or_else(|| ClientError::missing_claim("scope"))?;
        let expiry = self.exp.ok_or_else(|| ClientError::missing_claim("exp"))?;
        if expiry <= now {
            return Err(ClientError::invalid_token("token has expired"));
        }

        Ok(TokenClaims {
            subject,
            client_id,
            scopes,
            expiry,
        })
    }
}

/// Validates tokens by calling the introspection endpoint
pub struct IntrospectionValidator {
    endpoint: Url,
    client_id: String,
    client_secret: SecretString,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for IntrospectionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrospectionValidator")
            .field("endpoint", &self.endpoint.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

impl IntrospectionValidator {
    /// Create a validator for `endpoint`
    pub fn new(
        endpoint: Url,
        client_id: impl Into<String>,
        client_secret: SecretString,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            endpoint,
            client_id: client_id.into(),
            client_secret,
            http_client,
        }
    }

    /// Introspection endpoint
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn failure(&self, reason: String) -> ApiError {
        ApiError::new(
            ErrorKind::IntrospectionFailure,
            AREA,
            "Problem encountered calling the introspection endpoint",
        )
        .with_details(format!("{reason} (url: {})", self.endpoint))
    }
}

#[async_trait]
impl TokenValidator for IntrospectionValidator {
    async fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let form = [
            ("token", token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret().as_str()),
        ];

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!(endpoint = %self.endpoint, error = %e, "Introspection request failed");
                self.failure(format!("request failed: {e}"))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.failure(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            let reason = match OAuthErrorBody::parse(&body).summary() {
                Some(summary) => format!("status {status}, {summary}"),
                None => format!("status {status}, body: {body}"),
            };
            return Err(self.failure(reason).into());
        }

        let response: IntrospectionResponse = serde_json::from_str(&body)
            .map_err(|e| self.failure(format!("invalid introspection response: {e}")))?;

        if let Some(error) = &response.error {
            let description = response.error_description.as_deref().unwrap_or_default();
            return Err(ClientError::invalid_token(format!(
                "introspection returned {error}: {description}"
            ))
            .into());
        }

        if !response.active {
            debug!("Introspection reported an inactive token");
            return Err(ClientError::invalid_token("token is not active").into());
        }

        Ok(response.into_claims(Utc::now().timestamp())?)
    }
}
