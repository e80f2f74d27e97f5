//! Local JWT validation
//!
//! Tokens must be RS256 JWTs with a `kid` header. The signature is verified
//! with the matching key from [`SigningKeyResolver`]; issuer, audience and
//! expiry are then checked explicitly so that each failure has its own
//! logged reason.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation, decode, decode_header};
use serde::Deserialize;
use tracing::{debug, warn};

use super::jwks::SigningKeyResolver;
use crate::claims::TokenClaims;
use crate::error::{AuthError, ClientError};
use crate::validator::TokenValidator;

/// `aud` may be a single string or an array
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    fn contains(&self, audience: &str) -> bool {
        match self {
            Self::Single(aud) => aud == audience,
            Self::Multiple(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

/// `scope` is normally space-delimited, but some issuers emit an array
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ScopeClaim {
    Delimited(String),
    List(Vec<String>),
}

impl ScopeClaim {
    fn into_scopes(self) -> Vec<String> {
        match self {
            Self::Delimited(scope) => TokenClaims::parse_scopes(&scope),
            Self::List(scopes) => TokenClaims::parse_scopes(&scopes.join(" ")),
        }
    }
}

/// JWT payload fields this crate reads
#[derive(Debug, Clone, Deserialize)]
struct JwtPayload {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    azp: Option<String>,
    #[serde(default)]
    scope: Option<ScopeClaim>,
}

/// Validates JWT access tokens against the issuer's signing keys
#[derive(Debug)]
pub struct JwtValidator {
    keys: Arc<SigningKeyResolver>,
    expected_issuer: String,
    expected_audience: Option<String>,
}

impl JwtValidator {
    /// Create a validator
    ///
    /// `expected_audience` of `None` disables the audience check.
    pub fn new(
        keys: Arc<SigningKeyResolver>,
        expected_issuer: impl Into<String>,
        expected_audience: Option<String>,
    ) -> Self {
        Self {
            keys,
            expected_issuer: expected_issuer.into(),
            expected_audience,
        }
    }

    /// Issuer every token must carry
    pub fn expected_issuer(&self) -> &str {
        &self.expected_issuer
    }

    fn check_payload(&self, payload: JwtPayload, now: i64) -> Result<TokenClaims, ClientError> {
        match payload.iss.as_deref() {
            Some(iss) if iss == self.expected_issuer => {}
            Some(iss) => {
                return Err(ClientError::invalid_token(format!(
                    "issuer mismatch: expected '{}', got '{iss}'",
                    self.expected_issuer
                )));
            }
            None => return Err(ClientError::invalid_token("token has no issuer")),
        }

        if let Some(expected) = &self.expected_audience
            && !payload.aud.as_ref().is_some_and(|aud| aud.contains(expected))
        {
            return Err(ClientError::invalid_token(format!(
                "audience mismatch: expected '{expected}'"
            )));
        }

        let expiry = payload.exp.ok_or_else(|| ClientError::missing_claim("exp"))?;
        if expiry <= now {
            return Err(ClientError::invalid_token("token has expired"));
        }

        let subject = payload
            .sub
            .filter(|sub| !sub.is_empty())
            .ok_or_else(|| ClientError::missing_claim("sub"))?;

        let client_id = payload
            .client_id
            .or(payload.azp)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::missing_claim("client_id"))?;

        let scopes = payload
            .scope
            .map(ScopeClaim::into_scopes)
            .filter(|scopes| !scopes.is_empty())
            .ok_or_else(|| ClientError::missing_claim("scope"))?;

        Ok(TokenClaims {
            subject,
            client_id,
            scopes,
            expiry,
        })
    }
}

#[async_trait]
impl TokenValidator for JwtValidator {
    async fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "Failed to decode JWT header");
            ClientError::invalid_token(format!("malformed JWT header: {e}"))
        })?;

        if header.alg != Algorithm::RS256 {
            return Err(ClientError::invalid_token(format!(
                "unsupported algorithm {:?}",
                header.alg
            ))
            .into());
        }

        let kid = header
            .kid
            .ok_or_else(|| ClientError::invalid_token("JWT header has no kid"))?;

        let jwk = self
            .keys
            .get_key(&kid)
            .await?
            .ok_or_else(|| ClientError::invalid_token(format!("no signing key found for kid '{kid}'")))?;

        let key = DecodingKey::from_jwk(&jwk).map_err(|e| {
            warn!(kid = %kid, error = %e, "Signing key could not be used");
            ClientError::invalid_token(format!("unusable signing key '{kid}': {e}"))
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_aud = false;

        let data: TokenData<JwtPayload> = decode(token, &key, &validation).map_err(|e| {
            debug!(kid = %kid, error = %e, "JWT verification failed");
            ClientError::invalid_token(format!("JWT verification failed: {e}"))
        })?;

        Ok(self.check_payload(data.claims, Utc::now().timestamp())?)
    }
}
