//! Per-request claims authorization
//!
//! [`ClaimsAuthorizer::authorize`] is the single entry point the HTTP adapter
//! calls. For a new token it runs:
//!
//! ```text
//! hash -> cache miss -> validate -> required scope -> user info -> custom claims -> cache put
//! ```
//!
//! A cached token skips straight from the hash to the required scope check.
//! The authorizer is shared across requests and holds no per-request state.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{ClaimsCache, ClaimsStore};
use crate::claims::{Claims, CustomClaimsProvider, TokenClaims};
use crate::config::{ConfigError, OAuthConfig, ValidationStrategy};
use crate::discovery::IssuerMetadata;
use crate::error::{AuthError, ClientError, ErrorTranslator};
use crate::hasher::TokenHasher;
use crate::introspection::IntrospectionValidator;
use crate::jwt::{JwtValidator, SigningKeyResolver};
use crate::userinfo::UserInfoClient;
use crate::validator::TokenValidator;

/// Turns a bearer token into [`Claims`]
pub struct ClaimsAuthorizer<P: CustomClaimsProvider> {
    validator: Arc<dyn TokenValidator>,
    user_info: Option<UserInfoClient>,
    provider: Arc<P>,
    cache: ClaimsCache,
    required_scope: Option<String>,
}

impl<P: CustomClaimsProvider> std::fmt::Debug for ClaimsAuthorizer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimsAuthorizer")
            .field("user_info", &self.user_info)
            .field("cache", &self.cache)
            .field("required_scope", &self.required_scope)
            .finish_non_exhaustive()
    }
}

impl<P: CustomClaimsProvider> ClaimsAuthorizer<P> {
    /// Create an authorizer from its parts
    pub fn new(validator: Arc<dyn TokenValidator>, provider: Arc<P>, cache: ClaimsCache) -> Self {
        Self {
            validator,
            user_info: None,
            provider,
            cache,
            required_scope: None,
        }
    }

    /// Look up user info for every uncached token
    #[must_use]
    pub fn with_user_info(mut self, user_info: UserInfoClient) -> Self {
        self.user_info = Some(user_info);
        self
    }

    /// Require `scope` in every token
    #[must_use]
    pub fn with_required_scope(mut self, scope: impl Into<String>) -> Self {
        self.required_scope = Some(scope.into());
        self
    }

    /// Wire up the configured strategy against loaded issuer metadata
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid or the
    /// metadata lacks an endpoint the strategy needs.
    pub fn from_config(
        config: &OAuthConfig,
        metadata: &IssuerMetadata,
        provider: Arc<P>,
        store: Arc<dyn ClaimsStore>,
        http_client: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let validator: Arc<dyn TokenValidator> = match config.strategy {
            ValidationStrategy::Jwt => {
                let jwks_uri = config
                    .jwks_endpoint
                    .clone()
                    .or_else(|| metadata.jwks_endpoint.clone())
                    .ok_or(ConfigError::MissingEndpoint("jwks_uri"))?;
                let issuer = config
                    .expected_issuer
                    .clone()
                    .unwrap_or_else(|| metadata.issuer.clone());

                info!(%jwks_uri, %issuer, "Validating access tokens as JWTs");
                let keys = Arc::new(SigningKeyResolver::new(jwks_uri, http_client.clone()));
                Arc::new(JwtValidator::new(
                    keys,
                    issuer,
                    config.expected_audience.clone(),
                ))
            }
            ValidationStrategy::Introspection => {
                let endpoint = metadata
                    .introspection_endpoint
                    .clone()
                    .ok_or(ConfigError::MissingEndpoint("introspection_endpoint"))?;
                let (Some(client_id), Some(client_secret)) =
                    (config.client_id.clone(), config.client_secret.clone())
                else {
                    return Err(ConfigError::MissingClientCredentials);
                };

                info!(%endpoint, "Validating access tokens with introspection");
                Arc::new(IntrospectionValidator::new(
                    endpoint,
                    client_id,
                    client_secret,
                    http_client.clone(),
                ))
            }
        };

        let cache = ClaimsCache::new(store, config.max_claims_cache_duration());
        let mut authorizer = Self::new(validator, provider, cache);

        if config.user_info {
            match &metadata.userinfo_endpoint {
                Some(endpoint) => {
                    authorizer =
                        authorizer.with_user_info(UserInfoClient::new(endpoint.clone(), http_client));
                }
                None => warn!("User info lookup enabled but the issuer has no userinfo endpoint"),
            }
        }
        if let Some(scope) = &config.required_scope {
            authorizer = authorizer.with_required_scope(scope.clone());
        }

        Ok(authorizer)
    }

    /// Authorize a raw `Authorization` header value
    ///
    /// Accepts `Bearer <token>` with a case-insensitive scheme. Any other
    /// shape is treated as a missing token.
    ///
    /// # Errors
    ///
    /// See [`ClaimsAuthorizer::authorize`].
    pub async fn authorize_header(
        &self,
        header: Option<&str>,
    ) -> Result<Claims<P::Claims>, AuthError> {
        self.authorize(header.and_then(bearer_token)).await
    }

    /// Authorize a bearer token
    ///
    /// # Errors
    ///
    /// - `missing_token` if `token` is absent or empty
    /// - any error from validation, user info or the custom claims provider
    /// - `insufficient_scope` if the required scope is absent
    pub async fn authorize(&self, token: Option<&str>) -> Result<Claims<P::Claims>, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(ClientError::missing_token)?;

        let token_hash = TokenHasher::hash(token);

        if let Some(claims) = self.cache.get::<P::Claims>(&token_hash).await {
            self.check_scope(&claims.token)?;
            return Ok(claims);
        }

        let token_claims = self.validator.validate(token).await?;
        self.check_scope(&token_claims)?;

        let user_info = match &self.user_info {
            Some(client) => Some(client.lookup(token).await?),
            None => None,
        };

        let custom = self
            .provider
            .lookup(&token_claims, user_info.as_ref())
            .await
            .map_err(ErrorTranslator::translate)?;

        let claims = Claims {
            token: token_claims,
            user_info,
            custom,
        };

        self.cache.put(&token_hash, &claims, claims.expiry()).await;
        debug!(token_hash = %token_hash, subject = claims.subject(), "Authorized new token");

        Ok(claims)
    }

    fn check_scope(&self, token: &TokenClaims) -> Result<(), ClientError> {
        match &self.required_scope {
            Some(scope) if !token.has_scope(scope) => Err(ClientError::insufficient_scope(scope)),
            _ => Ok(()),
        }
    }
}

/// Extract the token from `Bearer <token>`
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryClaimsStore;
    use crate::claims::{NoCustomClaims, UserInfoClaims};
    use crate::error::{ApiError, ErrorKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingValidator {
        calls: AtomicUsize,
        scope: &'static str,
    }

    #[async_trait]
    impl TokenValidator for CountingValidator {
        async fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if token == "bad" {
                return Err(ClientError::invalid_token("bad token").into());
            }
            Ok(TokenClaims {
                subject: "user-1".to_string(),
                client_id: "web-client".to_string(),
                scopes: TokenClaims::parse_scopes(self.scope),
                expiry: chrono::Utc::now().timestamp() + 900,
            })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl CustomClaimsProvider for FailingProvider {
        type Claims = ();

        async fn lookup(
            &self,
            _token: &TokenClaims,
            _user_info: Option<&UserInfoClaims>,
        ) -> anyhow::Result<()> {
            Err(ApiError::new(ErrorKind::ServerError, "Repository", "database down").into())
        }
    }

    fn authorizer<P: CustomClaimsProvider>(
        scope: &'static str,
        provider: P,
    ) -> (ClaimsAuthorizer<P>, Arc<CountingValidator>) {
        let validator = Arc::new(CountingValidator {
            calls: AtomicUsize::new(0),
            scope,
        });
        let cache = ClaimsCache::new(
            Arc::new(MemoryClaimsStore::new(100)),
            Duration::from_secs(1800),
        );
        (
            ClaimsAuthorizer::new(validator.clone(), Arc::new(provider), cache),
            validator,
        )
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("BEARER abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let (authorizer, validator) = authorizer("openid", NoCustomClaims);

        for token in [None, Some(""), Some("   ")] {
            let error = authorizer.authorize(token).await.unwrap_err();
            assert_eq!(error.kind(), ErrorKind::MissingToken);
        }
        let error = authorizer.authorize_header(Some("Basic xyz")).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MissingToken);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let (authorizer, validator) = authorizer("openid profile", NoCustomClaims);

        let first = authorizer.authorize(Some("token-1")).await.unwrap();
        let second = authorizer.authorize_header(Some("Bearer token-1")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_token_is_not_cached() {
        let (authorizer, validator) = authorizer("openid", NoCustomClaims);

        for _ in 0..2 {
            let error = authorizer.authorize(Some("bad")).await.unwrap_err();
            assert_eq!(error.kind(), ErrorKind::InvalidToken);
        }
        assert_eq!(validator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_required_scope() {
        let (authorizer, _) = authorizer("openid", NoCustomClaims);
        let authorizer = authorizer.with_required_scope("investments");

        let error = authorizer.authorize(Some("token-1")).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InsufficientScope);
        assert_eq!(error.status(), http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_provider_errors_keep_their_class() {
        let (authorizer, _) = authorizer("openid", FailingProvider);

        match authorizer.authorize(Some("token-1")).await.unwrap_err() {
            AuthError::Server(api) => {
                assert_eq!(api.area(), "Repository");
                assert_eq!(api.message(), "database down");
            }
            AuthError::Client(e) => panic!("expected server error, got {e}"),
        }
    }
}
