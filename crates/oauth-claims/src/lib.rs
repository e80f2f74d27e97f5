//! # OAuth Claims - Resource Server Authorization
//!
//! Validates OAuth 2.0 access tokens for an API, enriches them with user info
//! and API-specific claims, and caches the result by token hash so that each
//! token is validated once per cache lifetime.
//!
//! ## Architecture
//!
//! - [`discovery`] - OpenID Connect metadata, loaded once at startup
//! - [`validator`] - the [`TokenValidator`] strategy seam
//!   - [`jwt`] - local RS256 validation against the issuer's JWKS
//!   - [`introspection`] - RFC 7662 introspection
//! - [`userinfo`] - OpenID Connect user info lookup
//! - [`claims`] - the [`Claims`] record and the [`CustomClaimsProvider`] extension point
//! - [`cache`] - [`ClaimsCache`] keyed by [`TokenHasher`] output
//! - [`authorizer`] - [`ClaimsAuthorizer`], the per-request entry point
//! - [`error`] - client (4xx) and server (5xx) errors
//! - [`tower`] - `AuthLayer` middleware (feature `middleware`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use oauth_claims::{
//!     ClaimsAuthorizer, IssuerMetadataResolver, MemoryClaimsStore, NoCustomClaims, OAuthConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OAuthConfig::new("https://login.example.com".parse()?);
//! let http_client = config.http_client()?;
//!
//! let metadata = IssuerMetadataResolver::new(http_client.clone())
//!     .load(&config.authority)
//!     .await?;
//!
//! let authorizer = ClaimsAuthorizer::from_config(
//!     &config,
//!     &metadata,
//!     Arc::new(NoCustomClaims),
//!     Arc::new(MemoryClaimsStore::new(config.claims_cache_capacity)),
//!     http_client,
//! )?;
//!
//! let claims = authorizer.authorize_header(Some("Bearer eyJ...")).await?;
//! println!("caller: {}", claims.subject());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod authorizer;
pub mod cache;
pub mod claims;
pub mod config;
pub mod discovery;
pub mod error;
pub mod hasher;
pub mod introspection;
pub mod jwt;
pub mod userinfo;
pub mod validator;

#[cfg(feature = "middleware")]
#[cfg_attr(docsrs, doc(cfg(feature = "middleware")))]
pub mod tower;

pub use authorizer::ClaimsAuthorizer;
pub use cache::{CacheEntry, ClaimsCache, ClaimsStore, MemoryClaimsStore};
pub use claims::{Claims, CustomClaimsProvider, NoCustomClaims, TokenClaims, UserInfoClaims};
pub use config::{ConfigError, OAuthConfig, ValidationStrategy};
pub use discovery::{IssuerMetadata, IssuerMetadataResolver};
pub use error::{ApiError, AuthError, ClientError, ErrorKind, ErrorResponse, ErrorTranslator};
pub use hasher::TokenHasher;
pub use introspection::IntrospectionValidator;
pub use jwt::{JwtValidator, SigningKeyResolver};
pub use userinfo::UserInfoClient;
pub use validator::TokenValidator;
