//! Token validation strategy seam

use async_trait::async_trait;

use crate::claims::TokenClaims;
use crate::error::AuthError;

/// Validates a raw access token and extracts its token claims
///
/// Implementations classify failures themselves: a bad, expired or malformed
/// token is a [`ClientError`](crate::error::ClientError), while a failure to
/// reach the identity provider is an [`ApiError`](crate::error::ApiError).
#[async_trait]
pub trait TokenValidator: Send + Sync + 'static {
    /// Validate `token`
    async fn validate(&self, token: &str) -> Result<TokenClaims, AuthError>;
}
