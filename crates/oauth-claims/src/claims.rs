//! Claims produced by the authorization pipeline
//!
//! [`Claims`] is composed rather than subclassed: a fixed [`TokenClaims`]
//! part from the validated token, optional [`UserInfoClaims`] from the user
//! info endpoint, and a provider-defined extension value `C` supplied by a
//! [`CustomClaimsProvider`].

use std::fmt::Debug;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Claims taken from a validated access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Immutable user identifier (`sub`)
    pub subject: String,
    /// Calling application (`client_id`)
    pub client_id: String,
    /// Scopes in the order they were issued
    pub scopes: Vec<String>,
    /// Expiry in Unix seconds (`exp`)
    pub expiry: i64,
}

impl TokenClaims {
    /// Split a space-delimited `scope` claim, keeping issue order
    pub fn parse_scopes(scope: &str) -> Vec<String> {
        let mut scopes: Vec<String> = Vec::new();
        for item in scope.split_whitespace() {
            if !scopes.iter().any(|s| s == item) {
                scopes.push(item.to_string());
            }
        }
        scopes
    }

    /// Whether the token carries `scope`
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Claims returned by the OpenID Connect user info endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoClaims {
    /// First name
    pub given_name: Option<String>,
    /// Last name
    pub family_name: Option<String>,
    /// Email address
    pub email: Option<String>,
}

/// The authorization result for one request
///
/// Built once per uncached token, stored in the claims cache, and never
/// mutated after it is handed to request processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims<C> {
    /// Claims from the access token
    pub token: TokenClaims,
    /// Claims from the user info endpoint, when looked up
    pub user_info: Option<UserInfoClaims>,
    /// Claims from the API's own data
    pub custom: C,
}

impl<C> Claims<C> {
    /// User identifier
    pub fn subject(&self) -> &str {
        &self.token.subject
    }

    /// Calling application
    pub fn client_id(&self) -> &str {
        &self.token.client_id
    }

    /// Token scopes
    pub fn scopes(&self) -> &[String] {
        &self.token.scopes
    }

    /// Token expiry in Unix seconds
    pub fn expiry(&self) -> i64 {
        self.token.expiry
    }

    /// First name from user info
    pub fn given_name(&self) -> Option<&str> {
        self.user_info.as_ref()?.given_name.as_deref()
    }

    /// Last name from user info
    pub fn family_name(&self) -> Option<&str> {
        self.user_info.as_ref()?.family_name.as_deref()
    }

    /// Email from user info
    pub fn email(&self) -> Option<&str> {
        self.user_info.as_ref()?.email.as_deref()
    }

    /// Fail with 403 unless the token carries `scope`
    ///
    /// # Errors
    ///
    /// Returns an `insufficient_scope` [`ClientError`].
    pub fn verify_scope(&self, scope: &str) -> Result<(), ClientError> {
        if self.token.has_scope(scope) {
            Ok(())
        } else {
            Err(ClientError::insufficient_scope(scope))
        }
    }
}

/// Looks up domain-specific claims for an already validated token
///
/// Called only after token validation succeeded. Implementations should
/// return an empty value rather than an error when the API simply has no
/// extra data for the user. Errors are classified by
/// [`ErrorTranslator`](crate::error::ErrorTranslator): a returned
/// [`ClientError`] or [`ApiError`](crate::error::ApiError) keeps its class,
/// anything else becomes a 500.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use oauth_claims::{CustomClaimsProvider, TokenClaims, UserInfoClaims};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Regions(Vec<String>);
///
/// struct RegionsProvider;
///
/// #[async_trait]
/// impl CustomClaimsProvider for RegionsProvider {
///     type Claims = Regions;
///
///     async fn lookup(
///         &self,
///         token: &TokenClaims,
///         _user_info: Option<&UserInfoClaims>,
///     ) -> anyhow::Result<Regions> {
///         Ok(Regions(vec!["Europe".to_string()]))
///     }
/// }
/// ```
#[async_trait]
pub trait CustomClaimsProvider: Send + Sync + 'static {
    /// Provider-defined claims stored alongside the token claims
    type Claims: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static;

    /// Look up custom claims for the validated token
    ///
    /// # Errors
    ///
    /// Any error fails the request; see the trait docs for classification.
    async fn lookup(
        &self,
        token: &TokenClaims,
        user_info: Option<&UserInfoClaims>,
    ) -> anyhow::Result<Self::Claims>;
}

/// Provider for APIs that need no custom claims
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCustomClaims;

#[async_trait]
impl CustomClaimsProvider for NoCustomClaims {
    type Claims = ();

    async fn lookup(
        &self,
        _token: &TokenClaims,
        _user_info: Option<&UserInfoClaims>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
