//! # Tower middleware
//!
//! [`AuthLayer`] wraps an HTTP service so that every request is authorized
//! before it reaches the handler.
//!
//! - On success the [`Claims`](crate::Claims) are inserted into the request
//!   extensions and the inner service is called.
//! - On failure the error is logged once and answered directly with the
//!   401, 403 or 500 response built by
//!   [`AuthError::to_http_response`](crate::AuthError::to_http_response).
//!   The inner service is never called.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use oauth_claims::tower::AuthLayer;
//!
//! let service = ServiceBuilder::new()
//!     .layer(AuthLayer::new(authorizer).bypass_path("/health"))
//!     .service(my_http_handler);
//! ```
//!
//! Handlers read the claims from the request extensions:
//!
//! ```rust,ignore
//! let claims = req.extensions().get::<Claims<MyClaims>>();
//! ```

mod layer;
mod service;

pub use layer::AuthLayer;
pub use service::{AuthService, AuthServiceFuture};

use http::HeaderName;

/// Configuration for the auth layer
#[derive(Debug, Clone)]
pub struct AuthLayerConfig {
    /// Header the bearer token is read from (default: `Authorization`)
    pub auth_header: HeaderName,
    /// Request paths served without authorization, such as health checks
    pub bypass_paths: Vec<String>,
}

impl Default for AuthLayerConfig {
    fn default() -> Self {
        Self {
            auth_header: http::header::AUTHORIZATION,
            bypass_paths: Vec::new(),
        }
    }
}

impl AuthLayerConfig {
    /// Whether `path` skips authorization
    pub fn should_bypass(&self, path: &str) -> bool {
        self.bypass_paths.iter().any(|p| p == path)
    }
}
