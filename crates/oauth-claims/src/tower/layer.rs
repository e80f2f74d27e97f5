//! Tower Layer implementation for claims authorization

use std::sync::Arc;

use ::tower::Layer;

use super::AuthLayerConfig;
use super::service::AuthService;
use crate::authorizer::ClaimsAuthorizer;
use crate::claims::CustomClaimsProvider;

/// Tower Layer that authorizes requests with a [`ClaimsAuthorizer`]
pub struct AuthLayer<P: CustomClaimsProvider> {
    authorizer: Arc<ClaimsAuthorizer<P>>,
    config: AuthLayerConfig,
}

impl<P: CustomClaimsProvider> Clone for AuthLayer<P> {
    fn clone(&self) -> Self {
        Self {
            authorizer: Arc::clone(&self.authorizer),
            config: self.config.clone(),
        }
    }
}

impl<P: CustomClaimsProvider> std::fmt::Debug for AuthLayer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthLayer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: CustomClaimsProvider> AuthLayer<P> {
    /// Create a layer with default configuration
    pub fn new(authorizer: ClaimsAuthorizer<P>) -> Self {
        Self::from_arc(Arc::new(authorizer))
    }

    /// Create a layer sharing an existing authorizer
    pub fn from_arc(authorizer: Arc<ClaimsAuthorizer<P>>) -> Self {
        Self {
            authorizer,
            config: AuthLayerConfig::default(),
        }
    }

    /// Replace the configuration
    #[must_use]
    pub fn config(mut self, config: AuthLayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Serve `path` without authorization
    #[must_use]
    pub fn bypass_path(mut self, path: impl Into<String>) -> Self {
        self.config.bypass_paths.push(path.into());
        self
    }
}

impl<S, P: CustomClaimsProvider> Layer<S> for AuthLayer<P> {
    type Service = AuthService<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService::new(inner, Arc::clone(&self.authorizer), self.config.clone())
    }
}
