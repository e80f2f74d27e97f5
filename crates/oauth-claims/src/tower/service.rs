//! Tower Service implementation for claims authorization

use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tower_service::Service;
use tracing::debug;

use super::AuthLayerConfig;
use crate::authorizer::ClaimsAuthorizer;
use crate::claims::CustomClaimsProvider;

/// Tower Service that authorizes each request before calling `S`
pub struct AuthService<S, P: CustomClaimsProvider> {
    inner: S,
    authorizer: Arc<ClaimsAuthorizer<P>>,
    config: AuthLayerConfig,
}

impl<S: Clone, P: CustomClaimsProvider> Clone for AuthService<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            authorizer: Arc::clone(&self.authorizer),
            config: self.config.clone(),
        }
    }
}

impl<S, P: CustomClaimsProvider> std::fmt::Debug for AuthService<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S, P: CustomClaimsProvider> AuthService<S, P> {
    /// Create a new auth service
    pub fn new(inner: S, authorizer: Arc<ClaimsAuthorizer<P>>, config: AuthLayerConfig) -> Self {
        Self {
            inner,
            authorizer,
            config,
        }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

/// Boxed future returned by [`AuthService`]
pub type AuthServiceFuture<T, E> = BoxFuture<'static, Result<T, E>>;

impl<S, P, B, ResBody> Service<http::Request<B>> for AuthService<S, P>
where
    S: Service<http::Request<B>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + 'static,
    P: CustomClaimsProvider,
    B: Send + 'static,
    ResBody: From<String> + Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = S::Error;
    type Future = AuthServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        // The clone may not be ready; keep the one poll_ready was called on
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if self.config.should_bypass(req.uri().path()) {
            debug!(path = req.uri().path(), "Authorization bypassed");
            return Box::pin(async move { inner.call(req).await });
        }

        let authorizer = Arc::clone(&self.authorizer);
        let auth_header = self.config.auth_header.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            let header = parts
                .headers
                .get(&auth_header)
                .and_then(|value| value.to_str().ok());

            match authorizer.authorize_header(header).await {
                Ok(claims) => {
                    parts.extensions.insert(claims);
                    inner.call(http::Request::from_parts(parts, body)).await
                }
                Err(error) => {
                    error.log();
                    Ok(error.to_http_response().map(ResBody::from))
                }
            }
        })
    }
}
