//! HTTP routes

use axum::routing::get;
use axum::{Extension, Json, Router};
use oauth_claims::tower::AuthLayer;
use oauth_claims::{Claims, ClaimsAuthorizer};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::claims_provider::{InvestorClaims, InvestorClaimsProvider};

/// Path served without a token
pub const HEALTH_PATH: &str = "/health";

/// User details shown by the frontend
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoResponse {
    given_name: String,
    family_name: String,
    role: String,
    regions: Vec<String>,
}

/// Build the application router with every route behind the auth layer
pub fn router(authorizer: ClaimsAuthorizer<InvestorClaimsProvider>) -> Router {
    Router::new()
        .route("/investments/userinfo", get(get_user_info))
        .route(HEALTH_PATH, get(health))
        .layer(AuthLayer::new(authorizer).bypass_path(HEALTH_PATH))
        .layer(TraceLayer::new_for_http())
}

async fn get_user_info(
    Extension(claims): Extension<Claims<InvestorClaims>>,
) -> Json<UserInfoResponse> {
    Json(UserInfoResponse {
        given_name: claims.given_name().unwrap_or_default().to_string(),
        family_name: claims.family_name().unwrap_or_default().to_string(),
        role: claims.custom.user_role.clone(),
        regions: claims.custom.user_regions.clone(),
    })
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use oauth_claims::{
        AuthError, ClaimsCache, ClientError, MemoryClaimsStore, TokenClaims, TokenValidator,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Accepts the token "good" only
    struct StubValidator;

    #[async_trait]
    impl TokenValidator for StubValidator {
        async fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
            if token != "good" {
                return Err(ClientError::invalid_token("unknown test token").into());
            }
            Ok(TokenClaims {
                subject: "user-1".to_string(),
                client_id: "web-client".to_string(),
                scopes: vec!["openid".to_string(), "investments".to_string()],
                expiry: i64::from(u32::MAX),
            })
        }
    }

    fn app() -> Router {
        let provider = InvestorClaimsProvider::default().with_subject("user-1", "10345", "user");
        let cache = ClaimsCache::new(
            Arc::new(MemoryClaimsStore::new(100)),
            Duration::from_secs(60),
        );
        router(ClaimsAuthorizer::new(
            Arc::new(StubValidator),
            Arc::new(provider),
            cache,
        ))
    }

    async fn body_json(body: Body) -> serde_json::Value {
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_userinfo_with_valid_token() {
        let request = Request::builder()
            .uri("/investments/userinfo")
            .header(header::AUTHORIZATION, "Bearer good")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response.into_body()).await;
        assert_eq!(json["role"], "user");
        assert_eq!(json["givenName"], "");
    }

    #[tokio::test]
    async fn test_userinfo_without_token() {
        let request = Request::builder()
            .uri("/investments/userinfo")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let json = body_json(response.into_body()).await;
        assert_eq!(json["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let request = Request::builder()
            .uri(HEALTH_PATH)
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
