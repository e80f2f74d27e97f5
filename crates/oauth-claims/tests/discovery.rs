//! OpenID Connect discovery at startup

mod common;

use common::{KEY_ID, MockIdentityProvider, TEST_KEY};
use oauth_claims::{
    ClaimsAuthorizer, ConfigError, ErrorKind, IssuerMetadataResolver, MemoryClaimsStore,
    NoCustomClaims, OAuthConfig,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_metadata_is_loaded() {
    let idp = MockIdentityProvider::start().await;
    let metadata = idp.metadata(&idp.config()).await;

    assert_eq!(metadata.issuer, idp.issuer());
    assert_eq!(
        metadata.jwks_endpoint.unwrap().as_str(),
        format!("{}/jwks", idp.issuer())
    );
    assert!(metadata.userinfo_endpoint.is_some());
    assert!(metadata.introspection_endpoint.is_some());
}

#[tokio::test]
async fn test_metadata_failure_carries_url_and_oauth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "temporarily_unavailable",
            "error_description": "try later",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let authority = Url::parse(&server.uri()).unwrap();
    let error = IssuerMetadataResolver::new(reqwest::Client::new())
        .load(&authority)
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::MetadataLookupFailure);
    assert_eq!(error.area(), "Metadata");
    let details = error.details().unwrap();
    assert!(details.contains("/.well-known/openid-configuration"));
    assert!(details.contains("temporarily_unavailable: try later"));
}

#[tokio::test]
async fn test_unreachable_authority_is_metadata_failure() {
    // Bind a server to learn a free port, then shut it down
    let server = MockServer::start().await;
    let authority = Url::parse(&server.uri()).unwrap();
    drop(server);

    let error = IssuerMetadataResolver::new(reqwest::Client::new())
        .load(&authority)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::MetadataLookupFailure);
}

#[tokio::test]
async fn test_jwks_endpoint_override() {
    let idp = MockIdentityProvider::start().await;
    Mock::given(method("GET"))
        .and(path("/keys/override"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "keys": [TEST_KEY.jwk(KEY_ID)] })),
        )
        .expect(1)
        .mount(&idp.server)
        .await;
    idp.mock_jwks(&[KEY_ID], 0).await;

    let mut config = idp.config();
    config.user_info = false;
    config.jwks_endpoint = Some(format!("{}/keys/override", idp.issuer()).parse().unwrap());
    let authorizer = idp.authorizer(&config, NoCustomClaims).await;

    authorizer
        .authorize(Some(&idp.token("user-1", "openid")))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_jwt_strategy_needs_a_jwks_uri() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": server.uri(),
        })))
        .mount(&server)
        .await;

    let config = OAuthConfig::new(Url::parse(&server.uri()).unwrap());
    let metadata = IssuerMetadataResolver::new(reqwest::Client::new())
        .load(&config.authority)
        .await
        .unwrap();

    let result = ClaimsAuthorizer::from_config(
        &config,
        &metadata,
        Arc::new(NoCustomClaims),
        Arc::new(MemoryClaimsStore::new(10)),
        reqwest::Client::new(),
    );
    assert!(matches!(result, Err(ConfigError::MissingEndpoint("jwks_uri"))));
}
