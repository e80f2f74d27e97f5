//! Common test utilities for integration tests
//!
//! Provides a stubbed identity provider (discovery, JWKS, user info and
//! introspection endpoints) and RS256 token minting.

#![allow(dead_code)]

use std::sync::{Arc, LazyLock};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use oauth_claims::{
    ClaimsAuthorizer, CustomClaimsProvider, IssuerMetadata, IssuerMetadataResolver,
    MemoryClaimsStore, OAuthConfig,
};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const KEY_ID: &str = "key-1";
pub const AUDIENCE: &str = "api.mycompany.com";

/// RSA key pair shared by every test in a binary
pub struct TestKey {
    encoding_key: EncodingKey,
    n: String,
    e: String,
}

impl TestKey {
    fn generate() -> Self {
        use rsa::pkcs8::{EncodePrivateKey, LineEnding};
        use rsa::traits::PublicKeyParts;
        use rsa::RsaPrivateKey;

        let private_key =
            RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("Failed to generate RSA key");
        let pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("Failed to encode private key");

        Self {
            encoding_key: EncodingKey::from_rsa_pem(pem.as_bytes()).expect("Invalid RSA key"),
            n: URL_SAFE_NO_PAD.encode(private_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(private_key.e().to_bytes_be()),
        }
    }

    /// Public JWK for this key under `kid`
    pub fn jwk(&self, kid: &str) -> Value {
        json!({
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": self.n,
            "e": self.e,
        })
    }

    /// Sign `claims` as an RS256 JWT with `kid`
    pub fn sign(&self, kid: &str, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, claims, &self.encoding_key).expect("Failed to encode test JWT")
    }
}

pub static TEST_KEY: LazyLock<TestKey> = LazyLock::new(TestKey::generate);

/// Get current Unix timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Stubbed OpenID Connect identity provider
pub struct MockIdentityProvider {
    pub server: MockServer,
}

impl MockIdentityProvider {
    /// Start the server and mount its discovery document
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": base,
                "jwks_uri": format!("{base}/jwks"),
                "userinfo_endpoint": format!("{base}/userinfo"),
                "introspection_endpoint": format!("{base}/introspect"),
            })))
            .mount(&server)
            .await;

        Self { server }
    }

    /// Issuer in the discovery document
    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// Configuration pointing at this provider
    pub fn config(&self) -> OAuthConfig {
        let mut config = OAuthConfig::new(self.server.uri().parse().expect("Invalid mock URI"));
        config.expected_audience = Some(AUDIENCE.to_string());
        config
    }

    /// Standard claims for a token issued by this provider
    pub fn claims(&self, sub: &str, scope: &str, exp_offset_secs: i64) -> Value {
        let now = now();
        json!({
            "iss": self.issuer(),
            "aud": AUDIENCE,
            "sub": sub,
            "client_id": "web-client",
            "scope": scope,
            "iat": now,
            "exp": now + exp_offset_secs,
        })
    }

    /// Mint a token for `sub` with `scope`, valid for 15 minutes
    pub fn token(&self, sub: &str, scope: &str) -> String {
        TEST_KEY.sign(KEY_ID, &self.claims(sub, scope, 900))
    }

    /// JWKS containing the test key under `kids`, expecting `calls` downloads
    pub async fn mock_jwks(&self, kids: &[&str], calls: u64) {
        let keys: Vec<Value> = kids.iter().map(|kid| TEST_KEY.jwk(kid)).collect();
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// JWKS endpoint failing with `status`
    pub async fn mock_jwks_error(&self, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// User info endpoint, expecting `calls` requests
    pub async fn mock_userinfo(&self, calls: u64) {
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "given_name": "Guest",
                "family_name": "User",
                "email": "guestuser@mycompany.com",
            })))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// User info endpoint responding with `status`
    pub async fn mock_userinfo_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Introspection endpoint responding with `status` and `body`
    pub async fn mock_introspection(&self, status: u16, body: Value, calls: u64) {
        Mock::given(method("POST"))
            .and(path("/introspect"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Number of requests received for `request_path`
    pub async fn request_count(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == request_path)
            .count()
    }

    /// Load issuer metadata through discovery
    pub async fn metadata(&self, config: &OAuthConfig) -> IssuerMetadata {
        IssuerMetadataResolver::new(config.http_client().expect("HTTP client"))
            .load(&config.authority)
            .await
            .expect("Failed to load metadata")
    }

    /// Build an authorizer for this provider
    pub async fn authorizer<P: CustomClaimsProvider>(
        &self,
        config: &OAuthConfig,
        provider: P,
    ) -> ClaimsAuthorizer<P> {
        let metadata = self.metadata(config).await;
        ClaimsAuthorizer::from_config(
            config,
            &metadata,
            Arc::new(provider),
            Arc::new(MemoryClaimsStore::new(config.claims_cache_capacity)),
            config.http_client().expect("HTTP client"),
        )
        .expect("Failed to build authorizer")
    }
}
