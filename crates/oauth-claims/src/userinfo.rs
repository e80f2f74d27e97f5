//! OpenID Connect user info lookup

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::error;
use url::Url;

use crate::claims::UserInfoClaims;
use crate::discovery::OAuthErrorBody;
use crate::error::{ApiError, AuthError, ClientError, ErrorKind};

const AREA: &str = "UserInfo";

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Calls the user info endpoint with the caller's access token
#[derive(Debug, Clone)]
pub struct UserInfoClient {
    endpoint: Url,
    http_client: reqwest::Client,
}

impl UserInfoClient {
    /// Create a client for `endpoint`
    pub fn new(endpoint: Url, http_client: reqwest::Client) -> Self {
        Self {
            endpoint,
            http_client,
        }
    }

    /// User info endpoint
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Look up user info for `token`
    ///
    /// # Errors
    ///
    /// A 401 from the endpoint means the token was rejected and yields
    /// `invalid_token`. Every other failure is a `userinfo_failure`
    /// [`ApiError`].
    pub async fn lookup(&self, token: &str) -> Result<UserInfoClaims, AuthError> {
        let response = self
            .http_client
            .get(self.endpoint.clone())
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                error!(endpoint = %self.endpoint, error = %e, "User info request failed");
                self.failure(format!("request failed: {e}"))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.failure(format!("failed to read response: {e}")))?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::invalid_token("user info endpoint rejected the token").into());
        }

        if !status.is_success() {
            let reason = match OAuthErrorBody::parse(&body).summary() {
                Some(summary) => format!("status {status}, {summary}"),
                None => format!("status {status}, body: {body}"),
            };
            return Err(self.failure(reason).into());
        }

        let response: UserInfoResponse = serde_json::from_str(&body)
            .map_err(|e| self.failure(format!("invalid user info response: {e}")))?;

        Ok(UserInfoClaims {
            given_name: response.given_name,
            family_name: response.family_name,
            email: response.email,
        })
    }

    fn failure(&self, reason: String) -> ApiError {
        ApiError::new(
            ErrorKind::UserInfoFailure,
            AREA,
            "Problem encountered downloading user info",
        )
        .with_details(format!("{reason} (url: {})", self.endpoint))
    }
}
