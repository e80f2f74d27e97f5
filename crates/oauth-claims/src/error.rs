//! Two-tier error model for the authorization pipeline
//!
//! Failures are split into two disjoint kinds:
//!
//! - [`ClientError`] - the caller's fault (missing, invalid or expired token,
//!   insufficient scope). Rendered as 401/403 with a generic message.
//! - [`ApiError`] - the API's fault (metadata, JWKS, introspection or user-info
//!   calls failing, unhandled errors). Rendered as 500 with a correlation
//!   `id` and `utcTime`; technical `details` are logged and never serialized.
//!
//! [`AuthError`] is the tagged union returned across internal boundaries, and
//! [`ErrorTranslator`] classifies anything that is not already one of the two.

use chrono::{DateTime, SecondsFormat, Utc};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Message returned for every 401 response
pub const UNAUTHORIZED_MESSAGE: &str = "Missing, invalid or expired access token";

/// Message returned for every 500 response
pub const SERVER_ERROR_MESSAGE: &str = "Problem encountered in the API";

/// Closed error taxonomy with stable machine-readable codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No bearer token, or a malformed `Authorization` header
    MissingToken,
    /// Token failed introspection or JWT validation, or has expired
    InvalidToken,
    /// Token is valid but lacks a scope the API requires
    InsufficientScope,
    /// Token is valid but lacks a claim the API requires
    MissingClaim,
    /// OpenID Connect discovery document could not be loaded
    MetadataLookupFailure,
    /// Introspection endpoint could not be called
    IntrospectionFailure,
    /// User info endpoint could not be called
    UserInfoFailure,
    /// JWKS document could not be downloaded or parsed
    SigningKeyDownloadFailure,
    /// Anything else
    ServerError,
}

impl ErrorKind {
    /// Stable code used in logs and response bodies
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::InvalidToken => "invalid_token",
            Self::InsufficientScope => "insufficient_scope",
            Self::MissingClaim => "missing_claim",
            Self::MetadataLookupFailure => "metadata_lookup_failure",
            Self::IntrospectionFailure => "introspection_failure",
            Self::UserInfoFailure => "userinfo_failure",
            Self::SigningKeyDownloadFailure => "jwks_download_failure",
            Self::ServerError => "server_error",
        }
    }

    /// Whether this kind is the caller's fault
    pub fn is_client(self) -> bool {
        matches!(
            self,
            Self::MissingToken | Self::InvalidToken | Self::InsufficientScope | Self::MissingClaim
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Fields that let a support engineer correlate a response with server logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportContext {
    /// Random correlation id, also written to the server log
    pub instance_id: u32,
    /// Component the failure came from
    pub area: String,
    /// When the failure happened
    pub utc_time: DateTime<Utc>,
}

/// JSON body of an error response
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Stable error code
    pub code: String,
    /// Human-readable message, never technical
    pub message: String,
    /// Correlation id (server errors only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    /// Failing component (server errors only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    /// RFC 3339 timestamp (server errors only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utc_time: Option<String>,
}

/// An error the caller can act on
///
/// The `reason` is the precise internal explanation (for example "issuer
/// mismatch") and is only ever logged.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ClientError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
    reason: Option<String>,
    context: Option<SupportContext>,
}

impl ClientError {
    /// Create a client error with an explicit status
    pub fn new(status: StatusCode, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            reason: None,
            context: None,
        }
    }

    /// No token was supplied
    pub fn missing_token() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ErrorKind::MissingToken, UNAUTHORIZED_MESSAGE)
            .with_reason("No access token was supplied in the bearer header")
    }

    /// The token was rejected; `reason` is logged, never returned
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ErrorKind::InvalidToken, UNAUTHORIZED_MESSAGE)
            .with_reason(reason)
    }

    /// The token has no value for a claim the API depends on
    pub fn missing_claim(claim: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ErrorKind::MissingClaim, UNAUTHORIZED_MESSAGE)
            .with_reason(format!("missing claim: {claim}"))
    }

    /// The token does not carry the required scope
    pub fn insufficient_scope(scope: &str) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            ErrorKind::InsufficientScope,
            "The token does not contain sufficient scope for this API",
        )
        .with_reason(format!("required scope '{scope}' is not present"))
    }

    /// Attach the internal reason
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach correlation fields
    #[must_use]
    pub fn with_context(mut self, context: SupportContext) -> Self {
        self.context = Some(context);
        self
    }

    /// HTTP status of the response
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Classification
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Message returned to the caller
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Internal reason, for logs only
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Correlation fields, present for errors derived from an [`ApiError`]
    pub fn context(&self) -> Option<&SupportContext> {
        self.context.as_ref()
    }

    /// Body returned to the caller
    ///
    /// All 401s share the `unauthorized` code so that callers cannot tell
    /// why a token was rejected.
    pub fn to_response(&self) -> ErrorResponse {
        let code = if self.status == StatusCode::UNAUTHORIZED {
            "unauthorized"
        } else {
            self.kind.code()
        };

        ErrorResponse {
            code: code.to_string(),
            message: self.message.clone(),
            id: self.context.as_ref().map(|c| c.instance_id),
            area: self.context.as_ref().map(|c| c.area.clone()),
            utc_time: self
                .context
                .as_ref()
                .map(|c| c.utc_time.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

/// An error that is the API's fault
///
/// Every instance gets a random `instance_id` in `10000..=99999` and a UTC
/// timestamp when created. [`ApiError::to_client_error`] exposes only those
/// two values plus the code and area.
#[derive(Debug, Clone, Error)]
#[error("{kind} in {area}: {message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    area: String,
    instance_id: u32,
    utc_time: DateTime<Utc>,
    details: Option<String>,
}

impl ApiError {
    /// Create a server error originating from `area`
    pub fn new(kind: ErrorKind, area: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            area: area.into(),
            instance_id: fastrand::u32(10_000..=99_999),
            utc_time: Utc::now(),
            details: None,
        }
    }

    /// Attach technical details, such as upstream URLs and response bodies
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Classification
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Internal message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Component the failure came from
    pub fn area(&self) -> &str {
        &self.area
    }

    /// Correlation id shared by the log record and the response
    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    /// Time of the failure
    pub fn utc_time(&self) -> DateTime<Utc> {
        self.utc_time
    }

    /// Technical details, for logs only
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Caller-facing form: generic message plus correlation fields
    pub fn to_client_error(&self) -> ClientError {
        ClientError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            self.kind,
            SERVER_ERROR_MESSAGE,
        )
        .with_context(SupportContext {
            instance_id: self.instance_id,
            area: self.area.clone(),
            utc_time: self.utc_time,
        })
    }
}

/// Failure of one authorization attempt
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The caller's fault
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The API's fault
    #[error(transparent)]
    Server(#[from] ApiError),
}

impl AuthError {
    /// Classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Client(e) => e.kind(),
            Self::Server(e) => e.kind(),
        }
    }

    /// HTTP status the adapter responds with
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Client(e) => e.status(),
            Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing form of either kind
    pub fn to_client_error(&self) -> ClientError {
        match self {
            Self::Client(e) => e.clone(),
            Self::Server(e) => e.to_client_error(),
        }
    }

    /// Write one structured log record for this failure
    pub fn log(&self) {
        match self {
            Self::Client(e) => warn!(
                error_code = e.kind().code(),
                status = e.status().as_u16(),
                reason = e.reason().unwrap_or_default(),
                "Request rejected"
            ),
            Self::Server(e) => error!(
                error_code = e.kind().code(),
                instance_id = e.instance_id(),
                area = e.area(),
                utc_time = %e.utc_time(),
                details = e.details().unwrap_or_default(),
                "{}",
                e.message()
            ),
        }
    }

    /// Build the HTTP response for this failure
    ///
    /// 401 responses carry a `WWW-Authenticate: Bearer` challenge, with
    /// `error="invalid_token"` only when a token was presented; no response ever
    /// contains upstream URLs, bodies or internal messages.
    pub fn to_http_response(&self) -> http::Response<String> {
        let client = self.to_client_error();
        let body = serde_json::to_string(&client.to_response()).unwrap_or_else(|_| {
            format!(r#"{{"code":"{}","message":"{}"}}"#, client.kind().code(), client.message())
        });

        let mut builder = http::Response::builder()
            .status(client.status())
            .header(http::header::CONTENT_TYPE, "application/json");

        match client.status() {
            // No credentials were presented, so the challenge carries no error code
            StatusCode::UNAUTHORIZED if client.kind() == ErrorKind::MissingToken => {
                builder = builder.header(http::header::WWW_AUTHENTICATE, "Bearer");
            }
            StatusCode::UNAUTHORIZED => {
                builder = builder.header(
                    http::header::WWW_AUTHENTICATE,
                    r#"Bearer error="invalid_token", error_description="Missing, invalid or expired access token""#,
                );
            }
            StatusCode::FORBIDDEN => {
                builder = builder.header(
                    http::header::WWW_AUTHENTICATE,
                    r#"Bearer error="insufficient_scope""#,
                );
            }
            _ => {}
        }

        builder.body(body).unwrap_or_else(|_| {
            let mut response = http::Response::new(String::new());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
    }
}

/// Classifies arbitrary errors into the two-tier model
pub struct ErrorTranslator;

impl ErrorTranslator {
    /// Area used for errors that carry no classification of their own
    pub const UNHANDLED_AREA: &'static str = "API";

    /// Return already-classified errors unchanged, wrap everything else
    ///
    /// Unclassified errors become a `server_error` [`ApiError`] whose
    /// `details` hold the full error chain for the log.
    pub fn translate(error: anyhow::Error) -> AuthError {
        let error = match error.downcast::<AuthError>() {
            Ok(auth) => return auth,
            Err(e) => e,
        };
        let error = match error.downcast::<ClientError>() {
            Ok(client) => return AuthError::Client(client),
            Err(e) => e,
        };
        let error = match error.downcast::<ApiError>() {
            Ok(api) => return AuthError::Server(api),
            Err(e) => e,
        };

        AuthError::Server(
            ApiError::new(
                ErrorKind::ServerError,
                Self::UNHANDLED_AREA,
                "An unexpected exception occurred in the API",
            )
            .with_details(format!("{error:#}")),
        )
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(error: anyhow::Error) -> Self {
        ErrorTranslator::translate(error)
    }
}
