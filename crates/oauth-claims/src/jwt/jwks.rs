//! Token signing key resolution
//!
//! The keyset starts empty and is filled on first use. When a token names a
//! `kid` that is not in the keyset, the JWKS document is downloaded again so
//! that key rotation at the identity provider is picked up without a restart.
//!
//! - Readers never block: the keyset lives behind an [`ArcSwap`] and a
//!   download replaces it atomically.
//! - Concurrent misses are coalesced: one download runs at a time, and
//!   requests that waited for it take its outcome (the new keyset or the
//!   same download error) instead of starting another download.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use url::Url;

use crate::error::{ApiError, ErrorKind};

const AREA: &str = "JWKS";

type Keyset = HashMap<String, Arc<Jwk>>;

/// Resolves token signing keys by key id
pub struct SigningKeyResolver {
    jwks_uri: Url,
    http_client: reqwest::Client,
    keys: ArcSwap<Keyset>,
    /// Incremented after every download attempt
    attempts: AtomicU64,
    /// Held for the duration of a download; holds the last failure
    last_failure: Mutex<Option<ApiError>>,
}

impl std::fmt::Debug for SigningKeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyResolver")
            .field("jwks_uri", &self.jwks_uri.as_str())
            .field("key_count", &self.keys.load().len())
            .finish()
    }
}

impl SigningKeyResolver {
    /// Create a resolver with an empty keyset
    pub fn new(jwks_uri: Url, http_client: reqwest::Client) -> Self {
        Self {
            jwks_uri,
            http_client,
            keys: ArcSwap::from_pointee(HashMap::new()),
            attempts: AtomicU64::new(0),
            last_failure: Mutex::new(None),
        }
    }

    /// JWKS endpoint
    pub fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }

    /// Number of keys currently held
    pub fn key_count(&self) -> usize {
        self.keys.load().len()
    }

    /// Look up the key for `kid`, downloading the keyset at most once
    ///
    /// Returns `Ok(None)` if the key is still unknown after a fresh download.
    ///
    /// # Errors
    ///
    /// Returns a `jwks_download_failure` [`ApiError`] if the download fails.
    pub async fn get_key(&self, kid: &str) -> Result<Option<Arc<Jwk>>, ApiError> {
        if let Some(key) = self.cached(kid) {
            return Ok(Some(key));
        }

        let seen = self.attempts.load(Ordering::Acquire);
        let mut last_failure = self.last_failure.lock().await;

        // A download finished while this request waited: share its outcome
        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(key) = self.cached(kid) {
                return Ok(Some(key));
            }
            return match last_failure.as_ref() {
                Some(error) => Err(error.clone()),
                None => Ok(None),
            };
        }
        if let Some(key) = self.cached(kid) {
            return Ok(Some(key));
        }

        debug!(kid, jwks_uri = %self.jwks_uri, "Signing key not cached");
        let outcome = self.download().await;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(keyset) => {
                self.keys.store(Arc::new(keyset));
                *last_failure = None;
                Ok(self.cached(kid))
            }
            Err(error) => {
                *last_failure = Some(error.clone());
                Err(error)
            }
        }
    }

    fn cached(&self, kid: &str) -> Option<Arc<Jwk>> {
        self.keys.load().get(kid).cloned()
    }

    async fn download(&self) -> Result<Keyset, ApiError> {
        info!(jwks_uri = %self.jwks_uri, "Downloading token signing keys");

        let response = self
            .http_client
            .get(self.jwks_uri.clone())
            .send()
            .await
            .map_err(|e| {
                error!(jwks_uri = %self.jwks_uri, error = %e, "JWKS request failed");
                self.download_error(format!("request failed: {e}"))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.download_error(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(self.download_error(format!("status {status}, body: {body}")));
        }

        let jwks: JwkSet = serde_json::from_str(&body)
            .map_err(|e| self.download_error(format!("invalid JWKS document: {e}")))?;

        let keyset: Keyset = jwks
            .keys
            .into_iter()
            .filter_map(|jwk| {
                let kid = jwk.common.key_id.clone()?;
                Some((kid, Arc::new(jwk)))
            })
            .collect();

        info!(
            jwks_uri = %self.jwks_uri,
            key_count = keyset.len(),
            "Downloaded token signing keys"
        );
        Ok(keyset)
    }

    fn download_error(&self, reason: String) -> ApiError {
        ApiError::new(
            ErrorKind::SigningKeyDownloadFailure,
            AREA,
            "Problem downloading token signing keys",
        )
        .with_details(format!("{reason} (url: {})", self.jwks_uri))
    }
}
