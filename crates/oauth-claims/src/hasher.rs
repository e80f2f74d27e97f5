//! Cache key derivation from raw access tokens

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

/// Derives one-way cache keys from access tokens
///
/// The key is the base64url encoding of the SHA-256 digest of the token, so it
/// is safe to appear in logs and cache backends.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenHasher;

impl TokenHasher {
    /// Hash a raw access token
    pub fn hash(token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}
