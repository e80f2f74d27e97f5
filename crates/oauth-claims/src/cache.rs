//! Claims cache keyed by token hash
//!
//! [`ClaimsCache`] owns the key derivation, the expiry arithmetic and the
//! serialization contract. Storage is delegated to a [`ClaimsStore`], which
//! must be safe to share across concurrent requests; the cache itself holds
//! no locks.
//!
//! # Expiry
//!
//! An entry for a token expiring at `exp` is stored until
//! `now + min(exp - now, max_cache_duration)`. If the token has already
//! expired when caching is attempted, nothing is stored.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::Expiry;
use moka::future::Cache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::claims::Claims;

/// One stored claims entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Hash of the access token
    pub token_hash: String,
    /// Serialized [`Claims`]
    pub serialized_claims: Vec<u8>,
    /// When the entry stops being served
    pub absolute_expiry: DateTime<Utc>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.absolute_expiry
    }
}

/// Thread-safe key-value store behind the claims cache
///
/// Implementations are expected to evict entries at `absolute_expiry` and
/// to apply per-key last-write-wins semantics.
#[async_trait]
pub trait ClaimsStore: Send + Sync + 'static {
    /// Read the entry for `token_hash`
    async fn get(&self, token_hash: &str) -> anyhow::Result<Option<CacheEntry>>;

    /// Write or overwrite an entry
    async fn put(&self, entry: CacheEntry) -> anyhow::Result<()>;
}

/// Per-entry time-to-live for the in-memory store
struct EntryExpiry;

impl Expiry<String, Arc<StoredEntry>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<StoredEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<StoredEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

struct StoredEntry {
    entry: CacheEntry,
    ttl: Duration,
}

/// In-process [`ClaimsStore`] backed by moka
///
/// Capacity-bounded; every entry expires at its own absolute expiry.
#[derive(Clone)]
pub struct MemoryClaimsStore {
    cache: Cache<String, Arc<StoredEntry>>,
}

impl std::fmt::Debug for MemoryClaimsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryClaimsStore")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl MemoryClaimsStore {
    /// Create a store holding at most `capacity` entries
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .expire_after(EntryExpiry)
                .build(),
        }
    }
}

#[async_trait]
impl ClaimsStore for MemoryClaimsStore {
    async fn get(&self, token_hash: &str) -> anyhow::Result<Option<CacheEntry>> {
        let entry = self
            .cache
            .get(token_hash)
            .await
            .map(|stored| stored.entry.clone())
            .filter(|entry| entry.is_live(Utc::now()));
        Ok(entry)
    }

    async fn put(&self, entry: CacheEntry) -> anyhow::Result<()> {
        let ttl = (entry.absolute_expiry - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let key = entry.token_hash.clone();
        self.cache
            .insert(key, Arc::new(StoredEntry { entry, ttl }))
            .await;
        Ok(())
    }
}

/// Time-bounded claims cache keyed by token hash
#[derive(Clone)]
pub struct ClaimsCache {
    store: Arc<dyn ClaimsStore>,
    max_duration: Duration,
}

impl std::fmt::Debug for ClaimsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimsCache")
            .field("max_duration", &self.max_duration)
            .finish_non_exhaustive()
    }
}

impl ClaimsCache {
    /// Create a cache over `store`, clamping entries to `max_duration`
    pub fn new(store: Arc<dyn ClaimsStore>, max_duration: Duration) -> Self {
        Self {
            store,
            max_duration,
        }
    }

    /// Maximum time an entry is kept
    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Read cached claims
    ///
    /// Store failures and undecodable entries are logged and reported as a
    /// miss, so that the caller falls back to full validation.
    pub async fn get<C>(&self, token_hash: &str) -> Option<Claims<C>>
    where
        C: DeserializeOwned,
    {
        let entry = match self.store.get(token_hash).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(token_hash, error = %e, "Claims cache read failed");
                return None;
            }
        };

        if !entry.is_live(Utc::now()) {
            return None;
        }

        match serde_json::from_slice(&entry.serialized_claims) {
            Ok(claims) => {
                debug!(token_hash, "Claims cache hit");
                Some(claims)
            }
            Err(e) => {
                warn!(token_hash, error = %e, "Cached claims could not be deserialized");
                None
            }
        }
    }

    /// Cache claims until the token expires, or for at most the max duration
    ///
    /// Best effort: failures are logged, never returned.
    pub async fn put<C>(&self, token_hash: &str, claims: &Claims<C>, token_expiry: i64)
    where
        C: Serialize,
    {
        self.put_at(token_hash, claims, token_expiry, Utc::now())
            .await;
    }

    async fn put_at<C>(
        &self,
        token_hash: &str,
        claims: &Claims<C>,
        token_expiry: i64,
        now: DateTime<Utc>,
    ) where
        C: Serialize,
    {
        let Some(absolute_expiry) = self.absolute_expiry(token_expiry, now) else {
            debug!(
                token_hash,
                token_expiry, "Token expired before caching, claims not cached"
            );
            return;
        };

        let serialized_claims = match serde_json::to_vec(claims) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(token_hash, error = %e, "Claims could not be serialized for caching");
                return;
            }
        };

        let entry = CacheEntry {
            token_hash: token_hash.to_string(),
            serialized_claims,
            absolute_expiry,
        };

        match self.store.put(entry).await {
            Ok(()) => debug!(token_hash, %absolute_expiry, "Claims cached"),
            Err(e) => warn!(token_hash, error = %e, "Claims cache write failed"),
        }
    }

    /// `now + min(token_expiry - now, max_duration)`, or `None` if expired
    fn absolute_expiry(&self, token_expiry: i64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let seconds_to_cache = token_expiry - now.timestamp();
        if seconds_to_cache <= 0 {
            return None;
        }

        let max_seconds = i64::try_from(self.max_duration.as_secs()).unwrap_or(i64::MAX);
        let seconds_to_cache = seconds_to_cache.min(max_seconds);
        now.checked_add_signed(chrono::Duration::try_seconds(seconds_to_cache)?)
    }
}
