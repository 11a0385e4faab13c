//! Per-token cache of remote validation outcomes.
//!
//! Introspection is a network round-trip on the request hot path; this cache
//! memoizes the outcome per raw token so a token presented repeatedly within
//! its lifetime costs one introspection call. Entries are bounded by the
//! token's own expiry (or a fallback TTL) and are never served once expired.
//!
//! Transient failures (`EndpointUnreachable`) must not be written here: the
//! caller retries the real endpoint on the next request.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::errors::Outcome;

/// Fallback entry lifetime when the token carries no parseable expiry.
pub const DEFAULT_FALLBACK_TTL: Duration = Duration::from_secs(300);

/// Entry count that triggers a full sweep of expired entries on write.
const SWEEP_THRESHOLD: usize = 1024;

struct CacheEntry {
    outcome: Outcome,
    expires_at: i64,
}

/// Validation result cache for endpoint mode.
///
/// Shared by all concurrent validations; reads do not block each other.
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    fallback_ttl_secs: i64,
}

impl ResultCache {
    /// Create a cache with the given fallback TTL.
    #[must_use]
    pub fn new(fallback_ttl: Duration) -> Self {
        // Safe cast: configuration bounds TTLs far below i64 seconds
        #[allow(clippy::cast_possible_wrap)]
        let fallback_ttl_secs = fallback_ttl.as_secs() as i64;
        Self {
            entries: RwLock::new(HashMap::new()),
            fallback_ttl_secs,
        }
    }

    /// Look up the cached outcome for a token.
    ///
    /// Serves an entry only while `now` is strictly before its expiry; an
    /// expired entry found here is removed.
    pub async fn get(&self, token: &str, now: i64) -> Option<Outcome> {
        {
            let entries = self.entries.read().await;
            match entries.get(token) {
                Some(entry) if now < entry.expires_at => return Some(entry.outcome.clone()),
                Some(_) => {} // expired, purge below
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(token)
            .is_some_and(|entry| now >= entry.expires_at)
        {
            entries.remove(token);
        }
        None
    }

    /// Store an outcome for a token.
    ///
    /// `expiry` is the token's own expiry when known; otherwise the entry
    /// lives for the fallback TTL. Outcomes already expired at write time are
    /// not stored. Once the map grows past a threshold, expired entries are
    /// swept during the write.
    pub async fn put(&self, token: &str, outcome: Outcome, expiry: Option<i64>, now: i64) {
        let expires_at = expiry.unwrap_or_else(|| now.saturating_add(self.fallback_ttl_secs));
        if expires_at <= now {
            tracing::debug!(
                target: "token_gate.result_cache",
                "Skipping cache write for already-expired outcome"
            );
            return;
        }

        let mut entries = self.entries.write().await;
        if entries.len() >= SWEEP_THRESHOLD {
            let before = entries.len();
            entries.retain(|_, entry| entry.expires_at > now);
            tracing::debug!(
                target: "token_gate.result_cache",
                swept = before - entries.len(),
                remaining = entries.len(),
                "Swept expired validation results"
            );
        }
        entries.insert(token.to_string(), CacheEntry { outcome, expires_at });
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
