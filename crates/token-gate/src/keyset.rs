//! Signing-key material: discovery, fetching, and caching.
//!
//! The [`KeyStore`] fetches the authority's discovery document
//! (`/.well-known/openid-configuration`), follows its `jwks_uri` to the key
//! set, and caches the consolidated [`KeyMaterial`] until a refresh is
//! requested — typically by the local validator on an unknown-key encounter.
//!
//! # Concurrency
//!
//! Material is replaced wholesale behind an `RwLock<Option<Arc<..>>>`:
//! concurrent readers see either the old or the new material, never a
//! partially updated one. Refreshes coalesce through a single gate — callers
//! pass the generation they observed, and whoever wins the gate fetches once
//! while the rest reuse the result.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Suffix appended to the authority URL to locate the discovery document.
pub const DISCOVERY_SUFFIX: &str = ".well-known/openid-configuration";

/// Default timeout for backchannel HTTP fetches.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the key material cache.
///
/// Both variants mean local validation cannot make progress with fresh keys;
/// a failed refresh leaves previously cached material in place.
#[derive(Debug, Clone, Error)]
pub enum KeySetError {
    /// The discovery document was unreachable or malformed.
    #[error("discovery document fetch failed: {0}")]
    DiscoveryFetch(String),

    /// The key set document was unreachable or malformed.
    #[error("key set fetch failed: {0}")]
    KeySetFetch(String),
}

/// A fetch failure reported by a [`DocumentFetcher`].
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct FetchError(pub String);

/// Capability for fetching backchannel documents.
///
/// Injected at construction so the core stays testable without network
/// access; the production implementation is [`HttpDocumentFetcher`].
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetch the raw bytes at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`DocumentFetcher`] over a `reqwest` client.
///
/// Certificate handling, proxies, and timeouts are the client's concern:
/// hosts that need custom TLS trust anchors or handlers build the
/// `reqwest::Client` themselves and pass it in.
pub struct HttpDocumentFetcher {
    client: reqwest::Client,
}

impl HttpDocumentFetcher {
    /// Create a fetcher over a caller-configured client.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Create a fetcher with default timeouts.
    #[must_use]
    pub fn with_defaults() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "token_gate.keyset", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });
        Self::new(client)
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError(format!("unexpected status {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// JSON Web Key from the key set document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Curve name for OKP keys ("Ed25519").
    #[serde(default)]
    pub crv: Option<String>,

    /// Public key value for OKP keys (base64url encoded).
    #[serde(default)]
    pub x: Option<String>,

    /// RSA modulus (base64url encoded).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url encoded).
    #[serde(default)]
    pub e: Option<String>,

    /// Algorithm ("RS256", "EdDSA", ...).
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// Key set document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// The parts of the discovery document this crate consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    /// The issuer identifier tokens must carry in `iss`.
    pub issuer: String,

    /// Where the key set document lives.
    pub jwks_uri: String,
}

/// One consolidated discovery round: keys plus derived audience/issuer.
///
/// Replaced wholesale on refresh and shared read-only by all concurrent
/// validations in between.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    keys: HashMap<String, Jwk>,

    /// Issuer from the discovery document.
    pub issuer: String,

    /// Expected audience: the configured override, or `issuer + "/resources"`.
    pub audience: String,

    /// When this material was fetched.
    pub fetched_at: DateTime<Utc>,

    generation: u64,
}

impl KeyMaterial {
    /// Look up a verification key by id.
    #[must_use]
    pub fn key(&self, kid: &str) -> Option<&Jwk> {
        self.keys.get(kid)
    }

    /// Monotonic counter distinguishing successive refreshes.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of verification keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when the key set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Fetching, caching key store.
///
/// Caches material indefinitely until a refresh is requested. A failed
/// refresh leaves the previous material in place (stale but available);
/// with no prior material every validation fails until a fetch succeeds.
pub struct KeyStore {
    discovery_url: String,
    audience_override: Option<String>,
    fetcher: Arc<dyn DocumentFetcher>,
    current: RwLock<Option<Arc<KeyMaterial>>>,
    refresh_gate: Mutex<()>,
}

impl KeyStore {
    /// Create a key store.
    ///
    /// `discovery_url` is the full URL of the discovery document (see
    /// [`crate::config::ValidationOptions::discovery_url`]).
    #[must_use]
    pub fn new(
        discovery_url: String,
        audience_override: Option<String>,
        fetcher: Arc<dyn DocumentFetcher>,
    ) -> Self {
        Self {
            discovery_url,
            audience_override,
            fetcher,
            current: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    /// The cached material, if any, without triggering a fetch.
    pub async fn current(&self) -> Option<Arc<KeyMaterial>> {
        self.current.read().await.clone()
    }

    /// Get key material, fetching on first use.
    pub async fn get(&self) -> Result<Arc<KeyMaterial>, KeySetError> {
        if let Some(material) = self.current.read().await.clone() {
            return Ok(material);
        }
        self.refresh_from(0).await
    }

    /// Refresh the material, coalescing concurrent requests.
    ///
    /// `seen` is the generation the caller observed before deciding to
    /// refresh (0 when it saw none). If another refresh completed while this
    /// call waited for the gate, the newer material is returned without a
    /// second fetch — N simultaneous unknown-key events produce one
    /// underlying fetch.
    #[instrument(skip(self))]
    pub async fn refresh_from(&self, seen: u64) -> Result<Arc<KeyMaterial>, KeySetError> {
        let _gate = self.refresh_gate.lock().await;

        if let Some(material) = self.current.read().await.clone() {
            if material.generation > seen {
                tracing::debug!(
                    target: "token_gate.keyset",
                    generation = material.generation,
                    "Refresh coalesced onto completed fetch"
                );
                return Ok(material);
            }
        }

        let material = Arc::new(self.fetch_material(seen.saturating_add(1)).await?);

        let mut current = self.current.write().await;
        *current = Some(Arc::clone(&material));

        tracing::info!(
            target: "token_gate.keyset",
            key_count = material.len(),
            issuer = %material.issuer,
            generation = material.generation,
            "Key material refreshed"
        );

        Ok(material)
    }

    async fn fetch_material(&self, generation: u64) -> Result<KeyMaterial, KeySetError> {
        tracing::debug!(
            target: "token_gate.keyset",
            url = %self.discovery_url,
            "Fetching discovery document"
        );

        let discovery_bytes = self
            .fetcher
            .fetch(&self.discovery_url)
            .await
            .map_err(|e| KeySetError::DiscoveryFetch(e.to_string()))?;

        let discovery: DiscoveryDocument = serde_json::from_slice(&discovery_bytes)
            .map_err(|e| KeySetError::DiscoveryFetch(e.to_string()))?;

        let jwks_bytes = self
            .fetcher
            .fetch(&discovery.jwks_uri)
            .await
            .map_err(|e| KeySetError::KeySetFetch(e.to_string()))?;

        let jwks: JwksDocument = serde_json::from_slice(&jwks_bytes)
            .map_err(|e| KeySetError::KeySetFetch(e.to_string()))?;

        let keys: HashMap<String, Jwk> = jwks
            .keys
            .into_iter()
            .map(|key| (key.kid.clone(), key))
            .collect();

        let audience = self
            .audience_override
            .clone()
            .unwrap_or_else(|| derived_audience(&discovery.issuer));

        Ok(KeyMaterial {
            keys,
            issuer: discovery.issuer,
            audience,
            fetched_at: Utc::now(),
            generation,
        })
    }
}

/// The audience convention used when no override is configured.
#[must_use]
pub fn derived_audience(issuer: &str) -> String {
    format!("{}/resources", issuer.trim_end_matches('/'))
}
