//! Remote token validation via OAuth 2.0 token introspection.
//!
//! The [`Introspector`] capability posts a token to the authority's
//! introspection endpoint with client credentials and interprets the
//! `{active, ...claims}` response. The [`EndpointValidator`] wraps it with
//! the validation result cache so a token presented repeatedly within its
//! lifetime costs a single network round-trip.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

use crate::claims::ClaimSet;
use crate::config::ValidationOptions;
use crate::errors::{Outcome, Rejection};
use crate::jwt;
use crate::result_cache::ResultCache;

/// Claim name under which the raw token is preserved when configured.
const TOKEN_CLAIM: &str = "token";

/// Errors from the introspection collaborator.
///
/// Both variants surface to the pipeline as `EndpointUnreachable`: a
/// transient failure for this request, never cached, never a crash.
#[derive(Debug, Clone, Error)]
pub enum IntrospectError {
    /// Transport failure or unexpected HTTP status.
    #[error("introspection endpoint unreachable: {0}")]
    Unreachable(String),

    /// The endpoint answered, but not with a parseable introspection
    /// response.
    #[error("invalid introspection response: {0}")]
    InvalidResponse(String),
}

/// Introspection response per RFC 7662: an `active` marker plus claims.
#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently valid at the authority.
    pub active: bool,

    /// All other top-level members (sub, exp, scope, ...).
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// Capability for asking the authority whether a token is valid.
///
/// Injected at construction so the core stays testable without network
/// access; the production implementation is [`HttpIntrospector`].
#[async_trait]
pub trait Introspector: Send + Sync {
    /// Introspect a token at the authority.
    async fn introspect(&self, token: &str) -> Result<IntrospectionResponse, IntrospectError>;
}

/// [`Introspector`] over a `reqwest` client.
///
/// Sends `token=<raw>` as a form body with HTTP Basic client credentials,
/// the standard introspection authentication scheme.
pub struct HttpIntrospector {
    endpoint: String,
    client_id: String,
    client_secret: SecretString,
    client: reqwest::Client,
}

impl HttpIntrospector {
    /// Create an introspector over a caller-configured client.
    #[must_use]
    pub fn new(
        endpoint: String,
        client_id: String,
        client_secret: SecretString,
        client: reqwest::Client,
    ) -> Self {
        Self {
            endpoint,
            client_id,
            client_secret,
            client,
        }
    }
}

impl std::fmt::Debug for HttpIntrospector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIntrospector")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl Introspector for HttpIntrospector {
    #[instrument(skip_all)]
    async fn introspect(&self, token: &str) -> Result<IntrospectionResponse, IntrospectError> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "token_gate.introspection", error = %e, "Introspection request failed");
                IntrospectError::Unreachable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                target: "token_gate.introspection",
                status = %status,
                "Introspection endpoint returned error status"
            );
            return Err(IntrospectError::Unreachable(format!(
                "unexpected status {status}"
            )));
        }

        response.json::<IntrospectionResponse>().await.map_err(|e| {
            tracing::warn!(target: "token_gate.introspection", error = %e, "Failed to parse introspection response");
            IntrospectError::InvalidResponse(e.to_string())
        })
    }
}

/// Validator for the remote-endpoint strategy.
pub struct EndpointValidator {
    introspector: Arc<dyn Introspector>,
    cache: Option<ResultCache>,
    name_claim_type: String,
    role_claim_type: String,
    preserve_access_token: bool,
}

impl EndpointValidator {
    /// Create an endpoint validator; the result cache is built when the
    /// options enable it.
    #[must_use]
    pub fn new(options: &ValidationOptions, introspector: Arc<dyn Introspector>) -> Self {
        let cache = options
            .cache_results
            .then(|| ResultCache::new(options.cache_fallback_ttl));
        Self {
            introspector,
            cache,
            name_claim_type: options.name_claim_type.clone(),
            role_claim_type: options.role_claim_type.clone(),
            preserve_access_token: options.preserve_access_token,
        }
    }

    /// Validate a token against the introspection endpoint.
    ///
    /// A cache hit skips the network call entirely. Both authenticated and
    /// inactive outcomes are cached, bounded by the token's expiry; an
    /// unreachable endpoint is never cached.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Outcome {
        let now = chrono::Utc::now().timestamp();

        if let Some(cache) = &self.cache {
            if let Some(outcome) = cache.get(token, now).await {
                tracing::debug!(target: "token_gate.introspection", "Validation result cache hit");
                return outcome;
            }
        }

        let response = match self.introspector.introspect(token).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(target: "token_gate.introspection", error = %e, "Treating request as unauthenticated");
                return Outcome::Rejected(Rejection::EndpointUnreachable);
            }
        };

        let outcome = self.interpret(token, response);

        if let Some(cache) = &self.cache {
            let expiry = outcome_expiry(token, &outcome);
            cache.put(token, outcome.clone(), expiry, now).await;
        }

        outcome
    }

    fn interpret(&self, token: &str, response: IntrospectionResponse) -> Outcome {
        if !response.active {
            tracing::debug!(target: "token_gate.introspection", "Token reported inactive");
            return Outcome::Rejected(Rejection::TokenInactive);
        }

        let mut claims = ClaimSet::from_payload(
            &response.claims,
            &self.name_claim_type,
            &self.role_claim_type,
        );
        if self.preserve_access_token {
            claims.insert(TOKEN_CLAIM, token);
        }
        Outcome::Authenticated(claims)
    }
}

/// The token's own expiry, for bounding the cache entry.
///
/// Prefers the `exp` the authority reported; falls back to the token's own
/// payload for JWTs sent to the endpoint. Reference tokens without a
/// reported expiry get the cache's fallback TTL (`None` here).
fn outcome_expiry(token: &str, outcome: &Outcome) -> Option<i64> {
    if let Outcome::Authenticated(claims) = outcome {
        if let Some(exp) = claims.first("exp").and_then(|v| v.parse::<i64>().ok()) {
            return Some(exp);
        }
    }
    jwt::unverified_expiry(token)
}
