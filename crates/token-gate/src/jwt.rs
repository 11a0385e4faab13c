//! JWT plumbing shared by the validators.
//!
//! This module provides:
//! - Size limits for DoS prevention
//! - Clock skew constants and deterministic `exp`/`nbf` checks
//! - JOSE header inspection (algorithm + key id) without verifying anything
//! - Unverified expiry extraction for the result cache
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only RS256/RS384/RS512/EdDSA are accepted
//! - Header inspection does NOT validate the token; the token must still be
//!   verified against a key from a trusted key set

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::Algorithm;
use std::time::Duration;

use crate::errors::Rejection;

/// Maximum allowed token size in bytes (8KB).
///
/// Typical access tokens are well under 1KB; anything larger is rejected
/// before base64 decoding or cryptographic work happens.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance for `exp`/`nbf` validation (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed clock skew tolerance (10 minutes).
///
/// Prevents misconfiguration that would weaken expiry checking with an
/// excessively large tolerance.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// The parts of a JOSE header the validators need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Signing algorithm, restricted to the allowlist.
    pub alg: Algorithm,

    /// Key id referencing a key in the JWKS.
    pub kid: String,
}

/// Inspect a token's JOSE header without verifying the signature.
///
/// Returns the algorithm and key id, or `MalformedToken` when the token is
/// not a three-part JWT, the header is not valid base64url JSON, the `kid`
/// is missing or empty, or the algorithm is outside the allowlist. The
/// specific cause is logged at debug level.
pub fn inspect_header(token: &str) -> Result<TokenHeader, Rejection> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        tracing::debug!(
            target: "token_gate.jwt",
            token_size = token.len(),
            max_size = MAX_TOKEN_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(Rejection::MalformedToken);
    }

    if token.split('.').count() != 3 {
        tracing::debug!(target: "token_gate.jwt", "Token rejected: not a three-part JWT");
        return Err(Rejection::MalformedToken);
    }

    let header_part = token.split('.').next().ok_or(Rejection::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "token_gate.jwt", error = %e, "Failed to decode JOSE header base64");
        Rejection::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "token_gate.jwt", error = %e, "Failed to parse JOSE header JSON");
        Rejection::MalformedToken
    })?;

    let alg_name = header
        .get("alg")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            tracing::debug!(target: "token_gate.jwt", "JOSE header missing alg");
            Rejection::MalformedToken
        })?;

    let alg = parse_algorithm(alg_name).ok_or_else(|| {
        tracing::debug!(target: "token_gate.jwt", alg = %alg_name, "Unsupported signing algorithm");
        Rejection::MalformedToken
    })?;

    // Empty kid values are rejected for defense-in-depth
    let kid = header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| {
            tracing::debug!(target: "token_gate.jwt", "JOSE header missing kid");
            Rejection::MalformedToken
        })?;

    Ok(TokenHeader { alg, kid })
}

/// Map an `alg` header value onto the allowlist.
#[must_use]
pub fn parse_algorithm(name: &str) -> Option<Algorithm> {
    match name {
        "RS256" => Some(Algorithm::RS256),
        "RS384" => Some(Algorithm::RS384),
        "RS512" => Some(Algorithm::RS512),
        "EdDSA" => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// Validate the `exp` claim with clock skew tolerance.
///
/// The boundary is inclusive: a token whose `exp` equals the current time is
/// still valid.
pub fn validate_exp(exp: i64, clock_skew: Duration) -> Result<(), Rejection> {
    let now = chrono::Utc::now().timestamp();
    validate_exp_at(exp, clock_skew, now)
}

/// Deterministic `exp` validation against an explicit `now` timestamp.
///
/// Prefer [`validate_exp`] in production code. This variant exists so that
/// boundary conditions can be unit-tested without wall-clock dependence.
pub fn validate_exp_at(exp: i64, clock_skew: Duration, now: i64) -> Result<(), Rejection> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds)
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;

    if now > exp.saturating_add(clock_skew_secs) {
        tracing::debug!(
            target: "token_gate.jwt",
            exp = exp,
            now = now,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: expired"
        );
        return Err(Rejection::Expired);
    }

    Ok(())
}

/// Validate the `nbf` claim with clock skew tolerance.
///
/// A token whose `nbf` equals the current time is already valid.
pub fn validate_nbf(nbf: i64, clock_skew: Duration) -> Result<(), Rejection> {
    let now = chrono::Utc::now().timestamp();
    validate_nbf_at(nbf, clock_skew, now)
}

/// Deterministic `nbf` validation against an explicit `now` timestamp.
pub fn validate_nbf_at(nbf: i64, clock_skew: Duration, now: i64) -> Result<(), Rejection> {
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;

    if nbf > now.saturating_add(clock_skew_secs) {
        tracing::debug!(
            target: "token_gate.jwt",
            nbf = nbf,
            now = now,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: not yet valid"
        );
        return Err(Rejection::NotYetValid);
    }

    Ok(())
}

/// Extract the `exp` claim from a token payload WITHOUT verifying anything.
///
/// Used only to bound result-cache entries by the token's own lifetime; the
/// value must never be trusted for validation decisions. Returns `None` for
/// reference tokens and anything else that is not a parseable JWT.
#[must_use]
pub fn unverified_expiry(token: &str) -> Option<i64> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        return None;
    }

    let payload_part = token.split('.').nth(1)?;
    let payload_bytes = URL_SAFE_NO_PAD.decode(payload_part).ok()?;
    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).ok()?;
    payload.get("exp")?.as_i64()
}
