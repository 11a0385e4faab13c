//! Local token validation against cached key material.
//!
//! Validates signature, expiry, audience, and issuer using keys from the
//! [`KeyStore`]; a token referencing an unknown key triggers exactly one
//! coalesced key-set refresh before the rejection becomes terminal.
//!
//! # Security
//!
//! - Tokens are size-checked before parsing
//! - Only RS256/RS384/RS512/EdDSA are accepted; the JWK and header must agree
//! - Failure reasons are logged at debug level and collapsed into the
//!   rejection taxonomy for the caller

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::claims::ClaimSet;
use crate::config::ValidationOptions;
use crate::errors::{Outcome, Rejection};
use crate::jwt;
use crate::keyset::{Jwk, KeyStore};

/// Claim name under which the raw token is preserved when configured.
const TOKEN_CLAIM: &str = "token";

/// Validator for the local strategy.
pub struct LocalValidator {
    keys: Arc<KeyStore>,
    issuer_override: Option<String>,
    clock_skew: Duration,
    name_claim_type: String,
    role_claim_type: String,
    preserve_access_token: bool,
}

impl LocalValidator {
    /// Create a local validator over a key store.
    #[must_use]
    pub fn new(options: &ValidationOptions, keys: Arc<KeyStore>) -> Self {
        Self {
            keys,
            issuer_override: options.issuer.clone(),
            clock_skew: options.clock_skew,
            name_claim_type: options.name_claim_type.clone(),
            role_claim_type: options.role_claim_type.clone(),
            preserve_access_token: options.preserve_access_token,
        }
    }

    /// Validate a token and produce an outcome.
    ///
    /// Steps, each a rejection point: header shape, key lookup (with one
    /// refresh-and-retry on an unknown key), signature, `exp`/`nbf`,
    /// audience, issuer, claim extraction.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Outcome {
        match self.try_validate(token).await {
            Ok(claims) => Outcome::Authenticated(claims),
            Err(rejection) => Outcome::Rejected(rejection),
        }
    }

    async fn try_validate(&self, token: &str) -> Result<ClaimSet, Rejection> {
        let header = jwt::inspect_header(token)?;

        let material = self.keys.get().await.map_err(|e| {
            tracing::warn!(target: "token_gate.local", error = %e, "No key material available");
            Rejection::KeysUnavailable
        })?;

        // Unknown key: refresh once (coalesced across concurrent encounters)
        // and retry the lookup. A second miss is terminal.
        let (jwk, material) = match material.key(&header.kid) {
            Some(key) => (key.clone(), material),
            None => {
                tracing::debug!(
                    target: "token_gate.local",
                    kid = %header.kid,
                    "Unknown signing key, refreshing key material"
                );
                let refreshed = self
                    .keys
                    .refresh_from(material.generation())
                    .await
                    .map_err(|e| {
                        tracing::warn!(
                            target: "token_gate.local",
                            error = %e,
                            "Key material refresh failed for unknown key"
                        );
                        Rejection::InvalidSignature
                    })?;
                let key = refreshed.key(&header.kid).cloned().ok_or_else(|| {
                    tracing::warn!(
                        target: "token_gate.local",
                        kid = %header.kid,
                        "Signing key still unknown after refresh"
                    );
                    Rejection::InvalidSignature
                })?;
                (key, refreshed)
            }
        };

        let decoding_key = build_decoding_key(&jwk, header.alg)?;
        let payload = verify_signature(token, &decoding_key, header.alg)?;

        let exp = payload.get("exp").and_then(Value::as_i64).ok_or_else(|| {
            tracing::debug!(target: "token_gate.local", "Token missing exp claim");
            Rejection::MalformedToken
        })?;
        jwt::validate_exp(exp, self.clock_skew)?;

        if let Some(nbf) = payload.get("nbf").and_then(Value::as_i64) {
            jwt::validate_nbf(nbf, self.clock_skew)?;
        }

        check_audience(&payload, &material.audience)?;

        let issuer = self
            .issuer_override
            .as_deref()
            .unwrap_or(&material.issuer);
        check_issuer(&payload, issuer)?;

        let mut claims =
            ClaimSet::from_payload(&payload, &self.name_claim_type, &self.role_claim_type);
        if self.preserve_access_token {
            claims.insert(TOKEN_CLAIM, token);
        }

        tracing::debug!(target: "token_gate.local", "Token validated");
        Ok(claims)
    }
}

/// Build a decoding key from a JWK, checking key/algorithm agreement.
fn build_decoding_key(jwk: &Jwk, alg: Algorithm) -> Result<DecodingKey, Rejection> {
    // A JWK that names its algorithm must name the one the token uses
    if let Some(jwk_alg) = &jwk.alg {
        if jwt::parse_algorithm(jwk_alg) != Some(alg) {
            tracing::warn!(
                target: "token_gate.local",
                kid = %jwk.kid,
                jwk_alg = %jwk_alg,
                "JWK algorithm does not match token header"
            );
            return Err(Rejection::InvalidSignature);
        }
    }

    match jwk.kty.as_str() {
        "RSA" => {
            if !matches!(alg, Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512) {
                tracing::warn!(target: "token_gate.local", kid = %jwk.kid, "RSA key used with non-RSA algorithm");
                return Err(Rejection::InvalidSignature);
            }
            let (n, e) = match (&jwk.n, &jwk.e) {
                (Some(n), Some(e)) => (n, e),
                _ => {
                    tracing::error!(target: "token_gate.local", kid = %jwk.kid, "RSA JWK missing n/e components");
                    return Err(Rejection::InvalidSignature);
                }
            };
            DecodingKey::from_rsa_components(n, e).map_err(|err| {
                tracing::error!(target: "token_gate.local", kid = %jwk.kid, error = %err, "Invalid RSA JWK components");
                Rejection::InvalidSignature
            })
        }
        "OKP" => {
            if alg != Algorithm::EdDSA {
                tracing::warn!(target: "token_gate.local", kid = %jwk.kid, "OKP key used with non-EdDSA algorithm");
                return Err(Rejection::InvalidSignature);
            }
            if let Some(crv) = &jwk.crv {
                if crv != "Ed25519" {
                    tracing::warn!(target: "token_gate.local", kid = %jwk.kid, crv = %crv, "Unsupported OKP curve");
                    return Err(Rejection::InvalidSignature);
                }
            }
            let x = jwk.x.as_ref().ok_or_else(|| {
                tracing::error!(target: "token_gate.local", kid = %jwk.kid, "OKP JWK missing x field");
                Rejection::InvalidSignature
            })?;
            let public_key_bytes = URL_SAFE_NO_PAD.decode(x).map_err(|err| {
                tracing::error!(target: "token_gate.local", kid = %jwk.kid, error = %err, "Invalid public key encoding");
                Rejection::InvalidSignature
            })?;
            Ok(DecodingKey::from_ed_der(&public_key_bytes))
        }
        other => {
            tracing::warn!(target: "token_gate.local", kid = %jwk.kid, kty = %other, "Unsupported JWK key type");
            Err(Rejection::InvalidSignature)
        }
    }
}

/// Verify the signature and decode the payload.
///
/// Time, audience, and issuer checks are performed by the caller so each
/// failure maps to its own rejection; `jsonwebtoken` handles only the
/// cryptographic verification here.
fn verify_signature(
    token: &str,
    key: &DecodingKey,
    alg: Algorithm,
) -> Result<Map<String, Value>, Rejection> {
    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = std::collections::HashSet::new();

    let data = decode::<Map<String, Value>>(token, key, &validation).map_err(|e| {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_)
            | ErrorKind::InvalidToken => {
                tracing::debug!(target: "token_gate.local", error = %e, "Token undecodable");
                Rejection::MalformedToken
            }
            _ => {
                tracing::debug!(target: "token_gate.local", error = %e, "Signature verification failed");
                Rejection::InvalidSignature
            }
        }
    })?;

    Ok(data.claims)
}

/// Check that the `aud` claim (string or array) contains the expected
/// audience.
fn check_audience(payload: &Map<String, Value>, audience: &str) -> Result<(), Rejection> {
    let matched = match payload.get("aud") {
        Some(Value::String(aud)) => aud == audience,
        Some(Value::Array(auds)) => auds
            .iter()
            .filter_map(Value::as_str)
            .any(|aud| aud == audience),
        _ => false,
    };

    if matched {
        Ok(())
    } else {
        tracing::debug!(target: "token_gate.local", expected = %audience, "Audience mismatch");
        Err(Rejection::AudienceMismatch)
    }
}

/// Check that the `iss` claim matches the expected issuer.
fn check_issuer(payload: &Map<String, Value>, issuer: &str) -> Result<(), Rejection> {
    match payload.get("iss").and_then(Value::as_str) {
        Some(iss) if iss == issuer => Ok(()),
        _ => {
            tracing::debug!(target: "token_gate.local", expected = %issuer, "Issuer mismatch");
            Err(Rejection::IssuerMismatch)
        }
    }
}
