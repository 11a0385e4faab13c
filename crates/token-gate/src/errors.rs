//! Validation outcomes and the rejection taxonomy.
//!
//! Every validation failure is recovered into an [`Outcome::Rejected`] value
//! and never raised as a fault into the pipeline. Client-facing messages are
//! intentionally generic to avoid leaking why a token was rejected; the
//! specific reason is logged server-side and available to the host
//! application through the [`Rejection`] variant itself.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::claims::ClaimSet;

/// Result of validating one bearer token.
///
/// Produced per request and consumed immediately by the pipeline; never
/// persisted except as a result-cache value in endpoint mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The token is authentic, current, and correctly scoped.
    Authenticated(ClaimSet),

    /// The token was rejected; the variant says why.
    Rejected(Rejection),
}

impl Outcome {
    /// True for [`Outcome::Authenticated`].
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Outcome::Authenticated(_))
    }

    /// The claims of an authenticated outcome.
    #[must_use]
    pub fn claims(&self) -> Option<&ClaimSet> {
        match self {
            Outcome::Authenticated(claims) => Some(claims),
            Outcome::Rejected(_) => None,
        }
    }
}

/// Why a bearer token was rejected.
///
/// All variants map to 401 Unauthorized except [`Rejection::InsufficientScope`],
/// which is an authorization failure (403 Forbidden) so the pipeline can
/// distinguish "who are you" from "you may not do this".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// No bearer credentials were presented.
    #[error("no bearer token presented")]
    MissingToken,

    /// The token is not a well-formed signed token.
    #[error("malformed token")]
    MalformedToken,

    /// Signature verification failed, or the signing key is unknown even
    /// after a key-set refresh.
    #[error("invalid signature")]
    InvalidSignature,

    /// The `exp` claim is in the past, beyond the configured skew.
    #[error("token expired")]
    Expired,

    /// The `nbf` claim is in the future, beyond the configured skew.
    #[error("token not yet valid")]
    NotYetValid,

    /// The `aud` claim does not contain the expected audience.
    #[error("audience mismatch")]
    AudienceMismatch,

    /// The `iss` claim does not match the expected issuer.
    #[error("issuer mismatch")]
    IssuerMismatch,

    /// The introspection endpoint reported the token inactive.
    #[error("token inactive")]
    TokenInactive,

    /// The token lacks a required scope.
    #[error("insufficient scope")]
    InsufficientScope,

    /// The introspection endpoint could not be reached or answered
    /// unintelligibly. Never cached; the next request retries.
    #[error("validation endpoint unreachable")]
    EndpointUnreachable,

    /// No signing-key material is available and the fetch failed, so local
    /// validation cannot proceed.
    #[error("signing keys unavailable")]
    KeysUnavailable,
}

impl Rejection {
    /// HTTP status code for this rejection.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Rejection::InsufficientScope => 403,
            _ => 401,
        }
    }

    /// True when this is an authorization (scope) failure rather than an
    /// authentication failure.
    #[must_use]
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self, Rejection::InsufficientScope)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        // Log the specific reason server-side; the client sees a generic
        // message so rejection reasons cannot be enumerated by probing.
        tracing::debug!(target: "token_gate.http", reason = %self, "Request rejected");

        let (status, code, message) = match &self {
            Rejection::InsufficientScope => (
                StatusCode::FORBIDDEN,
                "INSUFFICIENT_SCOPE",
                "The access token is missing a required scope",
            ),
            _ => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "The access token is invalid or expired",
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.to_string(),
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer error=\"invalid_token\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        } else if status == StatusCode::FORBIDDEN {
            if let Ok(header_value) = "Bearer error=\"insufficient_scope\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}
