//! Scope enforcement, composed after authentication.
//!
//! Authorization is a separate stage from authentication: an authenticated
//! outcome passes through this gate, which requires the token's scopes to be
//! a superset of the configured requirement. The resulting
//! `InsufficientScope` rejection is distinguishable from authentication
//! failures so the pipeline maps it to 403 rather than 401.

use crate::errors::{Outcome, Rejection};

/// Apply a required-scope set to a validation outcome.
///
/// Rejections pass through untouched; authenticated outcomes survive only
/// when every required scope is granted. An empty requirement disables the
/// gate.
#[must_use]
pub fn enforce(outcome: Outcome, required: &[String]) -> Outcome {
    if required.is_empty() {
        return outcome;
    }

    match outcome {
        Outcome::Authenticated(claims) => {
            let granted = claims.scopes();
            let missing = required
                .iter()
                .find(|scope| !granted.iter().any(|g| *g == scope.as_str()));

            match missing {
                Some(scope) => {
                    tracing::debug!(
                        target: "token_gate.scope",
                        scope = %scope,
                        "Required scope missing"
                    );
                    Outcome::Rejected(Rejection::InsufficientScope)
                }
                None => Outcome::Authenticated(claims),
            }
        }
        rejected => rejected,
    }
}
