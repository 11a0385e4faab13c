//! Bearer-token validation for axum services.
//!
//! `token-gate` wires OAuth2/OIDC access-token validation into an HTTP
//! pipeline. Tokens are validated either locally - signature, expiry,
//! audience, and issuer checked against a cached key set discovered from the
//! authority - or remotely against the authority's introspection endpoint,
//! with per-token result caching bounded by token expiry. An optional scope
//! gate runs after authentication.
//!
//! # Architecture
//!
//! ```text
//! middleware -> validator (orchestrator)
//!                 |- local:    keyset (discovery + JWKS cache) -> jwt checks
//!                 |- endpoint: result_cache -> introspection client
//!                 `- scope gate over the outcome
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use token_gate::{
//!     middleware::{require_bearer, AuthState},
//!     AccessTokenValidator, ValidationMode, ValidationOptions,
//! };
//!
//! let options = ValidationOptions::new(
//!     "https://idp.example.com".to_string(),
//!     ValidationMode::Local,
//! )
//! .with_required_scopes(vec!["api".to_string()]);
//!
//! let validator = AccessTokenValidator::from_options(options)?;
//! let auth = Arc::new(AuthState::new(validator));
//!
//! let app = axum::Router::new()
//!     .route("/protected", axum::routing::get(handler))
//!     .layer(axum::middleware::from_fn_with_state(auth, require_bearer));
//! ```
//!
//! # Modules
//!
//! - `config` - validated, immutable options
//! - `errors` - outcomes and the rejection taxonomy with HTTP mapping
//! - `claims` - the claim set extracted from validated tokens
//! - `keyset` - discovery-driven signing-key cache
//! - `local` - local signature/claims validation
//! - `introspection` - remote validation client
//! - `result_cache` - per-token memoization of remote outcomes
//! - `scope` - scope enforcement gate
//! - `middleware` - axum integration

pub mod claims;
pub mod config;
pub mod errors;
pub mod introspection;
pub mod jwt;
pub mod keyset;
pub mod local;
pub mod middleware;
pub mod result_cache;
pub mod scope;
pub mod validator;

pub use claims::ClaimSet;
pub use config::{ConfigError, ValidationMode, ValidationOptions};
pub use errors::{Outcome, Rejection};
pub use validator::AccessTokenValidator;

// Secret types for client credentials; re-exported so hosts do not need a
// direct secrecy dependency.
pub use secrecy::{ExposeSecret, SecretString};
