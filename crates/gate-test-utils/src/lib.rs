//! # Gate Test Utilities
//!
//! Shared test utilities for token-gate test suites.
//!
//! This crate provides:
//! - Deterministic Ed25519 keypairs for signing test tokens (`TestKeypair`)
//! - A wiremock-backed mock identity provider (`MockIdp`) serving discovery,
//!   JWKS, and introspection endpoints
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gate_test_utils::{MockIdp, TestKeypair, standard_claims};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let keypair = TestKeypair::new(1, "test-key-01");
//!     let idp = MockIdp::start().await;
//!     idp.mount_discovery().await;
//!     idp.mount_jwks(&[&keypair]).await;
//!
//!     let claims = standard_claims(&idp.issuer(), &idp.audience(), "user-1", "read", 3600);
//!     let token = keypair.sign_token(&claims);
//!     // ... validate `token` against idp.authority()
//! }
//! ```

pub mod idp;
pub mod keypair;

// Re-export commonly used items
pub use idp::*;
pub use keypair::*;
