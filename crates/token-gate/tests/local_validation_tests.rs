//! Local validation integration tests.
//!
//! Exercises the full local path - discovery, JWKS fetching, signature and
//! claims checks - against a mocked identity provider.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use gate_test_utils::{standard_claims, MockIdp, TestKeypair};
use std::sync::Arc;
use token_gate::{
    AccessTokenValidator, Outcome, Rejection, ValidationMode, ValidationOptions,
};

fn local_options(idp: &MockIdp) -> ValidationOptions {
    ValidationOptions::new(idp.authority(), ValidationMode::Local)
}

async fn idp_with_keys(keypair: &TestKeypair) -> MockIdp {
    let idp = MockIdp::start().await;
    idp.mount_discovery().await;
    idp.mount_jwks(&[keypair]).await;
    idp
}

#[tokio::test]
async fn valid_token_is_authenticated_with_payload_claims() {
    let keypair = TestKeypair::new(1, "test-key-01");
    let idp = idp_with_keys(&keypair).await;

    let claims = standard_claims(&idp.issuer(), &idp.audience(), "user-1", "read write", 3600);
    let token = keypair.sign_token(&claims);

    let validator = AccessTokenValidator::from_options(local_options(&idp)).unwrap();
    let outcome = validator.validate(&token).await;

    let claim_set = outcome.claims().expect("token should authenticate");
    assert_eq!(claim_set.subject(), Some("user-1"));
    assert_eq!(claim_set.first("iss").unwrap(), idp.issuer());
    assert_eq!(claim_set.first("aud").unwrap(), idp.audience());
    assert_eq!(claim_set.scopes(), vec!["read", "write"]);
}

#[tokio::test]
async fn name_claim_mapping_is_applied() {
    let keypair = TestKeypair::new(1, "test-key-01");
    let idp = idp_with_keys(&keypair).await;

    let mut claims = standard_claims(&idp.issuer(), &idp.audience(), "user-1", "read", 3600);
    claims
        .as_object_mut()
        .unwrap()
        .insert("preferred_username".to_string(), "alice".into());
    let token = keypair.sign_token(&claims);

    let options = local_options(&idp)
        .with_claim_types("preferred_username".to_string(), "role".to_string());
    let validator = AccessTokenValidator::from_options(options).unwrap();

    let outcome = validator.validate(&token).await;
    assert_eq!(outcome.claims().unwrap().name(), Some("alice"));
}

#[tokio::test]
async fn preserved_access_token_becomes_a_claim() {
    let keypair = TestKeypair::new(1, "test-key-01");
    let idp = idp_with_keys(&keypair).await;

    let claims = standard_claims(&idp.issuer(), &idp.audience(), "user-1", "read", 3600);
    let token = keypair.sign_token(&claims);

    let options = local_options(&idp).with_preserved_access_token();
    let validator = AccessTokenValidator::from_options(options).unwrap();

    let outcome = validator.validate(&token).await;
    assert_eq!(outcome.claims().unwrap().first("token"), Some(token.as_str()));
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let keypair = TestKeypair::new(1, "test-key-01");
    let idp = idp_with_keys(&keypair).await;

    // Expired an hour ago, far beyond the default skew tolerance
    let claims = standard_claims(&idp.issuer(), &idp.audience(), "user-1", "read", -3600);
    let token = keypair.sign_token(&claims);

    let validator = AccessTokenValidator::from_options(local_options(&idp)).unwrap();
    assert_eq!(
        validator.validate(&token).await,
        Outcome::Rejected(Rejection::Expired)
    );
}

#[tokio::test]
async fn not_yet_valid_token_is_rejected() {
    let keypair = TestKeypair::new(1, "test-key-01");
    let idp = idp_with_keys(&keypair).await;

    let mut claims = standard_claims(&idp.issuer(), &idp.audience(), "user-1", "read", 3600);
    let nbf = chrono::Utc::now().timestamp() + 3600;
    claims.as_object_mut().unwrap().insert("nbf".to_string(), nbf.into());
    let token = keypair.sign_token(&claims);

    let validator = AccessTokenValidator::from_options(local_options(&idp)).unwrap();
    assert_eq!(
        validator.validate(&token).await,
        Outcome::Rejected(Rejection::NotYetValid)
    );
}

#[tokio::test]
async fn wrong_audience_is_rejected() {
    let keypair = TestKeypair::new(1, "test-key-01");
    let idp = idp_with_keys(&keypair).await;

    let claims = standard_claims(&idp.issuer(), "https://some-other-api", "user-1", "read", 3600);
    let token = keypair.sign_token(&claims);

    let validator = AccessTokenValidator::from_options(local_options(&idp)).unwrap();
    assert_eq!(
        validator.validate(&token).await,
        Outcome::Rejected(Rejection::AudienceMismatch)
    );
}

#[tokio::test]
async fn audience_override_is_honored() {
    let keypair = TestKeypair::new(1, "test-key-01");
    let idp = idp_with_keys(&keypair).await;

    let claims = standard_claims(&idp.issuer(), "urn:my-api", "user-1", "read", 3600);
    let token = keypair.sign_token(&claims);

    let options = local_options(&idp).with_audience("urn:my-api".to_string());
    let validator = AccessTokenValidator::from_options(options).unwrap();

    assert!(validator.validate(&token).await.is_authenticated());
}

#[tokio::test]
async fn issuer_override_mismatch_is_rejected() {
    let keypair = TestKeypair::new(1, "test-key-01");
    let idp = idp_with_keys(&keypair).await;

    let claims = standard_claims(&idp.issuer(), &idp.audience(), "user-1", "read", 3600);
    let token = keypair.sign_token(&claims);

    let options = local_options(&idp).with_issuer("https://expected-issuer".to_string());
    let validator = AccessTokenValidator::from_options(options).unwrap();

    assert_eq!(
        validator.validate(&token).await,
        Outcome::Rejected(Rejection::IssuerMismatch)
    );
}

#[tokio::test]
async fn forged_signature_is_rejected() {
    let trusted = TestKeypair::new(1, "test-key-01");
    let idp = idp_with_keys(&trusted).await;

    // Signed by a different key that claims the trusted key's id
    let forger = TestKeypair::new(2, "test-key-01");
    let claims = standard_claims(&idp.issuer(), &idp.audience(), "user-1", "read", 3600);
    let token = forger.sign_token(&claims);

    let validator = AccessTokenValidator::from_options(local_options(&idp)).unwrap();
    assert_eq!(
        validator.validate(&token).await,
        Outcome::Rejected(Rejection::InvalidSignature)
    );
}

#[tokio::test]
async fn malformed_tokens_are_rejected() {
    let keypair = TestKeypair::new(1, "test-key-01");
    let idp = idp_with_keys(&keypair).await;

    let validator = AccessTokenValidator::from_options(local_options(&idp)).unwrap();

    for token in ["", "garbage", "a.b", "!!.!!.!!"] {
        assert_eq!(
            validator.validate(token).await,
            Outcome::Rejected(Rejection::MalformedToken),
            "token {token:?} should be malformed"
        );
    }

    let claims = standard_claims(&idp.issuer(), &idp.audience(), "user-1", "read", 3600);
    let without_kid = keypair.sign_token_without_kid(&claims);
    assert_eq!(
        validator.validate(&without_kid).await,
        Outcome::Rejected(Rejection::MalformedToken)
    );
}

#[tokio::test]
async fn unknown_key_triggers_exactly_one_refresh_then_rejects() {
    let known = TestKeypair::new(1, "key-1");
    let unknown = TestKeypair::new(2, "key-2");

    let idp = MockIdp::start().await;
    idp.mount_discovery().await;
    // Initial load plus exactly one refresh for the unknown-key encounter
    idp.mount_jwks_expect(&[&known], 2).await;

    let validator = AccessTokenValidator::from_options(local_options(&idp)).unwrap();

    // Prewarm the key store with a known-good validation
    let good = known.sign_token(&standard_claims(
        &idp.issuer(),
        &idp.audience(),
        "user-1",
        "read",
        3600,
    ));
    assert!(validator.validate(&good).await.is_authenticated());

    // Unknown kid: one refresh, still missing, terminal rejection - no crash
    let bad = unknown.sign_token(&standard_claims(
        &idp.issuer(),
        &idp.audience(),
        "user-2",
        "read",
        3600,
    ));
    assert_eq!(
        validator.validate(&bad).await,
        Outcome::Rejected(Rejection::InvalidSignature)
    );

    // The JWKS call-count expectation is verified when `idp` drops
}

#[tokio::test]
async fn key_rotation_is_picked_up_by_refresh() {
    let old_key = TestKeypair::new(1, "key-old");
    let new_key = TestKeypair::new(2, "key-new");

    let idp = MockIdp::start().await;
    idp.mount_discovery().await;
    // First fetch sees only the old key; the refresh sees both
    idp.mount_jwks_up_to(&[&old_key], 1).await;
    idp.mount_jwks(&[&old_key, &new_key]).await;

    let validator = AccessTokenValidator::from_options(local_options(&idp)).unwrap();

    let token = new_key.sign_token(&standard_claims(
        &idp.issuer(),
        &idp.audience(),
        "user-1",
        "read",
        3600,
    ));

    let outcome = validator.validate(&token).await;
    assert!(
        outcome.is_authenticated(),
        "rotated key should validate after refresh, got {outcome:?}"
    );
}

#[tokio::test]
async fn concurrent_unknown_key_encounters_coalesce_to_one_fetch() {
    let old_key = TestKeypair::new(1, "key-old");
    let new_key = TestKeypair::new(2, "key-new");

    let idp = MockIdp::start().await;
    idp.mount_discovery().await;
    idp.mount_jwks_up_to(&[&old_key], 1).await;
    // Initial fetch + exactly one coalesced refresh across all tasks
    idp.mount_jwks_expect(&[&old_key, &new_key], 1).await;

    let validator =
        Arc::new(AccessTokenValidator::from_options(local_options(&idp)).unwrap());

    // Prewarm so every task starts from the same key material generation
    let good = old_key.sign_token(&standard_claims(
        &idp.issuer(),
        &idp.audience(),
        "user-0",
        "read",
        3600,
    ));
    assert!(validator.validate(&good).await.is_authenticated());

    let token = new_key.sign_token(&standard_claims(
        &idp.issuer(),
        &idp.audience(),
        "user-1",
        "read",
        3600,
    ));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let validator = Arc::clone(&validator);
        let token = token.clone();
        handles.push(tokio::spawn(async move { validator.validate(&token).await }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(
            outcome.is_authenticated(),
            "all concurrent validations should succeed, got {outcome:?}"
        );
    }

    // The second JWKS mock's expect(1) is verified when `idp` drops
}

#[tokio::test]
async fn unreachable_authority_fails_validations_without_crashing() {
    let keypair = TestKeypair::new(1, "test-key-01");
    // No discovery or JWKS mounted: every fetch 404s
    let idp = MockIdp::start().await;

    let claims = standard_claims(&idp.issuer(), &idp.audience(), "user-1", "read", 3600);
    let token = keypair.sign_token(&claims);

    let validator = AccessTokenValidator::from_options(local_options(&idp)).unwrap();
    assert_eq!(
        validator.validate(&token).await,
        Outcome::Rejected(Rejection::KeysUnavailable)
    );
}

#[tokio::test]
async fn scope_gate_applies_to_local_outcomes() {
    let keypair = TestKeypair::new(1, "test-key-01");
    let idp = idp_with_keys(&keypair).await;

    let options = local_options(&idp)
        .with_required_scopes(vec!["read".to_string(), "write".to_string()]);
    let validator = AccessTokenValidator::from_options(options).unwrap();

    let short = keypair.sign_token(&standard_claims(
        &idp.issuer(),
        &idp.audience(),
        "user-1",
        "read",
        3600,
    ));
    assert_eq!(
        validator.validate(&short).await,
        Outcome::Rejected(Rejection::InsufficientScope)
    );

    let ample = keypair.sign_token(&standard_claims(
        &idp.issuer(),
        &idp.audience(),
        "user-1",
        "read write admin",
        3600,
    ));
    assert!(validator.validate(&ample).await.is_authenticated());
}
