//! Mock identity provider backed by wiremock.
//!
//! Serves the discovery document, JWKS, and introspection endpoints that
//! token-gate talks to, with call-count expectations for tests that assert
//! fetch behavior (cache hits, refresh coalescing).

use crate::keypair::TestKeypair;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the JWKS document is served from.
pub const JWKS_PATH: &str = "/jwks";

/// Path the introspection endpoint is served from.
pub const INTROSPECTION_PATH: &str = "/connect/introspect";

/// A mock identity provider.
///
/// The wiremock server doubles as the authority: its URI is the issuer, and
/// the derived audience follows the `{issuer}/resources` convention.
pub struct MockIdp {
    /// The underlying mock server, exposed for custom mocks.
    pub server: MockServer,
}

impl MockIdp {
    /// Start a mock identity provider.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// The authority URL to configure validators with.
    pub fn authority(&self) -> String {
        self.server.uri()
    }

    /// The issuer advertised in the discovery document.
    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// The audience derived from the issuer.
    pub fn audience(&self) -> String {
        format!("{}/resources", self.server.uri())
    }

    /// The introspection endpoint URL.
    pub fn introspection_endpoint(&self) -> String {
        format!("{}{INTROSPECTION_PATH}", self.server.uri())
    }

    /// Serve the discovery document.
    pub async fn mount_discovery(&self) {
        let body = serde_json::json!({
            "issuer": self.issuer(),
            "jwks_uri": format!("{}{JWKS_PATH}", self.server.uri()),
            "introspection_endpoint": self.introspection_endpoint(),
        });

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Serve a JWKS containing the given keypairs.
    pub async fn mount_jwks(&self, keypairs: &[&TestKeypair]) {
        self.jwks_mock(keypairs).mount(&self.server).await;
    }

    /// Serve a JWKS for at most `n` requests.
    ///
    /// Mount a second JWKS afterwards to simulate key rotation: the first
    /// mock answers the initial fetches, later fetches fall through to the
    /// replacement.
    pub async fn mount_jwks_up_to(&self, keypairs: &[&TestKeypair], n: u64) {
        self.jwks_mock(keypairs)
            .up_to_n_times(n)
            .mount(&self.server)
            .await;
    }

    /// Serve a JWKS and verify the exact number of fetches on drop.
    pub async fn mount_jwks_expect(&self, keypairs: &[&TestKeypair], hits: u64) {
        self.jwks_mock(keypairs)
            .expect(hits)
            .mount(&self.server)
            .await;
    }

    fn jwks_mock(&self, keypairs: &[&TestKeypair]) -> Mock {
        let keys: Vec<serde_json::Value> =
            keypairs.iter().map(|keypair| keypair.jwk_json()).collect();
        let body = serde_json::json!({ "keys": keys });

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
    }

    /// Serve an introspection response.
    pub async fn mount_introspection(&self, response: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(INTROSPECTION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .mount(&self.server)
            .await;
    }

    /// Serve an introspection response and verify the exact number of calls
    /// on drop.
    pub async fn mount_introspection_expect(&self, response: serde_json::Value, hits: u64) {
        Mock::given(method("POST"))
            .and(path(INTROSPECTION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .expect(hits)
            .mount(&self.server)
            .await;
    }

    /// Make the introspection endpoint fail with a server error.
    pub async fn mount_introspection_failure(&self) {
        Mock::given(method("POST"))
            .and(path(INTROSPECTION_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&self.server)
            .await;
    }
}

/// An active introspection response with the given claims merged in.
pub fn active_introspection(claims: serde_json::Value) -> serde_json::Value {
    let mut body = serde_json::json!({ "active": true });
    if let (Some(target), Some(source)) = (body.as_object_mut(), claims.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
    body
}

/// An inactive introspection response.
pub fn inactive_introspection() -> serde_json::Value {
    serde_json::json!({ "active": false })
}
