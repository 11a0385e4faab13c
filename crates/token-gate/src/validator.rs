//! The validation orchestrator.
//!
//! [`AccessTokenValidator`] fixes the strategy at construction from the
//! options, dispatches each token to the local or endpoint validator, and
//! composes the scope gate over the outcome. It holds no per-request mutable
//! state; everything shared (key material, result cache) lives inside the
//! strategy validators with their own concurrency contracts.

use std::sync::Arc;
use tracing::instrument;

use crate::config::{ConfigError, ValidationOptions};
use crate::errors::Outcome;
use crate::introspection::{EndpointValidator, HttpIntrospector, Introspector};
use crate::keyset::{DocumentFetcher, HttpDocumentFetcher, KeyStore};
use crate::local::LocalValidator;
use crate::scope;

enum Strategy {
    Local(LocalValidator),
    Endpoint(EndpointValidator),
    Both {
        local: LocalValidator,
        endpoint: EndpointValidator,
    },
}

/// Validates bearer tokens per the configured strategy.
pub struct AccessTokenValidator {
    strategy: Strategy,
    required_scopes: Vec<String>,
}

impl AccessTokenValidator {
    /// Build a validator with production HTTP capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the options are inconsistent (see
    /// [`ValidationOptions::validate`]).
    pub fn from_options(options: ValidationOptions) -> Result<Self, ConfigError> {
        Self::with_capabilities(options, None, None)
    }

    /// Build a validator, overriding the backchannel capabilities.
    ///
    /// Pass `None` to use the HTTP implementations; tests inject stubs here
    /// to run without network access.
    pub fn with_capabilities(
        options: ValidationOptions,
        fetcher: Option<Arc<dyn DocumentFetcher>>,
        introspector: Option<Arc<dyn Introspector>>,
    ) -> Result<Self, ConfigError> {
        options.validate()?;

        let client = || {
            reqwest::Client::builder()
                .timeout(options.http_timeout)
                .build()
                .unwrap_or_else(|e| {
                    tracing::warn!(target: "token_gate.validator", error = %e, "Failed to build HTTP client with custom config, using defaults");
                    reqwest::Client::new()
                })
        };

        let build_local = |fetcher: Option<Arc<dyn DocumentFetcher>>| {
            let fetcher =
                fetcher.unwrap_or_else(|| Arc::new(HttpDocumentFetcher::new(client())));
            let keys = Arc::new(KeyStore::new(
                options.discovery_url(),
                options.audience.clone(),
                fetcher,
            ));
            LocalValidator::new(&options, keys)
        };

        let build_endpoint = |introspector: Option<Arc<dyn Introspector>>| -> Result<EndpointValidator, ConfigError> {
            let introspector = match introspector {
                Some(introspector) => introspector,
                None => {
                    // validate() has already required the credentials
                    let (client_id, client_secret) =
                        match (&options.client_id, &options.client_secret) {
                            (Some(id), Some(secret)) => (id.clone(), secret.clone()),
                            _ => return Err(ConfigError::MissingClientCredentials),
                        };
                    Arc::new(HttpIntrospector::new(
                        options.introspection_url(),
                        client_id,
                        client_secret,
                        client(),
                    ))
                }
            };
            Ok(EndpointValidator::new(&options, introspector))
        };

        let strategy = match options.mode {
            crate::config::ValidationMode::Local => Strategy::Local(build_local(fetcher)),
            crate::config::ValidationMode::ValidationEndpoint => {
                Strategy::Endpoint(build_endpoint(introspector)?)
            }
            crate::config::ValidationMode::Both => Strategy::Both {
                local: build_local(fetcher),
                endpoint: build_endpoint(introspector)?,
            },
        };

        Ok(Self {
            strategy,
            required_scopes: options.required_scopes,
        })
    }

    /// Validate a bearer token, scope gate included.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Outcome {
        let outcome = match &self.strategy {
            Strategy::Local(local) => local.validate(token).await,
            Strategy::Endpoint(endpoint) => endpoint.validate(token).await,
            Strategy::Both { local, endpoint } => {
                // JWTs carry dots; reference tokens do not
                if token.contains('.') {
                    local.validate(token).await
                } else {
                    endpoint.validate(token).await
                }
            }
        };

        scope::enforce(outcome, &self.required_scopes)
    }
}
