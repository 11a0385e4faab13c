//! Validation configuration.
//!
//! [`ValidationOptions`] is constructed once at startup, validated, and read
//! only thereafter. Configuration errors are fatal at startup, never
//! per-request. The client secret is held as a [`SecretString`] and redacted
//! in Debug output.

use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use crate::keyset::DISCOVERY_SUFFIX;
use crate::result_cache::DEFAULT_FALLBACK_TTL;

/// Default timeout for backchannel HTTP calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default name claim type.
pub const DEFAULT_NAME_CLAIM_TYPE: &str = "name";

/// Default role claim type.
pub const DEFAULT_ROLE_CLAIM_TYPE: &str = "role";

/// Path of the authority's introspection endpoint when not overridden.
const DEFAULT_INTROSPECTION_PATH: &str = "connect/introspect";

/// How incoming tokens are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Verify signatures locally against the discovered key set.
    Local,

    /// Ask the authority's introspection endpoint.
    ValidationEndpoint,

    /// Per-token dispatch: JWTs (tokens containing a `.`) are validated
    /// locally, reference tokens go to the endpoint.
    Both,
}

impl ValidationMode {
    /// True when this mode can send tokens to the introspection endpoint.
    #[must_use]
    pub fn uses_endpoint(&self) -> bool {
        matches!(self, ValidationMode::ValidationEndpoint | ValidationMode::Both)
    }

    /// True when this mode can validate tokens locally.
    #[must_use]
    pub fn uses_local(&self) -> bool {
        matches!(self, ValidationMode::Local | ValidationMode::Both)
    }
}

impl std::str::FromStr for ValidationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(ValidationMode::Local),
            "endpoint" | "validation_endpoint" => Ok(ValidationMode::ValidationEndpoint),
            "both" => Ok(ValidationMode::Both),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

/// Configuration errors, fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid authority URL: {0}")]
    InvalidAuthority(String),

    #[error("Invalid validation mode: {0}")]
    InvalidMode(String),

    #[error("Endpoint validation requires client_id and client_secret")]
    MissingClientCredentials,

    #[error("Invalid clock skew configuration: {0}")]
    InvalidClockSkew(String),

    #[error("Invalid numeric configuration value for {0}")]
    InvalidNumber(String),
}

/// Immutable validation configuration.
///
/// Built with [`ValidationOptions::new`] plus the `with_*` methods, or from
/// environment variables via [`ValidationOptions::from_env`]. Call
/// [`ValidationOptions::validate`] (done by the orchestrator constructor) to
/// reject inconsistent settings before serving traffic.
#[derive(Clone)]
pub struct ValidationOptions {
    /// Base URL of the token authority.
    pub authority: String,

    /// Validation strategy selection.
    pub mode: ValidationMode,

    /// Scopes every token must carry; empty disables the scope gate.
    pub required_scopes: Vec<String>,

    /// Expected audience; defaults to the authority's derived audience.
    pub audience: Option<String>,

    /// Expected issuer; defaults to the discovered issuer.
    pub issuer: Option<String>,

    /// Tolerance applied to `exp`/`nbf` checks. Bounded by
    /// [`MAX_CLOCK_SKEW`].
    pub clock_skew: Duration,

    /// Whether endpoint-mode outcomes are memoized per token.
    pub cache_results: bool,

    /// Result-cache entry lifetime when the token has no parseable expiry.
    pub cache_fallback_ttl: Duration,

    /// Introspection endpoint; defaults to
    /// `{authority}/connect/introspect`.
    pub introspection_endpoint: Option<String>,

    /// OAuth client id for the introspection backchannel.
    pub client_id: Option<String>,

    /// OAuth client secret for the introspection backchannel.
    pub client_secret: Option<SecretString>,

    /// Claim type exposed as the identity name.
    pub name_claim_type: String,

    /// Claim type exposed as the identity roles.
    pub role_claim_type: String,

    /// Keep the raw bearer token as a `token` claim on success.
    pub preserve_access_token: bool,

    /// Timeout for backchannel HTTP calls.
    pub http_timeout: Duration,
}

/// Custom Debug implementation that redacts the client secret.
impl fmt::Debug for ValidationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationOptions")
            .field("authority", &self.authority)
            .field("mode", &self.mode)
            .field("required_scopes", &self.required_scopes)
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("clock_skew", &self.clock_skew)
            .field("cache_results", &self.cache_results)
            .field("cache_fallback_ttl", &self.cache_fallback_ttl)
            .field("introspection_endpoint", &self.introspection_endpoint)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("name_claim_type", &self.name_claim_type)
            .field("role_claim_type", &self.role_claim_type)
            .field("preserve_access_token", &self.preserve_access_token)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl ValidationOptions {
    /// Create options with defaults for everything but authority and mode.
    #[must_use]
    pub fn new(authority: String, mode: ValidationMode) -> Self {
        Self {
            authority,
            mode,
            required_scopes: Vec::new(),
            audience: None,
            issuer: None,
            clock_skew: DEFAULT_CLOCK_SKEW,
            cache_results: true,
            cache_fallback_ttl: DEFAULT_FALLBACK_TTL,
            introspection_endpoint: None,
            client_id: None,
            client_secret: None,
            name_claim_type: DEFAULT_NAME_CLAIM_TYPE.to_string(),
            role_claim_type: DEFAULT_ROLE_CLAIM_TYPE.to_string(),
            preserve_access_token: false,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the scopes every token must carry.
    #[must_use]
    pub fn with_required_scopes(mut self, scopes: Vec<String>) -> Self {
        self.required_scopes = scopes;
        self
    }

    /// Override the expected audience.
    #[must_use]
    pub fn with_audience(mut self, audience: String) -> Self {
        self.audience = Some(audience);
        self
    }

    /// Override the expected issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Set the clock skew tolerance.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Enable or disable the endpoint-mode result cache.
    #[must_use]
    pub fn with_result_cache(mut self, enabled: bool) -> Self {
        self.cache_results = enabled;
        self
    }

    /// Set the introspection client credentials.
    #[must_use]
    pub fn with_client_credentials(mut self, id: String, secret: SecretString) -> Self {
        self.client_id = Some(id);
        self.client_secret = Some(secret);
        self
    }

    /// Override the introspection endpoint URL.
    #[must_use]
    pub fn with_introspection_endpoint(mut self, endpoint: String) -> Self {
        self.introspection_endpoint = Some(endpoint);
        self
    }

    /// Set the name/role claim type mappings.
    #[must_use]
    pub fn with_claim_types(mut self, name: String, role: String) -> Self {
        self.name_claim_type = name;
        self.role_claim_type = role;
        self
    }

    /// Keep the raw bearer token as a claim on success.
    #[must_use]
    pub fn with_preserved_access_token(mut self) -> Self {
        self.preserve_access_token = true;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a map (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let authority = vars
            .get("TOKEN_GATE_AUTHORITY")
            .ok_or_else(|| ConfigError::MissingEnvVar("TOKEN_GATE_AUTHORITY".to_string()))?
            .clone();

        let mode = vars
            .get("TOKEN_GATE_MODE")
            .map(|raw| raw.parse())
            .transpose()?
            .unwrap_or(ValidationMode::Local);

        let mut options = Self::new(authority, mode);

        if let Some(scopes) = vars.get("TOKEN_GATE_REQUIRED_SCOPES") {
            options.required_scopes =
                scopes.split_whitespace().map(ToString::to_string).collect();
        }
        options.audience = vars.get("TOKEN_GATE_AUDIENCE").cloned();
        options.issuer = vars.get("TOKEN_GATE_ISSUER").cloned();

        if let Some(raw) = vars.get("TOKEN_GATE_CLOCK_SKEW_SECONDS") {
            let secs: u64 = raw
                .parse()
                .map_err(|_| ConfigError::InvalidClockSkew(raw.clone()))?;
            options.clock_skew = Duration::from_secs(secs);
        }

        if let Some(raw) = vars.get("TOKEN_GATE_CACHE_RESULTS") {
            options.cache_results = raw == "true" || raw == "1";
        }

        if let Some(raw) = vars.get("TOKEN_GATE_CACHE_TTL_SECONDS") {
            let secs: u64 = raw.parse().map_err(|_| {
                ConfigError::InvalidNumber("TOKEN_GATE_CACHE_TTL_SECONDS".to_string())
            })?;
            options.cache_fallback_ttl = Duration::from_secs(secs);
        }

        options.introspection_endpoint = vars.get("TOKEN_GATE_INTROSPECTION_ENDPOINT").cloned();
        options.client_id = vars.get("TOKEN_GATE_CLIENT_ID").cloned();
        options.client_secret = vars
            .get("TOKEN_GATE_CLIENT_SECRET")
            .map(|s| SecretString::from(s.clone()));

        if let Some(name) = vars.get("TOKEN_GATE_NAME_CLAIM") {
            options.name_claim_type = name.clone();
        }
        if let Some(role) = vars.get("TOKEN_GATE_ROLE_CLAIM") {
            options.role_claim_type = role.clone();
        }
        if let Some(raw) = vars.get("TOKEN_GATE_PRESERVE_ACCESS_TOKEN") {
            options.preserve_access_token = raw == "true" || raw == "1";
        }

        if let Some(raw) = vars.get("TOKEN_GATE_HTTP_TIMEOUT_SECONDS") {
            let secs: u64 = raw.parse().map_err(|_| {
                ConfigError::InvalidNumber("TOKEN_GATE_HTTP_TIMEOUT_SECONDS".to_string())
            })?;
            options.http_timeout = Duration::from_secs(secs);
        }

        Ok(options)
    }

    /// Reject inconsistent settings.
    ///
    /// Endpoint modes require client credentials; the clock skew must stay
    /// within [`MAX_CLOCK_SKEW`]; the authority must be an http(s) URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.authority.starts_with("http://") && !self.authority.starts_with("https://") {
            return Err(ConfigError::InvalidAuthority(self.authority.clone()));
        }

        if self.clock_skew > MAX_CLOCK_SKEW {
            return Err(ConfigError::InvalidClockSkew(format!(
                "{}s exceeds maximum of {}s",
                self.clock_skew.as_secs(),
                MAX_CLOCK_SKEW.as_secs()
            )));
        }

        if self.mode.uses_endpoint()
            && (self.client_id.is_none() || self.client_secret.is_none())
        {
            return Err(ConfigError::MissingClientCredentials);
        }

        Ok(())
    }

    /// The discovery document URL: the authority with exactly one trailing
    /// slash, plus the well-known suffix.
    #[must_use]
    pub fn discovery_url(&self) -> String {
        format!("{}/{DISCOVERY_SUFFIX}", self.authority.trim_end_matches('/'))
    }

    /// The introspection endpoint: the override, or the authority's
    /// conventional path.
    #[must_use]
    pub fn introspection_url(&self) -> String {
        self.introspection_endpoint.clone().unwrap_or_else(|| {
            format!(
                "{}/{DEFAULT_INTROSPECTION_PATH}",
                self.authority.trim_end_matches('/')
            )
        })
    }
}
