//! Claims extracted from a validated token.
//!
//! A [`ClaimSet`] is a claim-name to values multimap built from a JWT payload
//! or an introspection response. The `sub` claim contains user or client
//! identifiers and is redacted in Debug output.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Well-known claim names.
pub const SUBJECT_CLAIM: &str = "sub";
pub const SCOPE_CLAIM: &str = "scope";

/// Claims of an authenticated token.
///
/// Values are stored as strings; multi-valued claims (JSON arrays) become
/// multiple values under one name. The configured name/role claim types
/// drive the [`ClaimSet::name`] and [`ClaimSet::roles`] accessors so hosts
/// that issue e.g. `preferred_username` instead of `name` keep working.
#[derive(Clone, PartialEq)]
pub struct ClaimSet {
    claims: HashMap<String, Vec<String>>,
    name_claim_type: String,
    role_claim_type: String,
}

/// Custom Debug implementation that redacts the `sub` claim.
impl fmt::Debug for ClaimSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, values) in &self.claims {
            if name == SUBJECT_CLAIM {
                map.entry(name, &"[REDACTED]");
            } else {
                map.entry(name, values);
            }
        }
        map.finish()
    }
}

impl ClaimSet {
    /// Build a claim set from a decoded JSON payload.
    ///
    /// Strings, numbers, and booleans become single string values; arrays
    /// become one value per element; nested objects are kept as compact JSON
    /// text; nulls are dropped.
    #[must_use]
    pub fn from_payload(
        payload: &Map<String, Value>,
        name_claim_type: &str,
        role_claim_type: &str,
    ) -> Self {
        let mut claims: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in payload {
            let values = flatten_value(value);
            if !values.is_empty() {
                claims.entry(name.clone()).or_default().extend(values);
            }
        }

        Self {
            claims,
            name_claim_type: name_claim_type.to_string(),
            role_claim_type: role_claim_type.to_string(),
        }
    }

    /// All values of a claim, or `None` if absent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.claims.get(name).map(Vec::as_slice)
    }

    /// First value of a claim, or `None` if absent.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.claims
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// The `sub` claim.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.first(SUBJECT_CLAIM)
    }

    /// The identity name, read through the configured name claim type.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.first(&self.name_claim_type)
    }

    /// The roles, read through the configured role claim type.
    #[must_use]
    pub fn roles(&self) -> Vec<&str> {
        self.claims
            .get(&self.role_claim_type)
            .map(|values| values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// All scopes granted to the token.
    ///
    /// The scope claim may be a single space-delimited string or a
    /// multi-valued claim; both shapes flatten to individual scopes here.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.claims
            .get(SCOPE_CLAIM)
            .map(|values| {
                values
                    .iter()
                    .flat_map(|v| v.split_whitespace())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check if the token has a specific scope.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().iter().any(|s| *s == scope)
    }

    /// Add a claim value.
    ///
    /// Used by validators for derived claims, e.g. preserving the raw access
    /// token when configured.
    pub fn insert(&mut self, name: &str, value: &str) {
        self.claims
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// Number of distinct claim names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// True when no claims are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Iterate over claim names and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.claims
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }
}

fn flatten_value(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Number(n) => vec![n.to_string()],
        Value::Bool(b) => vec![b.to_string()],
        Value::Array(items) => items.iter().flat_map(flatten_value).collect(),
        Value::Object(_) => vec![value.to_string()],
        Value::Null => Vec::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn claim_set(value: Value) -> ClaimSet {
        ClaimSet::from_payload(&payload(value), "name", "role")
    }

    #[test]
    fn test_string_and_number_claims() {
        let claims = claim_set(json!({
            "sub": "user-123",
            "exp": 1_700_000_000,
            "verified": true
        }));

        assert_eq!(claims.subject(), Some("user-123"));
        assert_eq!(claims.first("exp"), Some("1700000000"));
        assert_eq!(claims.first("verified"), Some("true"));
        assert_eq!(claims.len(), 3);
    }

    #[test]
    fn test_array_claim_becomes_multi_valued() {
        let claims = claim_set(json!({"role": ["admin", "auditor"]}));

        assert_eq!(claims.get("role").unwrap(), &["admin", "auditor"]);
        assert_eq!(claims.roles(), vec!["admin", "auditor"]);
    }

    #[test]
    fn test_null_claims_are_dropped() {
        let claims = claim_set(json!({"sub": "u", "middle_name": null}));

        assert!(claims.get("middle_name").is_none());
        assert_eq!(claims.len(), 1);
    }

    #[test]
    fn test_object_claim_kept_as_json_text() {
        let claims = claim_set(json!({"address": {"city": "Springfield"}}));

        let value = claims.first("address").unwrap();
        assert!(value.contains("Springfield"));
        assert!(serde_json::from_str::<Value>(value).is_ok());
    }

    #[test]
    fn test_scopes_space_delimited() {
        let claims = claim_set(json!({"scope": "read write admin"}));

        assert_eq!(claims.scopes(), vec!["read", "write", "admin"]);
        assert!(claims.has_scope("write"));
        assert!(!claims.has_scope("delete"));
        assert!(!claims.has_scope("rea")); // Partial match must not work
    }

    #[test]
    fn test_scopes_multi_valued() {
        let claims = claim_set(json!({"scope": ["read", "write"]}));

        assert_eq!(claims.scopes(), vec!["read", "write"]);
        assert!(claims.has_scope("read"));
    }

    #[test]
    fn test_scopes_absent() {
        let claims = claim_set(json!({"sub": "u"}));

        assert!(claims.scopes().is_empty());
        assert!(!claims.has_scope("read"));
    }

    #[test]
    fn test_name_claim_type_mapping() {
        let map = payload(json!({"preferred_username": "alice", "name": "ignored"}));
        let claims = ClaimSet::from_payload(&map, "preferred_username", "role");

        assert_eq!(claims.name(), Some("alice"));
        // The original payload claim stays reachable under its own name
        assert_eq!(claims.first("name"), Some("ignored"));
    }

    #[test]
    fn test_insert_appends_value() {
        let mut claims = claim_set(json!({"sub": "u"}));
        claims.insert("token", "raw-token-value");

        assert_eq!(claims.first("token"), Some("raw-token-value"));
    }

    #[test]
    fn test_debug_redacts_sub() {
        let claims = claim_set(json!({"sub": "secret-user-id", "scope": "read"}));

        let debug_str = format!("{:?}", claims);

        assert!(
            !debug_str.contains("secret-user-id"),
            "Debug output should not contain actual sub value"
        );
        assert!(
            debug_str.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
    }

    #[test]
    fn test_equality_for_cache_round_trips() {
        let a = claim_set(json!({"sub": "u", "scope": "read"}));
        let b = claim_set(json!({"sub": "u", "scope": "read"}));
        assert_eq!(a, b);
    }
}
