//! Decoded claim sets.

use serde_json::{Map, Value};

/// Authentication realm, e.g. `"user"` or `"admin"`.
pub type Scope = String;

pub const SUBJECT_CLAIM: &str = "sub";
pub const SCOPE_CLAIM: &str = "scp";
pub const AUDIENCE_CLAIM: &str = "aud";
pub const ISSUER_CLAIM: &str = "iss";
pub const JWT_ID_CLAIM: &str = "jti";

/// The payload of a verified token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimSet {
    claims: Map<String, Value>,
}

impl ClaimSet {
    /// Wrap a decoded payload. Returns `None` unless it is a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(claims) => Some(Self { claims }),
            _ => None,
        }
    }

    /// Get a claim by key.
    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.claims.get(key)
    }

    /// True if the key is present, whatever its value.
    pub fn contains(&self, key: &str) -> bool {
        self.claims.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.claims.insert(key.into(), value.into());
    }

    /// The subject. Numeric subjects are rendered in decimal.
    pub fn sub(&self) -> Option<String> {
        match self.claim(SUBJECT_CLAIM)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// True when an `scp` key exists, even with a non-string value.
    pub fn has_scope(&self) -> bool {
        self.contains(SCOPE_CLAIM)
    }

    pub fn scope(&self) -> Option<&str> {
        self.claim(SCOPE_CLAIM).and_then(Value::as_str)
    }

    pub fn iss(&self) -> Option<&str> {
        self.claim(ISSUER_CLAIM).and_then(Value::as_str)
    }

    pub fn jti(&self) -> Option<&str> {
        self.claim(JWT_ID_CLAIM).and_then(Value::as_str)
    }

    /// Audiences named by `aud`.
    ///
    /// `None` when the claim is absent or null. A string yields one entry,
    /// an array yields its string members; anything else yields no entries.
    pub fn audiences(&self) -> Option<Vec<&str>> {
        match self.claim(AUDIENCE_CLAIM)? {
            Value::Null => None,
            Value::String(s) => Some(vec![s.as_str()]),
            Value::Array(items) => Some(items.iter().filter_map(Value::as_str).collect()),
            _ => Some(Vec::new()),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> ClaimSet {
        ClaimSet::from_value(value).unwrap()
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert!(ClaimSet::from_value(json!(["sub"])).is_none());
        assert!(ClaimSet::from_value(json!("sub")).is_none());
    }

    #[test]
    fn numeric_subject_is_stringified() {
        assert_eq!(claims(json!({"sub": 42})).sub().as_deref(), Some("42"));
        assert_eq!(claims(json!({"sub": "42"})).sub().as_deref(), Some("42"));
        assert_eq!(claims(json!({"sub": ""})).sub(), None);
        assert_eq!(claims(json!({})).sub(), None);
    }

    #[test]
    fn scope_presence_is_key_presence() {
        let c = claims(json!({"scp": null}));
        assert!(c.has_scope());
        assert_eq!(c.scope(), None);
        assert!(!claims(json!({})).has_scope());
    }

    #[test]
    fn audiences_accept_string_or_list() {
        assert_eq!(claims(json!({"aud": "a"})).audiences(), Some(vec!["a"]));
        assert_eq!(
            claims(json!({"aud": ["a", 1, "b"]})).audiences(),
            Some(vec!["a", "b"])
        );
        assert_eq!(claims(json!({"aud": null})).audiences(), None);
        assert_eq!(claims(json!({"aud": 7})).audiences(), Some(vec![]));
        assert_eq!(claims(json!({})).audiences(), None);
    }
}
