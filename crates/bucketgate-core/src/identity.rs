//! Authenticated principal.
//!
//! Identity verification happens upstream of bucketgate. What arrives here is
//! the set of claims the authenticating layer produced, kept as an opaque JSON
//! value and handed to the policy engine verbatim as `input.user`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The identity making a request.
///
/// No internal structure is assumed: the value serializes exactly as it was
/// received, and an anonymous caller serializes as `null`.
///
/// # Example
///
/// ```
/// use bucketgate_core::Principal;
///
/// let principal = Principal::new(serde_json::json!({"sub": "alice", "groups": ["dev"]}));
/// assert!(!principal.is_anonymous());
/// assert_eq!(principal.subject(), Some("alice"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(Value);

impl Principal {
    /// Wraps claims produced by the authentication layer.
    #[must_use]
    pub const fn new(claims: Value) -> Self {
        Self(claims)
    }

    /// The unauthenticated caller.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self(Value::Null)
    }

    /// Returns `true` when no claims were attached.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.0.is_null()
    }

    /// Returns the raw claims.
    #[must_use]
    pub const fn claims(&self) -> &Value {
        &self.0
    }

    /// Returns the `sub` claim when present, for logging.
    ///
    /// Never returns tokens or secrets, only the subject identifier.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    /// A short identifier suitable for log fields.
    #[must_use]
    pub fn log_id(&self) -> String {
        match self.subject() {
            Some(sub) => format!("user:{sub}"),
            None if self.is_anonymous() => "anonymous".to_string(),
            None => "unknown".to_string(),
        }
    }
}

impl From<Value> for Principal {
    fn from(claims: Value) -> Self {
        Self(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_anonymous_serializes_as_null() {
        let principal = Principal::anonymous();
        assert!(principal.is_anonymous());
        assert_eq!(serde_json::to_string(&principal).unwrap(), "null");
    }

    #[test]
    fn test_claims_pass_through_verbatim() {
        let claims = json!({"sub": "u-1", "email": "a@example.com", "roles": ["admin"]});
        let principal = Principal::new(claims.clone());
        assert_eq!(serde_json::to_value(&principal).unwrap(), claims);
    }

    #[test]
    fn test_log_id() {
        assert_eq!(Principal::anonymous().log_id(), "anonymous");
        assert_eq!(Principal::new(json!({"sub": "bob"})).log_id(), "user:bob");
        assert_eq!(Principal::new(json!({"email": "x"})).log_id(), "unknown");
    }

    #[test]
    fn test_subject_ignores_non_string() {
        let principal = Principal::new(json!({"sub": 42}));
        assert!(principal.subject().is_none());
    }
}
