//! Per-resource authorization configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, AuthzResult};

/// What to do when the policy endpoint cannot produce a verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnevaluablePolicy {
    /// Treat the request as denied (403).
    #[default]
    Deny,
    /// Surface the failure as a server error so an upstream may retry.
    Error,
}

/// Where and how to ask for a decision for one protected resource.
///
/// Loaded once with the gateway configuration and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAuthorizationConfig {
    /// Full decision URL, e.g. `http://opa:8181/v1/data/bucketgate/allow`.
    pub url: String,

    /// Static tags forwarded to the policy as `input.tags`.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Behavior when the endpoint fails or answers garbage.
    #[serde(default)]
    pub on_error: UnevaluablePolicy,
}

impl ResourceAuthorizationConfig {
    /// Creates a configuration for `url` with no tags and fail-closed errors.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tags: BTreeMap::new(),
            on_error: UnevaluablePolicy::Deny,
        }
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Sets the unevaluable policy.
    #[must_use]
    pub fn with_on_error(mut self, on_error: UnevaluablePolicy) -> Self {
        self.on_error = on_error;
        self
    }

    /// Checks that the URL is a non-empty absolute `http`/`https` URL.
    pub fn validate(&self) -> AuthzResult<()> {
        if self.url.trim().is_empty() {
            return Err(AuthzError::config("policy url must not be empty"));
        }
        let url = reqwest::Url::parse(&self.url)
            .map_err(|e| AuthzError::config(format!("invalid policy url {}: {e}", self.url)))?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(AuthzError::config(format!(
                "policy url {} must use http or https, not {other}",
                self.url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        assert!(ResourceAuthorizationConfig::new("http://opa:8181/v1/data/authz/allow")
            .validate()
            .is_ok());
        assert!(ResourceAuthorizationConfig::new("https://policy.internal/allow")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_rejects_empty_url() {
        let err = ResourceAuthorizationConfig::new("  ").validate().unwrap_err();
        assert!(matches!(err, AuthzError::Config(_)));
    }

    #[test]
    fn test_rejects_relative_and_foreign_schemes() {
        assert!(ResourceAuthorizationConfig::new("/v1/data/allow")
            .validate()
            .is_err());
        assert!(ResourceAuthorizationConfig::new("ftp://opa/allow")
            .validate()
            .is_err());
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: ResourceAuthorizationConfig =
            serde_json::from_str(r#"{"url":"http://opa/allow"}"#).unwrap();
        assert!(config.tags.is_empty());
        assert_eq!(config.on_error, UnevaluablePolicy::Deny);
    }

    #[test]
    fn test_deserialize_on_error() {
        let config: ResourceAuthorizationConfig = serde_json::from_str(
            r#"{"url":"http://opa/allow","tags":{"team":"data"},"on_error":"error"}"#,
        )
        .unwrap();
        assert_eq!(config.on_error, UnevaluablePolicy::Error);
        assert_eq!(config.tags.get("team").map(String::as_str), Some("data"));
    }

    #[test]
    fn test_builder() {
        let config = ResourceAuthorizationConfig::new("http://opa/allow")
            .with_tag("bucket", "assets")
            .with_on_error(UnevaluablePolicy::Error);
        assert_eq!(config.tags.len(), 1);
        assert_eq!(config.on_error, UnevaluablePolicy::Error);
    }
}
