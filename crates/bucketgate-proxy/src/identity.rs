//! Caller identity from a trusted header.
//!
//! Authentication happens in front of the gateway. The authenticating layer
//! forwards the verified claims as a JSON document in a configured header;
//! requests without it are anonymous.

use bucketgate_core::Principal;
use http::{HeaderMap, HeaderName};

use crate::config::IdentitySettings;
use crate::error::{ProxyError, ProxyResult};

/// Reads the [`Principal`] of a request.
#[derive(Debug, Clone)]
pub struct PrincipalResolver {
    header: HeaderName,
}

impl PrincipalResolver {
    /// Creates a resolver reading `header`.
    pub const fn new(header: HeaderName) -> Self {
        Self { header }
    }

    /// Creates a resolver from identity settings.
    pub fn from_settings(settings: &IdentitySettings) -> ProxyResult<Self> {
        HeaderName::from_bytes(settings.principal_header.as_bytes())
            .map(Self::new)
            .map_err(|e| ProxyError::config(format!("invalid principal_header: {e}")))
    }

    /// Name of the claims header.
    pub const fn header(&self) -> &HeaderName {
        &self.header
    }

    /// Returns the caller's principal, anonymous when the header is absent.
    ///
    /// A present but unparseable header is rejected rather than treated as
    /// anonymous.
    pub fn resolve(&self, headers: &HeaderMap) -> ProxyResult<Principal> {
        let Some(value) = headers.get(&self.header) else {
            return Ok(Principal::anonymous());
        };
        serde_json::from_slice(value.as_bytes())
            .map(Principal::new)
            .map_err(|_| ProxyError::bad_request(format!("malformed {} header", self.header)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn resolver() -> PrincipalResolver {
        PrincipalResolver::from_settings(&IdentitySettings::default()).unwrap()
    }

    #[test]
    fn test_missing_header_is_anonymous() {
        let principal = resolver().resolve(&HeaderMap::new()).unwrap();
        assert!(principal.is_anonymous());
    }

    #[test]
    fn test_claims_are_kept_verbatim() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-bucketgate-principal",
            HeaderValue::from_static(r#"{"sub":"alice","groups":["ops"]}"#),
        );
        let principal = resolver().resolve(&headers).unwrap();
        assert_eq!(principal.subject(), Some("alice"));
        assert_eq!(principal.claims()["groups"][0], "ops");
    }

    #[test]
    fn test_malformed_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("x-bucketgate-principal", HeaderValue::from_static("alice"));
        let err = resolver().resolve(&headers).unwrap_err();
        assert!(matches!(err, ProxyError::BadRequest { .. }));
    }
}
