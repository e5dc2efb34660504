//! HTTP client for the policy decision endpoint.

use std::time::Instant;

use bucketgate_core::{Principal, RequestContext, SpanScope};
use bucketgate_telemetry::metrics::record_authz_decision;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;

use crate::config::ResourceAuthorizationConfig;
use crate::decision::AuthorizationDecision;
use crate::error::{AuthzError, AuthzResult};
use crate::request::{AuthorizationRequest, InboundRequest};

/// Span name for the outbound policy call.
pub const POLICY_SPAN_NAME: &str = "opa-server.request";

/// Asks an OPA-compatible endpoint whether a request may proceed.
///
/// Cheap to clone; clones share the connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let client = PolicyDecisionClient::new();
/// let decision = client
///     .authorize(&ctx, &InboundRequest::new(&parts, remote, false), &principal, &config)
///     .await;
/// if !decision.resolve(config.on_error)? {
///     return forbidden();
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct PolicyDecisionClient {
    http: reqwest::Client,
}

impl PolicyDecisionClient {
    /// Creates a client with a default connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured `reqwest` client (TLS roots, proxies).
    pub const fn with_http_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Performs one authorization check.
    ///
    /// Makes exactly one POST. The call is bounded by the context deadline
    /// and is abandoned if this future is dropped. Failures never produce
    /// [`AuthorizationDecision::Allowed`].
    pub async fn authorize(
        &self,
        ctx: &RequestContext,
        request: &InboundRequest<'_>,
        principal: &Principal,
        config: &ResourceAuthorizationConfig,
    ) -> AuthorizationDecision {
        let started = Instant::now();
        let span = ctx.trace().child_span(POLICY_SPAN_NAME);
        span.set_attribute("opa.uri", config.url.as_str());

        let decision = match self.query(ctx, &span, request, principal, config).await {
            Ok(true) => AuthorizationDecision::Allowed,
            Ok(false) => AuthorizationDecision::Denied,
            Err(err) => {
                span.record_error(err.to_string());
                AuthorizationDecision::Unevaluable(err)
            }
        };

        let elapsed = started.elapsed();
        record_authz_decision(decision.label(), elapsed);

        match &decision {
            AuthorizationDecision::Unevaluable(err) => tracing::warn!(
                request_id = %ctx.request_id(),
                policy_endpoint = %config.url,
                principal = %principal.log_id(),
                error = %err,
                category = err.category(),
                "policy decision unavailable"
            ),
            verdict => tracing::debug!(
                request_id = %ctx.request_id(),
                policy_endpoint = %config.url,
                principal = %principal.log_id(),
                method = %request.method(),
                path = request.target(),
                decision = verdict.label(),
                duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "policy decision"
            ),
        }

        decision
    }

    async fn query(
        &self,
        ctx: &RequestContext,
        span: &SpanScope,
        request: &InboundRequest<'_>,
        principal: &Principal,
        config: &ResourceAuthorizationConfig,
    ) -> AuthzResult<bool> {
        let endpoint = config.url.as_str();
        let envelope = AuthorizationRequest::build(request, principal, &config.tags);
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| AuthzError::protocol(endpoint, format!("cannot encode input: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        span.inject(&mut headers);

        let call = async {
            let response = self
                .http
                .post(endpoint)
                .headers(headers)
                .body(body)
                .send()
                .await
                .map_err(|e| AuthzError::transport(endpoint, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(AuthzError::status(endpoint, status.as_u16()));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| AuthzError::transport(endpoint, e))?;
            parse_verdict(endpoint, &bytes)
        };

        ctx.run(call)
            .await
            .map_err(|_| AuthzError::deadline_exceeded(endpoint))?
    }
}

/// Reads `{"result": bool}`.
///
/// An absent `result` is OPA's undefined decision and counts as `false`.
fn parse_verdict(endpoint: &str, body: &[u8]) -> AuthzResult<bool> {
    let answer: Value = serde_json::from_slice(body)
        .map_err(|e| AuthzError::protocol(endpoint, format!("response is not JSON: {e}")))?;

    let Value::Object(fields) = answer else {
        return Err(AuthzError::protocol(
            endpoint,
            "response is not a JSON object",
        ));
    };

    match fields.get("result") {
        None => Ok(false),
        Some(Value::Bool(allowed)) => Ok(*allowed),
        Some(other) => Err(AuthzError::protocol(
            endpoint,
            format!("result must be a boolean, got {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://opa/allow";

    #[test]
    fn test_parse_true_and_false() {
        assert!(parse_verdict(URL, br#"{"result": true}"#).unwrap());
        assert!(!parse_verdict(URL, br#"{"result": false}"#).unwrap());
    }

    #[test]
    fn test_undefined_decision_is_false() {
        assert!(!parse_verdict(URL, b"{}").unwrap());
        assert!(!parse_verdict(URL, br#"{"decision_id": "abc"}"#).unwrap());
    }

    #[test]
    fn test_non_boolean_result_is_protocol_error() {
        for body in [
            &br#"{"result": "true"}"#[..],
            &br#"{"result": null}"#[..],
            &br#"{"result": {"allow": true}}"#[..],
            &br#"{"result": 1}"#[..],
        ] {
            let err = parse_verdict(URL, body).unwrap_err();
            assert!(err.is_protocol(), "{err}");
        }
    }

    #[test]
    fn test_non_json_is_protocol_error() {
        assert!(parse_verdict(URL, b"<html>oops</html>")
            .unwrap_err()
            .is_protocol());
        assert!(parse_verdict(URL, b"true").unwrap_err().is_protocol());
        assert!(parse_verdict(URL, b"").unwrap_err().is_protocol());
    }
}
