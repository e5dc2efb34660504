//! Explicit trace handle threaded through every call boundary.
//!
//! A [`TraceContext`] is extracted from the inbound request headers and stored
//! in the [`RequestContext`](crate::RequestContext). Anything that performs an
//! outbound call opens a [`SpanScope`] from it; the child span ends when the
//! scope is dropped, whichever way the call exits.
//!
//! When no tracer provider or propagator has been installed (tracing disabled)
//! every operation here is a no-op: spans are non-recording and injection
//! writes no headers.
//!
//! # Example
//!
//! ```
//! use bucketgate_core::TraceContext;
//!
//! let trace = TraceContext::new();
//! let mut outbound = http::HeaderMap::new();
//! {
//!     let span = trace.child_span("opa-server.request");
//!     span.set_attribute("opa.uri", "http://opa:8181/v1/data/authz/allow");
//!     span.inject(&mut outbound);
//! } // span ends here
//! ```

use std::fmt;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::trace::{Status, TraceContextExt, Tracer};
use opentelemetry::{global, Context, KeyValue};

/// Instrumentation scope name used for spans opened by bucketgate.
pub const TRACER_NAME: &str = "bucketgate";

/// Trace context of one request.
#[derive(Clone, Default)]
pub struct TraceContext {
    cx: Context,
}

impl TraceContext {
    /// Creates an empty context (no parent span).
    #[must_use]
    pub fn new() -> Self {
        Self { cx: Context::new() }
    }

    /// Extracts the caller's trace context (e.g. W3C `traceparent`) from
    /// inbound request headers using the globally installed propagator.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let cx = global::get_text_map_propagator(|propagator| {
            propagator.extract(&HeaderExtractor(headers))
        });
        Self { cx }
    }

    /// Opens a child span of this context.
    ///
    /// The returned scope ends the span on drop.
    #[must_use]
    pub fn child_span(&self, name: &'static str) -> SpanScope {
        let span = global::tracer(TRACER_NAME).start_with_context(name, &self.cx);
        SpanScope {
            cx: self.cx.with_span(span),
        }
    }

    /// Injects this context into outbound request headers.
    pub fn inject(&self, headers: &mut HeaderMap) {
        inject_context(&self.cx, headers);
    }

    /// Returns the hex trace ID when the context carries a valid span.
    #[must_use]
    pub fn trace_id(&self) -> Option<String> {
        let span = self.cx.span();
        let span_context = span.span_context();
        span_context
            .is_valid()
            .then(|| span_context.trace_id().to_string())
    }
}

impl fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceContext")
            .field("trace_id", &self.trace_id())
            .finish()
    }
}

/// A child span that ends when dropped.
pub struct SpanScope {
    cx: Context,
}

impl SpanScope {
    /// Attaches a string attribute to the span.
    pub fn set_attribute(&self, key: &'static str, value: impl Into<String>) {
        self.cx.span().set_attribute(KeyValue::new(key, value.into()));
    }

    /// Marks the span as failed.
    pub fn record_error(&self, description: impl Into<String>) {
        self.cx.span().set_status(Status::error(description.into()));
    }

    /// Injects the span's context into outbound request headers, so the
    /// remote side becomes a child of this span.
    pub fn inject(&self, headers: &mut HeaderMap) {
        inject_context(&self.cx, headers);
    }

    /// Returns a handle on this span's context, for nesting further spans.
    #[must_use]
    pub fn context(&self) -> TraceContext {
        TraceContext {
            cx: self.cx.clone(),
        }
    }
}

impl Drop for SpanScope {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}

impl fmt::Debug for SpanScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanScope").finish_non_exhaustive()
    }
}

fn inject_context(cx: &Context, headers: &mut HeaderMap) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(cx, &mut HeaderInjector(headers));
    });
}

/// HTTP header extractor for `http::HeaderMap`.
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// HTTP header injector for `http::HeaderMap`.
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(val)) = (
            HeaderName::try_from(key),
            HeaderValue::try_from(&value),
        ) {
            self.0.insert(name, val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_extractor() {
        let mut headers = HeaderMap::new();
        headers.insert("traceparent", "test-value".parse().unwrap());

        let extractor = HeaderExtractor(&headers);
        assert_eq!(extractor.get("traceparent"), Some("test-value"));
        assert!(extractor.get("nonexistent").is_none());
        assert_eq!(extractor.keys(), vec!["traceparent"]);
    }

    #[test]
    fn test_header_injector() {
        let mut headers = HeaderMap::new();

        {
            let mut injector = HeaderInjector(&mut headers);
            injector.set("traceparent", "injected-value".to_string());
            injector.set("bad header", "ignored".to_string());
        }

        assert_eq!(headers.len(), 1);
        assert_eq!(
            headers.get("traceparent").unwrap().to_str().unwrap(),
            "injected-value"
        );
    }

    #[test]
    fn test_empty_context_has_no_trace_id() {
        assert!(TraceContext::new().trace_id().is_none());
    }

    #[test]
    fn test_span_scope_without_provider() {
        let trace = TraceContext::new();
        let span = trace.child_span("test");
        span.set_attribute("key", "value");
        span.record_error("boom");
        let nested = span.context().child_span("nested");
        drop(nested);
        drop(span);
    }
}
