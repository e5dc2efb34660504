//! Decision request envelope.
//!
//! The body POSTed to the policy endpoint:
//!
//! ```json
//! {
//!   "input": {
//!     "user": { "sub": "alice" },
//!     "request": {
//!       "method": "GET",
//!       "protocol": "HTTP/1.1",
//!       "headers": { "host": "files.example.com" },
//!       "remoteAddr": "10.0.0.7:51234",
//!       "scheme": "https",
//!       "host": "files.example.com",
//!       "parsed_path": ["assets", "logo.png"],
//!       "path": "/assets/logo.png"
//!     },
//!     "tags": { "bucket": "assets" }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;

use bucketgate_core::Principal;
use http::header::{HeaderMap, HOST};
use http::{Method, Uri, Version};
use serde::{Deserialize, Serialize};

/// Header set by reverse proxies to carry the client-facing host.
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Borrowed view of the inbound HTTP request being authorized.
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    method: &'a Method,
    uri: &'a Uri,
    version: Version,
    headers: &'a HeaderMap,
    remote_addr: SocketAddr,
    secure: bool,
}

impl<'a> InboundRequest<'a> {
    /// Creates a view over request parts.
    ///
    /// `secure` is whether the client connection was encrypted.
    pub fn new(parts: &'a http::request::Parts, remote_addr: SocketAddr, secure: bool) -> Self {
        Self {
            method: &parts.method,
            uri: &parts.uri,
            version: parts.version,
            headers: &parts.headers,
            remote_addr,
            secure,
        }
    }

    /// Request method.
    pub const fn method(&self) -> &Method {
        self.method
    }

    /// Raw request target: path plus query, as received.
    pub fn target(&self) -> &str {
        self.uri.path_and_query().map_or("", |pq| pq.as_str())
    }

    /// `https` for encrypted connections, otherwise `http`.
    pub const fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// Client-facing host.
    pub fn host(&self) -> String {
        let header = |name: &str| {
            self.headers
                .get(name)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        };

        header(X_FORWARDED_HOST)
            .map(|forwarded| {
                // may carry a list when several proxies appended to it
                forwarded
                    .split(',')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            })
            .filter(|h| !h.is_empty())
            .or_else(|| header(HOST.as_str()).filter(|h| !h.is_empty()))
            .or_else(|| self.uri.authority().map(|a| a.as_str().to_string()))
            .unwrap_or_default()
    }
}

/// Top-level policy query document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Everything the policy may look at.
    pub input: PolicyInput,
}

/// The `input` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyInput {
    /// Principal claims, `null` when anonymous.
    pub user: Principal,
    /// Inbound request facts.
    pub request: RequestFacts,
    /// Per-resource tags from configuration.
    pub tags: BTreeMap<String, String>,
}

/// Facts about the inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFacts {
    /// HTTP method.
    pub method: String,
    /// Protocol version, e.g. `HTTP/1.1`.
    pub protocol: String,
    /// Lower-cased header names, first value only.
    pub headers: BTreeMap<String, String>,
    /// Client socket address.
    #[serde(rename = "remoteAddr")]
    pub remote_addr: String,
    /// `http` or `https`.
    pub scheme: String,
    /// Client-facing host.
    pub host: String,
    /// Non-empty segments of `path`.
    pub parsed_path: Vec<String>,
    /// Raw request target.
    pub path: String,
}

impl AuthorizationRequest {
    /// Builds the envelope for one check.
    pub fn build(
        request: &InboundRequest<'_>,
        principal: &Principal,
        tags: &BTreeMap<String, String>,
    ) -> Self {
        let path = request.target().to_string();

        Self {
            input: PolicyInput {
                user: principal.clone(),
                request: RequestFacts {
                    method: request.method.as_str().to_string(),
                    protocol: protocol_name(request.version).to_string(),
                    headers: first_values(request.headers),
                    remote_addr: request.remote_addr.to_string(),
                    scheme: request.scheme().to_string(),
                    host: request.host(),
                    parsed_path: parse_path(&path),
                    path,
                },
                tags: tags.clone(),
            },
        }
    }
}

/// Splits a request target on `/`, dropping empty segments.
///
/// ```
/// use bucketgate_authz::request::parse_path;
///
/// assert_eq!(parse_path("/a//b/"), vec!["a", "b"]);
/// assert!(parse_path("/").is_empty());
/// ```
pub fn parse_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

fn protocol_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// Later values of a repeated header are dropped.
fn first_values(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .filter_map(|name| {
            headers.get(name).map(|value| {
                (
                    name.as_str().to_ascii_lowercase(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::HeaderValue;
    use proptest::prelude::*;
    use serde_json::json;

    fn parts(uri: &str, headers: &[(&str, &str)]) -> http::request::Parts {
        let mut builder = http::Request::builder().method("GET").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn addr() -> SocketAddr {
        "10.0.0.7:51234".parse().unwrap()
    }

    #[test]
    fn test_parse_path_examples() {
        assert_eq!(parse_path("/a//b/"), vec!["a", "b"]);
        assert!(parse_path("/").is_empty());
        assert!(parse_path("").is_empty());
        assert_eq!(parse_path("a/b/c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_scheme_follows_transport() {
        let p = parts("/x", &[]);
        assert_eq!(InboundRequest::new(&p, addr(), false).scheme(), "http");
        assert_eq!(InboundRequest::new(&p, addr(), true).scheme(), "https");
    }

    #[test]
    fn test_host_precedence() {
        let p = parts(
            "http://authority.local/x",
            &[("host", "host.local"), ("x-forwarded-host", "public.example, inner")],
        );
        assert_eq!(InboundRequest::new(&p, addr(), false).host(), "public.example");

        let p = parts("http://authority.local/x", &[("host", "host.local")]);
        assert_eq!(InboundRequest::new(&p, addr(), false).host(), "host.local");

        let p = parts("http://authority.local/x", &[]);
        assert_eq!(InboundRequest::new(&p, addr(), false).host(), "authority.local");

        let p = parts("/x", &[]);
        assert_eq!(InboundRequest::new(&p, addr(), false).host(), "");
    }

    #[test]
    fn test_headers_keep_first_value() {
        let mut p = parts("/x", &[("X-Tenant", "first")]);
        p.headers
            .append("x-tenant", HeaderValue::from_static("second"));
        let facts = first_values(&p.headers);
        assert_eq!(facts.get("x-tenant").map(String::as_str), Some("first"));
    }

    #[test]
    fn test_non_utf8_header_is_lossy() {
        let mut p = parts("/x", &[]);
        p.headers.insert(
            "x-raw",
            HeaderValue::from_bytes(&[b'a', 0xff, b'b']).unwrap(),
        );
        let facts = first_values(&p.headers);
        assert_eq!(facts.get("x-raw").map(String::as_str), Some("a\u{fffd}b"));
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!(protocol_name(Version::HTTP_10), "HTTP/1.0");
        assert_eq!(protocol_name(Version::HTTP_11), "HTTP/1.1");
        assert_eq!(protocol_name(Version::HTTP_2), "HTTP/2.0");
    }

    #[test]
    fn test_envelope_shape() {
        let p = parts("/assets//logo.png?v=2", &[("host", "files.example")]);
        let inbound = InboundRequest::new(&p, addr(), true);
        let principal = Principal::new(json!({"sub": "alice"}));
        let tags = BTreeMap::from([("bucket".to_string(), "assets".to_string())]);

        let body = serde_json::to_value(AuthorizationRequest::build(&inbound, &principal, &tags))
            .unwrap();

        assert_eq!(
            body,
            json!({
                "input": {
                    "user": {"sub": "alice"},
                    "request": {
                        "method": "GET",
                        "protocol": "HTTP/1.1",
                        "headers": {"host": "files.example"},
                        "remoteAddr": "10.0.0.7:51234",
                        "scheme": "https",
                        "host": "files.example",
                        "parsed_path": ["assets", "logo.png?v=2"],
                        "path": "/assets//logo.png?v=2"
                    },
                    "tags": {"bucket": "assets"}
                }
            })
        );
    }

    #[test]
    fn test_anonymous_user_is_null() {
        let p = parts("/", &[]);
        let inbound = InboundRequest::new(&p, addr(), false);
        let body = serde_json::to_value(AuthorizationRequest::build(
            &inbound,
            &Principal::anonymous(),
            &BTreeMap::new(),
        ))
        .unwrap();
        assert!(body["input"]["user"].is_null());
        assert_eq!(body["input"]["request"]["parsed_path"], json!([]));
    }

    proptest! {
        #[test]
        fn prop_segments_are_non_empty_and_slash_free(path in "[a-z/]{0,40}") {
            for segment in parse_path(&path) {
                prop_assert!(!segment.is_empty());
                prop_assert!(!segment.contains('/'));
            }
        }

        #[test]
        fn prop_segments_rejoin_to_collapsed_path(segments in proptest::collection::vec("[a-z0-9]{1,8}", 0..6), slashes in 1usize..4) {
            let sep = "/".repeat(slashes);
            let path = format!("{sep}{}{sep}", segments.join(&sep));
            prop_assert_eq!(parse_path(&path), segments);
        }
    }
}
