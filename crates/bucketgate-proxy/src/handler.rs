//! HTTP mapping of bucket operations.

use std::fmt::Display;
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime};

use bucketgate_authz::{InboundRequest, PolicyDecisionClient};
use bucketgate_bucket::{
    BucketClient, BucketError, GetInput, GetOutput, ObjectResponse, PutInput,
};
use bucketgate_core::{RequestContext, RequestId, TraceContext};
use bucketgate_telemetry::metrics::record_request;
use bytes::Bytes;
use http::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT_RANGES, ALLOW, CONTENT_LENGTH, CONTENT_RANGE,
    CONTENT_TYPE, ETAG, LAST_MODIFIED,
};
use http::request::Parts;
use http::{Method, Request, Response, StatusCode};
use hyper::body::Body;
use serde::Serialize;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

use crate::body::{self, empty, full, stream_object, ResponseBody};
use crate::config::{GateConfig, ServerSettings};
use crate::error::{ErrorResponse, ProxyError, ProxyResult};
use crate::identity::PrincipalResolver;
use crate::routing::{Access, RouteTable, Target};

/// Liveness endpoint.
pub const HEALTH_PATH: &str = "/_bucketgate/health";

/// Correlation header, echoed on every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Request handler shared by all connections.
#[derive(Debug)]
pub struct Gateway {
    routes: RouteTable,
    authorizer: PolicyDecisionClient,
    principals: PrincipalResolver,
    request_timeout: Duration,
    max_body_size: u64,
    trust_forwarded_proto: bool,
}

impl Gateway {
    /// Builds targets, backends and the policy client from configuration.
    pub fn new(config: &GateConfig) -> ProxyResult<Self> {
        let http = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ProxyError::server(format!("failed to build policy client: {e}")))?;

        Ok(Self::from_parts(
            RouteTable::from_config(config)?,
            PolicyDecisionClient::with_http_client(http),
            PrincipalResolver::from_settings(&config.identity)?,
            &config.server,
        ))
    }

    /// Assembles a gateway from prepared parts.
    pub fn from_parts(
        routes: RouteTable,
        authorizer: PolicyDecisionClient,
        principals: PrincipalResolver,
        settings: &ServerSettings,
    ) -> Self {
        Self {
            routes,
            authorizer,
            principals,
            request_timeout: settings.request_timeout,
            max_body_size: settings.max_request_body_size,
            trust_forwarded_proto: settings.trust_forwarded_proto,
        }
    }

    /// Mounted targets.
    pub const fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Answers one request. Never fails: errors become JSON error responses.
    pub async fn handle<B>(&self, req: Request<B>, peer: SocketAddr) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + Unpin,
        B::Error: Display,
    {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let request_id = inbound_request_id(req.headers()).unwrap_or_default();
        let ctx = RequestContext::with_request_id(request_id)
            .with_trace(TraceContext::from_headers(req.headers()))
            .with_timeout(self.request_timeout);

        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %method,
            path = %path,
            peer = %peer,
        );

        async move {
            let mut response = if method == Method::GET && path == HEALTH_PATH {
                json_response(StatusCode::OK, &serde_json::json!({"status": "ok"}))
            } else {
                match self.dispatch(&ctx, req, peer).await {
                    Ok(response) => response,
                    Err(err) => {
                        log_failure(&err);
                        error_response(&err, request_id)
                    }
                }
            };

            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }

            let elapsed = started.elapsed();
            record_request(method.as_str(), response.status().as_u16(), elapsed);
            info!(
                status = response.status().as_u16(),
                duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "request completed"
            );
            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch<B>(
        &self,
        ctx: &RequestContext,
        req: Request<B>,
        peer: SocketAddr,
    ) -> ProxyResult<Response<ResponseBody>>
    where
        B: Body<Data = Bytes> + Send + Unpin,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        let route = self.routes.route(parts.uri.path())?;
        if !matches!(
            parts.method,
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE
        ) {
            return Err(ProxyError::MethodNotAllowed {
                method: parts.method.to_string(),
            });
        }

        self.authorize(ctx, route.target, &parts, peer, &route.path)
            .await?;

        let client = route.target.client();
        match parts.method {
            Method::GET => {
                let input = GetInput::from_headers(route.path, &parts.headers);
                read_response(client.get(ctx, input).await?, false)
            }
            Method::HEAD => {
                let input = GetInput::from_headers(route.path, &parts.headers);
                read_response(client.head(ctx, input).await?, true)
            }
            Method::PUT => self.upload(ctx, client, &parts, body, route.path).await,
            _ => {
                client.delete(ctx, &route.path).await?;
                Ok(status_response(StatusCode::NO_CONTENT))
            }
        }
    }

    async fn authorize(
        &self,
        ctx: &RequestContext,
        target: &Target,
        parts: &Parts,
        peer: SocketAddr,
        path: &str,
    ) -> ProxyResult<()> {
        let config = match target.access(&parts.method, path) {
            Access::Public => return Ok(()),
            Access::Unmatched => {
                return Err(ProxyError::forbidden("no access rule covers this request"))
            }
            Access::Protected(config) => config,
        };

        let principal = self.principals.resolve(&parts.headers)?;
        let inbound = InboundRequest::new(parts, peer, self.is_secure(&parts.headers));
        let decision = self
            .authorizer
            .authorize(ctx, &inbound, &principal, config)
            .await;

        if decision.resolve(config.on_error)? {
            Ok(())
        } else {
            Err(ProxyError::forbidden(format!(
                "{} {} denied by policy",
                parts.method,
                target.name()
            )))
        }
    }

    async fn upload<B>(
        &self,
        ctx: &RequestContext,
        client: &dyn BucketClient,
        parts: &Parts,
        body: B,
        path: String,
    ) -> ProxyResult<Response<ResponseBody>>
    where
        B: Body<Data = Bytes> + Send + Unpin,
        B::Error: Display,
    {
        let (folder, filename) = match path.rsplit_once('/') {
            Some((folder, name)) => (format!("{folder}/"), name.to_string()),
            None => (String::new(), path.clone()),
        };
        if filename.is_empty() {
            return Err(ProxyError::bad_request("PUT target must name a file"));
        }

        let declared = match parts.headers.get(CONTENT_LENGTH) {
            Some(value) => Some(
                value
                    .to_str()
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .ok_or_else(|| ProxyError::bad_request("invalid Content-Length"))?,
            ),
            None => None,
        };
        if declared.is_some_and(|len| len > self.max_body_size) {
            return Err(ProxyError::PayloadTooLarge {
                limit: self.max_body_size,
            });
        }

        let mut upload = ctx
            .run(body::spool(body, self.max_body_size))
            .await
            .map_err(|_| ProxyError::DeadlineExceeded)??;

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let stored = client
            .put(
                ctx,
                PutInput {
                    request_path: folder,
                    filename,
                    body: &mut upload.file,
                    content_type,
                    content_length: declared.unwrap_or(upload.len),
                },
            )
            .await?;

        debug!(key = %stored.key, size = stored.metadata.size, "object stored");

        let mut response = status_response(StatusCode::NO_CONTENT);
        insert_validators(
            response.headers_mut(),
            &stored.metadata.etag,
            SystemTime::from(stored.metadata.last_modified),
        );
        Ok(response)
    }

    fn is_secure(&self, headers: &HeaderMap) -> bool {
        self.trust_forwarded_proto
            && headers
                .get(X_FORWARDED_PROTO)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
    }
}

/// Accepts a caller-supplied request ID when it is a UUID.
fn inbound_request_id(headers: &HeaderMap) -> Option<RequestId> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .map(RequestId::from_uuid)
}

fn read_response(output: GetOutput, head: bool) -> ProxyResult<Response<ResponseBody>> {
    match output {
        GetOutput::Object(object) => Ok(object_response(object, head)),
        GetOutput::Folder(listing) => {
            let mut response = json_response(StatusCode::OK, &listing);
            if head {
                *response.body_mut() = empty();
            }
            Ok(response)
        }
    }
}

fn object_response(object: ObjectResponse, head: bool) -> Response<ResponseBody> {
    let length = object.content_length();
    let ObjectResponse {
        metadata,
        range,
        body,
        ..
    } = object;

    let mut response = Response::new(if head { empty() } else { stream_object(body) });
    *response.status_mut() = if range.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let headers = response.headers_mut();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    insert_text(headers, CONTENT_TYPE, &metadata.content_type);
    insert_validators(
        headers,
        &metadata.etag,
        SystemTime::from(metadata.last_modified),
    );
    if let Some(range) = range {
        insert_text(headers, CONTENT_RANGE, &range.to_string());
    }
    response
}

fn error_response(err: &ProxyError, request_id: RequestId) -> Response<ResponseBody> {
    if let ProxyError::Bucket(BucketError::NotModified {
        etag,
        last_modified,
        ..
    }) = err
    {
        let mut response = status_response(StatusCode::NOT_MODIFIED);
        insert_validators(
            response.headers_mut(),
            etag,
            SystemTime::from(*last_modified),
        );
        return response;
    }

    let body = ErrorResponse::from(err).with_request_id(request_id.to_string());
    let mut response = json_response(err.status_code(), &body);
    match err {
        ProxyError::Bucket(BucketError::RangeNotSatisfiable { size, .. }) => {
            insert_text(
                response.headers_mut(),
                CONTENT_RANGE,
                &format!("bytes */{size}"),
            );
        }
        ProxyError::MethodNotAllowed { .. } => {
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD, PUT, DELETE"));
        }
        _ => {}
    }
    response
}

fn log_failure(err: &ProxyError) {
    let status = err.status_code();
    if status.is_server_error() {
        error!(error = %err, category = err.category(), status = status.as_u16(), "request failed");
    } else if status == StatusCode::FORBIDDEN {
        info!(error = %err, category = err.category(), "request refused");
    } else {
        debug!(error = %err, category = err.category(), status = status.as_u16(), "request rejected");
    }
}

fn status_response(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(empty());
    *response.status_mut() = status;
    response
}

/// Create a JSON response.
fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<ResponseBody> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let length = json.len() as u64;

    let mut response = Response::new(full(json));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    response
}

fn insert_validators(headers: &mut HeaderMap, etag: &str, last_modified: SystemTime) {
    insert_text(headers, ETAG, etag);
    insert_text(
        headers,
        LAST_MODIFIED,
        &httpdate::fmt_http_date(last_modified),
    );
}

fn insert_text(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_json_response() {
        let response = json_response(StatusCode::OK, &serde_json::json!({"key": "value"}));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "15");
        let body = tokio_test::block_on(response.into_body().collect())
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..], br#"{"key":"value"}"#);
    }

    #[test]
    fn test_not_modified_has_validators_and_no_json() {
        let err = ProxyError::Bucket(BucketError::NotModified {
            path: "a".to_string(),
            etag: "\"abc\"".to_string(),
            last_modified: chrono_epoch(),
        });
        let response = error_response(&err, RequestId::new());
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers().get(ETAG).unwrap(), "\"abc\"");
        assert_eq!(
            response.headers().get(LAST_MODIFIED).unwrap(),
            "Thu, 01 Jan 1970 00:00:00 GMT"
        );
        assert!(response.headers().get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_range_not_satisfiable_has_content_range() {
        let err = ProxyError::Bucket(BucketError::RangeNotSatisfiable {
            path: "a".to_string(),
            size: 42,
        });
        let response = error_response(&err, RequestId::new());
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers().get(CONTENT_RANGE).unwrap(), "bytes */42");
    }

    #[test]
    fn test_inbound_request_id() {
        let mut headers = HeaderMap::new();
        assert!(inbound_request_id(&headers).is_none());

        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(inbound_request_id(&headers).is_none());

        let id = RequestId::new();
        headers.insert(
            REQUEST_ID_HEADER,
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        assert_eq!(inbound_request_id(&headers), Some(id));
    }

    fn chrono_epoch() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from(SystemTime::UNIX_EPOCH)
    }
}
