//! Gateway test harness: memory-backed targets and a fake policy endpoint.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bucketgate_authz::PolicyDecisionClient;
use bucketgate_bucket::{MemoryBackend, StorageBackend};
use bucketgate_proxy::{
    Gateway, IdentitySettings, PrincipalResolver, RouteTable, ServerSettings, Target,
    TargetConfig,
};
use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Response;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

pub const PEER: &str = "198.51.100.7:51000";

/// Gateway over one memory-backed target.
pub struct Harness {
    pub gateway: Gateway,
    pub backend: Arc<MemoryBackend>,
}

impl Harness {
    pub fn new(target: TargetConfig) -> Self {
        Self::with_settings(target, ServerSettings::default())
    }

    pub fn with_settings(target: TargetConfig, settings: ServerSettings) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let gateway = gateway_over(&target, backend.clone(), &settings);
        Self { gateway, backend }
    }

    pub async fn send(&self, request: Request<Full<Bytes>>) -> Answered {
        send_to(&self.gateway, request).await
    }

    pub async fn get(&self, uri: &str) -> Answered {
        self.send(request("GET", uri, &[], Bytes::new())).await
    }
}

/// Gateway over one target stored in `backend`.
pub fn gateway_over(
    target: &TargetConfig,
    backend: Arc<dyn StorageBackend>,
    settings: &ServerSettings,
) -> Gateway {
    let target = Target::new(target, backend).unwrap();
    Gateway::from_parts(
        RouteTable::new(vec![target]),
        PolicyDecisionClient::new(),
        PrincipalResolver::from_settings(&IdentitySettings::default()).unwrap(),
        settings,
    )
}

pub async fn send_to(gateway: &Gateway, request: Request<Full<Bytes>>) -> Answered {
    let response = gateway.handle(request, PEER.parse().unwrap()).await;
    let (parts, body) = response.into_parts();
    Answered {
        status: parts.status,
        headers: parts.headers,
        body: body.collect().await.unwrap().to_bytes(),
    }
}

/// Collected response.
#[derive(Debug)]
pub struct Answered {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Answered {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub fn request(
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: impl Into<Bytes>,
) -> Request<Full<Bytes>> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Full::new(body.into())).unwrap()
}

/// Policy endpoint answering every query the same way.
pub struct FakePolicy {
    pub url: String,
    inputs: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl FakePolicy {
    pub async fn start(status: u16, body: &'static str, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let inputs = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&inputs);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let sink = Arc::clone(&sink);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let sink = Arc::clone(&sink);
                        async move {
                            let bytes = req.into_body().collect().await?.to_bytes();
                            let envelope: serde_json::Value =
                                serde_json::from_slice(&bytes).unwrap_or_default();
                            sink.lock().unwrap().push(envelope["input"].clone());
                            tokio::time::sleep(delay).await;
                            Ok::<_, hyper::Error>(
                                Response::builder()
                                    .status(status)
                                    .body(Full::new(Bytes::from_static(body.as_bytes())))
                                    .unwrap(),
                            )
                        }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            url: format!("http://{addr}/v1/data/bucketgate/allow"),
            inputs,
        }
    }

    pub async fn allowing() -> Self {
        Self::start(200, r#"{"result": true}"#, Duration::ZERO).await
    }

    pub async fn denying() -> Self {
        Self::start(200, r#"{"result": false}"#, Duration::ZERO).await
    }

    /// `input` documents received so far.
    pub fn inputs(&self) -> Vec<serde_json::Value> {
        self.inputs.lock().unwrap().clone()
    }
}

/// A policy URL nothing listens on.
pub async fn unreachable_policy() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/v1/data/bucketgate/allow")
}
