//! In-process fake policy endpoint.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

/// A request the fake endpoint received.
#[derive(Debug, Clone)]
pub struct Captured {
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

/// Canned answer.
#[derive(Debug, Clone, Copy)]
pub struct Answer {
    pub status: u16,
    pub body: &'static str,
    pub delay: Duration,
}

impl Answer {
    pub const fn json(body: &'static str) -> Self {
        Self {
            status: 200,
            body,
            delay: Duration::ZERO,
        }
    }

    pub const fn status(status: u16) -> Self {
        Self {
            status,
            body: r#"{"result": true}"#,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub struct FakePolicyServer {
    pub url: String,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl FakePolicyServer {
    pub async fn start(answer: Answer) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&captured);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let sink = Arc::clone(&sink);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let sink = Arc::clone(&sink);
                        async move {
                            let (parts, body) = req.into_parts();
                            let bytes = body.collect().await?.to_bytes();
                            let body = serde_json::from_slice(&bytes)
                                .unwrap_or(serde_json::Value::Null);
                            sink.lock().unwrap().push(Captured {
                                headers: parts.headers,
                                body,
                            });

                            tokio::time::sleep(answer.delay).await;

                            Ok::<_, hyper::Error>(
                                Response::builder()
                                    .status(answer.status)
                                    .header("content-type", "application/json")
                                    .body(Full::new(Bytes::from_static(answer.body.as_bytes())))
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
            captured,
        }
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }
}

/// An address nothing listens on.
pub async fn closed_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/v1/data/bucketgate/allow")
}

/// Request parts for `GET <uri>` with the given headers.
pub fn parts(method: &str, uri: &str, headers: &[(&str, &str)]) -> http::request::Parts {
    let mut builder = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(()).unwrap().into_parts().0
}

pub fn remote() -> SocketAddr {
    "192.0.2.10:40000".parse().unwrap()
}
