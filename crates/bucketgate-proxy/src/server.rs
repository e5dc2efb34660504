//! Gateway HTTP server.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::GateConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::handler::Gateway;

/// Gateway server.
#[derive(Debug)]
pub struct GateServer {
    config: Arc<GateConfig>,
    gateway: Arc<Gateway>,
}

impl GateServer {
    /// Create a new server, building every target from `config`.
    pub fn new(config: GateConfig) -> ProxyResult<Self> {
        let gateway = Arc::new(Gateway::new(&config)?);
        Ok(Self {
            config: Arc::new(config),
            gateway,
        })
    }

    /// The request handler.
    pub fn gateway(&self) -> Arc<Gateway> {
        Arc::clone(&self.gateway)
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> ProxyResult<TcpListener> {
        let ip = self
            .config
            .server
            .listen_addr
            .parse()
            .map_err(|e| ProxyError::config(format!("invalid listen address: {e}")))?;
        let addr = SocketAddr::new(ip, self.config.server.listen_port);

        TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::server(format!("failed to bind {addr}: {e}")))
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run(self) -> ProxyResult<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Accept connections on `listener` until `shutdown` completes.
    ///
    /// In-flight connections get `shutdown_timeout` to finish; the rest are
    /// aborted.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> ProxyResult<()> {
        let local = listener
            .local_addr()
            .map_err(|e| ProxyError::server(format!("listener has no address: {e}")))?;
        info!(
            addr = %local,
            targets = self.gateway.routes().len(),
            "bucketgate listening"
        );

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };
                    let gateway = Arc::clone(&self.gateway);
                    connections.spawn(serve_connection(gateway, stream, peer));
                }
            }
            while connections.try_join_next().is_some() {}
        }

        info!(in_flight = connections.len(), "shutting down");
        drain(&mut connections, self.config.server.shutdown_timeout).await;
        Ok(())
    }
}

async fn serve_connection(gateway: Arc<Gateway>, stream: tokio::net::TcpStream, peer: SocketAddr) {
    let service = service_fn(move |req: Request<Incoming>| {
        let gateway = Arc::clone(&gateway);
        async move { Ok::<_, Infallible>(gateway.handle(req, peer).await) }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        debug!(peer = %peer, error = %e, "connection error");
    }
}

async fn drain(connections: &mut JoinSet<()>, timeout: Duration) {
    let finished = tokio::time::timeout(timeout, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if finished.is_err() {
        warn!(
            aborted = connections.len(),
            "shutdown timeout elapsed, aborting connections"
        );
        connections.abort_all();
    }
}

/// Completes on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}
