//! Bucketgate proxy - authorizing gateway in front of object storage.
//!
//! Each request is matched to a bucket target by mount path, checked against
//! the target's access rules (asking an OPA-compatible policy endpoint where a
//! rule requires it) and then mapped onto a bucket operation:
//!
//! ```text
//!  client ──► GateServer ──► Gateway ──► RouteTable ──► Target
//!                              │                          │
//!                              │   Access::Protected      │ BucketClient
//!                              ▼                          ▼
//!                     PolicyDecisionClient          StorageBackend
//!                     (POST {"input": ...})     (filesystem / memory)
//! ```
//!
//! | Method   | Operation                  | Success       |
//! |----------|----------------------------|---------------|
//! | `GET`    | object, listing, or index  | 200 / 206     |
//! | `HEAD`   | same, without content      | 200 / 206     |
//! | `PUT`    | upload into the folder     | 204           |
//! | `DELETE` | remove one object          | 204           |
//!
//! Conditional headers produce 304 and 412, bad ranges 416. Error bodies are
//! JSON `{error, message, request_id}`.
//!
//! # Example Usage
//!
//! ```bash
//! $ bucketgate --config /etc/bucketgate/gate.toml
//! $ BUCKETGATE_LISTEN_PORT=9000 bucketgate -c gate.toml
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod body;
pub mod config;
pub mod error;
pub mod handler;
pub mod identity;
pub mod routing;
pub mod server;

pub use config::{
    BackendConfig, GateConfig, GateConfigBuilder, IdentitySettings, ResourceConfig,
    ServerSettings, TargetConfig,
};
pub use error::{ErrorResponse, ProxyError, ProxyResult};
pub use handler::{Gateway, HEALTH_PATH, REQUEST_ID_HEADER};
pub use identity::PrincipalResolver;
pub use routing::{Access, RouteTable, Target};
pub use server::GateServer;

/// Gateway version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
