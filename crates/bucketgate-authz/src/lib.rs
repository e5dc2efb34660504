//! Bucketgate Authorization - OPA policy decisions over HTTP
//!
//! Each protected resource names a policy endpoint. For every request that
//! hits such a resource, [`PolicyDecisionClient::authorize`] describes the
//! request to the endpoint and reads back a boolean verdict.
//!
//! # Architecture
//!
//! ```text
//!   inbound request ──┐
//!   principal ────────┼──► AuthorizationRequest ──POST──► policy endpoint
//!   resource tags ────┘                                        │
//!                                                   {"result": bool}
//!                                                              │
//!            Allowed | Denied | Unevaluable(AuthzError) ◄──────┘
//! ```
//!
//! `Unevaluable` is kept apart from `Denied` so the caller decides, through
//! [`UnevaluablePolicy`], whether an unreachable policy means 403 or 5xx.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod decision;
pub mod error;
pub mod request;

pub use client::PolicyDecisionClient;
pub use config::{ResourceAuthorizationConfig, UnevaluablePolicy};
pub use decision::AuthorizationDecision;
pub use error::{AuthzError, AuthzResult};
pub use request::{AuthorizationRequest, InboundRequest};
