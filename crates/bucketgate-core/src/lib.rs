//! # Bucketgate Core
//!
//! Request-scoped types shared by every bucketgate crate:
//!
//! - [`RequestContext`] - request ID, trace handle and deadline for one inbound request
//! - [`RequestId`] - UUID v7 request identifier
//! - [`Principal`] - opaque identity forwarded to the policy engine
//! - [`TraceContext`] / [`SpanScope`] - explicit trace handle and scoped child spans
//! - [`DeadlineExceeded`] - error raised when a request deadline elapses

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod identity;
pub mod trace;

pub use context::{RequestContext, RequestId};
pub use error::DeadlineExceeded;
pub use identity::Principal;
pub use trace::{SpanScope, TraceContext};
