//! Request context types.
//!
//! The [`RequestContext`] is created when a request arrives and passed by
//! reference to every operation performed on its behalf: the policy decision
//! call and all storage I/O. It carries the request ID for log correlation,
//! the trace handle, and the optional deadline that bounds every suspension
//! point.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DeadlineExceeded;
use crate::trace::TraceContext;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for request tracking
/// and log correlation.
///
/// # Example
///
/// ```
/// use bucketgate_core::RequestId;
///
/// let id = RequestId::new();
/// println!("Request ID: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Per-request context.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use bucketgate_core::RequestContext;
///
/// let ctx = RequestContext::new().with_timeout(Duration::from_secs(30));
/// assert!(ctx.deadline().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique identifier for this request.
    request_id: RequestId,

    /// Trace handle extracted from the inbound request.
    trace: TraceContext,

    /// Point in time after which pending I/O is abandoned.
    deadline: Option<tokio::time::Instant>,

    /// When the request started processing.
    started_at: Instant,
}

impl RequestContext {
    /// Creates a new request context with a fresh request ID, an empty trace
    /// and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(RequestId::new())
    }

    /// Creates a new request context with the specified request ID.
    #[must_use]
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            trace: TraceContext::new(),
            deadline: None,
            started_at: Instant::now(),
        }
    }

    /// Returns a new context carrying the given trace handle.
    #[must_use]
    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = trace;
        self
    }

    /// Returns a new context whose deadline is `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(tokio::time::Instant::now() + timeout)
    }

    /// Returns a new context with an absolute deadline.
    ///
    /// An earlier deadline already set on the context is kept.
    #[must_use]
    pub fn with_deadline(mut self, deadline: tokio::time::Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the trace handle.
    #[must_use]
    pub const fn trace(&self) -> &TraceContext {
        &self.trace
    }

    /// Returns the deadline if set.
    #[must_use]
    pub const fn deadline(&self) -> Option<tokio::time::Instant> {
        self.deadline
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Drives `future` to completion unless the deadline elapses first.
    ///
    /// On expiry the future is dropped, which cancels any I/O it owns.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, DeadlineExceeded> {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, future)
                .await
                .map_err(|_| DeadlineExceeded),
            None => Ok(future.await),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
