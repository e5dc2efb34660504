//! Errors shared across crates.

use thiserror::Error;

/// The deadline carried by a [`RequestContext`](crate::RequestContext) elapsed
/// before the guarded operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("request deadline exceeded")]
pub struct DeadlineExceeded;
