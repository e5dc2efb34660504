//! Error types for bucket operations.

use chrono::{DateTime, Utc};
use http::StatusCode;
use thiserror::Error;

/// Result type for bucket operations.
pub type BucketResult<T> = Result<T, BucketError>;

/// Failure reported by a [`StorageBackend`](crate::StorageBackend).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// I/O failure talking to the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other store-specific failure.
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Whether the store reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Errors that can occur during bucket operations.
///
/// `NotModified` and `PreconditionFailed` are outcomes of conditional
/// evaluation rather than faults; they travel as errors so that the success
/// path always carries content.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BucketError {
    /// Conditional GET matched; the client copy is current.
    #[error("not modified: {path}")]
    NotModified {
        /// Request path.
        path: String,
        /// Current entity tag.
        etag: String,
        /// Current last-modified time.
        last_modified: DateTime<Utc>,
    },

    /// `If-Match` or `If-Unmodified-Since` failed.
    #[error("precondition failed: {path}")]
    PreconditionFailed {
        /// Request path.
        path: String,
    },

    /// The `Range` header is invalid or outside the object.
    #[error("range not satisfiable for {path} (size {size})")]
    RangeNotSatisfiable {
        /// Request path.
        path: String,
        /// Object size in bytes.
        size: u64,
    },

    /// Attempt to delete a folder.
    #[error("can't remove folder {path}")]
    FolderRemoval {
        /// Request path.
        path: String,
    },

    /// Object does not exist.
    #[error("object not found: {path}")]
    NotFound {
        /// Request path.
        path: String,
    },

    /// Upload would replace an existing object and overriding is disabled.
    #[error("object already exists: {path}")]
    OverrideForbidden {
        /// Request path.
        path: String,
    },

    /// Upload stream length differs from the declared length.
    #[error("content length mismatch for {path}: declared {declared}, read {actual}")]
    ContentLengthMismatch {
        /// Request path.
        path: String,
        /// Declared length.
        declared: u64,
        /// Bytes read before the mismatch was detected.
        actual: u64,
    },

    /// Path is not a valid object key.
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// Request path.
        path: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// File is larger than an in-memory load allows.
    #[error("file {path} is {size} bytes, limit is {limit}")]
    FileTooLarge {
        /// Request path.
        path: String,
        /// Object size.
        size: u64,
        /// Maximum allowed size.
        limit: u64,
    },

    /// File content is not valid UTF-8.
    #[error("file {path} is not valid UTF-8")]
    InvalidContent {
        /// Request path.
        path: String,
    },

    /// Request deadline elapsed during storage I/O.
    #[error("storage operation on {path} exceeded the request deadline")]
    DeadlineExceeded {
        /// Request path.
        path: String,
    },

    /// Storage backend failure.
    #[error("storage backend error on {path}: {source}")]
    Backend {
        /// Request path.
        path: String,
        /// Underlying failure.
        #[source]
        source: BackendError,
    },
}

impl BucketError {
    /// Create a not-found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason,
        }
    }

    /// Wrap a backend failure; missing objects become [`BucketError::NotFound`].
    pub fn backend(path: impl Into<String>, source: BackendError) -> Self {
        let path = path.into();
        if source.is_not_found() {
            Self::NotFound { path }
        } else {
            Self::Backend { path, source }
        }
    }

    /// Create a deadline error.
    pub fn deadline_exceeded(path: impl Into<String>) -> Self {
        Self::DeadlineExceeded { path: path.into() }
    }

    /// Whether this ends the request early without being a failure.
    pub const fn is_short_circuit(&self) -> bool {
        matches!(self, Self::NotModified { .. })
    }

    /// Returns the HTTP status code for this error.
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotModified { .. } => StatusCode::NOT_MODIFIED,
            Self::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::FolderRemoval { .. } | Self::OverrideForbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::ContentLengthMismatch { .. } | Self::InvalidPath { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::FileTooLarge { .. } | Self::InvalidContent { .. } | Self::Backend { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short machine-readable category, also the metrics outcome label.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::NotModified { .. } => "not_modified",
            Self::PreconditionFailed { .. } => "precondition_failed",
            Self::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            Self::FolderRemoval { .. } => "folder_removal",
            Self::NotFound { .. } => "not_found",
            Self::OverrideForbidden { .. } => "override_forbidden",
            Self::ContentLengthMismatch { .. } => "content_length_mismatch",
            Self::InvalidPath { .. } => "invalid_path",
            Self::FileTooLarge { .. } => "file_too_large",
            Self::InvalidContent { .. } => "invalid_content",
            Self::DeadlineExceeded { .. } => "deadline",
            Self::Backend { .. } => "backend",
        }
    }
}
