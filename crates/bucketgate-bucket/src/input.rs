//! Inputs of bucket operations.

use std::fmt;

use chrono::{DateTime, Utc};
use http::header::{
    HeaderMap, HeaderName, IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_UNMODIFIED_SINCE, RANGE,
};
use tokio::io::{AsyncRead, AsyncSeek};

/// A GET or HEAD on a bucket path, with its conditional headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetInput {
    /// Path relative to the target mount; empty or trailing `/` is a folder.
    pub request_path: String,
    /// `If-Modified-Since`.
    pub if_modified_since: Option<DateTime<Utc>>,
    /// Raw `If-Match` value.
    pub if_match: Option<String>,
    /// Raw `If-None-Match` value.
    pub if_none_match: Option<String>,
    /// `If-Unmodified-Since`.
    pub if_unmodified_since: Option<DateTime<Utc>>,
    /// Raw `Range` value.
    pub range: Option<String>,
}

impl GetInput {
    /// Unconditional request for `request_path`.
    pub fn new(request_path: impl Into<String>) -> Self {
        Self {
            request_path: request_path.into(),
            ..Self::default()
        }
    }

    /// Reads the conditional and range headers.
    ///
    /// Dates that do not parse as HTTP-dates are ignored, as RFC 9110
    /// requires. Empty header values count as absent.
    pub fn from_headers(request_path: impl Into<String>, headers: &HeaderMap) -> Self {
        let text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let date = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| httpdate::parse_http_date(v.trim()).ok())
                .map(DateTime::<Utc>::from)
        };

        Self {
            request_path: request_path.into(),
            if_modified_since: date(IF_MODIFIED_SINCE),
            if_match: text(IF_MATCH),
            if_none_match: text(IF_NONE_MATCH),
            if_unmodified_since: date(IF_UNMODIFIED_SINCE),
            range: text(RANGE),
        }
    }

    /// Sets `If-Match`.
    #[must_use]
    pub fn with_if_match(mut self, value: impl Into<String>) -> Self {
        self.if_match = Some(value.into());
        self
    }

    /// Sets `If-None-Match`.
    #[must_use]
    pub fn with_if_none_match(mut self, value: impl Into<String>) -> Self {
        self.if_none_match = Some(value.into());
        self
    }

    /// Sets `If-Modified-Since`.
    #[must_use]
    pub fn with_if_modified_since(mut self, at: DateTime<Utc>) -> Self {
        self.if_modified_since = Some(at);
        self
    }

    /// Sets `If-Unmodified-Since`.
    #[must_use]
    pub fn with_if_unmodified_since(mut self, at: DateTime<Utc>) -> Self {
        self.if_unmodified_since = Some(at);
        self
    }

    /// Sets `Range`.
    #[must_use]
    pub fn with_range(mut self, value: impl Into<String>) -> Self {
        self.range = Some(value.into());
        self
    }
}

/// Readable and seekable upload stream.
pub trait SeekableBody: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin + ?Sized> SeekableBody for T {}

/// An upload into a folder.
///
/// The body is borrowed for the duration of the call only.
pub struct PutInput<'a> {
    /// Folder path relative to the target mount.
    pub request_path: String,
    /// Name of the file inside the folder.
    pub filename: String,
    /// Content stream.
    pub body: &'a mut dyn SeekableBody,
    /// Declared MIME type.
    pub content_type: String,
    /// Declared length in bytes.
    pub content_length: u64,
}

impl fmt::Debug for PutInput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutInput")
            .field("request_path", &self.request_path)
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}
