//! Storage backend capability.
//!
//! A [`StorageBackend`] stores opaque objects under string keys. Keys handed
//! to a backend are already validated: no leading `/`, no `.`/`..` segments,
//! no backslashes. Folder keys are empty or end with `/`.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::error::BackendError;

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
    /// Entity tag, quoted (e.g. `"5d-18c2f"`).
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type.
    pub content_type: String,
}

/// One entry of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderEntry {
    /// Entry name relative to the folder; sub-folders end with `/`.
    pub name: String,
    /// Whether the entry is a sub-folder.
    pub is_folder: bool,
    /// Size in bytes (0 for folders).
    pub size: u64,
    /// Last modification time, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Entity tag, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl FolderEntry {
    /// A sub-folder entry.
    pub fn folder(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self {
            name,
            is_folder: true,
            size: 0,
            last_modified: None,
            etag: None,
        }
    }

    /// An object entry.
    pub fn object(name: impl Into<String>, metadata: &ObjectMetadata) -> Self {
        Self {
            name: name.into(),
            is_folder: false,
            size: metadata.size,
            last_modified: Some(metadata.last_modified),
            etag: Some(metadata.etag.clone()),
        }
    }
}

/// Streamed object content.
pub struct ObjectBody(Box<dyn AsyncRead + Send + Unpin>);

impl ObjectBody {
    /// Wraps a reader.
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self(Box::new(reader))
    }

    /// A body backed by an in-memory buffer.
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self::new(io::Cursor::new(bytes))
    }

    /// A body with no content.
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// Reads the whole body into memory.
    pub async fn into_bytes(mut self) -> io::Result<Bytes> {
        let mut buf = Vec::new();
        self.0.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

impl AsyncRead for ObjectBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.0).poll_read(cx, buf)
    }
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody").finish_non_exhaustive()
    }
}

/// Object store used by a bucket target.
///
/// Implementations must be safe for concurrent use; requests share one
/// backend through an `Arc`.
#[async_trait]
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Returns metadata, or `None` when no object exists at `key`.
    async fn head_object(&self, key: &str) -> Result<Option<ObjectMetadata>, BackendError>;

    /// Opens the object content, optionally restricted to the inclusive
    /// byte range `(start, end)`.
    async fn get_object(
        &self,
        key: &str,
        range: Option<(u64, u64)>,
    ) -> Result<ObjectBody, BackendError>;

    /// Stores the stream read to its end under `key`.
    ///
    /// Nothing may become visible under `key` if reading fails.
    async fn put_object(
        &self,
        key: &str,
        body: &mut (dyn AsyncRead + Send + Unpin),
        content_type: &str,
        content_length: u64,
    ) -> Result<ObjectMetadata, BackendError>;

    /// Removes the object. Removing a missing object succeeds.
    async fn delete_object(&self, key: &str) -> Result<(), BackendError>;

    /// Lists the immediate children of the folder `prefix`, sorted by name.
    async fn list_folder(&self, prefix: &str) -> Result<Vec<FolderEntry>, BackendError>;
}

/// MIME type from the file extension.
pub fn content_type_for(key: &str) -> &'static str {
    let extension = key
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "xml" => "application/xml",
        "txt" | "log" => "text/plain; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "yaml" | "yml" => "application/yaml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "tar" => "application/x-tar",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("site/index.HTML"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("a/b/report.csv"), "text/csv; charset=utf-8");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
        assert_eq!(content_type_for("dir.d/noext"), "application/octet-stream");
    }

    #[test]
    fn test_folder_entry_gets_trailing_slash() {
        assert_eq!(FolderEntry::folder("docs").name, "docs/");
        assert_eq!(FolderEntry::folder("docs/").name, "docs/");
    }

    #[tokio::test]
    async fn test_object_body_roundtrip() {
        let body = ObjectBody::from_bytes(Bytes::from_static(b"hello"));
        assert_eq!(body.into_bytes().await.unwrap(), Bytes::from_static(b"hello"));
        assert!(ObjectBody::empty().into_bytes().await.unwrap().is_empty());
    }
}
