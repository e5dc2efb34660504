//! Bucket operation contract.

use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use bucketgate_core::RequestContext;
use bucketgate_telemetry::metrics::record_bucket_operation;
use serde::Serialize;
use tokio::io::AsyncSeekExt;

use crate::backend::{FolderEntry, ObjectBody, ObjectMetadata, StorageBackend};
use crate::body::LengthCheckedReader;
use crate::conditional::{self, Outcome};
use crate::error::{BackendError, BucketError, BucketResult};
use crate::input::{GetInput, PutInput};
use crate::range::{ByteRange, ResolvedRange};

/// Upper bound for [`BucketClient::load_file_content`].
pub const MAX_LOADED_FILE_SIZE: u64 = 1024 * 1024;

/// Per-target settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketOptions {
    /// Target name, used in logs.
    pub name: String,
    /// Key prefix prepended to every request path; empty or ending in `/`.
    pub prefix: String,
    /// File served instead of a listing for folder requests, e.g. `index.html`.
    pub index_document: Option<String>,
    /// Whether uploads may replace existing objects.
    pub allow_override: bool,
}

impl BucketOptions {
    /// Options for target `name` with no prefix, listings on, overrides allowed.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: String::new(),
            index_document: None,
            allow_override: true,
        }
    }

    /// Sets the key prefix. A trailing `/` is added when missing.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into().trim_start_matches('/').to_string();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.prefix = prefix;
        self
    }

    /// Sets the index document.
    #[must_use]
    pub fn with_index_document(mut self, name: impl Into<String>) -> Self {
        self.index_document = Some(name.into());
        self
    }

    /// Sets whether uploads may replace existing objects.
    #[must_use]
    pub fn with_allow_override(mut self, allow: bool) -> Self {
        self.allow_override = allow;
        self
    }
}

/// An object ready to be sent.
#[derive(Debug)]
pub struct ObjectResponse {
    /// Storage key.
    pub key: String,
    /// Object metadata.
    pub metadata: ObjectMetadata,
    /// Selected range, for 206 responses.
    pub range: Option<ResolvedRange>,
    /// Content. Empty for `head`.
    pub body: ObjectBody,
}

impl ObjectResponse {
    /// Number of bytes the response carries (the range length when ranged).
    pub fn content_length(&self) -> u64 {
        self.range.map_or(self.metadata.size, |r| r.len())
    }
}

/// Immediate children of a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderListing {
    /// Request path of the folder.
    pub path: String,
    /// Entries sorted by name.
    pub entries: Vec<FolderEntry>,
}

/// Result of `get` and `head`.
#[derive(Debug)]
pub enum GetOutput {
    /// An object (or a folder's index document).
    Object(ObjectResponse),
    /// A folder listing.
    Folder(FolderListing),
}

/// Result of `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutput {
    /// Storage key written.
    pub key: String,
    /// Metadata of the stored object.
    pub metadata: ObjectMetadata,
}

/// Storage operations of one bucket target.
#[async_trait]
pub trait BucketClient: Send + Sync {
    /// Reads an object or lists a folder, honoring conditional headers.
    async fn get(&self, ctx: &RequestContext, input: GetInput) -> BucketResult<GetOutput>;

    /// Like [`get`](Self::get) without opening the content.
    async fn head(&self, ctx: &RequestContext, input: GetInput) -> BucketResult<GetOutput>;

    /// Stores the upload stream under folder path plus file name.
    async fn put(&self, ctx: &RequestContext, input: PutInput<'_>) -> BucketResult<PutOutput>;

    /// Removes one object. Folder paths are refused.
    async fn delete(&self, ctx: &RequestContext, request_path: &str) -> BucketResult<()>;

    /// Reads a small UTF-8 file fully into memory.
    async fn load_file_content(&self, ctx: &RequestContext, path: &str) -> BucketResult<String>;
}

/// [`BucketClient`] over a [`StorageBackend`].
#[derive(Debug, Clone)]
pub struct BucketRequestContext {
    options: Arc<BucketOptions>,
    backend: Arc<dyn StorageBackend>,
}

/// Empty or trailing `/`.
pub fn is_folder_path(path: &str) -> bool {
    path.is_empty() || path.ends_with('/')
}

/// Refuses request paths that do not map to exactly one storage key.
///
/// Leading slashes are ignored. Backslashes, NUL bytes, `.` and `..`
/// segments, and empty segments (`a//b`) are rejected; only the final
/// segment may be empty, marking a folder.
pub fn check_request_path(request_path: &str) -> BucketResult<()> {
    let relative = request_path.trim_start_matches('/');
    if relative.contains('\\') {
        return Err(BucketError::invalid_path(request_path, "backslash in path"));
    }
    if relative.contains('\0') {
        return Err(BucketError::invalid_path(request_path, "NUL byte in path"));
    }

    let segments: Vec<&str> = relative.split('/').collect();
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(BucketError::invalid_path(
            request_path,
            "relative segment in path",
        ));
    }
    if let Some((_, interior)) = segments.split_last() {
        if interior.iter().any(|s| s.is_empty()) {
            return Err(BucketError::invalid_path(request_path, "empty segment in path"));
        }
    }
    Ok(())
}

/// Request path of an upload: the folder joined with the file name.
fn upload_path(folder: &str, filename: &str) -> String {
    let folder = folder.trim_start_matches('/');
    let folder = folder.strip_suffix('/').unwrap_or(folder);
    if folder.is_empty() {
        filename.to_string()
    } else {
        format!("{folder}/{filename}")
    }
}

impl BucketRequestContext {
    /// Creates a client for one target.
    pub fn new(options: Arc<BucketOptions>, backend: Arc<dyn StorageBackend>) -> Self {
        Self { options, backend }
    }

    /// Target options.
    pub fn options(&self) -> &BucketOptions {
        &self.options
    }

    /// Maps a request path to a storage key.
    ///
    /// Leading slashes are dropped. Paths refused by [`check_request_path`]
    /// never reach the backend.
    pub fn object_key(&self, request_path: &str) -> BucketResult<String> {
        check_request_path(request_path)?;
        Ok(format!(
            "{}{}",
            self.options.prefix,
            request_path.trim_start_matches('/')
        ))
    }

    async fn head_metadata(
        &self,
        ctx: &RequestContext,
        path: &str,
        key: &str,
    ) -> BucketResult<Option<ObjectMetadata>> {
        ctx.run(self.backend.head_object(key))
            .await
            .map_err(|_| BucketError::deadline_exceeded(path))?
            .map_err(|e| BucketError::backend(path, e))
    }

    async fn read(
        &self,
        ctx: &RequestContext,
        input: GetInput,
        open_body: bool,
    ) -> BucketResult<GetOutput> {
        let path = input.request_path.as_str();
        let key = self.object_key(path)?;

        if is_folder_path(path) {
            if let Some(index) = &self.options.index_document {
                let index_key = format!("{key}{index}");
                if let Some(metadata) = self.head_metadata(ctx, path, &index_key).await? {
                    return self
                        .serve(ctx, &input, index_key, metadata, open_body)
                        .await
                        .map(GetOutput::Object);
                }
            }

            let entries = ctx
                .run(self.backend.list_folder(&key))
                .await
                .map_err(|_| BucketError::deadline_exceeded(path))?
                .map_err(|e| BucketError::backend(path, e))?;
            return Ok(GetOutput::Folder(FolderListing {
                path: path.to_string(),
                entries,
            }));
        }

        let metadata = self
            .head_metadata(ctx, path, &key)
            .await?
            .ok_or_else(|| BucketError::not_found(path))?;

        self.serve(ctx, &input, key, metadata, open_body)
            .await
            .map(GetOutput::Object)
    }

    async fn serve(
        &self,
        ctx: &RequestContext,
        input: &GetInput,
        key: String,
        metadata: ObjectMetadata,
        open_body: bool,
    ) -> BucketResult<ObjectResponse> {
        let path = input.request_path.as_str();

        match conditional::evaluate(input, &metadata) {
            Outcome::Proceed => {}
            Outcome::NotModified => {
                return Err(BucketError::NotModified {
                    path: path.to_string(),
                    etag: metadata.etag,
                    last_modified: metadata.last_modified,
                })
            }
            Outcome::PreconditionFailed => {
                return Err(BucketError::PreconditionFailed {
                    path: path.to_string(),
                })
            }
        }

        let range = match input.range.as_deref() {
            Some(value) => Some(
                ByteRange::parse(value)
                    .and_then(|r| r.resolve(metadata.size))
                    .ok_or_else(|| BucketError::RangeNotSatisfiable {
                        path: path.to_string(),
                        size: metadata.size,
                    })?,
            ),
            None => None,
        };

        let body = if open_body {
            ctx.run(
                self.backend
                    .get_object(&key, range.map(|r| (r.start, r.end))),
            )
            .await
            .map_err(|_| BucketError::deadline_exceeded(path))?
            .map_err(|e| BucketError::backend(path, e))?
        } else {
            ObjectBody::empty()
        };

        Ok(ObjectResponse {
            key,
            metadata,
            range,
            body,
        })
    }

    async fn write(&self, ctx: &RequestContext, input: PutInput<'_>) -> BucketResult<PutOutput> {
        let filename = input.filename.trim_matches('/');
        if filename.is_empty() || filename.contains('/') {
            return Err(BucketError::invalid_path(
                input.filename.clone(),
                "file name must be a single path segment",
            ));
        }

        check_request_path(&input.request_path)?;
        let path = upload_path(&input.request_path, filename);
        let key = self.object_key(&path)?;

        if !self.options.allow_override && self.head_metadata(ctx, &path, &key).await?.is_some() {
            return Err(BucketError::OverrideForbidden { path });
        }

        input
            .body
            .seek(SeekFrom::Start(0))
            .await
            .map_err(|e| BucketError::backend(path.as_str(), e.into()))?;

        let declared = input.content_length;
        let mut reader = LengthCheckedReader::new(input.body, declared);
        let stored = ctx
            .run(
                self.backend
                    .put_object(&key, &mut reader, &input.content_type, declared),
            )
            .await;

        match stored {
            Err(_) => Err(BucketError::deadline_exceeded(path)),
            Ok(Ok(metadata)) => Ok(PutOutput { key, metadata }),
            Ok(Err(source)) => match reader.mismatch() {
                Some(actual) => Err(BucketError::ContentLengthMismatch {
                    path,
                    declared,
                    actual,
                }),
                None => Err(BucketError::backend(path, source)),
            },
        }
    }

    async fn remove(&self, ctx: &RequestContext, request_path: &str) -> BucketResult<()> {
        if is_folder_path(request_path) {
            return Err(BucketError::FolderRemoval {
                path: request_path.to_string(),
            });
        }
        let key = self.object_key(request_path)?;
        ctx.run(self.backend.delete_object(&key))
            .await
            .map_err(|_| BucketError::deadline_exceeded(request_path))?
            .map_err(|e| BucketError::backend(request_path, e))
    }

    async fn load(&self, ctx: &RequestContext, path: &str) -> BucketResult<String> {
        if is_folder_path(path) {
            return Err(BucketError::invalid_path(path, "not a file path"));
        }
        let key = self.object_key(path)?;
        let metadata = self
            .head_metadata(ctx, path, &key)
            .await?
            .ok_or_else(|| BucketError::not_found(path))?;
        if metadata.size > MAX_LOADED_FILE_SIZE {
            return Err(BucketError::FileTooLarge {
                path: path.to_string(),
                size: metadata.size,
                limit: MAX_LOADED_FILE_SIZE,
            });
        }

        let bytes = ctx
            .run(async {
                let body = self.backend.get_object(&key, None).await?;
                Ok::<_, BackendError>(body.into_bytes().await?)
            })
            .await
            .map_err(|_| BucketError::deadline_exceeded(path))?
            .map_err(|e| BucketError::backend(path, e))?;

        // the object may have grown since head_object
        if bytes.len() as u64 > MAX_LOADED_FILE_SIZE {
            return Err(BucketError::FileTooLarge {
                path: path.to_string(),
                size: bytes.len() as u64,
                limit: MAX_LOADED_FILE_SIZE,
            });
        }

        String::from_utf8(bytes.to_vec()).map_err(|_| BucketError::InvalidContent {
            path: path.to_string(),
        })
    }

    fn observe<T>(&self, operation: &'static str, path: &str, result: &BucketResult<T>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(err) => err.category(),
        };
        record_bucket_operation(operation, outcome);

        match result {
            Ok(_) => tracing::debug!(
                target_name = %self.options.name,
                operation,
                path,
                "bucket operation"
            ),
            Err(err) if err.status_code().is_server_error() => tracing::error!(
                target_name = %self.options.name,
                operation,
                path,
                error = %err,
                "bucket operation failed"
            ),
            Err(err) => tracing::debug!(
                target_name = %self.options.name,
                operation,
                path,
                outcome = err.category(),
                "bucket operation refused"
            ),
        }
    }
}

#[async_trait]
impl BucketClient for BucketRequestContext {
    async fn get(&self, ctx: &RequestContext, input: GetInput) -> BucketResult<GetOutput> {
        let path = input.request_path.clone();
        let span = ctx.trace().child_span("bucket.get");
        span.set_attribute("bucket.path", path.as_str());

        let result = self.read(ctx, input, true).await;
        if let Err(err) = &result {
            span.record_error(err.to_string());
        }
        self.observe("get", &path, &result);
        result
    }

    async fn head(&self, ctx: &RequestContext, input: GetInput) -> BucketResult<GetOutput> {
        let path = input.request_path.clone();
        let result = self.read(ctx, input, false).await;
        self.observe("head", &path, &result);
        result
    }

    async fn put(&self, ctx: &RequestContext, input: PutInput<'_>) -> BucketResult<PutOutput> {
        let path = upload_path(&input.request_path, input.filename.trim_matches('/'));
        let span = ctx.trace().child_span("bucket.put");
        span.set_attribute("bucket.path", path.as_str());

        let result = self.write(ctx, input).await;
        if let Err(err) = &result {
            span.record_error(err.to_string());
        }
        self.observe("put", &path, &result);
        result
    }

    async fn delete(&self, ctx: &RequestContext, request_path: &str) -> BucketResult<()> {
        let span = ctx.trace().child_span("bucket.delete");
        span.set_attribute("bucket.path", request_path);

        let result = self.remove(ctx, request_path).await;
        if let Err(err) = &result {
            span.record_error(err.to_string());
        }
        self.observe("delete", request_path, &result);
        result
    }

    async fn load_file_content(&self, ctx: &RequestContext, path: &str) -> BucketResult<String> {
        let result = self.load(ctx, path).await;
        self.observe("load_file_content", path, &result);
        result
    }
}
