//! Filesystem-backed storage.
//!
//! Keys map to files under a root directory. Writes go to a temporary file in
//! the destination directory and are renamed into place, so readers never see
//! partial content.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs as async_fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tracing::debug;

use crate::backend::{content_type_for, FolderEntry, ObjectBody, ObjectMetadata, StorageBackend};
use crate::error::BackendError;

/// Prefix of in-flight upload files; hidden from listings.
const TEMP_PREFIX: &str = ".bucketgate-upload-";

/// Stores objects as files below `root`.
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Creates a backend rooted at `root`. The directory need not exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

fn metadata_from(key: &str, metadata: &std::fs::Metadata) -> ObjectMetadata {
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    ObjectMetadata {
        last_modified: DateTime::<Utc>::from(modified),
        etag: etag_for(metadata.len(), modified),
        size: metadata.len(),
        content_type: content_type_for(key).to_string(),
    }
}

/// Entity tag from size and modification time.
fn etag_for(size: u64, modified: SystemTime) -> String {
    let since_epoch = modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    format!(
        "\"{:x}-{:x}{:08x}\"",
        size,
        since_epoch.as_secs(),
        since_epoch.subsec_nanos()
    )
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn head_object(&self, key: &str) -> Result<Option<ObjectMetadata>, BackendError> {
        let path = self.path_for(key);
        match async_fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(metadata_from(key, &metadata))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_object(
        &self,
        key: &str,
        range: Option<(u64, u64)>,
    ) -> Result<ObjectBody, BackendError> {
        let mut file = async_fs::File::open(self.path_for(key)).await?;
        match range {
            Some((start, end)) => {
                file.seek(SeekFrom::Start(start)).await?;
                Ok(ObjectBody::new(file.take(end - start + 1)))
            }
            None => Ok(ObjectBody::new(file)),
        }
    }

    async fn put_object(
        &self,
        key: &str,
        body: &mut (dyn AsyncRead + Send + Unpin),
        _content_type: &str,
        content_length: u64,
    ) -> Result<ObjectMetadata, BackendError> {
        let destination = self.path_for(key);
        let parent = destination
            .parent()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        async_fs::create_dir_all(&parent).await?;

        debug!(key = %key, path = ?destination, size = content_length, "writing object");

        let temp = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .tempfile_in(parent)
        })
        .await
        .map_err(io::Error::other)??;
        let (std_file, temp_path) = temp.into_parts();
        let mut file = async_fs::File::from_std(std_file);

        // temp_path removes the file on drop if we bail out before persisting
        tokio::io::copy(body, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let target = destination.clone();
        tokio::task::spawn_blocking(move || temp_path.persist(target))
            .await
            .map_err(io::Error::other)?
            .map_err(|e| BackendError::Io(e.error))?;

        let metadata = async_fs::metadata(&destination).await?;
        Ok(metadata_from(key, &metadata))
    }

    async fn delete_object(&self, key: &str) -> Result<(), BackendError> {
        let path = self.path_for(key);
        debug!(key = %key, path = ?path, "deleting object");
        match async_fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_folder(&self, prefix: &str) -> Result<Vec<FolderEntry>, BackendError> {
        let dir = self.path_for(prefix);
        let mut reader = match async_fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                entries.push(FolderEntry::folder(name));
            } else if metadata.is_file() {
                let object = metadata_from(&name, &metadata);
                entries.push(FolderEntry::object(name, &object));
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
