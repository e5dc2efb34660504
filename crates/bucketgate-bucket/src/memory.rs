//! In-process storage, for tests and ephemeral targets.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::backend::{content_type_for, FolderEntry, ObjectBody, ObjectMetadata, StorageBackend};
use crate::error::BackendError;

#[derive(Debug, Clone)]
struct StoredObject {
    metadata: ObjectMetadata,
    data: Bytes,
}

/// Objects kept in a map. Counts every backend call it receives.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    calls: AtomicUsize,
    generation: AtomicU64,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` under `key`, with the content type guessed from the key.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) -> ObjectMetadata {
        let key = key.into();
        let content_type = content_type_for(&key).to_string();
        self.store(key, data.into(), content_type, Utc::now())
    }

    /// Stores an object with explicit metadata.
    pub fn insert_with_metadata(
        &self,
        key: impl Into<String>,
        data: impl Into<Bytes>,
        metadata: ObjectMetadata,
    ) {
        self.objects.write().insert(
            key.into(),
            StoredObject {
                metadata,
                data: data.into(),
            },
        );
    }

    /// Current content of `key`, bypassing the call counter.
    pub fn contents(&self, key: &str) -> Option<Bytes> {
        self.objects.read().get(key).map(|o| o.data.clone())
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Number of [`StorageBackend`] calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn store(
        &self,
        key: String,
        data: Bytes,
        content_type: String,
        last_modified: DateTime<Utc>,
    ) -> ObjectMetadata {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let metadata = ObjectMetadata {
            last_modified,
            etag: format!("\"{:x}-{:x}\"", data.len(), generation),
            size: data.len() as u64,
            content_type,
        };
        self.objects.write().insert(
            key,
            StoredObject {
                metadata: metadata.clone(),
                data,
            },
        );
        metadata
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn head_object(&self, key: &str) -> Result<Option<ObjectMetadata>, BackendError> {
        self.count();
        Ok(self.objects.read().get(key).map(|o| o.metadata.clone()))
    }

    async fn get_object(
        &self,
        key: &str,
        range: Option<(u64, u64)>,
    ) -> Result<ObjectBody, BackendError> {
        self.count();
        let data = self
            .objects
            .read()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| {
                BackendError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no object at {key}"),
                ))
            })?;

        let data = match range {
            Some((start, end)) => {
                let start = usize::try_from(start).unwrap_or(usize::MAX).min(data.len());
                let end = usize::try_from(end)
                    .unwrap_or(usize::MAX)
                    .saturating_add(1)
                    .min(data.len());
                data.slice(start..end.max(start))
            }
            None => data,
        };
        Ok(ObjectBody::from_bytes(data))
    }

    async fn put_object(
        &self,
        key: &str,
        body: &mut (dyn AsyncRead + Send + Unpin),
        content_type: &str,
        content_length: u64,
    ) -> Result<ObjectMetadata, BackendError> {
        self.count();
        let mut buf = Vec::with_capacity(usize::try_from(content_length).unwrap_or(0));
        body.read_to_end(&mut buf).await?;
        Ok(self.store(
            key.to_string(),
            Bytes::from(buf),
            content_type.to_string(),
            Utc::now(),
        ))
    }

    async fn delete_object(&self, key: &str) -> Result<(), BackendError> {
        self.count();
        self.objects.write().remove(key);
        Ok(())
    }

    async fn list_folder(&self, prefix: &str) -> Result<Vec<FolderEntry>, BackendError> {
        self.count();
        let objects = self.objects.read();
        let mut entries: BTreeMap<String, FolderEntry> = BTreeMap::new();

        for (key, object) in objects.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((folder, _)) => {
                    entries
                        .entry(format!("{folder}/"))
                        .or_insert_with(|| FolderEntry::folder(folder));
                }
                None if !rest.is_empty() => {
                    entries.insert(rest.to_string(), FolderEntry::object(rest, &object.metadata));
                }
                None => {}
            }
        }
        Ok(entries.into_values().collect())
    }
}
