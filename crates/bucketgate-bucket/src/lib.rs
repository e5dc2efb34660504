//! # Bucketgate Bucket
//!
//! Storage operations for one bucket target, with HTTP conditional request
//! and byte-range semantics:
//!
//! - [`BucketClient`] - the Get/Head/Put/Delete/LoadFileContent contract
//! - [`BucketRequestContext`] - the implementation over a [`StorageBackend`]
//! - [`conditional::evaluate`] - `If-Match`, `If-None-Match`,
//!   `If-Modified-Since`, `If-Unmodified-Since`
//! - [`ByteRange`] - single `Range: bytes=` requests
//! - [`FilesystemBackend`] and [`MemoryBackend`] - storage backends
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bucketgate_bucket::{BucketClient, BucketOptions, BucketRequestContext, GetInput, MemoryBackend};
//!
//! let backend = Arc::new(MemoryBackend::new());
//! backend.insert("docs/readme.txt", "hello");
//!
//! let bucket = BucketRequestContext::new(Arc::new(BucketOptions::new("docs")), backend);
//! let output = bucket.get(&ctx, GetInput::new("docs/readme.txt")).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
mod body;
pub mod client;
pub mod conditional;
pub mod error;
pub mod fs;
pub mod input;
pub mod memory;
pub mod range;

pub use backend::{FolderEntry, ObjectBody, ObjectMetadata, StorageBackend};
pub use client::{
    check_request_path, is_folder_path, BucketClient, BucketOptions, BucketRequestContext,
    FolderListing, GetOutput, ObjectResponse, PutOutput, MAX_LOADED_FILE_SIZE,
};
pub use conditional::Outcome;
pub use error::{BackendError, BucketError, BucketResult};
pub use fs::FilesystemBackend;
pub use input::{GetInput, PutInput, SeekableBody};
pub use memory::MemoryBackend;
pub use range::{ByteRange, ResolvedRange};
