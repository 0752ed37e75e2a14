//! Path-addressed storage for datasets
//!
//! Supports:
//! - Local filesystem paths (plain or `file://`)
//! - S3 object storage (`s3://bucket/key`), selected by prefix
//!
//! Every operation is synchronous. The object store backend blocks on its
//! own tokio runtime.

mod local;
mod object;

pub use local::LocalBackend;
pub use object::ObjectStoreBackend;

use std::collections::HashMap;
use std::sync::Arc;

use object_store::ObjectStore;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::WriterConfig;
use crate::error::{Result, WriterError};

pub const S3_PREFIX: &str = "s3://";

/// File and directory primitives shared by every backend
pub trait StorageBackend: Send + Sync {
    fn exists(&self, path: &str) -> Result<bool>;

    fn is_dir(&self, path: &str) -> Result<bool>;

    /// Names of the direct children of `path` (not full paths), sorted.
    /// A file has no children.
    fn list_dir(&self, path: &str) -> Result<Vec<String>>;

    fn make_dir(&self, path: &str) -> Result<()>;

    fn remove_file(&self, path: &str) -> Result<()>;

    /// Remove a directory and everything below it. Removing a file removes
    /// the file; a missing path is not an error.
    fn remove_dir_all(&self, path: &str) -> Result<()>;

    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Write `data` to `path`, creating missing parent directories
    fn write_file(&self, path: &str, data: Vec<u8>) -> Result<()>;
}

pub fn is_s3_path(path: &str) -> bool {
    path.starts_with(S3_PREFIX)
}

/// Parent directory of `path`, by string manipulation only
pub fn parent(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.starts_with('/') { "/".to_string() } else { ".".to_string() };
    }

    let (scheme, rest) = match trimmed.strip_prefix(S3_PREFIX) {
        Some(rest) => (S3_PREFIX, rest),
        None => ("", trimmed),
    };

    match rest.rfind('/') {
        Some(0) => format!("{scheme}/"),
        Some(idx) => format!("{scheme}{}", &rest[..idx]),
        // A bucket root is its own parent
        None if !scheme.is_empty() => trimmed.to_string(),
        None => ".".to_string(),
    }
}

/// Join a relative segment onto a base path with exactly one separator
pub fn join(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}

/// Dispatches each path to the local or the S3 backend
pub struct FileSystem {
    config: WriterConfig,
    local: Arc<LocalBackend>,
    buckets: Mutex<HashMap<String, Arc<ObjectStoreBackend>>>,
}

impl FileSystem {
    pub fn new(config: WriterConfig) -> Self {
        Self {
            config,
            local: Arc::new(LocalBackend::new()),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Serve `s3://{bucket}` from `store` instead of building an S3 client
    pub fn register_bucket(&self, bucket: &str, store: Arc<dyn ObjectStore>) -> Result<()> {
        let backend = ObjectStoreBackend::with_store(bucket, store)?;
        self.buckets.lock().insert(bucket.to_string(), Arc::new(backend));
        Ok(())
    }

    fn backend(&self, path: &str) -> Result<Arc<dyn StorageBackend>> {
        if !is_s3_path(path) {
            return Ok(self.local.clone());
        }

        let (bucket, _) = object::split_s3_path(path)?;
        let mut buckets = self.buckets.lock();
        if let Some(backend) = buckets.get(&bucket) {
            return Ok(backend.clone());
        }

        if !self.config.has_cloud_credentials() {
            return Err(WriterError::Config(
                "Missing AWS configurations, reinitialise with credentials".to_string(),
            ));
        }

        debug!(bucket = %bucket, "Creating S3 backend");
        let backend = Arc::new(ObjectStoreBackend::s3(&bucket, &self.config)?);
        buckets.insert(bucket, backend.clone());
        Ok(backend)
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        self.backend(path)?.exists(path)
    }

    pub fn is_dir(&self, path: &str) -> Result<bool> {
        self.backend(path)?.is_dir(path)
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        self.backend(path)?.list_dir(path)
    }

    pub fn parent(&self, path: &str) -> String {
        parent(path)
    }

    /// The directory of `path`: itself when it is a directory, else its parent
    pub fn get_dir(&self, path: &str) -> Result<String> {
        if self.is_dir(path)? {
            Ok(path.to_string())
        } else {
            Ok(parent(path))
        }
    }

    pub fn make_dir(&self, path: &str) -> Result<()> {
        self.backend(path)?.make_dir(path)
    }

    pub fn remove_file(&self, path: &str) -> Result<()> {
        self.backend(path)?.remove_file(path)
    }

    pub fn remove_dir_all(&self, path: &str) -> Result<()> {
        debug!(path, "Removing directory");
        self.backend(path)?.remove_dir_all(path)
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.backend(path)?.read_file(path)
    }

    pub fn write_file(&self, path: &str, data: Vec<u8>) -> Result<()> {
        self.backend(path)?.write_file(path, data)
    }
}
