//! S3 / object store backend
//!
//! Directories are implicit: a "directory" exists when at least one object
//! lives below its prefix. Each call blocks on the backend's own runtime, so
//! it must not be invoked from inside an async task.

use std::fmt;
use std::sync::Arc;

use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use tokio::runtime::Runtime;
use tracing::debug;

use super::{StorageBackend, S3_PREFIX};
use crate::config::WriterConfig;
use crate::error::{Result, WriterError};

/// Split `s3://bucket/key` into bucket and (slash-trimmed) key
pub(crate) fn split_s3_path(path: &str) -> Result<(String, String)> {
    let s3_uri = path
        .strip_prefix(S3_PREFIX)
        .ok_or_else(|| WriterError::InvalidPath(format!("Invalid S3 URI: {path}")))?;

    let (bucket, key) = s3_uri.split_once('/').unwrap_or((s3_uri, ""));
    if bucket.is_empty() {
        return Err(WriterError::InvalidPath(format!(
            "S3 URI must be s3://bucket/key, got {path}"
        )));
    }

    Ok((bucket.to_string(), key.trim_matches('/').to_string()))
}

pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    runtime: Runtime,
}

impl fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectStoreBackend<{}{}>", S3_PREFIX, self.bucket)
    }
}

impl ObjectStoreBackend {
    /// Build an S3 client for `bucket` from the writer's AWS settings
    pub fn s3(bucket: &str, config: &WriterConfig) -> Result<Self> {
        let mut builder = AmazonS3Builder::new().with_bucket_name(bucket);

        if let Some(key) = &config.aws_access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &config.aws_secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(region) = &config.aws_region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.aws_endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        Self::with_store(bucket, Arc::new(builder.build()?))
    }

    /// Wrap an existing store that serves `bucket`
    pub fn with_store(bucket: &str, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let runtime = Runtime::new()
            .map_err(|e| WriterError::Runtime(format!("Failed to create runtime: {}", e)))?;

        Ok(Self {
            store,
            bucket: bucket.to_string(),
            runtime,
        })
    }

    /// Object location of `path`; `None` is the bucket root
    fn location(&self, path: &str) -> Result<Option<Path>> {
        let (bucket, key) = split_s3_path(path)?;
        if bucket != self.bucket {
            return Err(WriterError::InvalidPath(format!(
                "{path} is not in bucket {}",
                self.bucket
            )));
        }

        if key.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Path::parse(key)?))
        }
    }

    fn object_location(&self, path: &str) -> Result<Path> {
        self.location(path)?.ok_or_else(|| {
            WriterError::InvalidPath(format!("{path} is a bucket root, not an object"))
        })
    }
}

async fn is_object(store: &dyn ObjectStore, location: &Path) -> Result<bool> {
    match store.head(location).await {
        Ok(_) => Ok(true),
        Err(object_store::Error::NotFound { .. }) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn has_children(store: &dyn ObjectStore, prefix: &Path) -> Result<bool> {
    let mut listing = store.list(Some(prefix));
    Ok(listing.try_next().await?.is_some())
}

impl StorageBackend for ObjectStoreBackend {
    fn exists(&self, path: &str) -> Result<bool> {
        let Some(location) = self.location(path)? else {
            return Ok(true);
        };

        let store = self.store.as_ref();
        self.runtime.block_on(async {
            Ok(is_object(store, &location).await? || has_children(store, &location).await?)
        })
    }

    fn is_dir(&self, path: &str) -> Result<bool> {
        let Some(location) = self.location(path)? else {
            return Ok(true);
        };

        let store = self.store.as_ref();
        self.runtime.block_on(async {
            Ok(!is_object(store, &location).await? && has_children(store, &location).await?)
        })
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let location = self.location(path)?;

        let listing = self
            .runtime
            .block_on(self.store.list_with_delimiter(location.as_ref()))?;

        let mut names = listing
            .common_prefixes
            .iter()
            .chain(listing.objects.iter().map(|meta| &meta.location))
            .filter_map(|p| p.filename().map(str::to_string))
            .collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }

    fn make_dir(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let location = self.object_location(path)?;
        self.runtime.block_on(self.store.delete(&location))?;
        Ok(())
    }

    fn remove_dir_all(&self, path: &str) -> Result<()> {
        let location = self.object_location(path)?;
        let store = self.store.as_ref();

        self.runtime.block_on(async {
            if is_object(store, &location).await? {
                store.delete(&location).await?;
            }

            let children: Vec<Path> = store
                .list(Some(&location))
                .map_ok(|meta| meta.location)
                .try_collect()
                .await?;

            debug!(path, objects = children.len(), "Deleting objects");
            for child in &children {
                store.delete(child).await?;
            }
            Ok(())
        })
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let location = self.object_location(path)?;
        let store = self.store.as_ref();

        self.runtime.block_on(async {
            let bytes = store.get(&location).await?.bytes().await?;
            Ok(bytes.to_vec())
        })
    }

    fn write_file(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let location = self.object_location(path)?;
        self.runtime
            .block_on(self.store.put(&location, PutPayload::from(data)))?;
        Ok(())
    }
}
