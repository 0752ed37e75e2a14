//! Configuration for the dataset writer

use crate::mode::Compression;

/// Writer configuration
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// AWS access key id used for `s3://` paths
    pub aws_access_key_id: Option<String>,

    /// AWS secret access key used for `s3://` paths
    pub aws_secret_access_key: Option<String>,

    /// AWS region of the bucket
    pub aws_region: Option<String>,

    /// Custom S3 endpoint (MinIO, LocalStack)
    pub aws_endpoint: Option<String>,

    /// Compression used when `WriteOptions` does not override it
    pub default_compression: Compression,

    /// Log level handed to `logging::init_tracing` (default: "info")
    pub log_level: String,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: None,
            aws_endpoint: None,
            default_compression: Compression::default(),
            log_level: "info".to_string(),
        }
    }
}

impl WriterConfig {
    /// Local-only configuration with default compression (gzip)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from the standard AWS variables plus
    /// `POLARS_WRITER_COMPRESSION` and `POLARS_WRITER_LOG_LEVEL`.
    ///
    /// An unparsable compression value falls back to the default.
    pub fn from_env() -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        Self {
            aws_access_key_id: env("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: env("AWS_SECRET_ACCESS_KEY"),
            aws_region: env("AWS_REGION").or_else(|| env("AWS_DEFAULT_REGION")),
            aws_endpoint: env("AWS_ENDPOINT_URL"),
            default_compression: env("POLARS_WRITER_COMPRESSION")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            log_level: env("POLARS_WRITER_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        }
    }

    /// Set all three AWS credentials at once
    pub fn with_aws_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        self.aws_access_key_id = Some(access_key_id.into());
        self.aws_secret_access_key = Some(secret_access_key.into());
        self.aws_region = Some(region.into());
        self
    }

    pub fn with_aws_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.aws_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_default_compression(mut self, compression: Compression) -> Self {
        self.default_compression = compression;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Cloud access needs the key, the secret and the region
    pub fn has_cloud_credentials(&self) -> bool {
        self.aws_access_key_id.is_some()
            && self.aws_secret_access_key.is_some()
            && self.aws_region.is_some()
    }
}
