//! # Polars Dataset Writer
//!
//! Reconciles freshly produced frames with parquet datasets that already live
//! on local disk or in S3, using the Polars lazy engine.
//!
//! ## Features
//!
//! - **Write modes**: append, full overwrite, partition overwrite and upsert
//!   by key columns
//! - **Hive layout**: `path/col=value/part-<uuid>.parquet`, with partition
//!   columns kept inside the files so their types survive a round trip
//! - **Schema drift**: incoming data is strict-cast to the existing schema;
//!   when that fails the dataset is rewritten as a union by name
//! - **Sanitization**: empty struct columns and fields are stripped before
//!   parquet is written
//! - **Self-healing**: a dataset whose files cannot be decoded is removed and
//!   rewritten; storage errors propagate and leave it alone
//! - **Storage**: local paths and `s3://` via `object_store`
//!
//! ## Example
//!
//! ```rust,no_run
//! use polars::prelude::*;
//! use polars_dataset_writer::{DatasetWriter, WriteMode, WriteOptions, WriterConfig};
//!
//! let writer = DatasetWriter::new(WriterConfig::new());
//! let df = DataFrame::new(vec![
//!     Series::new("id".into(), vec![1i64, 2]).into(),
//!     Series::new("region".into(), vec!["US", "EU"]).into(),
//! ])
//! .unwrap();
//!
//! let summary = writer
//!     .write(
//!         df,
//!         "/data/sales",
//!         WriteMode::Upsert { key_cols: vec!["id".into()] },
//!         &WriteOptions::new().with_partition_cols(["region"]),
//!     )
//!     .unwrap();
//! println!("{:?}: {} rows", summary.strategy, summary.rows_written);
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod mode;
pub mod partition;
pub mod schema;
pub mod storage;
pub mod writer;

// Re-exports
pub use config::WriterConfig;
pub use error::{Result, WriterError};
pub use logging::init_tracing;
pub use mode::{Compression, OverwriteLevel, WriteMode, WriteOptions};
pub use partition::{partition_keys, resolve_partition_path, PartitionKey};
pub use schema::{reconcile, sanitize, sanitize_dtype, Reconciled};
pub use storage::{FileSystem, StorageBackend};
pub use writer::{DatasetWriter, MergeStrategy, WriteSummary};
