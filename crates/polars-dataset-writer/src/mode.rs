//! Write modes and per-write options

use std::fmt;
use std::str::FromStr;

use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WriterError};

/// How incoming data is reconciled with an existing dataset
///
/// A closed set: the writer matches on it exhaustively, so there is no
/// precedence between optional arguments to reason about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WriteMode {
    /// Add incoming rows next to the existing ones
    Append,
    /// Replace the whole dataset
    FullOverwrite,
    /// Replace only the partitions present in the incoming data
    PartitionOverwrite { partition_cols: Vec<String> },
    /// Replace rows sharing `key_cols` values, keep every other row
    Upsert { key_cols: Vec<String> },
}

/// Overwrite level of the optional-argument calling style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwriteLevel {
    Partition,
    Full,
}

impl FromStr for OverwriteLevel {
    type Err = WriterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "partition" => Ok(OverwriteLevel::Partition),
            "full" => Ok(OverwriteLevel::Full),
            other => Err(WriterError::Config(format!(
                "Unknown overwrite level '{other}', expected 'partition' or 'full'"
            ))),
        }
    }
}

impl WriteMode {
    /// Build a mode from the `overwrite_level` / `upsert_key` argument pair.
    ///
    /// Giving both an overwrite level and a non-empty upsert key is rejected:
    /// the two requests contradict each other. An empty upsert key counts as
    /// no upsert key.
    pub fn from_legacy(
        overwrite_level: Option<OverwriteLevel>,
        upsert_key: Option<Vec<String>>,
        partition_cols: &[String],
    ) -> Result<Self> {
        let upsert_key = upsert_key.filter(|k| !k.is_empty());

        let mode = match (overwrite_level, upsert_key) {
            (Some(level), Some(key)) => {
                return Err(WriterError::Config(format!(
                    "Both overwrite level '{level:?}' and upsert key {key:?} were given; pick one"
                )))
            }
            (Some(OverwriteLevel::Full), None) => WriteMode::FullOverwrite,
            (Some(OverwriteLevel::Partition), None) => WriteMode::PartitionOverwrite {
                partition_cols: partition_cols.to_vec(),
            },
            (None, Some(key_cols)) => WriteMode::Upsert { key_cols },
            (None, None) => WriteMode::Append,
        };

        mode.validate()?;
        Ok(mode)
    }

    /// Check the mode's own invariants
    pub fn validate(&self) -> Result<()> {
        match self {
            WriteMode::PartitionOverwrite { partition_cols } if partition_cols.is_empty() => {
                Err(WriterError::Config(
                    "Partition columns are empty though overwrite level was set to partition"
                        .to_string(),
                ))
            }
            WriteMode::Upsert { key_cols } if key_cols.is_empty() => Err(WriterError::Config(
                "Upsert requires at least one key column".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WriteMode::Append => "append",
            WriteMode::FullOverwrite => "full_overwrite",
            WriteMode::PartitionOverwrite { .. } => "partition_overwrite",
            WriteMode::Upsert { .. } => "upsert",
        }
    }
}

/// Parquet compression codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Uncompressed,
    Snappy,
    #[default]
    Gzip,
    Lz4,
    Zstd,
    Brotli,
}

impl Compression {
    pub fn to_parquet(self) -> ParquetCompression {
        match self {
            Compression::Uncompressed => ParquetCompression::Uncompressed,
            Compression::Snappy => ParquetCompression::Snappy,
            Compression::Gzip => ParquetCompression::Gzip(None),
            Compression::Lz4 => ParquetCompression::Lz4Raw,
            Compression::Zstd => ParquetCompression::Zstd(None),
            Compression::Brotli => ParquetCompression::Brotli(None),
        }
    }
}

impl FromStr for Compression {
    type Err = WriterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "uncompressed" | "none" => Ok(Compression::Uncompressed),
            "snappy" => Ok(Compression::Snappy),
            "gzip" => Ok(Compression::Gzip),
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd),
            "brotli" => Ok(Compression::Brotli),
            other => Err(WriterError::Config(format!(
                "Unknown compression method '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compression::Uncompressed => "uncompressed",
            Compression::Snappy => "snappy",
            Compression::Gzip => "gzip",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
            Compression::Brotli => "brotli",
        };
        f.write_str(name)
    }
}

/// Per-write options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Codec for the written files; the writer's configured default when unset
    #[serde(default)]
    pub compression: Option<Compression>,

    /// Columns the output is physically partitioned by (hive layout)
    #[serde(default)]
    pub partition_cols: Vec<String>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn with_partition_cols<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition_cols = cols.into_iter().map(Into::into).collect();
        self
    }

    /// Physical partition columns for `mode`.
    ///
    /// A partition overwrite lays the data out by its own partition columns;
    /// conflicting layout columns are a configuration error.
    pub fn layout_columns(&self, mode: &WriteMode) -> Result<Vec<String>> {
        match mode {
            WriteMode::PartitionOverwrite { partition_cols } => {
                if !self.partition_cols.is_empty() && &self.partition_cols != partition_cols {
                    return Err(WriterError::Config(format!(
                        "Partition overwrite on {:?} conflicts with layout columns {:?}",
                        partition_cols, self.partition_cols
                    )));
                }
                Ok(partition_cols.clone())
            }
            _ => Ok(self.partition_cols.clone()),
        }
    }
}
