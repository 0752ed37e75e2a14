//! Hive-style partition paths
//!
//! A partition is a directory per partition column, nested in column order:
//! `base/region=US/day=2024-01-01`. Values are rendered as strings, nulls as
//! [`HIVE_DEFAULT_PARTITION`], and path-hostile characters are
//! percent-encoded.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use polars::prelude::*;

use crate::error::{Result, WriterError};
use crate::storage::join;

/// Directory name used for null partition values
pub const HIVE_DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'\\')
    .add(b'%')
    .add(b'=')
    .add(b':')
    .add(b'?')
    .add(b'#')
    .add(b'"')
    .add(b'*')
    .add(b'<')
    .add(b'>')
    .add(b'|');

/// Render a partition value as a single path segment
pub fn encode_value(value: Option<&str>) -> String {
    match value {
        Some(value) => utf8_percent_encode(value, PATH_SEGMENT).to_string(),
        None => HIVE_DEFAULT_PARTITION.to_string(),
    }
}

/// Inverse of [`encode_value`]
pub fn decode_value(segment: &str) -> Option<String> {
    if segment == HIVE_DEFAULT_PARTITION {
        None
    } else {
        Some(percent_decode_str(segment).decode_utf8_lossy().into_owned())
    }
}

/// `(column, value)` pairs of the `col=value` directories between `base` and
/// `file`, outermost first
pub fn hive_values(base: &str, file: &str) -> Vec<(String, Option<String>)> {
    let relative = file
        .strip_prefix(base.trim_end_matches('/'))
        .unwrap_or("")
        .trim_start_matches('/');

    let mut segments = relative.split('/').collect::<Vec<_>>();
    // last segment is the file itself
    segments.pop();

    segments
        .into_iter()
        .filter_map(|segment| segment.split_once('='))
        .map(|(column, value)| (column.to_string(), decode_value(value)))
        .collect()
}

/// `base/col1=v1/col2=v2/...`, in column order.
///
/// Values are used verbatim; encode them with [`encode_value`] first when
/// they come from data.
pub fn resolve_partition_path<S: AsRef<str>>(
    base: &str,
    partition_cols: &[String],
    values: &[S],
) -> String {
    let relative = partition_cols
        .iter()
        .zip(values)
        .map(|(col, value)| format!("{}={}", col, value.as_ref()))
        .collect::<Vec<_>>()
        .join("/");

    if relative.is_empty() {
        base.to_string()
    } else {
        join(base, &relative)
    }
}

/// One distinct combination of partition values, already encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    columns: Vec<String>,
    values: Vec<String>,
}

impl PartitionKey {
    pub fn new(columns: Vec<String>, values: Vec<String>) -> Result<Self> {
        if columns.len() != values.len() {
            return Err(WriterError::Config(format!(
                "Partition key has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Directory of this partition below `base`
    pub fn path(&self, base: &str) -> String {
        resolve_partition_path(base, &self.columns, &self.values)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| format!("{c}={v}"))
            .collect::<Vec<_>>();
        f.write_str(&parts.join("/"))
    }
}

/// Fail with a configuration error when `df` lacks any of `cols`
pub fn require_columns(df: &DataFrame, cols: &[String], role: &str) -> Result<()> {
    for name in cols {
        if df.column(name).is_err() {
            return Err(WriterError::Config(format!(
                "{role} column '{name}' is not in the data"
            )));
        }
    }
    Ok(())
}

/// Distinct partition value combinations of `df`, in first-seen order
pub fn affected_partitions(df: &DataFrame, partition_cols: &[String]) -> Result<DataFrame> {
    require_columns(df, partition_cols, "Partition")?;

    let selection = partition_cols.iter().map(|c| col(c.as_str())).collect::<Vec<_>>();
    Ok(df
        .clone()
        .lazy()
        .select(selection)
        .unique_stable(None, UniqueKeepStrategy::Any)
        .collect()?)
}

/// Partition keys for every row of `partitions` (one row per key)
pub fn keys_from_frame(partitions: &DataFrame, partition_cols: &[String]) -> Result<Vec<PartitionKey>> {
    let rendered = partitions
        .clone()
        .lazy()
        .select(
            partition_cols
                .iter()
                .map(|c| col(c.as_str()).cast(DataType::String))
                .collect::<Vec<_>>(),
        )
        .collect()?;

    let columns = partition_cols
        .iter()
        .map(|c| Ok(rendered.column(c)?.as_materialized_series().str()?.clone()))
        .collect::<Result<Vec<StringChunked>>>()?;

    (0..rendered.height())
        .map(|row| {
            let values = columns
                .iter()
                .map(|values| encode_value(values.get(row)))
                .collect();
            PartitionKey::new(partition_cols.to_vec(), values)
        })
        .collect()
}

/// Distinct partition keys of `df`, in first-seen order
pub fn partition_keys(df: &DataFrame, partition_cols: &[String]) -> Result<Vec<PartitionKey>> {
    keys_from_frame(&affected_partitions(df, partition_cols)?, partition_cols)
}
