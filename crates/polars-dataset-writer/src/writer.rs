//! Write reconciliation engine
//!
//! [`DatasetWriter::write`] merges an incoming frame into the dataset at a
//! path according to a [`WriteMode`]:
//!
//! 1. read the existing dataset (an unreadable one is removed and ignored)
//! 2. align the incoming schema with it
//! 3. compute the final table for the mode, reading everything it needs from
//!    the existing data before deleting anything
//! 4. strip empty nested types and write the part files
//!
//! Nothing is rolled back when a step after a deletion fails.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::WriterConfig;
use crate::dataset::{self, concat_relaxed, Materialized};
use crate::error::{Result, WriterError};
use crate::mode::{WriteMode, WriteOptions};
use crate::partition::{affected_partitions, keys_from_frame, require_columns, PartitionKey};
use crate::schema::{reconcile, sanitize, Reconciled};
use crate::storage::FileSystem;

/// How the final table was derived from incoming and existing data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// No readable data existed at the path
    Fresh,
    /// Existing dataset deleted, incoming data written
    Overwrite,
    /// Part files added next to the existing ones
    Append,
    /// Affected partitions deleted and rewritten from incoming data
    PartitionReplace,
    /// Whole dataset read, merged with incoming data, deleted and rewritten
    DatasetRewrite,
    /// Upsert confined to the affected partitions
    PartitionUpsert,
    /// Upsert across the whole dataset
    DatasetUpsert,
}

/// What a write did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub path: String,
    pub mode: &'static str,
    pub strategy: MergeStrategy,
    /// Whether readable data existed before the write
    pub had_existing_data: bool,
    /// Whether the incoming schema could be aligned with the existing one;
    /// `None` when there was no existing data
    pub schema_matched: Option<bool>,
    pub partitions_removed: usize,
    pub rows_written: usize,
    pub files_written: Vec<String>,
    /// Columns removed because their type was empty
    pub dropped_columns: Vec<String>,
}

impl WriteSummary {
    fn new(path: &str, mode: &WriteMode) -> Self {
        Self {
            path: path.to_string(),
            mode: mode.name(),
            strategy: MergeStrategy::Fresh,
            had_existing_data: false,
            schema_matched: None,
            partitions_removed: 0,
            rows_written: 0,
            files_written: Vec::new(),
            dropped_columns: Vec::new(),
        }
    }
}

/// Readable dataset found at the target path
struct Existing {
    schema: Schema,
    frame: LazyFrame,
    /// A single parquet file rather than a directory of part files
    is_file: bool,
}

fn key_exprs(cols: &[String]) -> Vec<Expr> {
    cols.iter().map(|c| col(c.as_str())).collect()
}

/// Errors that mean the bytes at a path are not a dataset we can read.
///
/// Transport failures surface as `Io`/`ObjectStore` errors before parquet
/// decoding starts, so they never land here.
fn is_unreadable(err: &PolarsError) -> bool {
    matches!(
        err,
        PolarsError::ComputeError(_)
            | PolarsError::SchemaMismatch(_)
            | PolarsError::ShapeMismatch(_)
    )
}

fn is_no_data(err: &PolarsError) -> bool {
    matches!(err, PolarsError::NoData(_))
}

/// Reconciles incoming frames with parquet datasets on local disk or S3
pub struct DatasetWriter {
    config: WriterConfig,
    fs: FileSystem,
}

impl DatasetWriter {
    pub fn new(config: WriterConfig) -> Self {
        let fs = FileSystem::new(config.clone());
        Self { config, fs }
    }

    pub fn from_env() -> Self {
        Self::new(WriterConfig::from_env())
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Storage used for every path this writer touches
    pub fn file_system(&self) -> &FileSystem {
        &self.fs
    }

    /// Read the dataset at `path` through this writer's storage (hive-aware,
    /// tolerant of missing columns across part files)
    pub fn scan(&self, path: &str) -> Result<LazyFrame> {
        dataset::scan(&self.fs, path)
    }

    pub fn read(&self, path: &str) -> Result<DataFrame> {
        Ok(self.scan(path)?.collect()?)
    }

    /// Collect `frame` and [`write`](Self::write) it
    pub fn write_lazy(
        &self,
        frame: LazyFrame,
        path: &str,
        mode: WriteMode,
        options: &WriteOptions,
    ) -> Result<WriteSummary> {
        self.write(frame.collect()?, path, mode, options)
    }

    /// Merge `incoming` into the dataset at `path`.
    ///
    /// Argument problems are reported as [`WriterError::Config`] before any
    /// storage is touched.
    pub fn write(
        &self,
        incoming: DataFrame,
        path: &str,
        mode: WriteMode,
        options: &WriteOptions,
    ) -> Result<WriteSummary> {
        mode.validate()?;
        let layout_cols = options.layout_columns(&mode)?;
        let compression = options
            .compression
            .unwrap_or(self.config.default_compression);

        require_columns(&incoming, &layout_cols, "Partition")?;
        if let WriteMode::Upsert { key_cols } = &mode {
            require_columns(&incoming, key_cols, "Upsert key")?;
        }

        info!(
            path,
            mode = mode.name(),
            rows = incoming.height(),
            partition_cols = ?layout_cols,
            %compression,
            "Attempting to write to parquet"
        );

        let mut summary = WriteSummary::new(path, &mode);
        let existing = self.load_existing(path)?;
        self.ensure_parent(path)?;

        let final_table = match existing {
            None => {
                debug!(path, "No existing data");
                incoming.lazy()
            }
            Some(existing) => {
                info!(path, single_file = existing.is_file, "Have existing data");
                let Reconciled { table, matches } = reconcile(&existing.schema, incoming);
                summary.had_existing_data = true;
                summary.schema_matched = Some(matches);
                self.merge(path, &mode, &layout_cols, table, matches, &existing, &mut summary)?
            }
        };

        let (plan, sanitized) = sanitize(final_table)?;
        summary.dropped_columns = plan.dropped;
        let table = sanitized.collect()?;

        info!(path, rows = table.height(), "Performing write operations");
        let Materialized { rows, files } =
            dataset::materialize(&self.fs, table, path, compression, &layout_cols)?;
        summary.rows_written = rows;
        summary.files_written = files;

        info!(
            path,
            strategy = ?summary.strategy,
            rows = summary.rows_written,
            files = summary.files_written.len(),
            "Finished writing to parquet"
        );
        Ok(summary)
    }

    /// Final table for `mode` given readable existing data
    #[allow(clippy::too_many_arguments)]
    fn merge(
        &self,
        path: &str,
        mode: &WriteMode,
        layout_cols: &[String],
        incoming: DataFrame,
        matches: bool,
        existing: &Existing,
        summary: &mut WriteSummary,
    ) -> Result<LazyFrame> {
        match mode {
            WriteMode::FullOverwrite => {
                info!(path, "Overwrite mode set to full, removing existing data");
                self.fs.remove_dir_all(path)?;
                summary.strategy = MergeStrategy::Overwrite;
                Ok(incoming.lazy())
            }

            WriteMode::PartitionOverwrite { partition_cols } => {
                let affected = affected_partitions(&incoming, partition_cols)?;
                let keys = keys_from_frame(&affected, partition_cols)?;
                info!(path, partitions = keys.len(), "Overwrite mode set to partition");

                if existing.is_file {
                    // No partition directories to drop: filter the rows instead
                    let remaining = existing.frame.clone().join(
                        affected.lazy(),
                        key_exprs(partition_cols),
                        key_exprs(partition_cols),
                        JoinArgs::new(JoinType::Anti),
                    );
                    let merged = concat_relaxed(vec![incoming.lazy(), remaining])?.collect()?;
                    self.fs.remove_dir_all(path)?;
                    summary.strategy = MergeStrategy::DatasetRewrite;
                    return Ok(merged.lazy());
                }

                summary.partitions_removed = self.remove_partitions(path, &keys)?;

                if matches {
                    summary.strategy = MergeStrategy::PartitionReplace;
                    return Ok(incoming.lazy());
                }

                info!(path, "Schemas do not match, rewriting whole dataset");
                let mut frames = vec![incoming.lazy()];
                frames.extend(self.rescan(path)?);
                let merged = concat_relaxed(frames)?.collect()?;
                self.fs.remove_dir_all(path)?;
                summary.strategy = MergeStrategy::DatasetRewrite;
                Ok(merged.lazy())
            }

            WriteMode::Upsert { key_cols } => {
                let existing_rows = existing.frame.clone();

                if !layout_cols.is_empty() && matches && !existing.is_file {
                    info!(path, key = ?key_cols, "Upserting affected partitions only");
                    let affected = affected_partitions(&incoming, layout_cols)?;
                    let keys = keys_from_frame(&affected, layout_cols)?;

                    let survivors = existing_rows
                        .join(
                            affected.lazy(),
                            key_exprs(layout_cols),
                            key_exprs(layout_cols),
                            JoinArgs::new(JoinType::Inner),
                        )
                        .join(
                            incoming.clone().lazy(),
                            key_exprs(key_cols),
                            key_exprs(key_cols),
                            JoinArgs::new(JoinType::Anti),
                        )
                        .collect()?;

                    summary.partitions_removed = self.remove_partitions(path, &keys)?;
                    summary.strategy = MergeStrategy::PartitionUpsert;
                    return concat_relaxed(vec![incoming.lazy(), survivors.lazy()]);
                }

                info!(path, key = ?key_cols, "Upserting whole dataset");
                let survivors = existing_rows.join(
                    incoming.clone().lazy(),
                    key_exprs(key_cols),
                    key_exprs(key_cols),
                    JoinArgs::new(JoinType::Anti),
                );
                let merged = concat_relaxed(vec![incoming.lazy(), survivors])?.collect()?;
                self.fs.remove_dir_all(path)?;
                summary.strategy = MergeStrategy::DatasetUpsert;
                Ok(merged.lazy())
            }

            WriteMode::Append => {
                if matches && !existing.is_file {
                    summary.strategy = MergeStrategy::Append;
                    return Ok(incoming.lazy());
                }

                info!(path, "Appending requires rewriting the dataset");
                let merged =
                    concat_relaxed(vec![existing.frame.clone(), incoming.lazy()])?.collect()?;
                self.fs.remove_dir_all(path)?;
                summary.strategy = MergeStrategy::DatasetRewrite;
                Ok(merged.lazy())
            }
        }
    }

    /// Scan `path` and resolve its schema
    fn read_existing(&self, path: &str) -> Result<(Schema, LazyFrame)> {
        let mut frame = self.scan(path)?;
        let schema = frame.collect_schema()?;
        Ok((schema.as_ref().clone(), frame))
    }

    /// The dataset at `path`, or `None` when there is none.
    ///
    /// A dataset whose files cannot be decoded is deleted and treated as
    /// absent. Storage errors propagate and leave the data alone.
    fn load_existing(&self, path: &str) -> Result<Option<Existing>> {
        if !self.fs.exists(path)? {
            return Ok(None);
        }
        let is_file = !self.fs.is_dir(path)?;

        match self.read_existing(path) {
            Ok((schema, frame)) => Ok(Some(Existing {
                schema,
                frame,
                is_file,
            })),
            Err(WriterError::Polars(e)) if is_no_data(&e) => {
                debug!(path, "Path holds no part files");
                Ok(None)
            }
            Err(WriterError::Polars(e)) if is_unreadable(&e) => {
                warn!(path, error = %e, "Existing dataset is unreadable, removing it");
                self.fs.remove_dir_all(path)?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Scan whatever is left at `path`; missing or unreadable means nothing
    fn rescan(&self, path: &str) -> Result<Option<LazyFrame>> {
        if !self.fs.exists(path)? {
            return Ok(None);
        }

        match self.read_existing(path) {
            Ok((_, frame)) => Ok(Some(frame)),
            Err(WriterError::Polars(e)) if is_no_data(&e) || is_unreadable(&e) => {
                debug!(path, error = %e, "No remaining data after partition removal");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn ensure_parent(&self, path: &str) -> Result<()> {
        let dir = self.fs.get_dir(path)?;
        if !self.fs.exists(&dir)? {
            debug!(dir = %dir, "Creating parent directory");
            self.fs.make_dir(&dir)?;
        }
        Ok(())
    }

    /// Delete the directories of `keys` that exist; returns how many did
    fn remove_partitions(&self, path: &str, keys: &[PartitionKey]) -> Result<usize> {
        info!(path, partitions = keys.len(), "Removing affected partitions");
        let mut removed = 0;
        for key in keys {
            let dir = key.path(path);
            if self.fs.exists(&dir)? {
                self.fs.remove_dir_all(&dir)?;
                debug!(partition = %key, "Removed partition");
                removed += 1;
            }
        }
        Ok(removed)
    }
}
