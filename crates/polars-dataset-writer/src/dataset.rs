//! Reading and materializing parquet datasets
//!
//! A dataset is a directory of parquet part files, optionally nested in hive
//! partition directories. Partition columns are kept inside the part files,
//! so their types survive a round trip. Single-file datasets written by other
//! tools are still readable.
//!
//! Reads go through the same [`FileSystem`] as writes, so a registered bucket
//! or a custom endpoint sees both.

use std::io::Cursor;

use polars::prelude::*;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::mode::Compression;
use crate::partition::{hive_values, keys_from_frame, require_columns};
use crate::storage::{join, FileSystem};

/// Whether a directory entry is bookkeeping (`_SUCCESS`, `.crc`, ...) rather
/// than data
fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

/// Every data file of the dataset at `path`, sorted.
///
/// A plain file is its own only part; a missing path has none.
pub fn part_files(fs: &FileSystem, path: &str) -> Result<Vec<String>> {
    if !fs.is_dir(path)? {
        return Ok(if fs.exists(path)? {
            vec![path.to_string()]
        } else {
            Vec::new()
        });
    }

    let mut files = Vec::new();
    let mut pending = vec![path.to_string()];
    while let Some(dir) = pending.pop() {
        for name in fs.list_dir(&dir)? {
            if is_hidden(&name) {
                continue;
            }
            let child = join(&dir, &name);
            if fs.is_dir(&child)? {
                pending.push(child);
            } else {
                files.push(child);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Read one part file of the dataset rooted at `base`.
///
/// Hive columns from the path are added as strings, but only when the file
/// does not carry the column itself.
fn read_part(fs: &FileSystem, base: &str, file: &str) -> Result<DataFrame> {
    let bytes = fs.read_file(file)?;
    let mut df = ParquetReader::new(Cursor::new(bytes)).finish()?;

    let height = df.height();
    for (name, value) in hive_values(base, file) {
        if df.column(&name).is_ok() {
            continue;
        }
        df.with_column(Series::new(name.into(), vec![value.as_deref(); height]))?;
    }
    Ok(df)
}

/// Union by name, casting to common supertypes and null-filling gaps
pub fn concat_relaxed(frames: Vec<LazyFrame>) -> Result<LazyFrame> {
    Ok(concat_lf_diagonal(
        frames,
        UnionArgs {
            to_supertypes: true,
            ..Default::default()
        },
    )?)
}

/// Read the dataset at `path`.
///
/// Part files are read eagerly and unioned by name, so files written before
/// a column was added still line up. A path without any part files is
/// [`PolarsError::NoData`].
pub fn scan(fs: &FileSystem, path: &str) -> Result<LazyFrame> {
    let files = part_files(fs, path)?;
    if files.is_empty() {
        return Err(PolarsError::NoData(format!("no parquet files at '{path}'").into()).into());
    }

    debug!(path, files = files.len(), "Reading parquet dataset");
    let frames = files
        .iter()
        .map(|file| Ok(read_part(fs, path, file)?.lazy()))
        .collect::<Result<Vec<_>>>()?;
    concat_relaxed(frames)
}

/// Outcome of a materialization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Materialized {
    pub rows: usize,
    pub files: Vec<String>,
}

fn part_file_name() -> String {
    format!("part-{}.parquet", Uuid::new_v4())
}

fn write_parquet_file(
    fs: &FileSystem,
    df: &mut DataFrame,
    path: &str,
    compression: Compression,
) -> Result<()> {
    let mut buffer = Vec::new();
    ParquetWriter::new(&mut buffer)
        .with_compression(compression.to_parquet())
        .finish(df)?;

    debug!(path, rows = df.height(), bytes = buffer.len(), "Writing part file");
    fs.write_file(path, buffer)
}

/// Write `df` below `path`, one part file per partition.
///
/// Without partition columns a single part file lands directly in `path`.
/// With them, each distinct value combination gets its own hive directory,
/// named with the same rendering used to remove partitions later.
pub fn materialize(
    fs: &FileSystem,
    mut df: DataFrame,
    path: &str,
    compression: Compression,
    partition_cols: &[String],
) -> Result<Materialized> {
    let rows = df.height();

    if partition_cols.is_empty() {
        let file = join(path, &part_file_name());
        write_parquet_file(fs, &mut df, &file, compression)?;
        return Ok(Materialized {
            rows,
            files: vec![file],
        });
    }

    require_columns(&df, partition_cols, "Partition")?;

    let mut files = Vec::new();
    for mut group in df.partition_by_stable(partition_cols.iter().map(String::as_str), true)? {
        let key = keys_from_frame(&group.head(Some(1)), partition_cols)?
            .into_iter()
            .next();
        let Some(key) = key else {
            continue;
        };

        let file = join(&key.path(path), &part_file_name());
        write_parquet_file(fs, &mut group, &file, compression)?;
        files.push(file);
    }

    Ok(Materialized { rows, files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WriterConfig;
    use crate::error::WriterError;
    use tempfile::TempDir;

    fn sample() -> DataFrame {
        DataFrame::new(vec![
            Series::new("id".into(), vec![1i64, 2, 3]).into(),
            Series::new("region".into(), vec!["US", "EU", "US"]).into(),
        ])
        .unwrap()
    }

    fn column_names(df: &DataFrame) -> Vec<&str> {
        df.get_column_names().into_iter().map(|n| n.as_str()).collect()
    }

    fn parquet_bytes(mut df: DataFrame) -> Vec<u8> {
        let mut buffer = Vec::new();
        ParquetWriter::new(&mut buffer).finish(&mut df).unwrap();
        buffer
    }

    #[test]
    fn test_materialize_unpartitioned() {
        let dir = TempDir::new().unwrap();
        let fs = FileSystem::new(WriterConfig::new());
        let path = dir.path().join("ds");
        let path = path.to_str().unwrap();

        let out = materialize(&fs, sample(), path, Compression::Snappy, &[]).unwrap();
        assert_eq!(out.rows, 3);
        assert_eq!(out.files.len(), 1);
        assert!(out.files[0].starts_with(&format!("{path}/part-")));

        let back = scan(&fs, path).unwrap().collect().unwrap();
        assert_eq!(back.height(), 3);
    }

    #[test]
    fn test_materialize_partitioned_layout() {
        let dir = TempDir::new().unwrap();
        let fs = FileSystem::new(WriterConfig::new());
        let path = dir.path().join("ds");
        let path = path.to_str().unwrap();

        let out = materialize(
            &fs,
            sample(),
            path,
            Compression::Gzip,
            &["region".to_string()],
        )
        .unwrap();
        assert_eq!(out.files.len(), 2);
        assert_eq!(fs.list_dir(path).unwrap(), vec!["region=EU", "region=US"]);

        let us_file = out
            .files
            .iter()
            .find(|f| f.contains("/region=US/"))
            .unwrap();
        let bytes = fs.read_file(us_file).unwrap();
        let us = ParquetReader::new(Cursor::new(bytes)).finish().unwrap();
        assert_eq!(us.height(), 2);
        assert_eq!(column_names(&us), vec!["id", "region"]);

        let all = scan(&fs, path)
            .unwrap()
            .sort(["id"], Default::default())
            .collect()
            .unwrap();
        assert_eq!(all.height(), 3);
        assert_eq!(column_names(&all), vec!["id", "region"]);
        let regions = all
            .column("region")
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .clone();
        assert_eq!(regions.get(1), Some("EU"));
    }

    #[test]
    fn test_partition_values_keep_file_types() {
        let dir = TempDir::new().unwrap();
        let fs = FileSystem::new(WriterConfig::new());
        let path = dir.path().join("ds");
        let path = path.to_str().unwrap();

        let df = DataFrame::new(vec![
            Series::new("id".into(), vec![1i64, 2]).into(),
            Series::new("region".into(), vec!["01", "02"]).into(),
        ])
        .unwrap();
        materialize(&fs, df, path, Compression::Snappy, &["region".to_string()]).unwrap();

        let back = scan(&fs, path)
            .unwrap()
            .sort(["id"], Default::default())
            .collect()
            .unwrap();
        let regions = back.column("region").unwrap();
        assert_eq!(regions.dtype(), &DataType::String);
        assert_eq!(regions.as_materialized_series().str().unwrap().get(0), Some("01"));
    }

    #[test]
    fn test_hive_values_fill_columns_missing_from_files() {
        let dir = TempDir::new().unwrap();
        let fs = FileSystem::new(WriterConfig::new());
        let path = dir.path().join("ds");
        let path = path.to_str().unwrap();

        let data = DataFrame::new(vec![Series::new("id".into(), vec![1i64, 2]).into()]).unwrap();
        fs.write_file(&format!("{path}/region=007/part-0.parquet"), parquet_bytes(data))
            .unwrap();
        fs.write_file(&format!("{path}/_SUCCESS"), Vec::new()).unwrap();

        assert_eq!(part_files(&fs, path).unwrap().len(), 1);

        let back = scan(&fs, path).unwrap().collect().unwrap();
        let regions = back.column("region").unwrap().as_materialized_series().clone();
        assert_eq!(regions.dtype(), &DataType::String);
        assert_eq!(regions.str().unwrap().get(1), Some("007"));
    }

    #[test]
    fn test_empty_directory_has_no_data() {
        let dir = TempDir::new().unwrap();
        let fs = FileSystem::new(WriterConfig::new());
        let path = dir.path().to_str().unwrap();

        assert!(matches!(
            scan(&fs, path),
            Err(WriterError::Polars(PolarsError::NoData(_)))
        ));
        assert!(part_files(&fs, &format!("{path}/missing")).unwrap().is_empty());
    }

    #[test]
    fn test_single_file_is_its_own_part() {
        let dir = TempDir::new().unwrap();
        let fs = FileSystem::new(WriterConfig::new());
        let file = dir.path().join("one.parquet");
        let file = file.to_str().unwrap();

        fs.write_file(file, parquet_bytes(sample())).unwrap();
        assert_eq!(part_files(&fs, file).unwrap(), vec![file.to_string()]);
        assert_eq!(scan(&fs, file).unwrap().collect().unwrap().height(), 3);
    }
}
