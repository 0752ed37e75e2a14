//! Alignment of incoming data to an existing dataset schema

use polars::prelude::*;
use tracing::{debug, info};

/// Incoming data after an attempt to align it with the existing schema
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub table: DataFrame,
    /// True when `table` now has exactly the existing schema
    pub matches: bool,
}

/// Schema of `df`, in column order
pub fn frame_schema(df: &DataFrame) -> Schema {
    df.get_columns()
        .iter()
        .map(|c| (c.name().clone(), c.dtype().clone()))
        .collect()
}

/// Order-sensitive schema equality (name and type, position by position)
pub fn schemas_equal(left: &Schema, right: &Schema) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right.iter())
            .all(|((ln, lt), (rn, rt))| ln == rn && lt == rt)
}

/// Strict-cast `incoming` to the types of `existing`.
///
/// Cast columns come out in the existing order, followed by any columns only
/// `incoming` has.
/// The cast is collected right away so value-level failures surface here.
/// A failed cast (including a column missing from `incoming`) is not an
/// error: `incoming` comes back unchanged with `matches == false` and the
/// caller falls back to a union by name.
pub fn reconcile(existing: &Schema, incoming: DataFrame) -> Reconciled {
    if schemas_equal(existing, &frame_schema(&incoming)) {
        debug!("Incoming schema matches existing data");
        return Reconciled {
            table: incoming,
            matches: true,
        };
    }

    let extras = incoming
        .get_column_names()
        .into_iter()
        .filter(|name| !existing.contains(name.as_str()))
        .map(|name| col(name.clone()))
        .collect::<Vec<_>>();

    let projection = existing
        .iter()
        .map(|(name, dtype)| col(name.clone()).strict_cast(dtype.clone()))
        .chain(extras)
        .collect::<Vec<_>>();

    match incoming.clone().lazy().select(projection).collect() {
        Ok(adjusted) => {
            let matches = schemas_equal(existing, &frame_schema(&adjusted));
            info!(matches, "Adjusted incoming schema to existing data");
            Reconciled {
                table: adjusted,
                matches,
            }
        }
        Err(e) => {
            info!(error = %e, "Could not adjust incoming schema to existing data");
            Reconciled {
                table: incoming,
                matches: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(fields: &[(&str, DataType)]) -> Schema {
        fields
            .iter()
            .map(|(name, dtype)| (PlSmallStr::from(*name), dtype.clone()))
            .collect()
    }

    #[test]
    fn test_equal_schema_is_untouched() {
        let df = DataFrame::new(vec![
            Series::new("id".into(), vec![1i64, 2]).into(),
            Series::new("v".into(), vec!["a", "b"]).into(),
        ])
        .unwrap();
        let existing = schema(&[("id", DataType::Int64), ("v", DataType::String)]);

        let out = reconcile(&existing, df.clone());
        assert!(out.matches);
        assert!(out.table.equals(&df));
    }

    #[test]
    fn test_widening_cast_matches() {
        let df = DataFrame::new(vec![
            Series::new("id".into(), vec![1i32, 2]).into(),
            Series::new("v".into(), vec!["a", "b"]).into(),
        ])
        .unwrap();
        let existing = schema(&[("id", DataType::Int64), ("v", DataType::String)]);

        let out = reconcile(&existing, df);
        assert!(out.matches);
        assert_eq!(out.table.column("id").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_failed_value_cast_falls_back() {
        let df = DataFrame::new(vec![Series::new("id".into(), vec!["1", "x"]).into()]).unwrap();
        let existing = schema(&[("id", DataType::Int64)]);

        let out = reconcile(&existing, df.clone());
        assert!(!out.matches);
        assert!(out.table.equals(&df));
    }

    #[test]
    fn test_missing_column_falls_back() {
        let df = DataFrame::new(vec![Series::new("id".into(), vec![1i64]).into()]).unwrap();
        let existing = schema(&[("id", DataType::Int64), ("v", DataType::String)]);

        let out = reconcile(&existing, df.clone());
        assert!(!out.matches);
        assert!(out.table.equals(&df));
    }

    #[test]
    fn test_extra_incoming_column_does_not_match() {
        let df = DataFrame::new(vec![
            Series::new("id".into(), vec![1i64]).into(),
            Series::new("extra".into(), vec![true]).into(),
        ])
        .unwrap();
        let existing = schema(&[("id", DataType::Int64)]);

        let out = reconcile(&existing, df);
        assert!(!out.matches);
        assert_eq!(out.table.width(), 2);
    }

    #[test]
    fn test_reordered_columns_are_aligned() {
        let df = DataFrame::new(vec![
            Series::new("region".into(), vec!["US"]).into(),
            Series::new("id".into(), vec![1i64]).into(),
        ])
        .unwrap();
        let existing = schema(&[("id", DataType::Int64), ("region", DataType::String)]);

        let out = reconcile(&existing, df);
        assert!(out.matches);
        assert!(schemas_equal(&frame_schema(&out.table), &existing));
    }

    #[test]
    fn test_column_order_matters() {
        let left = schema(&[("a", DataType::Int64), ("b", DataType::Int64)]);
        let right = schema(&[("b", DataType::Int64), ("a", DataType::Int64)]);
        assert!(!schemas_equal(&left, &right));
        assert!(schemas_equal(&left, &left.clone()));
    }
}
