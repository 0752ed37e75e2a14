//! Removal of empty nested types
//!
//! Parquet cannot store a struct without fields. Such structs (and lists or
//! arrays whose element type ends up empty) are stripped bottom-up before a
//! frame is written.

use polars::prelude::*;
use tracing::info;

use crate::error::Result;

/// Sanitized form of `dtype`, or `None` when nothing usable is left.
///
/// - primitives are kept as-is
/// - `List` / `Array` are empty when their element type is empty
/// - `Struct` keeps its non-empty fields in order and is empty when none survive
pub fn sanitize_dtype(dtype: &DataType) -> Option<DataType> {
    match dtype {
        DataType::List(inner) => {
            sanitize_dtype(inner).map(|inner| DataType::List(Box::new(inner)))
        }
        DataType::Array(inner, width) => {
            sanitize_dtype(inner).map(|inner| DataType::Array(Box::new(inner), *width))
        }
        DataType::Struct(fields) => {
            let kept = fields
                .iter()
                .filter_map(|field| {
                    sanitize_dtype(field.dtype()).map(|dtype| Field::new(field.name().clone(), dtype))
                })
                .collect::<Vec<_>>();

            if kept.is_empty() {
                None
            } else {
                Some(DataType::Struct(kept))
            }
        }
        other => Some(other.clone()),
    }
}

/// Result of sanitizing a schema
#[derive(Debug, Clone)]
pub struct SanitizedSchema {
    pub schema: Schema,
    /// Columns removed because their whole type was empty
    pub dropped: Vec<String>,
    /// Columns kept with a reduced type
    pub recast: Vec<String>,
}

impl SanitizedSchema {
    pub fn is_noop(&self) -> bool {
        self.dropped.is_empty() && self.recast.is_empty()
    }
}

pub fn sanitize_schema(schema: &Schema) -> SanitizedSchema {
    let mut kept = Vec::with_capacity(schema.len());
    let mut dropped = Vec::new();
    let mut recast = Vec::new();

    for (name, dtype) in schema.iter() {
        match sanitize_dtype(dtype) {
            None => dropped.push(name.to_string()),
            Some(sanitized) => {
                if &sanitized != dtype {
                    recast.push(name.to_string());
                }
                kept.push((name.clone(), sanitized));
            }
        }
    }

    SanitizedSchema {
        schema: kept.into_iter().collect(),
        dropped,
        recast,
    }
}

/// Rebuild `expr` (typed `source`) into the reduced type `target`.
///
/// Structs are rebuilt field by field so that dropped fields are selected
/// away rather than relying on a struct-to-struct cast.
fn rebuild(expr: Expr, source: &DataType, target: &DataType) -> Expr {
    match (source, target) {
        (DataType::Struct(source_fields), DataType::Struct(target_fields)) => {
            let fields = target_fields
                .iter()
                .map(|target_field| {
                    let name = target_field.name();
                    let child = expr.clone().struct_().field_by_name(name.as_str());
                    let child = match source_fields.iter().find(|f| f.name() == name) {
                        Some(source_field) if source_field.dtype() != target_field.dtype() => {
                            rebuild(child, source_field.dtype(), target_field.dtype())
                        }
                        _ => child,
                    };
                    child.alias(name.clone())
                })
                .collect::<Vec<_>>();
            as_struct(fields)
        }
        _ => expr.cast(target.clone()),
    }
}

/// Drop empty columns from `frame` and recast the ones whose type shrank.
///
/// Returns the frame unchanged when the schema is already clean, which makes
/// repeated application a no-op.
pub fn sanitize(mut frame: LazyFrame) -> Result<(SanitizedSchema, LazyFrame)> {
    let schema = frame.collect_schema()?;
    let plan = sanitize_schema(&schema);
    if plan.is_noop() {
        return Ok((plan, frame));
    }

    info!(
        dropped = ?plan.dropped,
        recast = ?plan.recast,
        "Removing empty struct fields"
    );

    let exprs = plan
        .schema
        .iter()
        .map(|(name, target)| {
            let column = col(name.clone());
            match schema.get(name) {
                Some(source) if source != target => {
                    rebuild(column, source, target).alias(name.clone())
                }
                _ => column,
            }
        })
        .collect::<Vec<_>>();

    Ok((plan, frame.select(exprs)))
}
