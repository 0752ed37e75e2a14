//! Schema handling for writes: sanitization of empty nested types and
//! reconciliation of incoming data with an existing dataset

pub mod reconcile;
pub mod sanitize;

pub use reconcile::{frame_schema, reconcile, schemas_equal, Reconciled};
pub use sanitize::{sanitize, sanitize_dtype, sanitize_schema, SanitizedSchema};
