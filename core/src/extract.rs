//! Flattening of entities into plain JSON for request bodies.
//!
//! Entities reach the driver as any `Serialize` type, and serde does the
//! recursive walk: nested structs become objects, sequences become arrays,
//! and scalars pass through. Cyclic graphs cannot be expressed by owned Rust
//! values, so the walk always terminates.

use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// Convert one entity into a plain JSON value.
pub fn extract<T: Serialize + ?Sized>(entity: &T) -> ApiResult<Value> {
    serde_json::to_value(entity).map_err(|e| ApiError::Serialization(e.to_string()))
}

/// Convert a list of entities into a JSON array.
pub fn extract_all<T: Serialize>(entities: &[T]) -> ApiResult<Value> {
    entities
        .iter()
        .map(extract)
        .collect::<ApiResult<Vec<_>>>()
        .map(Value::Array)
}
