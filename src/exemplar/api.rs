//! # API Facade
//!
//! Thin entry points over the resolver and the engine. The facade holds no
//! logic of its own: it resolves (or fetches the cached) schema and wires it
//! to a constructor, returning structured `Result` types. Hosts that need
//! finer control call [`RecordType::schema`] and [`Instances::new`]
//! directly.

use std::sync::Arc;

use crate::decl::RecordType;
use crate::engine::Instances;
use crate::error::{DrawResult, SchemaResult};
use crate::partial::DrawnValues;
use crate::sampler::InferGenerator;
use crate::schema::Schema;

/// Resolve a record type's schema, for introspection.
///
/// The ordered drawn-attribute list and per-attribute queries are O(1)
/// reads on the returned schema; repeated calls return the cached `Arc`.
pub fn schema_of<V: Clone + 'static>(
    ty: &RecordType<V>,
    infer: &dyn InferGenerator<V>,
) -> SchemaResult<Arc<Schema<V>>> {
    ty.schema(infer)
}

/// Build a strategy producing instances of `T` from a record type.
///
/// Resolution failures surface here, before any draw begins.
pub fn instances<V, T>(
    ty: &RecordType<V>,
    infer: &dyn InferGenerator<V>,
    construct: impl Fn(&mut DrawnValues<V>) -> DrawResult<T> + Send + Sync + 'static,
) -> SchemaResult<Instances<V, T>>
where
    V: Clone + 'static,
{
    Ok(Instances::new(ty.schema(infer)?, construct))
}
