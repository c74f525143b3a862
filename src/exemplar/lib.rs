//! # Exemplar Architecture
//!
//! Exemplar composes randomized instances of record types for
//! property-based testing. A record type declares, per attribute, where its
//! value comes from (an explicit generator, a generator inferred from a
//! type annotation, a manual-draw callback, or a fixed default), plus
//! post-draw callbacks that can veto invalid partial combinations early.
//! The engine's job is orchestration, not sampling: it resolves the
//! inherited attribute schema into one deterministic draw order and drives
//! passes against opaque generators through a pluggable sampler.
//!
//! ## The Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  API Facade (api.rs)                                        │
//! │  - instances() / schema_of(): resolve + wire a constructor  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Declarations (decl.rs)                                     │
//! │  - RecordType builder: attributes, parents, bindings        │
//! │  - Eagerly validated, schema cached per type                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Resolution (schema.rs + dispatch.rs)                       │
//! │  - Linearize ancestry, merge with override-by-name          │
//! │  - Validate bindings, precompute post-draw triggers         │
//! │  - Infer missing generators via the host collaborator       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Draw Engine (engine.rs + partial.rs)                       │
//! │  - One pass per sample, strictly in schema order            │
//! │  - Per-pass PartialInstance, read-only to callbacks         │
//! │  - Rejection aborts the pass; errors carry origin context   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Sampling Seam (sampler.rs)                                 │
//! │  - Generator / Sampler / InferGenerator traits              │
//! │  - RandomSampler (rand-backed, seedable) for production     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Principle: Orchestrate, Don't Sample
//!
//! From the engine's point of view generators are opaque and the sampler is
//! a capability handed in per pass. The crate makes no promises about value
//! distributions beyond what the generators provide, performs no retries on
//! its own (rejection is reported to the caller as "no instance this
//! attempt"), and never blocks on I/O.
//!
//! ## Ordering Contract
//!
//! Attribute-by-attribute sequencing is part of the contract, not an
//! implementation detail. Ancestor-declared attributes are always drawn
//! before descendant-introduced ones, a redeclared attribute keeps its
//! ancestor's position, and manual-draw callbacks may depend on every
//! previously drawn attribute through the partial state. Independent draw
//! passes may run concurrently, since the resolved schema and dispatch
//! tables are immutable and shared read-only, but no parallelism exists
//! inside a pass.
//!
//! ## Module Overview
//!
//! - [`api`]: thin facade, the entry points for hosts
//! - [`decl`]: record-type declaration tables and builder
//! - [`schema`]: schema resolver and introspection surface
//! - [`dispatch`]: attribute-to-callback dispatch tables
//! - [`engine`]: the draw engine and the `Instances` strategy
//! - [`partial`]: per-pass partial state and constructor arguments
//! - [`sampler`]: generator/sampler/inference seams
//! - [`error`]: error types, including the rejection signal

pub mod api;
pub mod decl;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod partial;
pub mod sampler;
pub mod schema;

pub use api::{instances, schema_of};
pub use decl::{AttrDecl, AttrKind, ManualDrawFn, PostDrawFn, RecordType, RecordTypeBuilder};
pub use dispatch::{DispatchTable, ManualDrawBinding, PostDrawBinding};
pub use engine::{ConstructFn, Instances};
pub use error::{
    BoxError, DrawError, DrawResult, Rejection, SchemaError, SchemaResult,
};
pub use partial::{DrawnValues, PartialInstance};
pub use sampler::{
    from_fn, DynGenerator, FnGenerator, Generator, InferError, InferGenerator, NoInference,
    RandomSampler, Sampler,
};
pub use schema::{AttributeSpec, Schema};
