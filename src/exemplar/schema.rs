//! # Schema Resolver
//!
//! Turns a [`RecordType`] declaration graph into a [`Schema`]: one flat,
//! ordered table of attributes plus the callback dispatch table, resolved
//! deterministically and idempotently.
//!
//! ## Resolution Algorithm
//!
//! 1. **Linearize** the ancestry: depth-first over the declared parent
//!    order, first visit wins (by `Arc` identity, so diamonds collapse to a
//!    single entry), the type itself last. Base types always come before the
//!    types that inherit them.
//! 2. **Merge attributes** type by type in that order, appending each type's
//!    own declarations. A redeclared name keeps the ancestor's position but
//!    takes the descendant's declaration. This is what guarantees that
//!    ancestor-declared attributes are drawn before descendant-only ones,
//!    so dependent attributes in subclasses can observe already-drawn base
//!    attributes.
//! 3. **Merge bindings** by binding name, descendant replacing ancestor
//!    wholesale, then validate them against the merged attribute table and
//!    precompute the post-draw trigger positions.
//! 4. **Infer generators** for drawable attributes that have neither an
//!    explicit generator nor a manual-draw binding.
//!
//! The resolved schema is immutable and safely shared read-only across
//! concurrent draw passes.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::decl::{AttrKind, RecordType};
use crate::dispatch::DispatchTable;
use crate::error::{SchemaError, SchemaResult};
use crate::sampler::{DynGenerator, InferGenerator};

/// How one resolved attribute obtains its value during a pass.
pub(crate) enum ValueSource<V> {
    /// Sampled from this generator (explicit or inferred).
    Sampled(DynGenerator<V>),
    /// Supplied by a manual-draw binding; no generator involved.
    ManualOnly,
    /// Fixed default; treated as already drawn at pass start.
    Default(V),
    /// Excluded from construction; never drawn, never passed.
    Excluded,
}

/// One attribute of a resolved schema.
pub struct AttributeSpec<V> {
    name: String,
    declared_in: String,
    pub(crate) source: ValueSource<V>,
}

impl<V> AttributeSpec<V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The record type that introduced this attribute or last overrode its
    /// declaration.
    pub fn declared_in(&self) -> &str {
        &self.declared_in
    }

    /// Whether a value is obtained for this attribute during a pass (by
    /// sampling or by a manual-draw binding).
    pub fn drawable(&self) -> bool {
        matches!(self.source, ValueSource::Sampled(_) | ValueSource::ManualOnly)
    }

    pub(crate) fn default_value(&self) -> Option<&V> {
        match &self.source {
            ValueSource::Default(v) => Some(v),
            _ => None,
        }
    }
}

impl<V> fmt::Debug for AttributeSpec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            ValueSource::Sampled(_) => "sampled",
            ValueSource::ManualOnly => "manual",
            ValueSource::Default(_) => "default",
            ValueSource::Excluded => "excluded",
        };
        f.debug_struct("AttributeSpec")
            .field("name", &self.name)
            .field("declared_in", &self.declared_in)
            .field("source", &source)
            .finish()
    }
}

/// A record type's resolved schema: the ordered attribute table, a
/// name-to-position index, and the callback dispatch table.
///
/// Resolution happens once per type (see [`RecordType::schema`]); every
/// introspection query afterwards is O(1).
pub struct Schema<V> {
    record: String,
    specs: Vec<AttributeSpec<V>>,
    index: HashMap<String, usize>,
    drawn: Vec<usize>,
    dispatch: DispatchTable<V>,
}

impl<V> fmt::Debug for Schema<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("record", &self.record)
            .field("specs", &self.specs)
            .finish()
    }
}

impl<V: Clone + 'static> Schema<V> {
    /// Resolve a record type's schema. Deterministic: resolving the same
    /// type twice yields a structurally identical schema.
    pub fn resolve(
        ty: &RecordType<V>,
        infer: &dyn InferGenerator<V>,
    ) -> SchemaResult<Schema<V>> {
        let chain = ancestry(ty);

        // Merge attribute declarations, replace-in-place on redeclaration.
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut merged: Vec<(String, String, AttrKind<V>)> = Vec::new();
        for t in &chain {
            for decl in t.attr_decls() {
                let entry = (
                    decl.name().to_string(),
                    t.name().to_string(),
                    decl.kind().clone(),
                );
                match index.get(decl.name()) {
                    Some(&at) => merged[at] = entry,
                    None => {
                        index.insert(decl.name().to_string(), merged.len());
                        merged.push(entry);
                    }
                }
            }
        }

        let dispatch = DispatchTable::build(&chain, &index, &merged)?;

        // Resolve value sources; inference runs last so binding validation
        // errors win over inference failures.
        let mut specs = Vec::with_capacity(merged.len());
        let mut drawn = Vec::new();
        for (at, (name, declared_in, kind)) in merged.into_iter().enumerate() {
            let source = match kind {
                AttrKind::Explicit(generator) => ValueSource::Sampled(generator),
                AttrKind::Inferred { annotation } => {
                    if dispatch.manual_draw_for(at).is_some() {
                        ValueSource::ManualOnly
                    } else {
                        let generator = infer.infer(&annotation).map_err(|source| {
                            SchemaError::Inference {
                                attribute: name.clone(),
                                source,
                            }
                        })?;
                        ValueSource::Sampled(generator)
                    }
                }
                AttrKind::Default(value) => ValueSource::Default(value),
                AttrKind::Excluded => ValueSource::Excluded,
            };
            if matches!(source, ValueSource::Sampled(_) | ValueSource::ManualOnly) {
                drawn.push(at);
            }
            specs.push(AttributeSpec {
                name,
                declared_in,
                source,
            });
        }

        debug!(
            record = ty.name(),
            attributes = specs.len(),
            drawn = drawn.len(),
            "resolved record schema"
        );

        Ok(Schema {
            record: ty.name().to_string(),
            specs,
            index,
            drawn,
            dispatch,
        })
    }
}

impl<V> Schema<V> {
    /// Name of the record type this schema was resolved for.
    pub fn record(&self) -> &str {
        &self.record
    }

    /// All resolved attributes, in draw order.
    pub fn attributes(&self) -> &[AttributeSpec<V>] {
        &self.specs
    }

    /// Number of attributes in the schema (drawable or not).
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Whether the named attribute will be drawn. O(1) after resolution.
    pub fn will_draw(&self, name: &str) -> bool {
        self.index
            .get(name)
            .map(|&at| self.specs[at].drawable())
            .unwrap_or(false)
    }

    /// Names of the attributes that will be drawn, in draw order.
    pub fn drawn_names(&self) -> impl Iterator<Item = &str> {
        self.drawn.iter().map(|&at| self.specs[at].name())
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn spec(&self, at: usize) -> &AttributeSpec<V> {
        &self.specs[at]
    }

    pub(crate) fn drawn_indices(&self) -> &[usize] {
        &self.drawn
    }

    /// The callback dispatch table resolved alongside this schema.
    pub fn dispatch(&self) -> &DispatchTable<V> {
        &self.dispatch
    }

    /// The manual-draw binding covering the named attribute, if any.
    pub fn manual_draw_for(&self, name: &str) -> Option<&crate::dispatch::ManualDrawBinding<V>> {
        self.index_of(name)
            .and_then(|at| self.dispatch.manual_draw_for(at))
    }
}

/// Ancestry chain, base-most type first, `ty` itself last. Depth-first over
/// the declared parent order; the first visit of a shared ancestor wins.
fn ancestry<V: Clone + 'static>(ty: &RecordType<V>) -> Vec<&RecordType<V>> {
    fn visit<'a, V: Clone + 'static>(
        ty: &'a RecordType<V>,
        seen: &mut Vec<*const ()>,
        out: &mut Vec<&'a RecordType<V>>,
    ) {
        let id = ty as *const RecordType<V> as *const ();
        if seen.contains(&id) {
            return;
        }
        seen.push(id);
        for parent in ty.parents() {
            visit(parent, seen, out);
        }
        out.push(ty);
    }

    let mut seen = Vec::new();
    let mut out = Vec::new();
    visit(ty, &mut seen, &mut out);
    out
}
