//! Definition-time declaration tables for record types.
//!
//! A [`RecordType`] is the declarative table a host builds once per record
//! type: its attributes in declaration order, its parents, and its named
//! manual-draw and post-draw bindings. The builder validates eagerly: the
//! mistakes it can see locally (duplicate names, empty binding sets) fail at
//! `build()`, before any schema is resolved and long before any draw runs.
//!
//! Declaration is separate from resolution: a `RecordType` says what the
//! host wrote down, the [`Schema`](crate::schema::Schema) says what will
//! actually be drawn after inheritance is merged.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{DrawResult, SchemaError, SchemaResult};
use crate::partial::PartialInstance;
use crate::sampler::{DynGenerator, Generator, InferGenerator, Sampler};
use crate::schema::Schema;

/// Callback that supplies the value for a manually drawn attribute.
///
/// Invoked with the sampling capability, the name of the attribute being
/// drawn, and the read-only partial state of the current pass.
pub type ManualDrawFn<V> =
    Arc<dyn Fn(&mut dyn Sampler<V>, &str, &PartialInstance<'_, V>) -> DrawResult<V> + Send + Sync>;

/// Callback fired once a fixed set of attributes has been drawn.
///
/// Invoked with the covering attribute-name set and the partial state.
/// Typically used to reject invalid partial combinations early.
pub type PostDrawFn<V> =
    Arc<dyn Fn(&BTreeSet<String>, &PartialInstance<'_, V>) -> DrawResult<()> + Send + Sync>;

/// How one declared attribute obtains its value.
#[derive(Clone)]
pub enum AttrKind<V> {
    /// Drawn from this explicit generator.
    Explicit(DynGenerator<V>),
    /// Drawn from a generator inferred from the annotation at resolution.
    Inferred { annotation: String },
    /// Fixed default value; never drawn, passed to the constructor as-is.
    Default(V),
    /// Excluded from construction: never drawn, never passed. Bindings
    /// may not reference it.
    Excluded,
}

impl<V> AttrKind<V> {
    pub(crate) fn drawable(&self) -> bool {
        matches!(self, AttrKind::Explicit(_) | AttrKind::Inferred { .. })
    }
}

impl<V> fmt::Debug for AttrKind<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrKind::Explicit(_) => f.write_str("Explicit"),
            AttrKind::Inferred { annotation } => write!(f, "Inferred({annotation})"),
            AttrKind::Default(_) => f.write_str("Default"),
            AttrKind::Excluded => f.write_str("Excluded"),
        }
    }
}

/// One declared attribute of a record type.
#[derive(Clone)]
pub struct AttrDecl<V> {
    name: String,
    kind: AttrKind<V>,
}

impl<V> AttrDecl<V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &AttrKind<V> {
        &self.kind
    }
}

/// Named manual-draw declaration: one callback covering one or more
/// attributes. The callback runs once per covered attribute.
#[derive(Clone)]
pub(crate) struct ManualDrawDecl<V> {
    pub(crate) name: String,
    pub(crate) fields: BTreeSet<String>,
    pub(crate) callback: ManualDrawFn<V>,
}

/// Named post-draw declaration: one callback over a fixed attribute set.
#[derive(Clone)]
pub(crate) struct PostDrawDecl<V> {
    pub(crate) name: String,
    pub(crate) fields: BTreeSet<String>,
    pub(crate) callback: PostDrawFn<V>,
}

/// A record type's declarative table: attributes, parents, and bindings.
///
/// Built once via [`RecordType::builder`], then shared (`Arc`) so derived
/// types can name it as a parent. The resolved schema is cached on first
/// resolution; resolution failures are not cached and surface on each call.
pub struct RecordType<V> {
    name: String,
    parents: Vec<Arc<RecordType<V>>>,
    attrs: Vec<AttrDecl<V>>,
    manual_draws: Vec<ManualDrawDecl<V>>,
    post_draws: Vec<PostDrawDecl<V>>,
    cache: OnceCell<Arc<Schema<V>>>,
}

impl<V> fmt::Debug for RecordType<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("name", &self.name)
            .field("parents", &self.parents.len())
            .field("attrs", &self.attrs.len())
            .finish()
    }
}

impl<V: Clone + 'static> RecordType<V> {
    pub fn builder(name: impl Into<String>) -> RecordTypeBuilder<V> {
        RecordTypeBuilder {
            name: name.into(),
            parents: Vec::new(),
            attrs: Vec::new(),
            manual_draws: Vec::new(),
            post_draws: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve (or fetch the cached) schema for this type.
    ///
    /// The first successful resolution is cached for the type's lifetime;
    /// repeated calls return the same `Arc`.
    pub fn schema(&self, infer: &dyn InferGenerator<V>) -> SchemaResult<Arc<Schema<V>>> {
        self.cache
            .get_or_try_init(|| Schema::resolve(self, infer).map(Arc::new))
            .cloned()
    }

    pub(crate) fn parents(&self) -> &[Arc<RecordType<V>>] {
        &self.parents
    }

    pub(crate) fn attr_decls(&self) -> &[AttrDecl<V>] {
        &self.attrs
    }

    pub(crate) fn manual_draw_decls(&self) -> &[ManualDrawDecl<V>] {
        &self.manual_draws
    }

    pub(crate) fn post_draw_decls(&self) -> &[PostDrawDecl<V>] {
        &self.post_draws
    }
}

/// Builder for [`RecordType`]. Declaration order is draw order for
/// attributes this type introduces.
pub struct RecordTypeBuilder<V> {
    name: String,
    parents: Vec<Arc<RecordType<V>>>,
    attrs: Vec<AttrDecl<V>>,
    manual_draws: Vec<ManualDrawDecl<V>>,
    post_draws: Vec<PostDrawDecl<V>>,
}

impl<V: Clone + 'static> RecordTypeBuilder<V> {
    /// Inherit another record type's attributes and bindings. Parents may be
    /// listed more than once or shared diamond-style; each is merged once.
    pub fn extends(mut self, parent: &Arc<RecordType<V>>) -> Self {
        self.parents.push(Arc::clone(parent));
        self
    }

    /// Declare a drawable attribute whose generator is inferred from the
    /// annotation by the host's [`InferGenerator`].
    pub fn attr(mut self, name: impl Into<String>, annotation: impl Into<String>) -> Self {
        self.attrs.push(AttrDecl {
            name: name.into(),
            kind: AttrKind::Inferred {
                annotation: annotation.into(),
            },
        });
        self
    }

    /// Declare a drawable attribute with an explicit generator.
    pub fn attr_with(
        mut self,
        name: impl Into<String>,
        generator: impl Generator<V> + 'static,
    ) -> Self {
        self.attrs.push(AttrDecl {
            name: name.into(),
            kind: AttrKind::Explicit(Arc::new(generator)),
        });
        self
    }

    /// Declare a non-drawable attribute with a fixed default value.
    pub fn attr_default(mut self, name: impl Into<String>, value: V) -> Self {
        self.attrs.push(AttrDecl {
            name: name.into(),
            kind: AttrKind::Default(value),
        });
        self
    }

    /// Declare an attribute excluded from construction entirely.
    pub fn attr_excluded(mut self, name: impl Into<String>) -> Self {
        self.attrs.push(AttrDecl {
            name: name.into(),
            kind: AttrKind::Excluded,
        });
        self
    }

    /// Bind a manual-draw callback to one or more attributes. Redeclaring
    /// the same binding name in a descendant replaces this binding wholesale.
    pub fn manual_draw<I, S, F>(mut self, name: impl Into<String>, fields: I, callback: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&mut dyn Sampler<V>, &str, &PartialInstance<'_, V>) -> DrawResult<V>
            + Send
            + Sync
            + 'static,
    {
        self.manual_draws.push(ManualDrawDecl {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            callback: Arc::new(callback),
        });
        self
    }

    /// Bind a post-draw callback to a fixed set of attributes. It fires
    /// exactly once per pass, as soon as the whole set has been drawn.
    pub fn post_draw<I, S, F>(mut self, name: impl Into<String>, fields: I, callback: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&BTreeSet<String>, &PartialInstance<'_, V>) -> DrawResult<()>
            + Send
            + Sync
            + 'static,
    {
        self.post_draws.push(PostDrawDecl {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            callback: Arc::new(callback),
        });
        self
    }

    /// Validate the local declarations and freeze the type.
    pub fn build(self) -> SchemaResult<Arc<RecordType<V>>> {
        let mut seen_attrs = BTreeSet::new();
        for decl in &self.attrs {
            if !seen_attrs.insert(decl.name.as_str()) {
                return Err(SchemaError::DuplicateAttribute {
                    record: self.name.clone(),
                    attribute: decl.name.clone(),
                });
            }
        }

        let mut seen_manual = BTreeSet::new();
        for decl in &self.manual_draws {
            if !seen_manual.insert(decl.name.as_str()) {
                return Err(SchemaError::DuplicateBinding {
                    record: self.name.clone(),
                    binding: decl.name.clone(),
                });
            }
            if decl.fields.is_empty() {
                return Err(SchemaError::EmptyBinding {
                    binding: decl.name.clone(),
                });
            }
        }

        let mut seen_post = BTreeSet::new();
        for decl in &self.post_draws {
            if !seen_post.insert(decl.name.as_str()) {
                return Err(SchemaError::DuplicateBinding {
                    record: self.name.clone(),
                    binding: decl.name.clone(),
                });
            }
            if decl.fields.is_empty() {
                return Err(SchemaError::EmptyBinding {
                    binding: decl.name.clone(),
                });
            }
        }

        Ok(Arc::new(RecordType {
            name: self.name,
            parents: self.parents,
            attrs: self.attrs,
            manual_draws: self.manual_draws,
            post_draws: self.post_draws,
            cache: OnceCell::new(),
        }))
    }
}
