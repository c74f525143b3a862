//! Callback dispatch tables: which attribute is drawn by which manual-draw
//! binding, and which post-draw bindings fire after which attribute.
//!
//! Built once during schema resolution and queried once per attribute per
//! pass, so both lookups are plain map/slice reads. Post-draw eligibility is
//! precomputed: a binding's *trigger* is the member of its attribute set
//! with the greatest schema position; the moment that attribute is stored,
//! the whole set is covered. Firing on the trigger makes every binding fire
//! exactly once per pass by construction.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::decl::{AttrKind, ManualDrawDecl, ManualDrawFn, PostDrawDecl, PostDrawFn, RecordType};
use crate::error::{DrawResult, SchemaError, SchemaResult};
use crate::partial::PartialInstance;
use crate::sampler::Sampler;

/// A resolved manual-draw binding: one callback that supplies the value for
/// each attribute it covers, invoked once per attribute.
pub struct ManualDrawBinding<V> {
    name: String,
    fields: BTreeSet<String>,
    callback: ManualDrawFn<V>,
}

impl<V> ManualDrawBinding<V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attribute names this binding draws.
    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub(crate) fn invoke(
        &self,
        sampler: &mut dyn Sampler<V>,
        attribute: &str,
        partial: &PartialInstance<'_, V>,
    ) -> DrawResult<V> {
        (self.callback)(sampler, attribute, partial)
    }
}

/// A resolved post-draw binding: fires exactly once per pass, immediately
/// after the last attribute of its set is drawn.
pub struct PostDrawBinding<V> {
    name: String,
    fields: BTreeSet<String>,
    callback: PostDrawFn<V>,
}

impl<V> PostDrawBinding<V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attribute set this binding waits for.
    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub(crate) fn invoke(&self, partial: &PartialInstance<'_, V>) -> DrawResult<()> {
        (self.callback)(&self.fields, partial)
    }
}

/// Lookup tables mapping attributes to their callbacks.
pub struct DispatchTable<V> {
    manual_bindings: Vec<ManualDrawBinding<V>>,
    manual_for: HashMap<usize, usize>,
    post_bindings: Vec<PostDrawBinding<V>>,
    triggers: HashMap<usize, Vec<usize>>,
}

impl<V: Clone + 'static> DispatchTable<V> {
    /// Merge and validate the bindings declared along `chain`.
    ///
    /// `index` and `merged` are the resolver's merged attribute table:
    /// name → position, and (name, declared_in, kind) per position.
    pub(crate) fn build(
        chain: &[&RecordType<V>],
        index: &HashMap<String, usize>,
        merged: &[(String, String, AttrKind<V>)],
    ) -> SchemaResult<DispatchTable<V>> {
        // Override-by-identical-name semantics for both binding kinds: the
        // BTreeMap keeps the most-derived declaration and iterates in a
        // deterministic order.
        let mut manual_decls: BTreeMap<String, ManualDrawDecl<V>> = BTreeMap::new();
        let mut post_decls: BTreeMap<String, PostDrawDecl<V>> = BTreeMap::new();
        for ty in chain {
            for decl in ty.manual_draw_decls() {
                manual_decls.insert(decl.name.clone(), decl.clone());
            }
            for decl in ty.post_draw_decls() {
                post_decls.insert(decl.name.clone(), decl.clone());
            }
        }

        let position = |binding: &str, field: &str| -> SchemaResult<usize> {
            let &at = index.get(field).ok_or_else(|| SchemaError::UnknownAttribute {
                binding: binding.to_string(),
                attribute: field.to_string(),
            })?;
            if !merged[at].2.drawable() {
                return Err(SchemaError::NotDrawable {
                    binding: binding.to_string(),
                    attribute: field.to_string(),
                });
            }
            Ok(at)
        };

        let mut manual_bindings: Vec<ManualDrawBinding<V>> = Vec::with_capacity(manual_decls.len());
        let mut manual_for: HashMap<usize, usize> = HashMap::new();
        for (name, decl) in manual_decls {
            for field in &decl.fields {
                let at = position(&name, field)?;
                if let Some(&prev) = manual_for.get(&at) {
                    return Err(SchemaError::AmbiguousManualDraw {
                        attribute: field.clone(),
                        first: manual_bindings[prev].name().to_string(),
                        second: name,
                    });
                }
                manual_for.insert(at, manual_bindings.len());
            }
            manual_bindings.push(ManualDrawBinding {
                name,
                fields: decl.fields,
                callback: decl.callback,
            });
        }

        let mut post_bindings = Vec::with_capacity(post_decls.len());
        let mut triggers: HashMap<usize, Vec<usize>> = HashMap::new();
        for (name, decl) in post_decls {
            let mut trigger: Option<usize> = None;
            for field in &decl.fields {
                let at = position(&name, field)?;
                trigger = Some(trigger.map_or(at, |t| t.max(at)));
            }
            let Some(trigger) = trigger else {
                return Err(SchemaError::EmptyBinding { binding: name });
            };
            triggers.entry(trigger).or_default().push(post_bindings.len());
            post_bindings.push(PostDrawBinding {
                name,
                fields: decl.fields,
                callback: decl.callback,
            });
        }

        Ok(DispatchTable {
            manual_bindings,
            manual_for,
            post_bindings,
            triggers,
        })
    }
}

impl<V> DispatchTable<V> {
    /// The manual-draw binding covering the attribute at `at`, if any.
    pub(crate) fn manual_draw_for(&self, at: usize) -> Option<&ManualDrawBinding<V>> {
        self.manual_for
            .get(&at)
            .map(|&binding| &self.manual_bindings[binding])
    }

    /// Indices of the post-draw bindings whose set completes with the
    /// attribute at `at`.
    pub(crate) fn fired_after(&self, at: usize) -> &[usize] {
        self.triggers
            .get(&at)
            .map(|bindings| bindings.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn post_binding(&self, binding: usize) -> &PostDrawBinding<V> {
        &self.post_bindings[binding]
    }

    /// All resolved post-draw bindings.
    pub fn post_draw_bindings(&self) -> &[PostDrawBinding<V>] {
        &self.post_bindings
    }

    /// The post-draw bindings whose attribute set contains `name`.
    pub fn covering<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PostDrawBinding<V>> {
        self.post_bindings
            .iter()
            .filter(move |binding| binding.fields.contains(name))
    }

    #[cfg(test)]
    pub(crate) fn trigger_of(&self, name: &str) -> Option<usize> {
        let at = self
            .post_bindings
            .iter()
            .position(|binding| binding.name == name)?;
        self.triggers
            .iter()
            .find_map(|(&trigger, bindings)| bindings.contains(&at).then_some(trigger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::DrawResult;
    use crate::sampler::{from_fn, NoInference};
    use crate::schema::Schema;
    use rand::RngCore;

    fn unit() -> impl crate::sampler::Generator<i64> {
        from_fn(|_: &mut dyn RngCore| -> DrawResult<i64> { Ok(0) })
    }

    #[test]
    fn two_bindings_claiming_one_attribute_is_ambiguous() {
        let ty = RecordType::builder("T")
            .attr_with("x", unit())
            .manual_draw("a", ["x"], |_, _, _| Ok(1))
            .manual_draw("b", ["x"], |_, _, _| Ok(2))
            .build()
            .unwrap();
        let err = Schema::resolve(&ty, &NoInference).unwrap_err();
        match err {
            SchemaError::AmbiguousManualDraw {
                attribute,
                first,
                second,
            } => {
                assert_eq!(attribute, "x");
                assert_eq!((first.as_str(), second.as_str()), ("a", "b"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn ambiguity_is_detected_across_ancestry_too() {
        let base = RecordType::builder("B")
            .attr_with("x", unit())
            .manual_draw("base_draw", ["x"], |_, _, _| Ok(1))
            .build()
            .unwrap();
        let derived = RecordType::builder("D")
            .extends(&base)
            .manual_draw("derived_draw", ["x"], |_, _, _| Ok(2))
            .build()
            .unwrap();
        let err = Schema::resolve(&derived, &NoInference).unwrap_err();
        assert!(matches!(err, SchemaError::AmbiguousManualDraw { .. }));
    }

    #[test]
    fn same_named_binding_replaces_the_ancestors_wholesale() {
        let base = RecordType::builder("B")
            .attr_with("x", unit())
            .attr_with("y", unit())
            .manual_draw("draw", ["x", "y"], |_, _, _| Ok(1))
            .build()
            .unwrap();
        // D's "draw" only covers x; y reverts to its generator. No
        // ambiguity, because the ancestor's binding is fully replaced.
        let derived = RecordType::builder("D")
            .extends(&base)
            .manual_draw("draw", ["x"], |_, _, _| Ok(2))
            .build()
            .unwrap();
        let schema = Schema::resolve(&derived, &NoInference).unwrap();
        let x = schema.index_of("x").unwrap();
        let y = schema.index_of("y").unwrap();
        assert_eq!(
            schema.dispatch().manual_draw_for(x).map(|b| b.name()),
            Some("draw")
        );
        assert!(schema.dispatch().manual_draw_for(y).is_none());
    }

    #[test]
    fn unknown_attribute_in_binding_is_rejected() {
        let ty = RecordType::builder("T")
            .attr_with("x", unit())
            .post_draw("check", ["x", "ghost"], |_, _| Ok(()))
            .build()
            .unwrap();
        let err = Schema::resolve(&ty, &NoInference).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnknownAttribute { ref attribute, .. } if attribute == "ghost"
        ));
    }

    #[test]
    fn bindings_may_not_reference_non_drawable_attributes() {
        let with_default = RecordType::builder("T")
            .attr_with("x", unit())
            .attr_default("d", 3)
            .post_draw("check", ["x", "d"], |_, _| Ok(()))
            .build()
            .unwrap();
        let err = Schema::resolve(&with_default, &NoInference).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::NotDrawable { ref attribute, .. } if attribute == "d"
        ));

        let with_excluded = RecordType::builder("U")
            .attr_with("x", unit())
            .attr_excluded("hidden")
            .manual_draw("draw", ["hidden"], |_, _, _| Ok(1))
            .build()
            .unwrap();
        let err = Schema::resolve(&with_excluded, &NoInference).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::NotDrawable { ref attribute, .. } if attribute == "hidden"
        ));
    }

    #[test]
    fn post_draw_trigger_is_the_last_member_in_draw_order() {
        let ty = RecordType::builder("T")
            .attr_with("a", unit())
            .attr_with("b", unit())
            .attr_with("c", unit())
            .post_draw("early", ["a", "b"], |_, _| Ok(()))
            .post_draw("late", ["a", "c"], |_, _| Ok(()))
            .build()
            .unwrap();
        let schema = Schema::resolve(&ty, &NoInference).unwrap();
        let dispatch = schema.dispatch();
        assert_eq!(dispatch.trigger_of("early"), schema.index_of("b"));
        assert_eq!(dispatch.trigger_of("late"), schema.index_of("c"));
        let covering: Vec<&str> = dispatch.covering("a").map(|b| b.name()).collect();
        assert_eq!(covering, ["early", "late"]);
    }

    #[test]
    fn differently_named_post_bindings_stack_instead_of_overriding() {
        let base = RecordType::builder("B")
            .attr_with("x", unit())
            .post_draw("base_check", ["x"], |_, _| Ok(()))
            .build()
            .unwrap();
        let derived = RecordType::builder("D")
            .extends(&base)
            .post_draw("derived_check", ["x"], |_, _| Ok(()))
            .build()
            .unwrap();
        let schema = Schema::resolve(&derived, &NoInference).unwrap();
        assert_eq!(schema.dispatch().post_draw_bindings().len(), 2);

        // Same name: the descendant's binding replaces the ancestor's.
        let overriding = RecordType::builder("E")
            .extends(&base)
            .attr_with("y", unit())
            .post_draw("base_check", ["x", "y"], |_, _| Ok(()))
            .build()
            .unwrap();
        let schema = Schema::resolve(&overriding, &NoInference).unwrap();
        let bindings = schema.dispatch().post_draw_bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].fields().len(), 2);
    }
}
