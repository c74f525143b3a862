//! # Draw Engine
//!
//! Executes draw passes against a resolved schema. One [`Instances`] value
//! is one strategy: a schema plus the record constructor. Each call to
//! [`Instances::sample`] runs one full pass:
//!
//! 1. Walk the drawable attributes strictly in schema order. For each, ask
//!    the manual-draw binding for the value if one covers the attribute,
//!    otherwise sample the attribute's generator; then store the value into
//!    the pass's [`PartialInstance`].
//! 2. After every store, fire the post-draw bindings whose attribute set
//!    completed with that store (each fires exactly once per pass; the
//!    relative order of simultaneously-eligible bindings is unspecified).
//! 3. Construct the record from the drawn values plus defaults.
//!
//! A rejection anywhere aborts the pass cleanly: the partial state is
//! discarded and the caller sees `Ok(None)`, not an error. Anything else is
//! wrapped with the attribute/binding/record that was executing and
//! propagated unchanged. The engine never retries on its own and a failed
//! pass never corrupts the schema or dispatch tables; the next pass starts
//! fresh.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::DrawResult;
use crate::partial::{DrawnValues, PartialInstance};
use crate::sampler::Sampler;
use crate::schema::{Schema, ValueSource};

/// Constructor collaborator: builds the record from named values.
///
/// Errors propagate as construction failures, except a rejection, which
/// discards the pass like any callback rejection. That is the hook for
/// construction-time validators that veto invalid instances.
pub type ConstructFn<V, T> = Arc<dyn Fn(&mut DrawnValues<V>) -> DrawResult<T> + Send + Sync>;

/// A strategy producing instances of `T` by drawing a resolved schema.
///
/// Cheap to clone; clones share the schema and constructor. Independent
/// passes may run concurrently as long as each owns its own sampler.
pub struct Instances<V, T> {
    schema: Arc<Schema<V>>,
    construct: ConstructFn<V, T>,
}

impl<V, T> Clone for Instances<V, T> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            construct: Arc::clone(&self.construct),
        }
    }
}

impl<V, T> std::fmt::Debug for Instances<V, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instances").finish_non_exhaustive()
    }
}

impl<V: Clone + 'static, T> Instances<V, T> {
    pub fn new(
        schema: Arc<Schema<V>>,
        construct: impl Fn(&mut DrawnValues<V>) -> DrawResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            schema,
            construct: Arc::new(construct),
        }
    }

    /// The resolved schema this strategy draws.
    pub fn schema(&self) -> &Arc<Schema<V>> {
        &self.schema
    }

    /// Run one draw pass.
    ///
    /// `Ok(Some(_))` is a constructed instance; `Ok(None)` means a callback
    /// (or the constructor) rejected this attempt and the caller may try a
    /// fresh pass; `Err(_)` is a hard failure.
    pub fn sample<S: Sampler<V>>(&self, sampler: &mut S) -> DrawResult<Option<T>> {
        match self.draw_pass(sampler) {
            Ok(instance) => Ok(Some(instance)),
            Err(err) if err.is_rejection() => {
                debug!(record = self.schema.record(), %err, "draw pass rejected");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Run passes until one produces an instance, up to `max_attempts`.
    ///
    /// `Ok(None)` when every attempt was rejected; hosts that need a global
    /// give-up policy for persistently-rejecting strategies should layer it
    /// on top of [`Instances::sample`] instead.
    pub fn sample_until<S: Sampler<V>>(
        &self,
        sampler: &mut S,
        max_attempts: usize,
    ) -> DrawResult<Option<T>> {
        for _ in 0..max_attempts {
            if let Some(instance) = self.sample(sampler)? {
                return Ok(Some(instance));
            }
        }
        Ok(None)
    }

    fn draw_pass<S: Sampler<V>>(&self, sampler: &mut S) -> DrawResult<T> {
        let schema = self.schema.as_ref();
        let dispatch = schema.dispatch();
        let mut partial = PartialInstance::new(schema);

        for &at in schema.drawn_indices() {
            let spec = schema.spec(at);
            let value = match dispatch.manual_draw_for(at) {
                Some(binding) => binding
                    .invoke(sampler, spec.name(), &partial)
                    .map_err(|err| err.in_manual_draw(binding.name(), spec.name()))?,
                None => match &spec.source {
                    ValueSource::Sampled(generator) => sampler
                        .sample(generator.as_ref())
                        .map_err(|err| err.in_generator(spec.name()))?,
                    // Unreachable: resolution only marks an attribute
                    // ManualOnly when a binding covers it.
                    _ => {
                        return Err(crate::error::DrawError::message(format!(
                            "attribute '{}' has no generator and no manual-draw binding",
                            spec.name()
                        )))
                    }
                },
            };
            partial.set(at, value);
            trace!(
                record = schema.record(),
                attribute = spec.name(),
                "drew attribute"
            );

            for &binding in dispatch.fired_after(at) {
                let binding = dispatch.post_binding(binding);
                trace!(
                    record = schema.record(),
                    binding = binding.name(),
                    "firing post-draw binding"
                );
                binding
                    .invoke(&partial)
                    .map_err(|err| err.in_post_draw(binding.name(), spec.name()))?;
            }
        }

        let mut values = partial.into_drawn_values();
        let instance = (self.construct)(&mut values)
            .map_err(|err| err.in_construction(schema.record()))?;
        debug!(record = schema.record(), "constructed instance");
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::decl::RecordType;
    use crate::error::{DrawError, DrawResult};
    use crate::sampler::{from_fn, NoInference, RandomSampler};
    use rand::RngCore;

    fn constant(value: i64) -> impl crate::sampler::Generator<i64> {
        from_fn(move |_: &mut dyn RngCore| Ok(value))
    }

    fn first_value(values: &mut DrawnValues<i64>, name: &str) -> i64 {
        values.take(name).unwrap()
    }

    #[test]
    fn values_are_stored_verbatim_and_in_order() {
        let ty = RecordType::builder("T")
            .attr_with("a", constant(1))
            .attr_with("b", constant(2))
            .build()
            .unwrap();
        let strategy = Instances::new(ty.schema(&NoInference).unwrap(), |values| {
            Ok((first_value(values, "a"), first_value(values, "b")))
        });
        let mut sampler = RandomSampler::from_seed(0);
        let instance = strategy.sample(&mut sampler).unwrap().unwrap();
        assert_eq!(instance, (1, 2));
    }

    #[test]
    fn manual_draw_sees_prior_state_but_not_its_own_attribute() {
        let ty = RecordType::builder("T")
            .attr_with("a", constant(10))
            .attr("b", "int")
            .manual_draw("draw_b", ["b"], |_, field, partial| {
                assert_eq!(field, "b");
                assert!(partial.has("a"));
                assert!(!partial.has("b"));
                Ok(*partial.get("a")? + 1)
            })
            .build()
            .unwrap();
        let strategy = Instances::new(ty.schema(&NoInference).unwrap(), |values| {
            first_value(values, "b");
            Ok(first_value(values, "a"))
        });
        let mut sampler = RandomSampler::from_seed(0);
        assert_eq!(strategy.sample(&mut sampler).unwrap(), Some(10));
    }

    #[test]
    fn manual_binding_over_two_attributes_runs_once_per_attribute() {
        let drawn_for: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&drawn_for);
        let ty = RecordType::builder("T")
            .attr_with("a", constant(0))
            .attr("b", "int")
            .attr("c", "int")
            .manual_draw("draw_bc", ["b", "c"], move |_, field, _| {
                recorder.lock().unwrap().push(field.to_string());
                Ok(5)
            })
            .build()
            .unwrap();
        let strategy = Instances::new(ty.schema(&NoInference).unwrap(), |values| {
            Ok(first_value(values, "b") + first_value(values, "c"))
        });
        let mut sampler = RandomSampler::from_seed(0);
        assert_eq!(strategy.sample(&mut sampler).unwrap(), Some(10));
        assert_eq!(*drawn_for.lock().unwrap(), ["b", "c"]);
    }

    #[test]
    fn manual_draw_takes_precedence_over_an_explicit_generator() {
        let ty = RecordType::builder("T")
            .attr_with("a", constant(1))
            .manual_draw("draw_a", ["a"], |_, _, _| Ok(99))
            .build()
            .unwrap();
        let strategy = Instances::new(ty.schema(&NoInference).unwrap(), |values| {
            Ok(first_value(values, "a"))
        });
        let mut sampler = RandomSampler::from_seed(0);
        assert_eq!(strategy.sample(&mut sampler).unwrap(), Some(99));
    }

    #[test]
    fn post_draw_fires_once_as_soon_as_its_set_completes() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let ty = RecordType::builder("T")
            .attr_with("a", constant(1))
            .attr_with("b", constant(2))
            .attr_with("c", constant(3))
            .post_draw("check_ab", ["a", "b"], move |fields, partial| {
                counter.fetch_add(1, Ordering::SeqCst);
                assert!(fields.contains("a") && fields.contains("b"));
                assert!(partial.has("a") && partial.has("b"));
                // Fires immediately after b, before c is drawn.
                assert!(!partial.has("c"));
                Ok(())
            })
            .build()
            .unwrap();
        let strategy = Instances::new(ty.schema(&NoInference).unwrap(), |values| {
            Ok(first_value(values, "c"))
        });
        let mut sampler = RandomSampler::from_seed(0);
        assert_eq!(strategy.sample(&mut sampler).unwrap(), Some(3));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn simultaneously_eligible_bindings_all_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let first = Arc::clone(&fired);
        let second = Arc::clone(&fired);
        let ty = RecordType::builder("T")
            .attr_with("a", constant(1))
            .attr_with("b", constant(2))
            .post_draw("one", ["a", "b"], move |_, _| {
                first.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .post_draw("two", ["b"], move |_, _| {
                second.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .unwrap();
        let strategy = Instances::new(ty.schema(&NoInference).unwrap(), |values| {
            Ok(first_value(values, "a"))
        });
        let mut sampler = RandomSampler::from_seed(0);
        strategy.sample(&mut sampler).unwrap().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn rejection_aborts_before_construction() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&constructed);
        let ty = RecordType::builder("T")
            .attr_with("a", constant(1))
            .attr_with("b", constant(2))
            .post_draw("veto", ["a"], |_, _| Err(DrawError::reject_because("always")))
            .build()
            .unwrap();
        let strategy = Instances::new(ty.schema(&NoInference).unwrap(), move |values| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(first_value(values, "a"))
        });
        let mut sampler = RandomSampler::from_seed(0);
        assert!(strategy.sample(&mut sampler).unwrap().is_none());
        assert!(strategy.sample_until(&mut sampler, 8).unwrap().is_none());
        assert_eq!(constructed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn constructor_rejection_discards_the_pass() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let ty = RecordType::builder("T")
            .attr_with("a", constant(1))
            .build()
            .unwrap();
        let strategy = Instances::new(ty.schema(&NoInference).unwrap(), move |values| {
            let a = first_value(values, "a");
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                return Err(DrawError::reject_because("validator said no"));
            }
            Ok(a)
        });
        let mut sampler = RandomSampler::from_seed(0);
        assert_eq!(strategy.sample_until(&mut sampler, 8).unwrap(), Some(1));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn generator_failures_are_fatal_and_name_the_attribute() {
        let ty = RecordType::builder("T")
            .attr_with(
                "a",
                from_fn(|_: &mut dyn RngCore| -> DrawResult<i64> {
                    Err(DrawError::message("backend down"))
                }),
            )
            .build()
            .unwrap();
        let strategy = Instances::new(ty.schema(&NoInference).unwrap(), |values| {
            Ok(first_value(values, "a"))
        });
        let mut sampler = RandomSampler::from_seed(0);
        let err = strategy.sample(&mut sampler).unwrap_err();
        assert!(matches!(
            err,
            DrawError::Generator { ref attribute, .. } if attribute == "a"
        ));
    }

    #[test]
    fn callback_errors_are_wrapped_with_binding_context() {
        let ty = RecordType::builder("T")
            .attr_with("a", constant(1))
            .post_draw("check", ["a"], |_, partial| {
                // Programming error inside the callback: looks up an
                // attribute that is not drawn yet.
                partial.get("missing")?;
                Ok(())
            })
            .build()
            .unwrap();
        let strategy = Instances::new(ty.schema(&NoInference).unwrap(), |values| {
            Ok(first_value(values, "a"))
        });
        let mut sampler = RandomSampler::from_seed(0);
        let err = strategy.sample(&mut sampler).unwrap_err();
        assert!(matches!(
            err,
            DrawError::PostDraw { ref binding, .. } if binding == "check"
        ));
    }

    #[test]
    fn defaults_reach_the_constructor_without_being_drawn() {
        let sampled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&sampled);
        let ty = RecordType::builder("T")
            .attr_with(
                "a",
                from_fn(move |_: &mut dyn RngCore| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                }),
            )
            .attr_default("d", 7)
            .build()
            .unwrap();
        let strategy = Instances::new(ty.schema(&NoInference).unwrap(), |values| {
            Ok((first_value(values, "a"), first_value(values, "d")))
        });
        let mut sampler = RandomSampler::from_seed(0);
        assert_eq!(strategy.sample(&mut sampler).unwrap(), Some((1, 7)));
        assert_eq!(sampled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_state_leaks_between_passes() {
        let ty = RecordType::builder("T")
            .attr_with("a", constant(1))
            .attr("b", "int")
            .manual_draw("draw_b", ["b"], |_, _, partial| {
                // A fresh pass must never show b as drawn.
                assert!(!partial.has("b"));
                Ok(2)
            })
            .build()
            .unwrap();
        let strategy = Instances::new(ty.schema(&NoInference).unwrap(), |values| {
            Ok(first_value(values, "b"))
        });
        let mut sampler = RandomSampler::from_seed(0);
        for _ in 0..5 {
            assert_eq!(strategy.sample(&mut sampler).unwrap(), Some(2));
        }
    }
}
