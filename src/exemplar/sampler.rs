//! # Sampling Layer
//!
//! This module defines the seams between the engine and its external
//! collaborators. The [`Sampler`] trait is the capability to obtain a value
//! from an opaque [`Generator`]; the engine never samples on its own.
//!
//! ## Design Rationale
//!
//! Sampling is abstracted behind a trait to:
//! - Enable **testing** with scripted or seeded samplers (no global entropy)
//! - Allow **future backends** (recorded draws, shrinking drivers) without
//!   changing the engine
//! - Keep draw orchestration **decoupled** from where randomness comes from
//!
//! ## Implementations
//!
//! - [`RandomSampler`]: production sampler backed by a `rand` RNG. Seedable,
//!   so statistical tests stay deterministic.
//!
//! [`InferGenerator`] is the second collaborator: given an attribute's type
//! annotation it must produce a generator for every drawable attribute that
//! lacks an explicit one. Its failure is a resolution error, not a pass
//! error. [`NoInference`] is the null implementation for schemas that
//! declare every generator explicitly.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use thiserror::Error;

use crate::error::DrawResult;

/// An opaque source of sample values of type `V`.
///
/// Generators are supplied by the host (explicitly per attribute, or through
/// an [`InferGenerator`]); the engine only ever passes them to a [`Sampler`].
/// A generator may fail, and may also signal rejection to discard the
/// current pass.
pub trait Generator<V>: Send + Sync {
    fn generate(&self, rng: &mut dyn RngCore) -> DrawResult<V>;
}

/// Shared handle to a generator, as stored in resolved schemas.
pub type DynGenerator<V> = Arc<dyn Generator<V>>;

impl<V> std::fmt::Debug for dyn Generator<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Generator")
    }
}

/// A [`Generator`] built from a closure. Construct with [`from_fn`].
pub struct FnGenerator<F>(F);

/// Wrap a closure as a [`Generator`].
pub fn from_fn<V, F>(f: F) -> FnGenerator<F>
where
    F: Fn(&mut dyn RngCore) -> DrawResult<V> + Send + Sync,
{
    FnGenerator(f)
}

impl<V, F> Generator<V> for FnGenerator<F>
where
    F: Fn(&mut dyn RngCore) -> DrawResult<V> + Send + Sync,
{
    fn generate(&self, rng: &mut dyn RngCore) -> DrawResult<V> {
        (self.0)(rng)
    }
}

/// The capability to obtain a value from an opaque generator.
///
/// One sampler drives one draw pass at a time; independent passes may run
/// concurrently as long as each owns its own sampler.
pub trait Sampler<V> {
    fn sample(&mut self, generator: &dyn Generator<V>) -> DrawResult<V>;
}

/// Production sampler: feeds a `rand` RNG to each generator.
pub struct RandomSampler<R = StdRng> {
    rng: R,
}

impl RandomSampler<StdRng> {
    /// Deterministic sampler for reproducible runs.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl<R: RngCore> RandomSampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<V, R: RngCore> Sampler<V> for RandomSampler<R> {
    fn sample(&mut self, generator: &dyn Generator<V>) -> DrawResult<V> {
        generator.generate(&mut self.rng)
    }
}

/// Failure to infer a generator from a type annotation.
#[derive(Error, Debug)]
#[error("cannot infer a generator for annotation '{annotation}': {message}")]
pub struct InferError {
    pub annotation: String,
    pub message: String,
}

impl InferError {
    pub fn new(annotation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            annotation: annotation.into(),
            message: message.into(),
        }
    }
}

/// External collaborator that maps a type annotation to a generator.
///
/// Consulted once per drawable attribute (at schema resolution, never during
/// a pass) for attributes that have neither an explicit generator nor a
/// manual-draw binding.
pub trait InferGenerator<V> {
    fn infer(&self, annotation: &str) -> Result<DynGenerator<V>, InferError>;
}

/// Inference collaborator that refuses every annotation. Use when the schema
/// declares all of its generators explicitly.
pub struct NoInference;

impl<V> InferGenerator<V> for NoInference {
    fn infer(&self, annotation: &str) -> Result<DynGenerator<V>, InferError> {
        Err(InferError::new(
            annotation,
            "no inference collaborator configured",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::Rng;

    #[test]
    fn seeded_samplers_replay_identical_draws() {
        let gen = from_fn(|rng: &mut dyn RngCore| Ok(rng.gen_range(0..1000)));
        let mut a = RandomSampler::from_seed(11);
        let mut b = RandomSampler::from_seed(11);
        let draws_a: Vec<i32> = (0..16).map(|_| a.sample(&gen).unwrap()).collect();
        let draws_b: Vec<i32> = (0..16).map(|_| b.sample(&gen).unwrap()).collect();
        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn generator_errors_surface_through_the_sampler() {
        let gen = from_fn(|_: &mut dyn RngCore| -> DrawResult<i32> {
            Err(crate::error::DrawError::message("entropy exhausted"))
        });
        let mut sampler = RandomSampler::from_seed(0);
        let err = sampler.sample(&gen).unwrap_err();
        assert_eq!(err.to_string(), "entropy exhausted");
    }

    #[test]
    fn no_inference_refuses_with_the_annotation_named() {
        let result: Result<DynGenerator<i32>, _> = NoInference.infer("u32");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("'u32'"));
    }
}
