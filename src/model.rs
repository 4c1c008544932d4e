//! The `Model` trait: the external, user-supplied collaborator contract
//! from spec.md §6. This crate never implements a concrete scientific
//! model beyond small reference fixtures used in its own tests — a real
//! embedding application supplies its own `Model` impl.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use rayon::prelude::*;

use crate::sample::Sample;

/// A user-defined probabilistic model: prior sampling and density, the
/// likelihood, bounds checks, and the unit-hypercube reparametrisation
/// the importance variant needs.
///
/// Implementors must be `Send + Sync`: the proposal driver may evaluate
/// likelihoods for a batch of candidates across a worker pool (see
/// `batch_log_likelihood`), and the pool's workers each hold a reference
/// to the same model instance.
pub trait Model: Send + Sync {
    /// Ordered parameter names; also fixes the dimensionality.
    fn names(&self) -> &[String];

    fn dim(&self) -> usize {
        self.names().len()
    }

    /// Draw a single point from the prior, in native coordinates.
    fn sample_prior(&self, rng: &mut dyn rand::RngCore) -> Vec<f64>;

    /// Log prior density at `x`; `-inf` signals "out of bounds".
    fn log_prior_density(&self, x: &[f64]) -> f64;

    /// Pure log-likelihood evaluation. Callers that need the evaluation
    /// counted should go through [`Model::evaluate_log_likelihood`]
    /// instead of calling this directly.
    fn log_likelihood(&self, x: &[f64]) -> f64;

    /// Bounds check independent of prior density (used to filter flow
    /// proposals before they are even scored).
    fn in_bounds(&self, x: &[f64]) -> bool;

    /// Map native coordinates into `[0, 1]^d`.
    fn to_unit_hypercube(&self, x: &[f64]) -> Vec<f64>;

    /// Inverse of [`Model::to_unit_hypercube`].
    fn from_unit_hypercube(&self, u: &[f64]) -> Vec<f64>;

    /// Running count of likelihood evaluations, incremented by
    /// [`Model::evaluate_log_likelihood`]. Safe to read/increment
    /// concurrently from pool workers.
    fn likelihood_evaluations(&self) -> &AtomicU64;

    /// Draw a fresh prior point with `logP` populated (`logL` left at
    /// `-inf`, matching the Python reference's `new_point`, which never
    /// evaluates the likelihood eagerly).
    fn new_point(&self, rng: &mut dyn rand::RngCore) -> Sample {
        let x = self.sample_prior(rng);
        let log_p = self.log_prior_density(&x);
        Sample::new(x, log_p, f64::NEG_INFINITY)
    }

    /// Likelihood evaluation wrapper that increments the evaluation
    /// counter, mirroring `NestedSampler.log_likelihood`'s role as a
    /// counting wrapper around the raw model method.
    fn evaluate_log_likelihood(&self, x: &[f64]) -> f64 {
        self.likelihood_evaluations().fetch_add(1, Ordering::Relaxed);
        self.log_likelihood(x)
    }

    /// Batch likelihood evaluation across the supplied worker pool.
    /// Order of results matches order of inputs (rayon's `map` over an
    /// indexed parallel iterator is order-preserving), satisfying the
    /// ordering guarantee in spec.md §5.
    fn batch_log_likelihood(&self, pool: &rayon::ThreadPool, xs: &[Vec<f64>]) -> Vec<f64>
    where
        Self: Sized,
    {
        pool.install(|| xs.par_iter().map(|x| self.evaluate_log_likelihood(x)).collect())
    }
}

/// Evaluate a batch of candidates' likelihoods through a pool, for use
/// behind a `&dyn Model` (the default trait method above requires
/// `Self: Sized` because `par_iter` needs a concrete, object-safe-free
/// call site; this free function works through dynamic dispatch).
pub fn batch_log_likelihood_dyn(
    model: &dyn Model,
    pool: &rayon::ThreadPool,
    xs: &[Vec<f64>],
) -> Vec<f64> {
    pool.install(|| xs.par_iter().map(|x| model.evaluate_log_likelihood(x)).collect())
}

/// Axis-aligned box bounds, the common case for `in_bounds`/prior
/// support used by the reference models in this crate's own test suite.
#[derive(Debug, Clone)]
pub struct BoxBounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl BoxBounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        assert_eq!(lower.len(), upper.len());
        Self { lower, upper }
    }

    pub fn unit(dim: usize) -> Self {
        Self {
            lower: vec![0.0; dim],
            upper: vec![1.0; dim],
        }
    }

    pub fn contains(&self, x: &[f64]) -> bool {
        x.iter()
            .zip(self.lower.iter())
            .zip(self.upper.iter())
            .all(|((&xi, &lo), &hi)| xi >= lo && xi <= hi)
    }

    pub fn to_unit(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.lower.iter())
            .zip(self.upper.iter())
            .map(|((&xi, &lo), &hi)| (xi - lo) / (hi - lo))
            .collect()
    }

    pub fn from_unit(&self, u: &[f64]) -> Vec<f64> {
        u.iter()
            .zip(self.lower.iter())
            .zip(self.upper.iter())
            .map(|((&ui, &lo), &hi)| lo + ui * (hi - lo))
            .collect()
    }

    pub fn log_volume(&self) -> f64 {
        self.lower
            .iter()
            .zip(self.upper.iter())
            .map(|(&lo, &hi)| (hi - lo).ln())
            .sum()
    }
}

/// A `Model` defined by a bounding box, a uniform prior over it, and an
/// arbitrary likelihood closure. Used by this crate's own scenario tests
/// (spec.md §8's Scenarios A–C are all "uniform prior, odd
/// likelihood"), and a convenient starting point for embedding
/// applications with a simple bounded parameter space.
pub struct BoxModel<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    names: Vec<String>,
    bounds: BoxBounds,
    likelihood: F,
    evaluations: AtomicU64,
}

impl<F> BoxModel<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    pub fn new(names: Vec<String>, bounds: BoxBounds, likelihood: F) -> Self {
        assert_eq!(names.len(), bounds.lower.len());
        Self {
            names,
            bounds,
            likelihood,
            evaluations: AtomicU64::new(0),
        }
    }
}

impl<F> Model for BoxModel<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn names(&self) -> &[String] {
        &self.names
    }

    fn sample_prior(&self, rng: &mut dyn rand::RngCore) -> Vec<f64> {
        self.bounds
            .lower
            .iter()
            .zip(self.bounds.upper.iter())
            .map(|(&lo, &hi)| rng.gen_range(lo..hi))
            .collect()
    }

    fn log_prior_density(&self, x: &[f64]) -> f64 {
        if self.bounds.contains(x) {
            -self.bounds.log_volume()
        } else {
            f64::NEG_INFINITY
        }
    }

    fn log_likelihood(&self, x: &[f64]) -> f64 {
        (self.likelihood)(x)
    }

    fn in_bounds(&self, x: &[f64]) -> bool {
        self.bounds.contains(x)
    }

    fn to_unit_hypercube(&self, x: &[f64]) -> Vec<f64> {
        self.bounds.to_unit(x)
    }

    fn from_unit_hypercube(&self, u: &[f64]) -> Vec<f64> {
        self.bounds.from_unit(u)
    }

    fn likelihood_evaluations(&self) -> &AtomicU64 {
        &self.evaluations
    }
}
