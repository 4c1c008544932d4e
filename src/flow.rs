//! The `Flow` trait: the external normalising-flow collaborator from
//! spec.md §6, treated as a black box by the proposal driver. This
//! module also ships one concrete, deterministic implementation,
//! [`GaussianMixtureFlow`], so the rest of the crate is exercisable
//! without an external ML dependency — see SPEC_FULL.md's note on why
//! this is a reference/test double, not "the design of the flow itself"
//! (a stated Non-goal).

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, Axis};
use rand::RngCore;
use rand_distr::{Distribution, Normal as NormalDistr};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SamplerError};

/// A single trainable generative model over the "prime" (unbounded)
/// space. The importance sampler keeps an append-only list of these
/// (one per level); the classical sampler retrains a single instance
/// in place.
pub trait Flow: Send + Sync {
    /// One-time setup (e.g. allocating network weights). Idempotent.
    fn initialise(&mut self) -> Result<()>;

    /// Fit the flow to `x` (rows = samples, cols = dimensions), with
    /// optional per-row weights (importance variant).
    fn train(&mut self, x: &Array2<f64>, weights: Option<&[f64]>) -> Result<()>;

    /// Draw `n` samples from the flow in prime space, with their
    /// log-probabilities under the flow.
    fn sample_and_log_prob(&self, n: usize, rng: &mut dyn RngCore) -> (Array2<f64>, Vec<f64>);

    /// Log-probability of each row of `x` under the flow.
    fn log_prob(&self, x: &Array2<f64>) -> Vec<f64>;

    /// Draw `n` samples without their log-probabilities.
    fn sample(&self, n: usize, rng: &mut dyn RngCore) -> Array2<f64> {
        self.sample_and_log_prob(n, rng).0
    }

    /// Reset the flow's weights to an untrained initial state before
    /// the next `train` call (the classical loop's `reset_weights`
    /// cadence, spec.md §4.5).
    fn reset_weights(&mut self);

    /// Reload weights from a checkpointed path.
    fn reload_weights(&mut self, _path: &Path) -> Result<()> {
        Err(SamplerError::FlowWeightsMissing(PathBuf::new()))
    }

    /// Record where weights should be persisted on the next checkpoint.
    fn update_weights_path(&mut self, _path: PathBuf) {}

    fn dim(&self) -> usize;
}

/// A diagonal-Gaussian reference flow: `train` fits a (weighted) mean
/// and standard deviation per dimension; sampling and log-density use
/// that fitted Gaussian directly. This is deliberately the simplest
/// possible stand-in for a real normalising flow — enough to make
/// [`crate::proposal::ProposalDriver`] and both loops exercisable and
/// testable end-to-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianMixtureFlow {
    dim: usize,
    mean: Array1<f64>,
    std: Array1<f64>,
    trained: bool,
}

impl GaussianMixtureFlow {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            mean: Array1::zeros(dim),
            std: Array1::ones(dim),
            trained: false,
        }
    }
}

impl Flow for GaussianMixtureFlow {
    fn initialise(&mut self) -> Result<()> {
        self.mean = Array1::zeros(self.dim);
        self.std = Array1::ones(self.dim);
        self.trained = false;
        Ok(())
    }

    fn train(&mut self, x: &Array2<f64>, weights: Option<&[f64]>) -> Result<()> {
        if x.ncols() != self.dim {
            return Err(SamplerError::NonOneDimensionalTrainingSet(vec![
                x.nrows(),
                x.ncols(),
            ]));
        }
        let n = x.nrows();
        if n == 0 {
            return Ok(());
        }
        let w: Vec<f64> = match weights {
            Some(w) => w.to_vec(),
            None => vec![1.0; n],
        };
        let total: f64 = w.iter().sum();
        let mut mean = Array1::zeros(self.dim);
        for (row, &wi) in x.axis_iter(Axis(0)).zip(w.iter()) {
            mean.scaled_add(wi / total, &row);
        }
        let mut var = Array1::zeros(self.dim);
        for (row, &wi) in x.axis_iter(Axis(0)).zip(w.iter()) {
            let diff = &row - &mean;
            var.scaled_add(wi / total, &(&diff * &diff));
        }
        self.mean = mean;
        self.std = var.mapv(|v| v.sqrt().max(1e-6));
        self.trained = true;
        Ok(())
    }

    fn sample_and_log_prob(&self, n: usize, rng: &mut dyn RngCore) -> (Array2<f64>, Vec<f64>) {
        let mut out = Array2::zeros((n, self.dim));
        let mut log_probs = vec![0.0; n];
        for i in 0..n {
            let mut lp = 0.0;
            for d in 0..self.dim {
                let dist = NormalDistr::new(self.mean[d], self.std[d])
                    .expect("fitted std is always positive");
                let v = dist.sample(&mut RngAdapter(rng));
                out[[i, d]] = v;
                lp += log_normal_pdf(v, self.mean[d], self.std[d]);
            }
            log_probs[i] = lp;
        }
        (out, log_probs)
    }

    fn log_prob(&self, x: &Array2<f64>) -> Vec<f64> {
        x.axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(d, &v)| log_normal_pdf(v, self.mean[d], self.std[d]))
                    .sum()
            })
            .collect()
    }

    fn reset_weights(&mut self) {
        self.mean = Array1::zeros(self.dim);
        self.std = Array1::ones(self.dim);
        self.trained = false;
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

fn log_normal_pdf(x: f64, mean: f64, std: f64) -> f64 {
    let z = (x - mean) / std;
    -0.5 * z * z - std.ln() - 0.5 * (2.0 * std::f64::consts::PI).ln()
}

/// Adapts `&mut dyn RngCore` to the `rand::Rng` trait object needed by
/// `rand_distr::Distribution::sample`.
struct RngAdapter<'a>(&'a mut dyn RngCore);

impl<'a> RngCore for RngAdapter<'a> {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }
    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.0.try_fill_bytes(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn untrained_flow_samples_standard_normal_scale() {
        let mut flow = GaussianMixtureFlow::new(2);
        flow.initialise().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (samples, log_probs) = flow.sample_and_log_prob(1000, &mut rng);
        assert_eq!(samples.nrows(), 1000);
        assert_eq!(log_probs.len(), 1000);
        let mean = samples.mean_axis(Axis(0)).unwrap();
        assert!(mean[0].abs() < 0.3);
    }

    #[test]
    fn training_recovers_approximate_mean_and_std() {
        let mut flow = GaussianMixtureFlow::new(1);
        flow.initialise().unwrap();
        let data = Array2::from_shape_vec((5, 1), vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        flow.train(&data, None).unwrap();
        assert!((flow.mean[0] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_training_set_with_mismatched_dimension() {
        let mut flow = GaussianMixtureFlow::new(2);
        flow.initialise().unwrap();
        let data = Array2::from_shape_vec((3, 1), vec![1.0, 2.0, 3.0]).unwrap();
        assert!(flow.train(&data, None).is_err());
    }
}
