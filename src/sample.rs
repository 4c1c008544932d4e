//! The `Sample` ("live point") record and the reserved fields every
//! sampler variant shares.

use serde::{Deserialize, Serialize};

/// A single live point / nested sample.
///
/// `x` holds the named real-valued coordinates in the model's native
/// space (see `Model::names` for the ordering). The reserved fields
/// mirror spec.md §3; `logW` is *derived* from `logQ` rather than stored,
/// so "Testable Property 7" (`logW == -logQ`) holds by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: Vec<f64>,
    /// Log prior density.
    pub log_p: f64,
    /// Log likelihood.
    pub log_l: f64,
    /// Iteration of origin; `-1` means drawn from the prior.
    pub it: i64,
    /// Log of the unnormalised proposal density under the current
    /// meta-proposal (importance variant only; `0.0` when unused).
    pub log_g: f64,
    /// Log of the normalised meta-proposal density (importance variant
    /// only; `0.0` when unused).
    pub log_q: f64,
}

impl Sample {
    pub fn new(x: Vec<f64>, log_p: f64, log_l: f64) -> Self {
        Self {
            x,
            log_p,
            log_l,
            it: -1,
            log_g: 0.0,
            log_q: 0.0,
        }
    }

    pub fn with_iteration(mut self, it: i64) -> Self {
        self.it = it;
        self
    }

    /// Log importance weight with respect to the meta-proposal,
    /// `logW = -logQ`.
    pub fn log_w(&self) -> f64 {
        -self.log_q
    }

    pub fn dim(&self) -> usize {
        self.x.len()
    }

    pub fn is_finite(&self) -> bool {
        self.log_p.is_finite() && self.log_l.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_w_is_negative_log_q_by_construction() {
        let mut s = Sample::new(vec![0.1, 0.2], -1.0, -2.0);
        s.log_q = -3.5;
        assert_eq!(s.log_w(), 3.5);
    }

    #[test]
    fn prior_samples_default_to_iteration_minus_one() {
        let s = Sample::new(vec![0.0], 0.0, 0.0);
        assert_eq!(s.it, -1);
    }
}
