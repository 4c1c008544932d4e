//! C9 — the observer/recorder abstraction.
//!
//! spec.md's Design Notes call out that "mutable append-only history"
//! (every per-iteration diagnostic the Python reference keeps on
//! `self`) should live outside the loop state so the core loop stays
//! testable without a plotting/reporting dependency. `Recorder` is that
//! boundary: the loops push to it unconditionally; a `Recorder::null()`
//! discards everything, which is what the unit tests in `classical` and
//! `importance` use.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub iteration: usize,
    pub log_l_min: f64,
    pub log_l_max: f64,
    pub log_z: f64,
    pub condition: f64,
    pub mean_acceptance: f64,
}

/// Accumulates the classical loop's periodic snapshots, insertion
/// indices, and rolling KS p-values; and the importance loop's
/// per-level history. A thin struct, not a component with behaviour of
/// its own — it exists so the loops don't need conditional logging
/// logic sprinkled through `consume_sample`/`update_state`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recorder {
    pub enabled: bool,
    pub snapshots: Vec<StateSnapshot>,
    pub insertion_indices: Vec<usize>,
    pub rolling_ks_p: Vec<f64>,
    pub training_iterations: Vec<usize>,
    pub levels_log_z: Vec<f64>,
    pub levels_ess: Vec<f64>,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// A recorder that discards everything pushed to it — used by unit
    /// tests that only care about loop mechanics.
    pub fn null() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn push_snapshot(&mut self, snapshot: StateSnapshot) {
        if self.enabled {
            self.snapshots.push(snapshot);
        }
    }

    pub fn push_insertion_index(&mut self, index: usize) {
        if self.enabled {
            self.insertion_indices.push(index);
        }
    }

    pub fn push_rolling_ks_p(&mut self, p: f64) {
        if self.enabled {
            self.rolling_ks_p.push(p);
        }
    }

    pub fn push_training_iteration(&mut self, iteration: usize) {
        if self.enabled {
            self.training_iterations.push(iteration);
        }
    }

    pub fn push_level(&mut self, log_z: f64, ess: f64) {
        if self.enabled {
            self.levels_log_z.push(log_z);
            self.levels_ess.push(ess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_recorder_discards_pushes() {
        let mut r = Recorder::null();
        r.push_insertion_index(3);
        r.push_rolling_ks_p(0.5);
        assert!(r.insertion_indices.is_empty());
        assert!(r.rolling_ks_p.is_empty());
    }

    #[test]
    fn enabled_recorder_keeps_pushes() {
        let mut r = Recorder::new();
        r.push_insertion_index(3);
        r.push_rolling_ks_p(0.5);
        assert_eq!(r.insertion_indices, vec![3]);
        assert_eq!(r.rolling_ks_p, vec![0.5]);
    }
}
