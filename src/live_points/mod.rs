//! C2 — the fixed-size, likelihood-sorted live-point store.
//!
//! Grounded in `NestedSampler.insert_live_point`/`populate_live_points`
//! (`original_source/flowproposal/nestedsampler.py`): a shift-left then
//! overwrite insertion that keeps the store sorted in O(nlive) without a
//! full resort, binary-searched via the `bisection` crate the way
//! `jwschroeder3-nested_sampling`'s `Particles::add_to_live` uses
//! `VecDeque::binary_search_by_key`.

use bisection::bisect_left;
use ordered_float::OrderedFloat;
use rand::RngCore;

use crate::error::{Result, SamplerError};
use crate::model::Model;
use crate::proposal::ProposalDriver;
use crate::sample::Sample;

/// Fixed-length population of [`Sample`]s, always sorted ascending by
/// `log_l`.
#[derive(Debug, Clone)]
pub struct LivePointStore {
    points: Vec<Sample>,
}

impl LivePointStore {
    pub fn nlive(&self) -> usize {
        self.points.len()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.points
    }

    pub fn into_vec(self) -> Vec<Sample> {
        self.points
    }

    /// The current worst (lowest-`logL`) point, by value.
    pub fn worst(&self) -> Sample {
        self.points[0].clone()
    }

    pub fn worst_log_l(&self) -> f64 {
        self.points[0].log_l
    }

    pub fn best_log_l(&self) -> f64 {
        self.points.last().map(|s| s.log_l).unwrap_or(f64::NEG_INFINITY)
    }

    /// Remove and return the current worst point, shrinking the store by
    /// one (used by the importance loop, which removes a prefix at once
    /// rather than replacing one-for-one).
    pub fn pop_worst(&mut self) -> Sample {
        self.points.remove(0)
    }

    /// Remove and return the lowest `n` points as a contiguous prefix.
    pub fn pop_prefix(&mut self, n: usize) -> Vec<Sample> {
        let tail = self.points.split_off(n.min(self.points.len()));
        std::mem::replace(&mut self.points, tail)
    }

    /// Insert `new` into rank order by binary search on `log_l`.
    /// Returns the zero-based insertion index. `k == 0` is unreachable
    /// for callers that only insert points with `log_l` strictly above
    /// the current worst (`new.log_l > self.worst_log_l()`), matching
    /// the Python reference's comment on `insert_live_point`.
    pub fn insert(&mut self, new: Sample) -> usize {
        let log_ls: Vec<OrderedFloat<f64>> =
            self.points.iter().map(|s| OrderedFloat(s.log_l)).collect();
        let k = bisect_left(&log_ls, &OrderedFloat(new.log_l));
        // Shift [1..k) down into [0..k-1), then write `new` at k-1,
        // exactly mirroring `insert_live_point`'s slice rotation.
        if k > 0 {
            self.points.copy_within(1..k, 0);
        }
        self.points[k - 1] = new;
        k - 1
    }

    /// Insert a batch of already-sorted samples, maintaining overall
    /// sort order (used by the importance loop's level advancement,
    /// which adds many points per iteration rather than one).
    pub fn insert_many(&mut self, mut new: Vec<Sample>) {
        new.sort_by(|a, b| a.log_l.partial_cmp(&b.log_l).unwrap());
        self.points.extend(new);
        self.points.sort_by(|a, b| a.log_l.partial_cmp(&b.log_l).unwrap());
    }

    pub fn is_sorted(&self) -> bool {
        self.points.windows(2).all(|w| w[0].log_l <= w[1].log_l)
    }

    /// Build a store of `nlive` points by repeatedly drawing from the
    /// proposal driver (seeded with fresh prior draws), accepting only
    /// samples whose `logP` and `logL` are both finite, then sorting.
    pub fn populate(
        model: &dyn Model,
        proposal: &mut ProposalDriver,
        nlive: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        if nlive == 0 {
            return Err(SamplerError::EmptyLivePointStore);
        }
        let mut points = Vec::with_capacity(nlive);
        while points.len() < nlive {
            let seed = model.new_point(rng);
            let (_, sample) = proposal.draw_from_prior(model, seed, rng)?;
            if sample.log_p.is_finite() && sample.log_l.is_finite() {
                points.push(sample);
            }
        }
        points.sort_by(|a, b| a.log_l.partial_cmp(&b.log_l).unwrap());
        Ok(Self { points })
    }

    /// Construct directly from an already-sorted vector (checkpoint
    /// resume path).
    pub fn from_sorted_vec(points: Vec<Sample>) -> Self {
        debug_assert!(points.windows(2).all(|w| w[0].log_l <= w[1].log_l));
        Self { points }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(log_l: f64) -> Sample {
        Sample::new(vec![log_l], 0.0, log_l)
    }

    fn store(log_ls: &[f64]) -> LivePointStore {
        LivePointStore::from_sorted_vec(log_ls.iter().map(|&l| sample(l)).collect())
    }

    #[test]
    fn insert_keeps_store_sorted_and_returns_rank() {
        let mut s = store(&[0.0, 1.0, 2.0, 3.0]);
        let idx = s.insert(sample(1.5));
        assert!(s.is_sorted());
        assert_eq!(s.nlive(), 4);
        assert_eq!(s.as_slice()[idx].log_l, 1.5);
    }

    #[test]
    fn insert_above_current_max_lands_at_last_slot() {
        let mut s = store(&[0.0, 1.0, 2.0]);
        let idx = s.insert(sample(10.0));
        assert_eq!(idx, 2);
        assert_eq!(s.as_slice()[2].log_l, 10.0);
        assert!(s.is_sorted());
    }

    #[test]
    fn pop_worst_shrinks_store_and_returns_lowest() {
        let mut s = store(&[0.0, 1.0, 2.0]);
        let w = s.pop_worst();
        assert_eq!(w.log_l, 0.0);
        assert_eq!(s.nlive(), 2);
        assert_eq!(s.worst_log_l(), 1.0);
    }

    #[test]
    fn pop_prefix_removes_lowest_n() {
        let mut s = store(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let removed = s.pop_prefix(2);
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].log_l, 0.0);
        assert_eq!(removed[1].log_l, 1.0);
        assert_eq!(s.nlive(), 3);
        assert_eq!(s.worst_log_l(), 2.0);
    }

    #[test]
    fn insert_many_keeps_overall_sort_order() {
        let mut s = store(&[0.0, 2.0, 4.0]);
        s.insert_many(vec![sample(1.0), sample(3.0), sample(5.0)]);
        assert!(s.is_sorted());
        assert_eq!(s.nlive(), 6);
    }
}
