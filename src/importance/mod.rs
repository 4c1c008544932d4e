//! C7 — the importance nested sampler.
//!
//! Grounded in `ImportanceNestedSampler.determine_level`/`update_level`/
//! `draw_n_samples`/`add_and_update_points`/`update_nested_samples`
//! (`original_source/nessai/importancesampler.py`) and
//! `FlowProposal._compute_log_Q_combined`/`_compute_log_Q_independent`
//! (`original_source/nessai/proposal/importance.py`). Instead of shrinking
//! a single live-point population one point at a time, this variant
//! trains a sequence of flows ("levels"), each covering a deeper
//! likelihood contour, and reweights every draw against the combined
//! mixture of all levels drawn so far.
//!
//! Design assumption (see DESIGN.md): every level's density is tracked
//! in unit-hypercube space, which only equals the native-space prior
//! density up to a constant when the model's prior is uniform over
//! `to_unit_hypercube`'s image. Every reference `Model` in this crate
//! satisfies that; a non-uniform prior needs its own density correction,
//! noted as an Open Question in SPEC_FULL.md.

use log::info;
use ndarray::Array2;
use rand::RngCore;

use crate::diagnostics::Recorder;
use crate::error::{Result, SamplerError};
use crate::flow::Flow;
use crate::model::Model;
use crate::numerics::{cumulative_entropy, effective_sample_size, logsumexp, weighted_quantile_sorted};
use crate::reparam::Reparam;
use crate::sample::Sample;

#[derive(Debug, Clone, Copy)]
pub enum LevelSelection {
    Entropy { bits: f64 },
    Quantile { q: f64 },
}

#[derive(Debug, Clone)]
pub struct ImportanceConfig {
    pub nlive: usize,
    pub level_selection: LevelSelection,
    pub combined_proposal: bool,
    pub max_levels: Option<usize>,
    pub dlogz_tolerance: f64,
    pub samples_per_level: usize,
    pub memory: usize,
    pub update_nested_samples: bool,
    /// Floor on the live population spec.md §4.7 step 1 clamps level
    /// removal to: a level is never allowed to retire more points than
    /// would leave fewer than `min_samples` live, matching
    /// `ImportanceNestedSampler`'s own `min_samples` constructor default.
    pub min_samples: usize,
    /// If true, the meta-proposal mixture weight for each level is the
    /// number of samples *requested* from it rather than the number
    /// actually drawn (`FlowProposal.unnormalised_weights`). Experimental,
    /// per the Python docstring this is grounded on.
    pub reweight_draws: bool,
    /// Leaky mode (spec.md §4.7 step 5 / GLOSSARY): keep every freshly
    /// drawn candidate regardless of where it falls relative to the new
    /// level's threshold. `false` (non-leaky) instead discards candidates
    /// below the threshold and keeps oversampling until `samples_per_level`
    /// candidates clear it, matching `ImportanceNestedSampler.draw_n_samples`'s
    /// `logL_min`-constrained branch.
    pub leaky: bool,
}

impl Default for ImportanceConfig {
    fn default() -> Self {
        Self {
            nlive: 1000,
            level_selection: LevelSelection::Quantile {
                q: 1.0 - 1.0 / std::f64::consts::E,
            },
            combined_proposal: true,
            max_levels: None,
            dlogz_tolerance: 0.1,
            samples_per_level: 1000,
            memory: 0,
            update_nested_samples: true,
            min_samples: 1000,
            reweight_draws: false,
            leaky: true,
        }
    }
}

impl ImportanceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.nlive == 0 || self.samples_per_level == 0 {
            return Err(SamplerError::InvalidConfig(
                "nlive and samples_per_level must be positive".into(),
            ));
        }
        if let LevelSelection::Quantile { q } = self.level_selection {
            if !(0.0..1.0).contains(&q) {
                return Err(SamplerError::InvalidConfig("quantile level selection needs q in [0, 1)".into()));
            }
        }
        Ok(())
    }
}

struct Level {
    flow: Option<Box<dyn Flow>>,
    n_requested: usize,
    n_drawn: usize,
}

/// The mixture of every level's proposal density drawn so far. `levels[0]`
/// is always the initial uniform (prior) proposal, `flow: None`.
pub struct MetaProposal {
    reparam: Reparam,
    levels: Vec<Level>,
}

impl MetaProposal {
    pub fn new(reparam: Reparam, n_initial: usize) -> Self {
        Self {
            reparam,
            levels: vec![Level {
                flow: None,
                n_requested: n_initial,
                n_drawn: n_initial,
            }],
        }
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn add_level(&mut self, flow: Box<dyn Flow>, n_requested: usize) {
        self.levels.push(Level {
            flow: Some(flow),
            n_requested,
            n_drawn: 0,
        });
    }

    /// Record that `n` raw candidates were just pulled from the latest
    /// level's flow, accumulating across however many batches
    /// `draw_level_candidates` needs (one in leaky mode, possibly several
    /// in non-leaky mode). Backs the `n_drawn`-weighted branch of
    /// `log_q_combined`.
    fn record_draws(&mut self, n: usize) {
        if let Some(last) = self.levels.last_mut() {
            last.n_drawn += n;
        }
    }

    fn level_log_density(&self, level_idx: usize, u: &[f64]) -> f64 {
        match &self.levels[level_idx].flow {
            None => 0.0,
            Some(flow) => {
                let (y, log_j) = self.reparam.to_prime(u);
                let arr = Array2::from_shape_vec((1, y.len()), y).expect("single row matches dim");
                flow.log_prob(&arr)[0] + log_j
            }
        }
    }

    /// Mixture weight for a level: the number of samples actually drawn
    /// from it, or the number requested when `reweight_draws` asks for
    /// the (experimental, biased) alternative normalisation
    /// (`FlowProposal.unnormalised_weights`).
    fn level_weight(level: &Level, reweight_draws: bool) -> f64 {
        if reweight_draws {
            level.n_requested as f64
        } else {
            level.n_drawn as f64
        }
    }

    pub fn log_q_combined(&self, u: &[f64], reweight_draws: bool) -> f64 {
        let total: f64 = self.levels.iter().map(|l| Self::level_weight(l, reweight_draws)).sum();
        let terms: Vec<f64> = self
            .levels
            .iter()
            .enumerate()
            .map(|(i, l)| Self::level_weight(l, reweight_draws).ln() + self.level_log_density(i, u))
            .collect();
        logsumexp(&terms) - total.ln()
    }

    pub fn log_q_independent(&self, u: &[f64], generating_level: usize) -> f64 {
        self.level_log_density(generating_level, u)
    }

    pub fn compute_log_q(&self, u: &[f64], generating_level: usize, combined: bool, reweight_draws: bool) -> f64 {
        if combined {
            self.log_q_combined(u, reweight_draws)
        } else {
            self.log_q_independent(u, generating_level)
        }
    }

    /// Draw `n` candidates in native coordinates from the most recently
    /// added level, together with the originating flow's own
    /// log-density (the value that will become each sample's `logG`).
    fn sample_latest_level(&self, model: &dyn Model, n: usize, rng: &mut dyn RngCore) -> Vec<(Vec<f64>, f64)> {
        let last = self.levels.last().expect("at least the initial level exists");
        match &last.flow {
            None => (0..n)
                .map(|_| {
                    let x = model.sample_prior(rng);
                    (x, 0.0)
                })
                .collect(),
            Some(flow) => {
                let (prime, _log_q_flow) = flow.sample_and_log_prob(n, rng);
                prime
                    .rows()
                    .into_iter()
                    .map(|row| {
                        let row_vec: Vec<f64> = row.to_vec();
                        let (u, log_j_inv) = self.reparam.from_prime(&row_vec);
                        let x = model.from_unit_hypercube(&u);
                        let log_g = flow.log_prob(&Array2::from_shape_vec((1, row_vec.len()), row_vec.clone()).unwrap())[0] - log_j_inv;
                        (x, log_g)
                    })
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportanceResult {
    pub log_z: f64,
    pub log_z_error: f64,
    pub levels: usize,
    pub effective_sample_size: f64,
    pub samples: Vec<Sample>,
    pub likelihood_evaluations: u64,
}

pub struct ImportanceSampler {
    config: ImportanceConfig,
    reparam: Reparam,
    flow_factory: Box<dyn Fn() -> Box<dyn Flow> + Send + Sync>,
    meta: MetaProposal,
    live: Vec<Sample>,
    retired: Vec<Sample>,
    recorder: Recorder,
    level: usize,
    pool: Option<std::sync::Arc<rayon::ThreadPool>>,
}

impl ImportanceSampler {
    pub fn new(
        config: ImportanceConfig,
        reparam: Reparam,
        flow_factory: Box<dyn Fn() -> Box<dyn Flow> + Send + Sync>,
    ) -> Result<Self> {
        config.validate()?;
        let meta = MetaProposal::new(reparam, config.nlive);
        Ok(Self {
            config,
            reparam,
            flow_factory,
            meta,
            live: Vec::new(),
            retired: Vec::new(),
            recorder: Recorder::new(),
            level: 0,
            pool: None,
        })
    }

    /// Attach a worker pool for batched likelihood evaluation of each
    /// level's freshly-drawn candidates (spec.md §5).
    pub fn set_pool(&mut self, pool: Option<std::sync::Arc<rayon::ThreadPool>>) {
        self.pool = pool;
    }

    pub fn initialise(&mut self, model: &dyn Model, rng: &mut dyn RngCore) -> Result<()> {
        let mut points = Vec::with_capacity(self.config.nlive);
        for _ in 0..self.config.nlive {
            let x = model.sample_prior(rng);
            let log_p = model.log_prior_density(&x);
            let log_l = model.evaluate_log_likelihood(&x);
            let u = model.to_unit_hypercube(&x);
            let log_q = self
                .meta
                .compute_log_q(&u, 0, self.config.combined_proposal, self.config.reweight_draws);
            let mut sample = Sample::new(x, log_p, log_l).with_iteration(0);
            sample.log_g = 0.0;
            sample.log_q = log_q;
            points.push(sample);
        }
        points.sort_by(|a, b| a.log_l.partial_cmp(&b.log_l).unwrap());
        self.live = points;
        Ok(())
    }

    fn current_log_z(&self, points: &[Sample]) -> (f64, f64) {
        if points.is_empty() {
            return (f64::NEG_INFINITY, 0.0);
        }
        let log_weights: Vec<f64> = points.iter().map(|s| s.log_l + s.log_w()).collect();
        let log_z = logsumexp(&log_weights) - (points.len() as f64).ln();
        let ess = effective_sample_size(&log_weights);
        (log_z, ess)
    }

    fn all_points(&self) -> Vec<Sample> {
        let mut all = self.retired.clone();
        all.extend(self.live.iter().cloned());
        all
    }

    /// Number of live points the next level should retire, before the
    /// `min_samples` floor (spec.md §4.7 step 1) is applied.
    fn points_to_remove(&self) -> usize {
        match self.config.level_selection {
            LevelSelection::Quantile { q } => {
                let log_ls: Vec<f64> = self.live.iter().map(|s| s.log_l).collect();
                let weights: Vec<f64> = self.live.iter().map(|s| s.log_w().exp()).collect();
                let cutoff = weighted_quantile_sorted(&log_ls, &weights, q);
                log_ls.iter().position(|&v| v >= cutoff).unwrap_or(0)
            }
            LevelSelection::Entropy { bits } => {
                let log_weights: Vec<f64> = self.live.iter().map(|s| s.log_l + s.log_w()).collect();
                let total = logsumexp(&log_weights);
                let probs: Vec<f64> = log_weights.iter().map(|&lw| (lw - total).exp()).collect();
                let mut reversed = probs.clone();
                reversed.reverse();
                let cum = cumulative_entropy(&reversed);
                let total_entropy = cum.last().copied().unwrap_or(0.0);
                let threshold = total_entropy - bits;
                let k = cum.iter().position(|&v| v > threshold).unwrap_or(0);
                self.live.len() - k
            }
        }
    }

    /// `logL` of the new live-set boundary: the level removes every
    /// point below this value. Clamps the raw removal count so at least
    /// `min_samples` live points always survive (spec.md §4.7 step 1,
    /// `importancesampler.py:656-657`).
    fn determine_level(&self) -> f64 {
        let mut n_remove = self.points_to_remove();
        if self.live.len().saturating_sub(n_remove) < self.config.min_samples {
            n_remove = self.live.len().saturating_sub(self.config.min_samples);
        }
        self.live.get(n_remove).map(|s| s.log_l).unwrap_or(f64::INFINITY)
    }

    /// Retire every live point below `threshold` into the permanent
    /// sample set; they keep contributing to `logZ` but are never drawn
    /// from again.
    fn remove_points(&mut self, threshold: f64) -> usize {
        let split = self.live.partition_point(|s| s.log_l < threshold);
        let removed: Vec<Sample> = self.live.drain(0..split).collect();
        let n = removed.len();
        self.retired.extend(removed);
        n
    }

    fn train_new_level(&mut self, model: &dyn Model) -> Result<Box<dyn Flow>> {
        let mut flow = (self.flow_factory)();
        flow.initialise()?;
        let mut data: Vec<Sample> = self.live.clone();
        if self.config.memory > 0 && !self.retired.is_empty() {
            let start = self.retired.len().saturating_sub(self.config.memory);
            data.extend_from_slice(&self.retired[start..]);
        }
        let dim = model.dim();
        let mut flat = Vec::with_capacity(data.len() * dim);
        for s in &data {
            let u = model.to_unit_hypercube(&s.x);
            let (prime, _log_j) = self.reparam.to_prime(&u);
            flat.extend_from_slice(&prime);
        }
        let arr = Array2::from_shape_vec((data.len(), dim), flat).expect("row-major flattening matches shape");
        flow.train(&arr, None)?;
        Ok(flow)
    }

    /// Score one batch of freshly-drawn candidates, turning each into a
    /// `Sample` with `logG`/`logQ` populated under the (just-grown)
    /// meta-proposal.
    fn score_candidates(&self, model: &dyn Model, drawn: Vec<(Vec<f64>, f64)>) -> Vec<Sample> {
        let xs: Vec<Vec<f64>> = drawn.iter().map(|(x, _)| x.clone()).collect();
        let log_ls: Vec<f64> = match &self.pool {
            Some(pool) => crate::model::batch_log_likelihood_dyn(model, pool, &xs),
            None => xs.iter().map(|x| model.evaluate_log_likelihood(x)).collect(),
        };
        let mut scored = Vec::with_capacity(drawn.len());
        for ((x, log_g), log_l) in drawn.into_iter().zip(log_ls) {
            let log_p = model.log_prior_density(&x);
            let u = model.to_unit_hypercube(&x);
            let log_q = self
                .meta
                .compute_log_q(&u, self.level, self.config.combined_proposal, self.config.reweight_draws);
            let mut sample = Sample::new(x, log_p, log_l).with_iteration(self.level as i64);
            sample.log_g = log_g;
            sample.log_q = log_q;
            scored.push(sample);
        }
        scored
    }

    /// Draw this level's batch of new candidates, honouring the
    /// leaky/non-leaky distinction (spec.md §4.7 step 5, GLOSSARY "Leaky
    /// mode"). Leaky mode (the default) keeps every candidate regardless
    /// of likelihood; non-leaky mode discards anything below `threshold`
    /// and oversamples until `samples_per_level` candidates clear it,
    /// mirroring `FlowProposal.draw`'s `logL_min`-constrained branch.
    fn draw_level_candidates(
        &mut self,
        model: &dyn Model,
        threshold: f64,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Sample>> {
        let target = self.config.samples_per_level;
        if self.config.leaky {
            let drawn = self.meta.sample_latest_level(model, target, rng);
            self.meta.record_draws(drawn.len());
            return Ok(self.score_candidates(model, drawn));
        }

        let mut kept = Vec::with_capacity(target);
        let mut batch_size = target;
        let mut attempts = 0usize;
        while kept.len() < target {
            attempts += 1;
            let drawn = self.meta.sample_latest_level(model, batch_size, rng);
            self.meta.record_draws(drawn.len());
            let scored = self.score_candidates(model, drawn);
            for sample in scored {
                if sample.log_l >= threshold {
                    kept.push(sample);
                }
            }
            let remaining = target.saturating_sub(kept.len());
            // Oversample proportionally to the acceptance rate observed so
            // far (floored at the remaining count), matching the source's
            // `1.2x` oversampling factor for a threshold-constrained draw.
            batch_size = ((remaining as f64) * 1.2).ceil().max(1.0) as usize;
            if attempts > 200 {
                return Err(SamplerError::ProposalStalled {
                    attempts,
                    log_l_min: threshold,
                });
            }
        }
        kept.truncate(target);
        Ok(kept)
    }

    fn recompute_combined_log_q(&mut self, model: &dyn Model) {
        if !self.config.combined_proposal {
            return;
        }
        for s in self.live.iter_mut() {
            let u = model.to_unit_hypercube(&s.x);
            s.log_q = self.meta.log_q_combined(&u, self.config.reweight_draws);
        }
        if self.config.update_nested_samples {
            for s in self.retired.iter_mut() {
                let u = model.to_unit_hypercube(&s.x);
                s.log_q = self.meta.log_q_combined(&u, self.config.reweight_draws);
            }
        }
    }

    /// One level-advancement step: retire the bottom of the current live
    /// set, train a new flow on what remains, draw fresh candidates from
    /// it, and fold everything back into one likelihood-sorted pool.
    pub fn advance_level(&mut self, model: &dyn Model, rng: &mut dyn RngCore) -> Result<()> {
        let threshold = self.determine_level();
        let removed = self.remove_points(threshold);
        info!("level {} removed {} points below logL={:.5}", self.level, removed, threshold);

        let flow = self.train_new_level(model)?;
        self.meta.add_level(flow, self.config.samples_per_level);
        self.level += 1;

        let new_samples = self.draw_level_candidates(model, threshold, rng)?;
        self.live.extend(new_samples);
        self.live.sort_by(|a, b| a.log_l.partial_cmp(&b.log_l).unwrap());

        self.recompute_combined_log_q(model);
        let (log_z, ess) = self.current_log_z(&self.all_points());
        self.recorder.push_level(log_z, ess);
        Ok(())
    }

    fn should_stop(&self, previous_log_z: f64, current_log_z: f64) -> bool {
        if let Some(max_levels) = self.config.max_levels {
            if self.level >= max_levels {
                return true;
            }
        }
        if !previous_log_z.is_finite() || !current_log_z.is_finite() {
            return false;
        }
        (current_log_z - previous_log_z).abs() <= self.config.dlogz_tolerance
    }

    pub fn run(&mut self, model: &dyn Model, rng: &mut dyn RngCore) -> Result<ImportanceResult> {
        if self.live.is_empty() && self.retired.is_empty() {
            self.initialise(model, rng)?;
        }
        let mut previous_log_z = self.current_log_z(&self.all_points()).0;
        loop {
            self.advance_level(model, rng)?;
            let current_log_z = self.current_log_z(&self.all_points()).0;
            if self.should_stop(previous_log_z, current_log_z) {
                break;
            }
            previous_log_z = current_log_z;
        }
        self.finalise(model)
    }

    pub fn finalise(&mut self, model: &dyn Model) -> Result<ImportanceResult> {
        let all = self.all_points();
        let (log_z, ess) = self.current_log_z(&all);
        let log_weights: Vec<f64> = all.iter().map(|s| s.log_l + s.log_w()).collect();
        let log_sum_sq = logsumexp(&log_weights.iter().map(|w| 2.0 * w).collect::<Vec<_>>());
        let log_z_error = (2.0 * log_z - log_sum_sq - (all.len() as f64).ln()).exp().sqrt();
        Ok(ImportanceResult {
            log_z,
            log_z_error: if log_z_error.is_finite() { log_z_error } else { 0.0 },
            levels: self.meta.n_levels(),
            effective_sample_size: ess,
            samples: all,
            likelihood_evaluations: model.likelihood_evaluations().load(std::sync::atomic::Ordering::Relaxed),
        })
    }
}
