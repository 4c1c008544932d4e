//! C5 — the proposal driver.
//!
//! Wraps a [`Flow`] with the reject/accept contract both loops share,
//! grounded in `NestedSampler.yield_sample`/`check_state`
//! (`original_source/flowproposal/nestedsampler.py`). Unifies the
//! "uninformed" (analytic/rejection) and "flow-based" draw strategies
//! behind one interface, per spec.md's Design Note on replacing dynamic
//! class selection with a closed tagged variant.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, warn};
use ndarray::Array2;
use rand::RngCore;

use crate::error::{Result, SamplerError};
use crate::flow::Flow;
use crate::model::{batch_log_likelihood_dyn, Model};
use crate::reparam::Reparam;
use crate::sample::Sample;

/// Build the worker pool spec.md §5 describes ("optionally fanning out
/// batch likelihood evaluations to a worker pool"). `n_pool = 1` still
/// builds a single-thread pool rather than skipping pooling entirely, so
/// the batch code path (and its ordering guarantee) is exercised the
/// same way regardless of configured parallelism.
pub fn build_pool(n_pool: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_pool.max(1))
        .build()
        .map_err(|e| SamplerError::ThreadPool(e.to_string()))
}

/// Closed tagged variant standing in for the source's string-keyed
/// proposal class registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalKind {
    Flow,
    GwFlow,
    Analytic,
    Rejection,
}

#[derive(Debug, Clone)]
pub struct ProposalConfig {
    pub kind: ProposalKind,
    pub reparam: Reparam,
    /// Per-sample acceptance floor (`1/counter`) below which a draw
    /// attempt is abandoned.
    pub acceptance_threshold: f64,
    /// Mean-acceptance floor that triggers the uninformed -> flow
    /// switch.
    pub uninformed_acceptance_threshold: f64,
    pub maximum_uninformed: usize,
    pub training_frequency: usize,
    pub cooldown: usize,
    /// Reset the flow's weights every `reset_weights` trainings; `0`
    /// disables the reset.
    pub reset_weights: usize,
    /// Concatenate the last `memory` nested samples into the training
    /// set; `0` disables.
    pub memory: usize,
    pub train_on_empty: bool,
    pub retrain_acceptance: bool,
    /// Number of candidates to draw from the flow per buffer refill.
    pub poolsize: usize,
    /// Window size for the rolling mean-acceptance statistic, normally
    /// set by the loop to `nlive / 10`.
    pub window: usize,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            kind: ProposalKind::Flow,
            reparam: Reparam::Logit,
            acceptance_threshold: 0.01,
            uninformed_acceptance_threshold: 0.9,
            maximum_uninformed: 0,
            training_frequency: 50,
            cooldown: 10,
            reset_weights: 0,
            memory: 0,
            train_on_empty: true,
            retrain_acceptance: true,
            poolsize: 1000,
            window: 10,
        }
    }
}

pub struct DrawOutcome {
    pub cost: usize,
    pub sample: Sample,
    pub accepted: bool,
}

/// Wraps a single [`Flow`] (the classical loop retrains it in place;
/// the importance loop keeps a separate, append-only list of these
/// driven by `importance::MetaProposal`).
pub struct ProposalDriver {
    config: ProposalConfig,
    flow: Box<dyn Flow>,
    uninformed: bool,
    /// Buffered flow candidates; `.1` is the likelihood pre-evaluated at
    /// refill time through [`Self::pool`] when one is configured, so
    /// `draw` need not re-evaluate it one candidate at a time.
    buffer: VecDeque<(Vec<f64>, Option<f64>)>,
    pool: Option<Arc<rayon::ThreadPool>>,
    acceptance_history: VecDeque<f64>,
    accepted: usize,
    rejected: usize,
    block_acceptance: f64,
    block_iteration: usize,
    last_updated: usize,
    training_count: usize,
    max_count: usize,
    /// Set on resume; the retraining policy treats it as "skip the next
    /// training decision", per spec.md §4.8.
    pub resumed: bool,
    log_l_max: f64,
}

impl ProposalDriver {
    pub fn new(flow: Box<dyn Flow>, config: ProposalConfig) -> Self {
        Self {
            config,
            flow,
            uninformed: true,
            buffer: VecDeque::new(),
            pool: None,
            acceptance_history: VecDeque::new(),
            accepted: 0,
            rejected: 0,
            block_acceptance: 0.0,
            block_iteration: 0,
            last_updated: 0,
            training_count: 0,
            max_count: 0,
            resumed: false,
            log_l_max: f64::NEG_INFINITY,
        }
    }

    /// Attach (or detach) the worker pool used to batch-evaluate the
    /// likelihood of a freshly-refilled flow buffer. Rebuilt on resume
    /// per spec.md §4.8 / §9's note on the cyclic model<->pool reference
    /// — the pool itself is never serialised.
    pub fn set_pool(&mut self, pool: Option<Arc<rayon::ThreadPool>>) {
        self.pool = pool;
    }

    pub fn set_window(&mut self, window: usize) {
        self.config.window = window.max(1);
        while self.acceptance_history.len() > self.config.window {
            self.acceptance_history.pop_front();
        }
    }

    pub fn is_uninformed(&self) -> bool {
        self.uninformed
    }

    pub fn log_l_max(&self) -> f64 {
        self.log_l_max
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn training_count(&self) -> usize {
        self.training_count
    }

    /// Whether the flow's current draw buffer has candidates. Always
    /// `true` in uninformed mode, where candidates are cheap to produce
    /// on demand.
    pub fn populated(&self) -> bool {
        self.uninformed || !self.buffer.is_empty()
    }

    pub fn mean_acceptance(&self) -> f64 {
        if self.acceptance_history.is_empty() {
            1.0
        } else {
            self.acceptance_history.iter().sum::<f64>() / self.acceptance_history.len() as f64
        }
    }

    pub fn mean_block_acceptance(&self) -> f64 {
        if self.block_iteration == 0 {
            1.0
        } else {
            self.block_acceptance / self.block_iteration as f64
        }
    }

    fn propose_native(
        &mut self,
        model: &dyn Model,
        rng: &mut dyn RngCore,
    ) -> Option<(Vec<f64>, Option<f64>)> {
        if self.uninformed || matches!(self.config.kind, ProposalKind::Analytic | ProposalKind::Rejection) {
            return Some((model.sample_prior(rng), None));
        }
        if self.buffer.is_empty() {
            self.refill_buffer(model, rng);
        }
        self.buffer.pop_front()
    }

    /// Refill the flow candidate buffer and, when a worker pool is
    /// attached, batch-evaluate every candidate's likelihood up front
    /// (spec.md §5: "optionally fanning out batch likelihood
    /// evaluations to a worker pool"; rayon's indexed `map` preserves
    /// input order, satisfying the ordering guarantee). `draw` then
    /// consumes pre-scored candidates instead of evaluating one at a
    /// time.
    fn refill_buffer(&mut self, model: &dyn Model, rng: &mut dyn RngCore) {
        let (prime, _log_q) = self.flow.sample_and_log_prob(self.config.poolsize, rng);
        let mut candidates = Vec::with_capacity(prime.nrows());
        for row in prime.rows() {
            let row_vec: Vec<f64> = row.to_vec();
            let (u, _log_j) = self.config.reparam.from_prime(&row_vec);
            if u.iter().all(|&v| v.is_finite() && (0.0..=1.0).contains(&v)) {
                let x = model.from_unit_hypercube(&u);
                if model.in_bounds(&x) && model.log_prior_density(&x).is_finite() {
                    candidates.push(x);
                }
            }
        }
        match &self.pool {
            Some(pool) => {
                let log_ls = batch_log_likelihood_dyn(model, pool, &candidates);
                for (x, log_l) in candidates.into_iter().zip(log_ls) {
                    self.buffer.push_back((x, Some(log_l)));
                }
            }
            None => {
                for x in candidates {
                    self.buffer.push_back((x, None));
                }
            }
        }
        debug!("Refilled proposal buffer with {} candidates", self.buffer.len());
    }

    /// Draw a single accepted sample above `log_l_min`, or report that
    /// this attempt was abandoned (acceptance stalled, or the flow
    /// buffer was empty — both let the caller trigger `check_state`).
    /// Mirrors `NestedSampler.yield_sample`/`consume_sample`'s inner
    /// loop.
    pub fn draw(
        &mut self,
        model: &dyn Model,
        log_l_min: f64,
        seed: &Sample,
        rng: &mut dyn RngCore,
    ) -> Result<DrawOutcome> {
        let mut counter = 0usize;
        loop {
            counter += 1;
            let (candidate, precomputed_log_l) = match self.propose_native(model, rng) {
                Some(c) => c,
                None => {
                    self.rejected += 1;
                    return Ok(DrawOutcome {
                        cost: counter,
                        sample: seed.clone(),
                        accepted: false,
                    });
                }
            };
            let log_p = model.log_prior_density(&candidate);
            if log_p.is_finite() {
                let log_l = match precomputed_log_l {
                    Some(log_l) => log_l,
                    None => model.evaluate_log_likelihood(&candidate),
                };
                if log_l > log_l_min {
                    self.log_l_max = self.log_l_max.max(log_l);
                    self.accepted += 1;
                    let inv = 1.0 / counter as f64;
                    self.block_acceptance += inv;
                    self.acceptance_history.push_back(inv);
                    while self.acceptance_history.len() > self.config.window {
                        self.acceptance_history.pop_front();
                    }
                    return Ok(DrawOutcome {
                        cost: counter,
                        sample: Sample::new(candidate, log_p, log_l),
                        accepted: true,
                    });
                }
            }
            if (1.0 / counter as f64) < self.config.acceptance_threshold {
                self.max_count += 1;
                self.rejected += 1;
                return Ok(DrawOutcome {
                    cost: counter,
                    sample: seed.clone(),
                    accepted: false,
                });
            }
        }
    }

    /// Draw a single prior-seeded point ignoring the flow entirely,
    /// used by `LivePointStore::populate`. Unlike `draw`, this never
    /// abandons the attempt early — live-point population must succeed.
    pub fn draw_from_prior(
        &mut self,
        model: &dyn Model,
        seed: Sample,
        rng: &mut dyn RngCore,
    ) -> Result<(usize, Sample)> {
        let _ = &seed;
        let mut counter = 0usize;
        loop {
            counter += 1;
            let candidate = model.sample_prior(rng);
            let log_p = model.log_prior_density(&candidate);
            if log_p.is_finite() {
                let log_l = model.evaluate_log_likelihood(&candidate);
                if log_l.is_finite() {
                    return Ok((counter, Sample::new(candidate, log_p, log_l)));
                }
            }
            if counter > 1_000_000 {
                return Ok((counter, Sample::new(vec![f64::NAN; model.dim()], f64::NEG_INFINITY, f64::NEG_INFINITY)));
            }
        }
    }

    /// Apply the retraining policy (spec.md §4.5) and train the flow if
    /// warranted. Returns whether a training actually happened.
    #[allow(clippy::too_many_arguments)]
    pub fn check_state(
        &mut self,
        model: &dyn Model,
        live_points: &[Sample],
        nested_samples: &[Sample],
        iteration: usize,
        force: bool,
        rejected: bool,
    ) -> Result<bool> {
        if self.uninformed {
            if self.mean_acceptance() < self.config.uninformed_acceptance_threshold
                || (self.config.maximum_uninformed > 0 && iteration >= self.config.maximum_uninformed)
            {
                warn!("Switching proposal from uninformed to flow-based");
                self.uninformed = false;
            } else {
                return Ok(false);
            }
        }

        let mut train = force;
        if !train
            && self.mean_block_acceptance() < self.config.acceptance_threshold
            && iteration.saturating_sub(self.last_updated) < self.config.cooldown
            && self.config.retrain_acceptance
        {
            debug!("Training flow (acceptance, cooling down)");
            train = true;
        }
        if !train
            && rejected
            && self.mean_block_acceptance() < self.config.acceptance_threshold
            && self.config.retrain_acceptance
        {
            debug!("Training flow (rejected + acceptance)");
            train = true;
        }
        if !train
            && self.config.training_frequency > 0
            && iteration.saturating_sub(self.last_updated) % self.config.training_frequency == 0
            && iteration > self.last_updated
        {
            debug!("Training flow (iteration)");
            train = true;
        }
        if !self.populated() && self.config.train_on_empty {
            debug!("Training flow (proposal empty)");
            train = true;
        }

        if !train {
            return Ok(false);
        }

        if iteration.saturating_sub(self.last_updated) < self.config.cooldown && !force {
            debug!("Not training, still cooling down");
            return Ok(false);
        }
        if self.resumed {
            debug!("Skipping training because of resume");
            self.resumed = false;
            return Ok(false);
        }

        if self.config.reset_weights > 0 && self.training_count % self.config.reset_weights == 0 {
            self.flow.reset_weights();
        }

        let mut training_data: Vec<Sample> = live_points.to_vec();
        if self.config.memory > 0 && !nested_samples.is_empty() {
            let start = nested_samples.len().saturating_sub(self.config.memory);
            training_data.extend_from_slice(&nested_samples[start..]);
        }
        self.train_flow(model, &training_data)?;
        self.training_count += 1;
        self.last_updated = iteration;
        self.block_acceptance = 0.0;
        self.block_iteration = 0;
        self.buffer.clear();
        Ok(true)
    }

    fn train_flow(&mut self, model: &dyn Model, data: &[Sample]) -> Result<()> {
        let dim = model.dim();
        let mut flat = Vec::with_capacity(data.len() * dim);
        for s in data {
            let u = model.to_unit_hypercube(&s.x);
            let (prime, _log_j) = self.config.reparam.to_prime(&u);
            flat.extend_from_slice(&prime);
        }
        let arr = Array2::from_shape_vec((data.len(), dim), flat)
            .expect("row-major flattening matches (n, dim) shape");
        self.flow.train(&arr, None)
    }

    pub fn note_iteration(&mut self) {
        self.block_iteration += 1;
    }

    pub fn flow(&self) -> &dyn Flow {
        self.flow.as_ref()
    }

    pub fn flow_mut(&mut self) -> &mut dyn Flow {
        self.flow.as_mut()
    }
}
