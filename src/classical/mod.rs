//! C6 — the classical nested sampling loop.
//!
//! Grounded in `NestedSampler.initialise`/`consume_sample`/
//! `update_state`/`check_state` (`original_source/flowproposal/nestedsampler.py`):
//! pop the worst live point, fold it into the evidence integral, draw a
//! replacement above its likelihood via the [`crate::proposal::ProposalDriver`],
//! and repeat until the remaining-evidence bound falls below tolerance.

use log::info;
use rand::RngCore;

use crate::diagnostics::{ks_test, Recorder, StateSnapshot};
use crate::error::{Result, SamplerError};
use crate::flow::Flow;
use crate::integral::IntegralState;
use crate::live_points::LivePointStore;
use crate::model::Model;
use crate::numerics::logaddexp;
use crate::proposal::{ProposalConfig, ProposalDriver};
use crate::sample::Sample;

#[derive(Debug, Clone)]
pub struct ClassicalConfig {
    pub nlive: usize,
    pub tolerance: f64,
    pub max_iteration: Option<usize>,
    pub proposal: ProposalConfig,
}

impl Default for ClassicalConfig {
    fn default() -> Self {
        Self {
            nlive: 1000,
            tolerance: 0.1,
            max_iteration: None,
            proposal: ProposalConfig::default(),
        }
    }
}

impl ClassicalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.nlive == 0 {
            return Err(SamplerError::InvalidConfig("nlive must be positive".into()));
        }
        if !(self.tolerance > 0.0) {
            return Err(SamplerError::InvalidConfig("tolerance must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NestedResult {
    pub log_z: f64,
    pub log_z_error: f64,
    pub information: f64,
    pub iterations: usize,
    pub nested_samples: Vec<Sample>,
    pub live_points: Vec<Sample>,
    pub likelihood_evaluations: u64,
    pub final_ks_p: Option<f64>,
}

pub struct ClassicalSampler {
    pub config: ClassicalConfig,
    pub state: IntegralState,
    pub live_points: Option<LivePointStore>,
    pub nested_samples: Vec<Sample>,
    pub proposal: ProposalDriver,
    pub recorder: Recorder,
    pub iteration: usize,
}

impl ClassicalSampler {
    pub fn new(config: ClassicalConfig, flow: Box<dyn Flow>) -> Result<Self> {
        config.validate()?;
        let nlive = config.nlive;
        let mut proposal = ProposalDriver::new(flow, config.proposal.clone());
        proposal.set_window((nlive / 10).max(1));
        Ok(Self {
            state: IntegralState::new(nlive),
            live_points: None,
            nested_samples: Vec::new(),
            proposal,
            recorder: Recorder::new(),
            config,
            iteration: 0,
        })
    }

    /// Attach a worker pool for batched flow-candidate likelihood
    /// evaluation (spec.md §5). Safe to call before or after
    /// `initialise`/`resume_with`.
    pub fn set_pool(&mut self, pool: Option<std::sync::Arc<rayon::ThreadPool>>) {
        self.proposal.set_pool(pool);
    }

    pub fn initialise(&mut self, model: &dyn Model, rng: &mut dyn RngCore) -> Result<()> {
        info!("Populating {} live points", self.config.nlive);
        let store = LivePointStore::populate(model, &mut self.proposal, self.config.nlive, rng)?;
        self.live_points = Some(store);
        Ok(())
    }

    /// Resume path: reattach an already-populated store (from a
    /// checkpoint) instead of drawing fresh live points.
    pub fn resume_with(&mut self, live_points: LivePointStore, nested_samples: Vec<Sample>, state: IntegralState, iteration: usize) {
        self.live_points = Some(live_points);
        self.nested_samples = nested_samples;
        self.state = state;
        self.iteration = iteration;
        self.proposal.resumed = true;
    }

    fn live_points_mut(&mut self) -> &mut LivePointStore {
        self.live_points.as_mut().expect("initialise() must run before stepping")
    }

    /// Remaining-evidence bound: `logaddexp(logZ, logLmax + logw) - logZ`,
    /// the standard conservative stopping criterion using the current
    /// maximum live likelihood as a proxy for the undiscovered mass.
    pub fn condition(&self) -> f64 {
        let store = self.live_points.as_ref().expect("initialise() must run before condition()");
        if self.state.log_z == f64::NEG_INFINITY {
            return f64::INFINITY;
        }
        logaddexp(self.state.log_z, store.best_log_l() + self.state.logw) - self.state.log_z
    }

    fn replace_worst(&mut self, model: &dyn Model, worst: &Sample, rng: &mut dyn RngCore) -> Result<Sample> {
        let mut attempts = 0usize;
        loop {
            let live_slice: Vec<Sample> = self.live_points.as_ref().unwrap().as_slice().to_vec();
            let outcome = self.proposal.draw(model, worst.log_l, worst, rng)?;
            if outcome.accepted {
                return Ok(outcome.sample);
            }
            attempts += 1;
            self.proposal
                .check_state(model, &live_slice, &self.nested_samples, self.iteration, false, true)?;
            if attempts > 10_000 {
                return Err(SamplerError::ProposalStalled {
                    attempts,
                    log_l_min: worst.log_l,
                });
            }
        }
    }

    /// One consume/replace cycle: pop the worst point, fold it into the
    /// integral, draw and insert its replacement. Only the successful
    /// path is logged, per the resolved Open Question on log-on-success.
    pub fn consume_sample(&mut self, model: &dyn Model, rng: &mut dyn RngCore) -> Result<()> {
        let nlive_now = self.live_points_mut().nlive();
        let worst = self.live_points_mut().pop_worst();
        self.state.increment(worst.log_l, Some(nlive_now));
        self.nested_samples.push(worst.clone());
        self.proposal.note_iteration();

        let new_sample = self.replace_worst(model, &worst, rng)?.with_iteration(self.iteration as i64);
        let idx = self.live_points_mut().insert(new_sample);
        self.recorder.push_insertion_index(idx);
        info!(
            "it={} logL={:.5} logZ={:.5} idx={}",
            self.iteration, worst.log_l, self.state.log_z, idx
        );
        self.iteration += 1;
        Ok(())
    }

    /// Periodic bookkeeping: state snapshots every `nlive/10` iterations,
    /// the rolling KS test every `nlive` iterations. Exposed alongside
    /// [`Self::should_stop`] for callers driving the loop manually.
    pub fn update_state(&mut self) -> Result<()> {
        let block = (self.config.nlive / 10).max(1);
        if self.iteration % block == 0 {
            let store = self.live_points.as_ref().unwrap();
            self.recorder.push_snapshot(StateSnapshot {
                iteration: self.iteration,
                log_l_min: store.worst_log_l(),
                log_l_max: store.best_log_l(),
                log_z: self.state.log_z,
                condition: self.condition(),
                mean_acceptance: self.proposal.mean_acceptance(),
            });
        }
        if self.iteration > 0 && self.iteration % self.config.nlive == 0 {
            let tail_start = self.recorder.insertion_indices.len().saturating_sub(self.config.nlive);
            let (_, p) = ks_test(&self.recorder.insertion_indices[tail_start..], self.config.nlive);
            if let Some(p) = p {
                self.recorder.push_rolling_ks_p(p);
            }
        }
        Ok(())
    }

    /// Whether the stopping condition (remaining-evidence bound at or
    /// below tolerance, or the iteration cap) has been reached. Exposed
    /// so callers that need to interleave their own checkpointing (the
    /// CLI) can drive the loop manually instead of calling `run`.
    pub fn should_stop(&self) -> bool {
        if let Some(max_it) = self.config.max_iteration {
            if self.iteration >= max_it {
                return true;
            }
        }
        self.condition() <= self.config.tolerance
    }

    /// Drive the loop to completion starting from an already-populated
    /// live-point store (via `initialise` or `resume_with`).
    pub fn run(&mut self, model: &dyn Model, rng: &mut dyn RngCore) -> Result<NestedResult> {
        if self.live_points.is_none() {
            self.initialise(model, rng)?;
        }
        while !self.should_stop() {
            self.consume_sample(model, rng)?;
            self.update_state()?;
            let live_slice: Vec<Sample> = self.live_points.as_ref().unwrap().as_slice().to_vec();
            self.proposal
                .check_state(model, &live_slice, &self.nested_samples, self.iteration, false, false)?;
        }
        self.finalise(model)
    }

    /// Consume the remaining live points in decreasing-`nlive` order and
    /// refine `logZ` with the trapezoidal rule.
    pub fn finalise(&mut self, model: &dyn Model) -> Result<NestedResult> {
        let mut store = self.live_points.take().unwrap_or_else(|| LivePointStore::from_sorted_vec(Vec::new()));
        let remaining = store.nlive();
        let mut leftover = Vec::with_capacity(remaining);
        for k in (1..=remaining).rev() {
            let p = store.pop_worst();
            self.state.increment(p.log_l, Some(k));
            leftover.push(p.clone());
            self.nested_samples.push(p);
        }
        self.state.finalise();
        let final_indices = &self.recorder.insertion_indices;
        let (_, final_p) = ks_test(final_indices, self.config.nlive);
        Ok(NestedResult {
            log_z: self.state.log_z,
            log_z_error: self.state.log_z_error(),
            information: self.state.information(),
            iterations: self.iteration,
            nested_samples: self.nested_samples.clone(),
            live_points: leftover,
            likelihood_evaluations: model.likelihood_evaluations().load(std::sync::atomic::Ordering::Relaxed),
            final_ks_p: final_p,
        })
    }
}
