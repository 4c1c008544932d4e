//! Ambient configuration layer, following `EstimationConfig`'s
//! builder-plus-`validate()` pattern: every
//! sub-config derives `serde::{Serialize, Deserialize}` so a run can be
//! fully specified from a JSON/TOML file, has a sensible `Default`, and
//! exposes `validate()` so bad values are rejected before a run starts
//! rather than surfacing as a confusing panic deep in the loop.

use serde::{Deserialize, Serialize};

use crate::classical::ClassicalConfig;
use crate::error::{Result, SamplerError};
use crate::importance::ImportanceConfig;
use crate::proposal::ProposalConfig;
use crate::reparam::Reparam;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variant {
    Classical,
    Importance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub variant: Variant,
    pub seed: u64,
    pub n_pool: usize,
    pub checkpointing: bool,
    pub checkpoint_interval: usize,
    pub output_dir: String,
    pub reparam: Reparam,
    pub classical: ClassicalConfig,
    pub importance: ImportanceConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Classical,
            seed: 0,
            n_pool: 1,
            checkpointing: true,
            checkpoint_interval: 500,
            output_dir: "outdir".to_string(),
            reparam: Reparam::Logit,
            classical: ClassicalConfig::default(),
            importance: ImportanceConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_pool == 0 {
            return Err(SamplerError::InvalidConfig("n_pool must be at least 1".into()));
        }
        if self.output_dir.trim().is_empty() {
            return Err(SamplerError::InvalidConfig("output_dir must not be empty".into()));
        }
        match self.variant {
            Variant::Classical => self.classical.validate(),
            Variant::Importance => self.importance.validate(),
        }
    }
}

impl ProposalConfig {
    /// Convenience constructor matching the common case of "start
    /// uninformed, switch once acceptance degrades", the default in both
    /// the classical and importance loops.
    pub fn default_with_reparam(reparam: Reparam) -> Self {
        Self {
            reparam,
            ..ProposalConfig::default()
        }
    }
}
