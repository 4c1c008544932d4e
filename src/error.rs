//! Crate-wide error type.
//!
//! Following the split NMODES uses (a `thiserror` enum per subsystem,
//! `anyhow` only at the CLI boundary), `SamplerError` collects the
//! "contract violation" failure modes spec.md §7 calls out as fatal.
//! Numerical warnings (non-monotonic `logL`, NaN information) are never
//! represented here — they are logged and recovered from locally.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("training set must be a 1-D array of samples per dimension, got shape {0:?}")]
    NonOneDimensionalTrainingSet(Vec<usize>),

    #[error("flow weights file not found: {0}")]
    FlowWeightsMissing(std::path::PathBuf),

    #[error("resume checkpoint has {checkpoint_dims} dimensions but the model has {model_dims}")]
    ResumeDimensionMismatch {
        checkpoint_dims: usize,
        model_dims: usize,
    },

    #[error("unknown parameter name: {0}")]
    UnknownParameter(String),

    #[error("live-point store requested with nlive=0")]
    EmptyLivePointStore,

    #[error("meta-proposal produced a NaN log-density; meta-proposal state is corrupt")]
    CorruptMetaProposal,

    #[error("proposal exhausted {attempts} draws without finding a sample above logLmin={log_l_min}")]
    ProposalStalled { attempts: usize, log_l_min: f64 },

    #[error("invalid sampler configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, SamplerError>;
