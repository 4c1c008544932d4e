pub mod numerics;
pub mod error;
pub mod sample;
pub mod model;
pub mod reparam;
pub mod flow;
pub mod integral;
pub mod live_points;
pub mod diagnostics;
pub mod proposal;
pub mod classical;
pub mod importance;
pub mod checkpoint;
pub mod config;
pub mod output;

pub use classical::{ClassicalConfig, ClassicalSampler, NestedResult};
pub use config::{RunConfig, Variant};
pub use error::{Result, SamplerError};
pub use flow::{Flow, GaussianMixtureFlow};
pub use importance::{ImportanceConfig, ImportanceResult, ImportanceSampler, LevelSelection, MetaProposal};
pub use live_points::LivePointStore;
pub use model::{BoxBounds, BoxModel, Model};
pub use proposal::{ProposalConfig, ProposalDriver, ProposalKind};
pub use reparam::Reparam;
pub use sample::Sample;
