//! C8 — checkpoint/resume.
//!
//! Grounded in `NestedSampler.checkpoint`/`NestedSampler.resume_from_pickle`
//! (`original_source/flowproposal/nestedsampler.py`): serialise everything
//! needed to continue a run except the caller-supplied collaborators
//! (`Model`, the worker pool, the flow factory) — those are reattached by
//! the caller on resume, breaking the cyclic self-reference the Python
//! pickle approach tolerates but a typed snapshot cannot.
//!
//! Written to a temporary file and renamed into place only once the
//! serialisation succeeds, so a crash mid-write never corrupts the
//! previous checkpoint.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::integral::IntegralState;
use crate::sample::Sample;

/// Snapshot of a classical-sampler run, excluding the model and the
/// flow's internal weights (those are persisted separately by
/// `Flow::update_weights_path`/`reload_weights`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassicalCheckpoint {
    pub nlive: usize,
    pub iteration: usize,
    pub state: IntegralState,
    pub live_points: Vec<Sample>,
    pub nested_samples: Vec<Sample>,
    pub insertion_indices: Vec<usize>,
    pub rng_seed: u64,
    pub rng_stream_offset: u64,
}

/// Snapshot of an importance-sampler run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceCheckpoint {
    pub nlive: usize,
    pub level: usize,
    pub live_points: Vec<Sample>,
    pub retired_points: Vec<Sample>,
    pub rng_seed: u64,
    pub rng_stream_offset: u64,
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn save_classical(path: &Path, checkpoint: &ClassicalCheckpoint) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(checkpoint)?;
    write_atomically(path, &bytes)
}

pub fn load_classical(path: &Path) -> Result<ClassicalCheckpoint> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn save_importance(path: &Path, checkpoint: &ImportanceCheckpoint) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(checkpoint)?;
    write_atomically(path, &bytes)
}

pub fn load_importance(path: &Path) -> Result<ImportanceCheckpoint> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Where the previous checkpoint (if any) is kept before being
/// overwritten, mirroring the Python reference's `resume_file.old`
/// retention so a failed write never leaves zero usable checkpoints.
pub fn backup_path(path: &Path) -> PathBuf {
    path.with_extension("old")
}

pub fn save_classical_with_backup(path: &Path, checkpoint: &ClassicalCheckpoint) -> Result<()> {
    if path.exists() {
        fs::copy(path, backup_path(path))?;
    }
    save_classical(path, checkpoint)
}
