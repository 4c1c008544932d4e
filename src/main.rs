//! CLI entry point. Ships one demonstration `Model` (an isotropic
//! Gaussian likelihood over a bounded box) since the crate's actual
//! `Model` contract is meant to be implemented by an embedding
//! application — `nested_sampler` as a library has no concrete science
//! to attach to a CLI otherwise. Following `nmodes::main`'s structure:
//! `clap` derive args, `env_logger::init()`, `anyhow::Result` at the
//! boundary. Interrupt handling is left to the OS-default `SIGINT`
//! behaviour rather than a hand-rolled handler.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use nested_sampler::checkpoint::{load_classical, save_classical_with_backup, ClassicalCheckpoint};
use nested_sampler::classical::{ClassicalConfig, ClassicalSampler};
use nested_sampler::importance::{ImportanceConfig, ImportanceSampler, LevelSelection};
use nested_sampler::proposal::build_pool;
use nested_sampler::{output, BoxBounds, BoxModel, GaussianMixtureFlow, LivePointStore, Reparam, RunConfig, Variant};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VariantArg {
    Classical,
    Importance,
}

#[derive(Debug, Parser)]
#[command(name = "nested-sampler", version, about = "Nested sampling engine for Bayesian evidence estimation")]
struct Cli {
    /// Number of live points.
    #[arg(long, default_value_t = 1000)]
    nlive: usize,

    /// Stopping tolerance (classical: remaining-evidence bound, importance: dlogZ).
    #[arg(long, default_value_t = 0.1)]
    tolerance: f64,

    /// Output directory.
    #[arg(long, default_value = "outdir")]
    output: PathBuf,

    /// Resume from a checkpoint in `output` if one exists.
    #[arg(long, default_value_t = false)]
    resume: bool,

    /// RNG seed for reproducible runs.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Worker pool size for batched likelihood evaluation.
    #[arg(long, default_value_t = 1)]
    n_pool: usize,

    #[arg(long, value_enum, default_value_t = VariantArg::Classical)]
    variant: VariantArg,

    /// Dimensionality of the built-in demonstration Gaussian likelihood.
    #[arg(long, default_value_t = 4)]
    dim: usize,

    /// Hard iteration cap (classical) / level cap (importance).
    #[arg(long)]
    max_iteration: Option<usize>,

    #[arg(long, default_value_t = true)]
    checkpointing: bool,

    #[arg(long = "no-checkpointing", action = clap::ArgAction::SetFalse, overrides_with = "checkpointing")]
    _no_checkpointing: bool,

    /// Iterations between checkpoint writes (classical variant only).
    #[arg(long, default_value_t = 500)]
    checkpoint_interval: usize,
}

fn run_config(cli: &Cli) -> RunConfig {
    let variant = match cli.variant {
        VariantArg::Classical => Variant::Classical,
        VariantArg::Importance => Variant::Importance,
    };
    RunConfig {
        variant,
        seed: cli.seed,
        n_pool: cli.n_pool,
        checkpointing: cli.checkpointing,
        checkpoint_interval: cli.checkpoint_interval,
        output_dir: cli.output.to_string_lossy().into_owned(),
        reparam: Reparam::Logit,
        classical: ClassicalConfig {
            nlive: cli.nlive,
            tolerance: cli.tolerance,
            max_iteration: cli.max_iteration,
            ..ClassicalConfig::default()
        },
        importance: ImportanceConfig {
            nlive: cli.nlive,
            dlogz_tolerance: cli.tolerance,
            max_levels: cli.max_iteration,
            level_selection: LevelSelection::Quantile { q: 0.5 },
            ..ImportanceConfig::default()
        },
    }
}

fn resume_path(output: &PathBuf) -> PathBuf {
    output.join("nested_sampler_resume.json")
}

/// Drive the classical loop to completion, checkpointing every
/// `config.checkpoint_interval` iterations and honouring `--resume`
/// (spec.md §4.8, §9's cyclic-reference note: the model is reattached
/// here by the caller, never stored in the checkpoint itself).
fn run_classical(
    cli: &Cli,
    config: &RunConfig,
    model: &BoxModel<impl Fn(&[f64]) -> f64 + Send + Sync>,
    pool: Arc<rayon::ThreadPool>,
) -> Result<()> {
    let resume_file = resume_path(&cli.output);
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut sampler = ClassicalSampler::new(config.classical.clone(), Box::new(GaussianMixtureFlow::new(cli.dim)))?;
    sampler.set_pool(Some(pool));

    if cli.resume && resume_file.exists() {
        info!("Resuming from {:?}", resume_file);
        let checkpoint = load_classical(&resume_file)?;
        if checkpoint.nlive != config.classical.nlive {
            anyhow::bail!(
                "checkpoint nlive={} does not match requested nlive={}",
                checkpoint.nlive,
                config.classical.nlive
            );
        }
        rng = ChaCha8Rng::seed_from_u64(checkpoint.rng_seed);
        rng.set_word_pos(checkpoint.rng_stream_offset as u128);
        sampler.resume_with(
            LivePointStore::from_sorted_vec(checkpoint.live_points),
            checkpoint.nested_samples,
            checkpoint.state,
            checkpoint.iteration,
        );
        sampler.recorder.insertion_indices = checkpoint.insertion_indices;
    } else {
        sampler.initialise(model, &mut rng)?;
    }

    while !sampler.should_stop() {
        sampler.consume_sample(model, &mut rng)?;
        sampler.update_state()?;

        if config.checkpointing && sampler.iteration % config.checkpoint_interval == 0 {
            let checkpoint = ClassicalCheckpoint {
                nlive: sampler.config.nlive,
                iteration: sampler.iteration,
                state: sampler.state.clone(),
                live_points: sampler.live_points.as_ref().unwrap().as_slice().to_vec(),
                nested_samples: sampler.nested_samples.clone(),
                insertion_indices: sampler.recorder.insertion_indices.clone(),
                rng_seed: config.seed,
                rng_stream_offset: rng.get_word_pos() as u64,
            };
            std::fs::create_dir_all(&cli.output)
                .with_context(|| format!("creating output dir {:?}", cli.output))?;
            save_classical_with_backup(&resume_file, &checkpoint)
                .with_context(|| "writing checkpoint")?;
        }
    }

    let result = sampler.finalise(model)?;
    info!(
        "logZ = {:.4} +/- {:.4}, {} iterations, {} likelihood evaluations",
        result.log_z, result.log_z_error, result.iterations, result.likelihood_evaluations
    );
    output::save_classical_result(&cli.output, model, &result)?;
    output::save_rolling_ks(&cli.output, &sampler.recorder)?;
    Ok(())
}

fn run_importance(
    cli: &Cli,
    config: &RunConfig,
    model: &BoxModel<impl Fn(&[f64]) -> f64 + Send + Sync>,
    pool: Arc<rayon::ThreadPool>,
) -> Result<()> {
    if cli.resume {
        info!("--resume is only wired for the classical variant in this CLI; starting a fresh importance run");
    }
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let dim = cli.dim;
    let mut sampler = ImportanceSampler::new(
        config.importance.clone(),
        config.reparam,
        Box::new(move || Box::new(GaussianMixtureFlow::new(dim))),
    )?;
    sampler.set_pool(Some(pool));
    let result = sampler.run(model, &mut rng)?;
    info!(
        "logZ = {:.4} +/- {:.4}, {} levels, ESS = {:.1}",
        result.log_z, result.log_z_error, result.levels, result.effective_sample_size
    );
    output::save_importance_result(&cli.output, model, &result)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = run_config(&cli);
    config.validate().context("invalid run configuration")?;

    let bounds = BoxBounds::new(vec![-10.0; cli.dim], vec![10.0; cli.dim]);
    let model = BoxModel::new(
        (0..cli.dim).map(|i| format!("x{i}")).collect(),
        bounds,
        |x: &[f64]| -0.5 * x.iter().map(|v| v * v).sum::<f64>(),
    );

    std::fs::create_dir_all(&cli.output).with_context(|| format!("creating output dir {:?}", cli.output))?;
    let pool = Arc::new(build_pool(cli.n_pool).context("building worker pool")?);

    match config.variant {
        Variant::Classical => run_classical(&cli, &config, &model, pool)?,
        Variant::Importance => run_importance(&cli, &config, &model, pool)?,
    }

    println!("Results saved to {:?}", cli.output);
    Ok(())
}
