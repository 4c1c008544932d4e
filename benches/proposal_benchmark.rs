//! Benchmarks for the two hot paths the core spends its time in: the
//! proposal driver's reject/accept loop (C5) and live-point insertion
//! (C2), following `nmodes`'s `benches/saem_benchmark.rs` structure
//! (one `criterion_group` per subsystem, `black_box` on every input).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use nested_sampler::{BoxBounds, BoxModel, GaussianMixtureFlow, ProposalConfig, ProposalDriver, ProposalKind, Sample};

fn benchmark_proposal_draw(c: &mut Criterion) {
    let model = BoxModel::new(
        vec!["x".into(), "y".into()],
        BoxBounds::new(vec![-5.0, -5.0], vec![5.0, 5.0]),
        |x: &[f64]| -0.5 * x.iter().map(|v| v * v).sum::<f64>(),
    );
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut driver = ProposalDriver::new(
        Box::new(GaussianMixtureFlow::new(2)),
        ProposalConfig {
            kind: ProposalKind::Analytic,
            acceptance_threshold: 1e-6,
            ..ProposalConfig::default()
        },
    );
    let seed = Sample::new(vec![0.0, 0.0], 0.0, 0.0);

    c.bench_function("proposal_draw_analytic", |b| {
        b.iter(|| {
            driver
                .draw(black_box(&model), black_box(-10.0), black_box(&seed), black_box(&mut rng))
                .unwrap()
        })
    });
}

fn benchmark_live_point_insert(c: &mut Criterion) {
    use nested_sampler::LivePointStore;

    c.bench_function("live_point_insert_1000", |b| {
        b.iter_batched(
            || {
                let mut rng = ChaCha8Rng::seed_from_u64(7);
                let model = BoxModel::new(vec!["x".into()], BoxBounds::unit(1), |x: &[f64]| x[0]);
                LivePointStore::populate(
                    &model,
                    &mut ProposalDriver::new(Box::new(GaussianMixtureFlow::new(1)), ProposalConfig::default()),
                    1000,
                    &mut rng,
                )
                .unwrap()
            },
            |mut store| {
                let new = Sample::new(vec![0.5], 0.0, 0.5);
                black_box(store.insert(black_box(new)))
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, benchmark_proposal_draw, benchmark_live_point_insert);
criterion_main!(benches);
