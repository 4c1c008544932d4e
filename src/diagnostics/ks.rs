//! C3 — the insertion-index diagnostic oracle.
//!
//! A two-sided Kolmogorov-Smirnov test of the observed insertion indices
//! against the discrete uniform distribution on `{0, ..., nlive - 1}`,
//! grounded in `NestedSampler.check_insertion_indices`
//! (`original_source/flowproposal/nestedsampler.py`), which calls
//! `compute_indices_ks_test` in rolling (last `nlive` indices) and final
//! (whole run) modes. The test is purely diagnostic and never aborts a
//! run.

/// Two-sided KS statistic and asymptotic p-value for `indices` against
/// the discrete uniform distribution on `{0, ..., nlive - 1}`.
///
/// Returns `p = None` when fewer than `nlive` indices are available —
/// the statistic is still well-defined on a short history, but a
/// p-value computed from too few draws is not meaningful.
pub fn ks_test(indices: &[usize], nlive: usize) -> (f64, Option<f64>) {
    let n = indices.len();
    if n == 0 || nlive == 0 {
        return (0.0, None);
    }

    let mut sorted = indices.to_vec();
    sorted.sort_unstable();

    let mut d_max = 0.0_f64;
    let mut cumulative = 0usize;
    let mut idx = 0usize;
    for i in 0..nlive {
        while idx < sorted.len() && sorted[idx] <= i {
            cumulative += 1;
            idx += 1;
        }
        let f_emp = cumulative as f64 / n as f64;
        let f_theory = (i + 1) as f64 / nlive as f64;
        d_max = d_max.max((f_emp - f_theory).abs());
    }

    let p = if n < nlive {
        None
    } else {
        Some(kolmogorov_asymptotic_p(d_max, n))
    };
    (d_max, p)
}

/// Asymptotic two-sided Kolmogorov distribution p-value (the same
/// large-sample approximation most KS implementations fall back to),
/// via the Kolmogorov series with the standard finite-sample
/// correction factor.
fn kolmogorov_asymptotic_p(d: f64, n: usize) -> f64 {
    let sqrt_n = (n as f64).sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * d;
    if lambda < 0.2 {
        return 1.0;
    }
    let mut sum = 0.0;
    for k in 1..=100 {
        let term = (-1.0_f64).powi(k - 1) * (-2.0 * (k as f64).powi(2) * lambda * lambda).exp();
        sum += term;
        if term.abs() < 1e-12 {
            break;
        }
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn exact_uniform_coverage_gives_zero_statistic() {
        let nlive = 10;
        let indices: Vec<usize> = (0..nlive).collect();
        let (d, p) = ks_test(&indices, nlive);
        assert!(d < 1e-9);
        assert!(p.unwrap() > 0.99);
    }

    #[test]
    fn fewer_than_nlive_indices_has_no_p_value() {
        let (_, p) = ks_test(&[0, 1, 2], 10);
        assert!(p.is_none());
    }

    #[test]
    fn all_insertions_at_rank_zero_is_detected_as_non_uniform() {
        let nlive = 20;
        let indices = vec![0usize; nlive * 5];
        let (d, p) = ks_test(&indices, nlive);
        assert!(d > 0.5);
        assert!(p.unwrap() < 0.01);
    }

    #[test]
    fn uniform_random_indices_pass_with_high_probability_across_seeds() {
        let nlive = 200;
        for seed in 0..5u64 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let indices: Vec<usize> = (0..(10 * nlive))
                .map(|_| rng.gen_range(0..nlive))
                .collect();
            let (_, p) = ks_test(&indices, nlive);
            assert!(p.unwrap() >= 0.01, "seed {seed} produced p={:?}", p);
        }
    }
}
