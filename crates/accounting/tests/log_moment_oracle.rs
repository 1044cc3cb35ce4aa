//! Moment accuracy against direct numerical integration.
//!
//! `A_α = ∫ N(x; 0, σ²) ((1 - q) + q·exp((2x - 1) / 2σ²))^α dx`, integrated
//! with the trapezoid rule over `[-14σ, α + 14σ]` at step `σ / 256`.

use approx::assert_relative_eq;
use rdp_accounting::compute_log_a;
use rdp_accounting_core::{log_add, log_sum_exp};

const TAILS: f64 = 14.0;
const STEPS_PER_SIGMA: f64 = 256.0;

/// Log of the likelihood ratio `μ(x) / μ0(x)`.
fn log_ratio(q: f64, sigma: f64, x: f64) -> f64 {
    let z = (2.0 * x - 1.0) / (2.0 * sigma * sigma);
    log_add((-q).ln_1p(), q.ln() + z)
}

fn log_density(sigma: f64, x: f64) -> f64 {
    -0.5 * (2.0 * std::f64::consts::PI).ln() - sigma.ln() - x * x / (2.0 * sigma * sigma)
}

fn grid(sigma: f64, alpha: f64) -> (f64, f64, usize) {
    let lo = -TAILS * sigma;
    let hi = alpha + TAILS * sigma;
    let h = sigma / STEPS_PER_SIGMA;
    (lo, h, ((hi - lo) / h) as usize + 1)
}

/// `log(A_α)` by trapezoid integration.
///
/// Small moments lose all precision in log space, so below `1e-2` the
/// excess `A_α - 1` is integrated directly instead.
fn oracle_log_a(q: f64, sigma: f64, alpha: f64) -> f64 {
    let (lo, h, n) = grid(sigma, alpha);
    let log_a = log_sum_exp(
        (0..n)
            .map(|k| lo + k as f64 * h)
            .map(|x| log_density(sigma, x) + alpha * log_ratio(q, sigma, x)),
    ) + h.ln();
    if log_a >= 1e-2 {
        return log_a;
    }

    let excess: f64 = (0..n)
        .map(|k| lo + k as f64 * h)
        .map(|x| {
            let z = (2.0 * x - 1.0) / (2.0 * sigma * sigma);
            let u = if z < 700.0 {
                alpha * (q * z.exp_m1()).ln_1p()
            } else {
                alpha * log_ratio(q, sigma, x)
            };
            let lw = log_density(sigma, x);
            if u > 30.0 {
                (lw + u).exp()
            } else {
                lw.exp() * u.exp_m1()
            }
        })
        .sum();
    (excess * h).ln_1p()
}

#[test]
fn moments_match_numerical_integration() {
    let grid = [
        (1e-7, 0.1, 1.01),
        (1e-6, 0.1, 256.0),
        (1e-5, 0.1, 256.1),
        (1e-6, 1.0, 27.0),
        (1e-4, 1.0, 1.5),
        (1e-3, 1.0, 2.0),
        (0.01, 10.0, 20.0),
        (0.1, 100.0, 20.5),
        (0.99, 0.1, 256.0),
        (0.999, 100.0, 256.1),
    ];
    for (q, sigma, alpha) in grid {
        let log_a = compute_log_a(q, sigma, alpha).expect("log moment");
        let expected = oracle_log_a(q, sigma, alpha);
        assert_relative_eq!(log_a, expected, max_relative = 1e-4);
    }
}

#[test]
fn fractional_orders_agree_with_integration_at_moderate_noise() {
    for (q, sigma, alpha) in [(0.41, 15.8, 59.4), (0.05, 0.8, 3.3), (0.3, 2.0, 7.75)] {
        let log_a = compute_log_a(q, sigma, alpha).expect("log moment");
        let expected = oracle_log_a(q, sigma, alpha);
        assert_relative_eq!(log_a, expected, max_relative = 1e-4);
    }
}
