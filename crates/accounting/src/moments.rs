//! Rényi moments of the (subsampled) Gaussian mechanism.
//!
//! For `μ0 = N(0, σ²)`, `μ1 = N(1, σ²)` and the Poisson mixture
//! `μ = (1 - q)·μ0 + q·μ1`, the moment is
//! `A_α = E_{x∼μ0}[(μ(x)/μ0(x))^α]` and the RDP of one step at order `α` is
//! `log(A_α) / (α - 1)`. Every routine here returns `log(A_α)`.
//!
//! Integer orders use the exact binomial expansion. Fractional orders split the
//! integral at the point where the two mixture components cross and sum two
//! convergent series weighted by Gaussian tails. Sampling without replacement
//! uses the moment bound of Wang, Balle and Kasiviswanathan (2019), which is
//! defined at integer orders and interpolated in between.

use std::f64::consts::{LN_2, SQRT_2};

use rdp_accounting_core::logspace::{
    log_add, log_binomial, log_erfc, log_factorials, log_sub, SignedLog,
};
use rdp_accounting_core::{DpError, Result};

use crate::orders::{is_integer, validate_order};
use crate::params::{validate_noise_multiplier, validate_sampling_prob, Sampler};

/// Terms below `exp(FRACTIONAL_TAIL_CUTOFF)` end the fractional series.
const FRACTIONAL_TAIL_CUTOFF: f64 = -30.0;

/// Upper bound on series terms before reporting non-convergence. Integer
/// orders above it are rejected up front since their expansion has `α + 1`
/// terms.
const MAX_SERIES_TERMS: usize = 1_000_000;

/// Largest order for which the without-replacement bound uses forward
/// differences; above it the cheaper term-wise bound is used.
const MAX_FORWARD_DIFF_ORDER: usize = 256;

/// `log(A_α)` for the Poisson-subsampled Gaussian mechanism.
pub fn compute_log_a(q: f64, sigma: f64, alpha: f64) -> Result<f64> {
    validate_moment_args(q, sigma, alpha)?;
    if let Some(v) = closed_form_log_a(q, sigma, alpha) {
        return Ok(v);
    }
    if is_integer(alpha) {
        Ok(log_a_int(q, sigma, series_order(alpha)?))
    } else {
        log_a_frac(q, sigma, alpha)
    }
}

/// Log of the Rényi moment bound for sampling without replacement.
///
/// At fractional orders the cumulant generating function `log(A_α)` is
/// linearly interpolated between `⌊α⌋` and `⌈α⌉`, which keeps it an upper
/// bound by convexity.
pub fn compute_log_a_without_replacement(q: f64, sigma: f64, alpha: f64) -> Result<f64> {
    validate_moment_args(q, sigma, alpha)?;
    if let Some(v) = closed_form_log_a(q, sigma, alpha) {
        return Ok(v);
    }
    if is_integer(alpha) {
        return Ok(log_a_without_replacement_int(q, sigma, series_order(alpha)?));
    }
    let floor = alpha.floor();
    let t = alpha - floor;
    let lower_order = series_order(floor)?;
    let upper_order = series_order(floor + 1.0)?;
    let lower = log_a_without_replacement_int(q, sigma, lower_order);
    let upper = log_a_without_replacement_int(q, sigma, upper_order);
    Ok((1.0 - t) * lower + t * upper)
}

/// `log(A_α)` under the given sampling discipline.
pub fn log_moment(sampler: Sampler, q: f64, sigma: f64, alpha: f64) -> Result<f64> {
    match sampler {
        Sampler::Poisson => compute_log_a(q, sigma, alpha),
        Sampler::WithoutReplacement => compute_log_a_without_replacement(q, sigma, alpha),
    }
}

fn validate_moment_args(q: f64, sigma: f64, alpha: f64) -> Result<()> {
    validate_sampling_prob(q)?;
    validate_noise_multiplier(sigma)?;
    validate_order(alpha)
}

/// Integer order as a term count, if the expansion is small enough to sum.
fn series_order(alpha: f64) -> Result<usize> {
    if alpha > MAX_SERIES_TERMS as f64 {
        return Err(DpError::numerical(format!(
            "order {alpha} needs more than {MAX_SERIES_TERMS} series terms"
        )));
    }
    Ok(alpha as usize)
}

/// Exact results that need no series: no sampling, no noise, infinite noise,
/// full-batch sampling and the infinite order.
fn closed_form_log_a(q: f64, sigma: f64, alpha: f64) -> Option<f64> {
    if q == 0.0 || sigma == f64::INFINITY {
        return Some(0.0);
    }
    if alpha == f64::INFINITY || sigma == 0.0 {
        return Some(f64::INFINITY);
    }
    if q == 1.0 {
        return Some(alpha * (alpha - 1.0) / (2.0 * sigma * sigma));
    }
    None
}

/// Binomial expansion for integer `alpha`:
/// `A_α = Σ_i C(α, i) q^i (1-q)^(α-i) exp((i² - i) / (2σ²))`.
fn log_a_int(q: f64, sigma: f64, alpha: usize) -> f64 {
    let log_fact = log_factorials(alpha);
    let log_q = q.ln();
    let log_1mq = (-q).ln_1p();
    let two_sigma_sq = 2.0 * sigma * sigma;
    let alpha_f = alpha as f64;

    let mut log_a = f64::NEG_INFINITY;
    for i in 0..=alpha {
        let i_f = i as f64;
        let log_coef = log_binomial(&log_fact, alpha, i) + i_f * log_q + (alpha_f - i_f) * log_1mq;
        log_a = log_add(log_a, log_coef + (i_f * i_f - i_f) / two_sigma_sq);
    }
    log_a
}

/// Series for fractional `alpha`, split at `z0` where `q·μ1 = (1-q)·μ0`.
fn log_a_frac(q: f64, sigma: f64, alpha: f64) -> Result<f64> {
    let log_q = q.ln();
    let log_1mq = (-q).ln_1p();
    let two_sigma_sq = 2.0 * sigma * sigma;
    let sqrt2_sigma = SQRT_2 * sigma;
    let z0 = sigma * sigma * (1.0 / q - 1.0).ln() + 0.5;

    let mut log_a0 = f64::NEG_INFINITY;
    let mut log_a1 = f64::NEG_INFINITY;
    // Generalized binomial coefficient C(alpha, i), as sign and log-magnitude.
    let mut log_coef = 0.0;
    let mut coef_negative = false;

    for i in 0..MAX_SERIES_TERMS {
        let i_f = i as f64;
        if i > 0 {
            let factor = alpha - i_f + 1.0;
            log_coef += factor.abs().ln() - i_f.ln();
            if factor < 0.0 {
                coef_negative = !coef_negative;
            }
        }
        let j = alpha - i_f;

        let log_t0 = log_coef + i_f * log_q + j * log_1mq;
        let log_t1 = log_coef + j * log_q + i_f * log_1mq;

        let log_e0 = -LN_2 + log_erfc((i_f - z0) / sqrt2_sigma);
        let log_e1 = -LN_2 + log_erfc((z0 - j) / sqrt2_sigma);

        let log_s0 = log_t0 + (i_f * i_f - i_f) / two_sigma_sq + log_e0;
        let log_s1 = log_t1 + (j * j - j) / two_sigma_sq + log_e1;

        if coef_negative {
            log_a0 = log_sub(log_a0, log_s0)?;
            log_a1 = log_sub(log_a1, log_s1)?;
        } else {
            log_a0 = log_add(log_a0, log_s0);
            log_a1 = log_add(log_a1, log_s1);
        }

        // Terms only decay once i exceeds alpha; earlier small terms may still
        // precede the bulk of the sum.
        if i_f > alpha && log_s0.max(log_s1) < FRACTIONAL_TAIL_CUTOFF {
            tracing::trace!(q, sigma, alpha, terms = i + 1, "fractional moment series converged");
            return Ok(log_add(log_a0, log_a1));
        }
    }

    Err(DpError::numerical(format!(
        "moment series did not converge for q={q}, sigma={sigma}, alpha={alpha}"
    )))
}

/// Without-replacement moment bound at integer `alpha`.
///
/// `A_α ≤ 1 + q²·C(α,2)·min(4(e^{ε(2)} - 1), 2e^{ε(2)})
///        + Σ_{j≥3} q^j·C(α,j)·min(4·√(B(2⌊j/2⌋)·B(2⌈j/2⌉)), 2e^{(j-1)ε(j)})`
/// with `ε(j) = j / (2σ²)` and `B(l)` the `l`-th forward difference of
/// `i ↦ exp((i - 1)·ε(i))` at zero.
fn log_a_without_replacement_int(q: f64, sigma: f64, alpha: usize) -> f64 {
    if alpha <= 1 {
        return 0.0;
    }
    let two_sigma_sq = 2.0 * sigma * sigma;
    let cgf = |x: f64| x * (x + 1.0) / two_sigma_sq;
    let eps_2 = 2.0 / two_sigma_sq;
    // log(e^{ε(2)} - 1)
    let log_f2m1 = eps_2 + (-(-eps_2).exp_m1()).ln();
    let ln_4 = 2.0 * LN_2;

    let log_fact = log_factorials(alpha);
    let log_q = q.ln();

    let mut log_a = 0.0;
    log_a = log_add(
        log_a,
        2.0 * log_q
            + log_binomial(&log_fact, alpha, 2)
            + (ln_4 + log_f2m1).min(eps_2 + LN_2),
    );

    if alpha <= MAX_FORWARD_DIFF_ORDER {
        let deltas = forward_differences(two_sigma_sq, alpha);
        for i in 3..=alpha {
            let lo = 2 * (i / 2);
            let hi = 2 * ((i + 1) / 2);
            let s = (ln_4 + 0.5 * (deltas[lo] + deltas[hi])).min(LN_2 + cgf((i - 1) as f64));
            log_a = log_add(
                log_a,
                s + i as f64 * log_q + log_binomial(&log_fact, alpha, i),
            );
        }
    } else {
        for i in 3..=alpha {
            let s = LN_2 + cgf((i - 1) as f64);
            log_a = log_add(
                log_a,
                s + i as f64 * log_q + log_binomial(&log_fact, alpha, i),
            );
        }
    }
    log_a
}

/// `log|Δ^k g(0)|` for `k = 0..=n+1`, where `log g(i) = (i - 1)·i / (2σ²)`.
fn forward_differences(two_sigma_sq: f64, n: usize) -> Vec<f64> {
    let len = n + 2;
    let mut values: Vec<SignedLog> = (0..len)
        .map(|i| {
            let i_f = i as f64;
            SignedLog::positive((i_f - 1.0) * i_f / two_sigma_sq)
        })
        .collect();

    let mut deltas = Vec::with_capacity(len);
    deltas.push(values[0].log_abs);
    for k in 1..len {
        for m in 0..len - k {
            values[m] = values[m + 1] - values[m];
        }
        values.truncate(len - k);
        deltas.push(values[0].log_abs);
    }
    deltas
}
