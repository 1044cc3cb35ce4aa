//! Numerically stable arithmetic on values stored as natural logarithms.
//!
//! Rényi moments of the subsampled Gaussian span hundreds of orders of
//! magnitude, so every accumulation in the accountant goes through these
//! helpers instead of multiplying moments directly.

use std::f64::consts::PI;
use std::ops::{Add, Neg, Sub};

use statrs::function::erf::erfc;

use crate::{DpError, Result};

/// Differences above this are beyond `expm1` range; `exp(x) - exp(y)` is then
/// indistinguishable from `exp(x)`.
const EXPM1_OVERFLOW: f64 = 700.0;

/// Numerically stable `log(exp(a) + exp(b))`.
pub fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    if a > b {
        a + (b - a).exp().ln_1p()
    } else {
        b + (a - b).exp().ln_1p()
    }
}

/// Numerically stable `log(exp(a) - exp(b))`.
///
/// Fails when `a < b`, since the difference would be negative.
pub fn log_sub(a: f64, b: f64) -> Result<f64> {
    if a < b {
        return Err(DpError::numerical(format!(
            "log-space subtraction would be negative ({a} < {b})"
        )));
    }
    if b == f64::NEG_INFINITY {
        return Ok(a);
    }
    if a == b {
        return Ok(f64::NEG_INFINITY);
    }
    let diff = a - b;
    if diff > EXPM1_OVERFLOW {
        return Ok(a);
    }
    Ok(diff.exp_m1().ln() + b)
}

/// Sum of an iterator of log-space values.
pub fn log_sum_exp<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values.into_iter().fold(f64::NEG_INFINITY, log_add)
}

/// A real number stored as a sign and the logarithm of its magnitude.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignedLog {
    /// Whether the value is negative.
    pub negative: bool,
    /// Natural log of the absolute value.
    pub log_abs: f64,
}

impl SignedLog {
    /// The value zero.
    pub const ZERO: Self = Self {
        negative: false,
        log_abs: f64::NEG_INFINITY,
    };

    /// A positive value given by its logarithm.
    pub fn positive(log_abs: f64) -> Self {
        Self {
            negative: false,
            log_abs,
        }
    }

    /// Whether this value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.log_abs == f64::NEG_INFINITY
    }
}

impl Neg for SignedLog {
    type Output = Self;

    fn neg(self) -> Self {
        if self.is_zero() {
            return self;
        }
        Self {
            negative: !self.negative,
            log_abs: self.log_abs,
        }
    }
}

impl Add for SignedLog {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        if self.is_zero() {
            return other;
        }
        if other.is_zero() {
            return self;
        }
        if self.negative == other.negative {
            return Self {
                negative: self.negative,
                log_abs: log_add(self.log_abs, other.log_abs),
            };
        }
        // Opposite signs: the larger magnitude keeps its sign.
        let (big, small) = if self.log_abs >= other.log_abs {
            (self, other)
        } else {
            (other, self)
        };
        if big.log_abs == small.log_abs {
            return Self::ZERO;
        }
        Self {
            negative: big.negative,
            log_abs: big.log_abs + (-(small.log_abs - big.log_abs).exp()).ln_1p(),
        }
    }
}

impl Sub for SignedLog {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self + (-other)
    }
}

/// Table of `log(k!)` for `k = 0..=max`.
pub fn log_factorials(max: usize) -> Vec<f64> {
    let mut log_fact = vec![0.0; max.saturating_add(1)];
    for i in 1..log_fact.len() {
        log_fact[i] = log_fact[i - 1] + (i as f64).ln();
    }
    log_fact
}

/// `log C(n, k)` from a table produced by [`log_factorials`] covering `n`.
pub fn log_binomial(log_fact: &[f64], n: usize, k: usize) -> f64 {
    debug_assert!(k <= n && n < log_fact.len());
    log_fact[n] - log_fact[k] - log_fact[n - k]
}

/// `log(erfc(x))`, accurate in the far right tail where `erfc` underflows.
pub fn log_erfc(x: f64) -> f64 {
    let r = erfc(x);
    if r > 0.0 {
        return r.ln();
    }
    log_erfc_asymptotic(x)
}

// Asymptotic expansion of erfc for large positive x.
fn log_erfc_asymptotic(x: f64) -> f64 {
    -PI.ln() / 2.0 - x.ln() - x * x - 0.5 * x.powi(-2) + 0.625 * x.powi(-4)
        - 37.0 / 24.0 * x.powi(-6)
        + 353.0 / 64.0 * x.powi(-8)
}
