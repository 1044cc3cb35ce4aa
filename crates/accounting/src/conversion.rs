//! Conversion of RDP curves to `(epsilon, delta)` guarantees.
//!
//! Uses the bound of Canonne, Kamath and Steinke (2020), tightened per order
//! by the KL-divergence bound on delta.

use serde::{Deserialize, Serialize};

use rdp_accounting_core::{DpError, Result};

use crate::orders::validate_order;

/// Below this order the conversion bound is numerically useless.
const MIN_USEFUL_ORDER: f64 = 1.01;

/// An `(epsilon, delta)` guarantee and the order that achieved it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrivacySpent {
    /// Privacy loss bound.
    pub epsilon: f64,
    /// Failure probability.
    pub delta: f64,
    /// Rényi order at which the bound is tightest.
    pub optimal_order: f64,
}

/// Which side of the guarantee is fixed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyTarget {
    /// Fix delta and solve for epsilon.
    Delta(f64),
    /// Fix epsilon and solve for delta.
    Epsilon(f64),
}

/// Convert an RDP curve given exactly one of `target_delta` and `target_eps`.
pub fn get_privacy_spent(
    orders: &[f64],
    rdp: &[f64],
    target_delta: Option<f64>,
    target_eps: Option<f64>,
) -> Result<PrivacySpent> {
    let target = match (target_delta, target_eps) {
        (Some(delta), None) => PrivacyTarget::Delta(delta),
        (None, Some(eps)) => PrivacyTarget::Epsilon(eps),
        _ => {
            return Err(DpError::invalid(
                "exactly one of target_delta and target_eps must be given",
            ))
        }
    };
    privacy_spent(orders, rdp, target)
}

/// Convert an RDP curve for the given target.
pub fn privacy_spent(orders: &[f64], rdp: &[f64], target: PrivacyTarget) -> Result<PrivacySpent> {
    let spent = match target {
        PrivacyTarget::Delta(delta) => {
            let (epsilon, optimal_order) = compute_epsilon(orders, rdp, delta)?;
            PrivacySpent {
                epsilon,
                delta,
                optimal_order,
            }
        }
        PrivacyTarget::Epsilon(epsilon) => {
            let (delta, optimal_order) = compute_delta(orders, rdp, epsilon)?;
            PrivacySpent {
                epsilon,
                delta,
                optimal_order,
            }
        }
    };
    tracing::debug!(
        epsilon = spent.epsilon,
        delta = spent.delta,
        optimal_order = spent.optimal_order,
        "converted RDP curve"
    );
    Ok(spent)
}

/// Smallest epsilon at `delta`, with the order achieving it.
pub fn compute_epsilon(orders: &[f64], rdp: &[f64], delta: f64) -> Result<(f64, f64)> {
    validate_curve(orders, rdp)?;
    if delta.is_nan() || delta <= 0.0 || delta > 1.0 {
        return Err(DpError::invalid(format!(
            "target delta must be in (0, 1], got {delta}"
        )));
    }

    let (eps, order) = argmin(orders, rdp, |alpha, r| epsilon_at(alpha, r, delta));
    Ok((eps.max(0.0), order))
}

/// Smallest delta at `epsilon`, with the order achieving it.
pub fn compute_delta(orders: &[f64], rdp: &[f64], epsilon: f64) -> Result<(f64, f64)> {
    validate_curve(orders, rdp)?;
    if epsilon.is_nan() || epsilon < 0.0 {
        return Err(DpError::invalid(format!(
            "target epsilon must be non-negative, got {epsilon}"
        )));
    }

    let (log_delta, order) = argmin(orders, rdp, |alpha, r| log_delta_at(alpha, r, epsilon));
    Ok((log_delta.exp().min(1.0), order))
}

fn validate_curve(orders: &[f64], rdp: &[f64]) -> Result<()> {
    if orders.is_empty() {
        return Err(DpError::invalid("orders must not be empty"));
    }
    if orders.len() != rdp.len() {
        return Err(DpError::invalid(format!(
            "orders and rdp must have the same length (got {} and {})",
            orders.len(),
            rdp.len()
        )));
    }
    for (&alpha, &r) in orders.iter().zip(rdp) {
        validate_order(alpha)?;
        if r.is_nan() || r < 0.0 {
            return Err(DpError::invalid(format!(
                "RDP values must be non-negative, got {r} at order {alpha}"
            )));
        }
    }
    Ok(())
}

/// Minimum of `f` over the curve; ties go to the larger order.
fn argmin<F>(orders: &[f64], rdp: &[f64], f: F) -> (f64, f64)
where
    F: Fn(f64, f64) -> f64,
{
    let mut best = (f64::INFINITY, f64::NEG_INFINITY);
    for (&alpha, &r) in orders.iter().zip(rdp) {
        let value = f(alpha, r);
        if value < best.0 || (value == best.0 && alpha > best.1) {
            best = (value, alpha);
        }
    }
    best
}

fn epsilon_at(alpha: f64, r: f64, delta: f64) -> f64 {
    // The KL bound already certifies epsilon = 0.
    if delta * delta + (-r).exp_m1() >= 0.0 {
        return 0.0;
    }
    if alpha == f64::INFINITY {
        return r;
    }
    if alpha > MIN_USEFUL_ORDER {
        r + (-1.0 / alpha).ln_1p() - (delta * alpha).ln() / (alpha - 1.0)
    } else {
        f64::INFINITY
    }
}

fn log_delta_at(alpha: f64, r: f64, epsilon: f64) -> f64 {
    let kl_bound = 0.5 * (-(-r).exp()).ln_1p();
    if alpha == f64::INFINITY {
        return if r <= epsilon {
            f64::NEG_INFINITY
        } else {
            kl_bound
        };
    }
    if alpha > MIN_USEFUL_ORDER {
        let rdp_bound = (alpha - 1.0) * (r - epsilon + (-1.0 / alpha).ln_1p()) - alpha.ln();
        kl_bound.min(rdp_bound)
    } else {
        kl_bound
    }
}
