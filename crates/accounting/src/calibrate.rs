//! Search for the smallest mechanism parameter that meets an epsilon target.

use rdp_accounting_core::{DpError, Result};

use crate::event::DpEvent;

const MIN_TOLERANCE: f64 = 1e-6;
const MAX_PARAMETER: f64 = 1e6;
const MAX_DOUBLINGS: usize = 60;

/// Calibrate a parameter of a family of events to an `(epsilon, delta)` target.
///
/// `make_event` must produce events whose epsilon does not increase with the
/// parameter, as with a noise multiplier. Starting from `[lower, upper]` the
/// upper end is doubled until it meets the target, then the bracket is
/// bisected for at most `max_iters` rounds or until narrower than `tol`. The
/// returned value always meets the target.
pub fn calibrate_dp_mechanism(
    make_event: impl Fn(f64) -> DpEvent,
    target_epsilon: f64,
    target_delta: f64,
    lower: f64,
    upper: f64,
    tol: f64,
    max_iters: usize,
) -> Result<f64> {
    if !target_epsilon.is_finite() || target_epsilon < 0.0 {
        return Err(DpError::invalid(format!(
            "target epsilon must be finite and non-negative, got {target_epsilon}"
        )));
    }
    if !(target_delta > 0.0 && target_delta < 1.0) {
        return Err(DpError::invalid(format!(
            "target delta must be in (0, 1), got {target_delta}"
        )));
    }
    if lower.is_nan() || upper.is_nan() || tol.is_nan() {
        return Err(DpError::invalid("search bounds and tolerance must not be NaN"));
    }

    let meets_target = |param: f64| -> Result<bool> {
        Ok(make_event(param).epsilon(target_delta)? <= target_epsilon)
    };

    let tol = tol.max(MIN_TOLERANCE);
    let lower = lower.max(0.0);
    if meets_target(lower)? {
        return Ok(lower);
    }

    let (mut lo, mut hi) = expand_bracket(&meets_target, lower, upper.max(lower + tol))?;
    let mut rounds = 0;
    while rounds < max_iters.max(1) && hi - lo > tol {
        let mid = lo + 0.5 * (hi - lo);
        if meets_target(mid)? {
            hi = mid;
        } else {
            lo = mid;
        }
        rounds += 1;
    }
    tracing::debug!(
        parameter = hi,
        width = hi - lo,
        rounds,
        "calibrated mechanism parameter"
    );
    Ok(hi)
}

/// Doubles `hi` until it meets the target; `lo` trails as the last failure.
fn expand_bracket(
    meets_target: impl Fn(f64) -> Result<bool>,
    mut lo: f64,
    mut hi: f64,
) -> Result<(f64, f64)> {
    for _ in 0..=MAX_DOUBLINGS {
        if meets_target(hi)? {
            return Ok((lo, hi));
        }
        if hi >= MAX_PARAMETER {
            break;
        }
        lo = hi;
        hi *= 2.0;
    }
    Err(DpError::invalid(format!(
        "no parameter up to {hi} achieves the target epsilon"
    )))
}
