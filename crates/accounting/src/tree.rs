//! Tree aggregation with restarts.
//!
//! Each restart segment of `s` steps is a binary tree of depth
//! `floor(log2 s) + 1`; an example contributes to one node per level, so the
//! whole schedule behaves like one Gaussian release with its sensitivity
//! scaled by the total depth.

use serde::{Deserialize, Serialize};

use rdp_accounting_core::{DpError, Result};

use crate::orders::{validate_orders, Orders};
use crate::params::{validate_noise_multiplier, Sampler};
use crate::rdp::single_step_rdp;

/// Steps between tree restarts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeSchedule {
    /// One tree without restarts.
    Single(u64),
    /// One tree per entry.
    Restarts(Vec<u64>),
}

impl TreeSchedule {
    /// Segment lengths in order.
    pub fn segments(&self) -> &[u64] {
        match self {
            Self::Single(steps) => std::slice::from_ref(steps),
            Self::Restarts(steps) => steps,
        }
    }

    /// Check that the schedule is non-empty with positive entries.
    pub fn validate(&self) -> Result<()> {
        let segments = self.segments();
        if segments.is_empty() {
            return Err(DpError::invalid("tree schedule must not be empty"));
        }
        if segments.contains(&0) {
            return Err(DpError::invalid(
                "tree schedule entries must be positive step counts",
            ));
        }
        Ok(())
    }

    /// Sum of per-segment tree depths.
    pub fn total_depth(&self) -> u64 {
        self.segments().iter().map(|&s| tree_depth(s)).sum()
    }
}

impl From<u64> for TreeSchedule {
    fn from(steps: u64) -> Self {
        Self::Single(steps)
    }
}

impl From<Vec<u64>> for TreeSchedule {
    fn from(steps: Vec<u64>) -> Self {
        Self::Restarts(steps)
    }
}

impl From<&[u64]> for TreeSchedule {
    fn from(steps: &[u64]) -> Self {
        Self::Restarts(steps.to_vec())
    }
}

impl<const N: usize> From<[u64; N]> for TreeSchedule {
    fn from(steps: [u64; N]) -> Self {
        Self::Restarts(steps.to_vec())
    }
}

/// Depth of a binary tree over `steps` leaves: the bit length of `steps`.
fn tree_depth(steps: u64) -> u64 {
    u64::from(u64::BITS - steps.leading_zeros())
}

/// RDP of tree aggregation with the given restart schedule.
pub fn compute_rdp_tree_restart<S, O>(
    noise_multiplier: f64,
    schedule: S,
    orders: O,
) -> Result<O::Curve>
where
    S: Into<TreeSchedule>,
    O: Orders,
{
    validate_noise_multiplier(noise_multiplier)?;
    let schedule = schedule.into();
    schedule.validate()?;
    validate_orders(orders.as_slice())?;

    if noise_multiplier == 0.0 {
        return orders.map_orders(|_| Ok(f64::INFINITY));
    }

    let depth = schedule.total_depth();
    let effective_sigma = noise_multiplier / (depth as f64).sqrt();
    tracing::trace!(
        noise_multiplier,
        depth,
        effective_sigma,
        "tree aggregation reduced to a Gaussian release"
    );
    orders.map_orders(|alpha| single_step_rdp(Sampler::Poisson, 1.0, effective_sigma, alpha))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdp::compute_rdp;

    #[test]
    fn depth_is_bit_length() {
        assert_eq!(tree_depth(1), 1);
        assert_eq!(tree_depth(2), 2);
        assert_eq!(tree_depth(3), 2);
        assert_eq!(tree_depth(4), 3);
        assert_eq!(tree_depth(1023), 10);
        assert_eq!(tree_depth(1024), 11);
        assert_eq!(tree_depth(u64::MAX), 64);
    }

    #[test]
    fn matches_closed_form() {
        // 1000 steps give depth 10; 24 give depth 5.
        let rdp = compute_rdp_tree_restart(2.0, vec![1000_u64, 24], 3.0).unwrap();
        let expected = 3.0 * 15.0 / 8.0;
        assert!((rdp - expected).abs() <= 1e-12 * expected);
    }

    #[test]
    fn single_leaf_trees_are_gaussian_composition() {
        let orders = [1.5, 2.0, 10.0, 100.0];
        let tree = compute_rdp_tree_restart(1.7, vec![1_u64; 12], &orders).unwrap();
        let gaussian = compute_rdp(1.0, 1.7, 12, &orders).unwrap();
        for (t, g) in tree.iter().zip(&gaussian) {
            assert!((t - g).abs() <= 1e-12 * g);
        }
    }

    #[test]
    fn zero_noise_is_unbounded() {
        let rdp = compute_rdp_tree_restart(0.0, 10_u64, [2.0, 5.0]).unwrap();
        assert!(rdp.iter().all(|r| r.is_infinite()));
    }

    #[test]
    fn infinite_order() {
        assert_eq!(
            compute_rdp_tree_restart(1.0, 8_u64, f64::INFINITY).unwrap(),
            f64::INFINITY
        );
        assert_eq!(
            compute_rdp_tree_restart(f64::INFINITY, 8_u64, f64::INFINITY).unwrap(),
            0.0
        );
    }

    #[test]
    fn rejects_invalid_inputs() {
        let err = compute_rdp_tree_restart(-1.0, 10_u64, 2.0).unwrap_err();
        assert!(err.to_string().contains("must be"));
        assert!(compute_rdp_tree_restart(f64::NAN, 10_u64, 2.0).is_err());
        assert!(compute_rdp_tree_restart(1.0, Vec::<u64>::new(), 2.0).is_err());
        assert!(compute_rdp_tree_restart(1.0, 0_u64, 2.0).is_err());
        assert!(compute_rdp_tree_restart(1.0, [5_u64, 0, 3], 2.0).is_err());
        assert!(compute_rdp_tree_restart(1.0, 10_u64, 0.5).is_err());
    }

    #[test]
    fn schedule_deserializes_scalar_or_list() {
        let single: TreeSchedule = serde_json::from_str("16").expect("scalar");
        assert_eq!(single, TreeSchedule::Single(16));
        let restarts: TreeSchedule = serde_json::from_str("[4, 4]").expect("list");
        assert_eq!(restarts.total_depth(), 6);
    }
}
