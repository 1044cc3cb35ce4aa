//! Rényi Differential Privacy accounting for the subsampled Gaussian
//! mechanism.
//!
//! The entry points compute RDP curves for Poisson subsampling
//! ([`compute_rdp`]), sampling without replacement
//! ([`compute_rdp_sample_without_replacement`]), heterogeneous sequences
//! ([`compute_heterogeneous_rdp`]) and tree aggregation with restarts
//! ([`compute_rdp_tree_restart`]), and convert them to `(epsilon, delta)`
//! guarantees ([`get_privacy_spent`]).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod accountants;
pub mod calibrate;
pub mod conversion;
pub mod event;
pub mod moments;
pub mod orders;
pub mod params;
pub mod rdp;
pub mod tree;

pub use accountants::{DpAccountantConfig, RdpAccountantConfig};
pub use calibrate::calibrate_dp_mechanism;
pub use conversion::{
    compute_delta, compute_epsilon, get_privacy_spent, privacy_spent, PrivacySpent, PrivacyTarget,
};
pub use event::{dpsgd_event, DpEvent};
pub use moments::{compute_log_a, compute_log_a_without_replacement, log_moment};
pub use orders::{default_orders, validate_orders, Orders};
pub use params::{GaussianMechanism, Sampler};
pub use rdp::{
    compute_heterogeneous_rdp, compute_rdp, compute_rdp_sample_without_replacement, RdpAccountant,
};
pub use rdp_accounting_core::{DpError, Result};
pub use tree::{compute_rdp_tree_restart, TreeSchedule};

/// Common imports for privacy accounting.
pub mod prelude {
    pub use crate::{
        calibrate_dp_mechanism, compute_heterogeneous_rdp, compute_rdp,
        compute_rdp_sample_without_replacement, compute_rdp_tree_restart, default_orders,
        dpsgd_event, get_privacy_spent, DpAccountantConfig, DpError, DpEvent, GaussianMechanism,
        Orders, PrivacySpent, PrivacyTarget, RdpAccountant, RdpAccountantConfig, Result, Sampler,
        TreeSchedule,
    };
}
