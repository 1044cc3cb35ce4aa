//! Core primitives shared by the Rényi DP accountant.
//!
//! This crate provides the error type used across the workspace and the
//! log-space arithmetic the moment computations are built on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod logspace;

pub use error::{DpError, Result};
pub use logspace::{
    log_add, log_binomial, log_erfc, log_factorials, log_sub, log_sum_exp, SignedLog,
};

/// Common imports for downstream users.
pub mod prelude {
    pub use crate::{
        log_add, log_binomial, log_erfc, log_factorials, log_sub, log_sum_exp, DpError, Result,
        SignedLog,
    };
}
