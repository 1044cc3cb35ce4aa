//! Mechanism descriptors and input validation.

use serde::{Deserialize, Serialize};

use rdp_accounting_core::{DpError, Result};

/// Sampling discipline used to form each batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampler {
    /// Poisson sampling (each example included independently).
    Poisson,
    /// Fixed-size batches drawn uniformly without replacement.
    WithoutReplacement,
}

/// A (possibly subsampled) Gaussian mechanism applied `steps` times.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaussianMechanism {
    /// Probability that a given example takes part in a step.
    pub sampling_prob: f64,
    /// Noise standard deviation relative to the clipping norm.
    pub noise_multiplier: f64,
    /// Number of identical applications.
    pub steps: u64,
}

impl GaussianMechanism {
    /// Create and validate a mechanism descriptor.
    pub fn new(sampling_prob: f64, noise_multiplier: f64, steps: u64) -> Result<Self> {
        let mechanism = Self {
            sampling_prob,
            noise_multiplier,
            steps,
        };
        mechanism.validate()?;
        Ok(mechanism)
    }

    /// The non-subsampled Gaussian mechanism.
    pub fn gaussian(noise_multiplier: f64, steps: u64) -> Result<Self> {
        Self::new(1.0, noise_multiplier, steps)
    }

    /// Validate parameters.
    pub fn validate(&self) -> Result<()> {
        validate_sampling_prob(self.sampling_prob)?;
        validate_noise_multiplier(self.noise_multiplier)
    }
}

/// Check that a sampling probability lies in `[0, 1]`.
pub fn validate_sampling_prob(q: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&q) {
        return Err(DpError::invalid(format!(
            "sampling probability must be in [0, 1], got {q}"
        )));
    }
    Ok(())
}

/// Check that a noise multiplier is non-negative (infinity is allowed).
pub fn validate_noise_multiplier(sigma: f64) -> Result<()> {
    if sigma.is_nan() || sigma < 0.0 {
        return Err(DpError::invalid(format!(
            "noise multiplier must be non-negative, got {sigma}"
        )));
    }
    Ok(())
}
