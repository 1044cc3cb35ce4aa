//! Rényi Differential Privacy of the subsampled Gaussian mechanism.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use rdp_accounting_core::{DpError, Result};

use crate::conversion::{privacy_spent, PrivacySpent, PrivacyTarget};
use crate::event::DpEvent;
use crate::moments::log_moment;
use crate::orders::{default_orders, validate_orders, Orders};
use crate::params::{GaussianMechanism, Sampler};
use crate::tree::{compute_rdp_tree_restart, TreeSchedule};

/// RDP of the Poisson-subsampled Gaussian mechanism applied `steps` times.
///
/// A scalar order yields a scalar; a collection of orders yields a `Vec`
/// aligned with it.
pub fn compute_rdp<O: Orders>(
    sampling_prob: f64,
    noise_multiplier: f64,
    steps: u64,
    orders: O,
) -> Result<O::Curve> {
    let mechanism = GaussianMechanism::new(sampling_prob, noise_multiplier, steps)?;
    mechanism_rdp(Sampler::Poisson, &mechanism, orders)
}

/// RDP of the Gaussian mechanism on batches sampled without replacement,
/// applied `steps` times.
pub fn compute_rdp_sample_without_replacement<O: Orders>(
    sampling_prob: f64,
    noise_multiplier: f64,
    steps: u64,
    orders: O,
) -> Result<O::Curve> {
    let mechanism = GaussianMechanism::new(sampling_prob, noise_multiplier, steps)?;
    mechanism_rdp(Sampler::WithoutReplacement, &mechanism, orders)
}

/// RDP of a sequence of Poisson-subsampled Gaussian mechanisms, the `i`-th
/// applied `steps[i]` times.
pub fn compute_heterogeneous_rdp<O: Orders>(
    sampling_probs: &[f64],
    noise_multipliers: &[f64],
    steps: &[u64],
    orders: O,
) -> Result<O::Curve> {
    if sampling_probs.len() != noise_multipliers.len() || sampling_probs.len() != steps.len() {
        return Err(DpError::invalid(format!(
            "sampling probabilities, noise multipliers and steps must have the same length \
             (got {}, {} and {})",
            sampling_probs.len(),
            noise_multipliers.len(),
            steps.len()
        )));
    }
    let mechanisms = sampling_probs
        .iter()
        .zip(noise_multipliers)
        .zip(steps)
        .map(|((&q, &sigma), &n)| GaussianMechanism::new(q, sigma, n))
        .collect::<Result<Vec<_>>>()?;
    validate_orders(orders.as_slice())?;

    orders.map_orders(|alpha| {
        mechanisms
            .iter()
            .map(|m| composed_rdp(Sampler::Poisson, m, alpha))
            .sum()
    })
}

fn mechanism_rdp<O: Orders>(
    sampler: Sampler,
    mechanism: &GaussianMechanism,
    orders: O,
) -> Result<O::Curve> {
    validate_orders(orders.as_slice())?;
    orders.map_orders(|alpha| composed_rdp(sampler, mechanism, alpha))
}

/// RDP of `mechanism.steps` applications at a single validated order.
pub(crate) fn composed_rdp(
    sampler: Sampler,
    mechanism: &GaussianMechanism,
    alpha: f64,
) -> Result<f64> {
    if mechanism.steps == 0 {
        return Ok(0.0);
    }
    let per_step = single_step_rdp(
        sampler,
        mechanism.sampling_prob,
        mechanism.noise_multiplier,
        alpha,
    )?;
    Ok(per_step * mechanism.steps as f64)
}

/// RDP of one application at a single validated order.
pub(crate) fn single_step_rdp(sampler: Sampler, q: f64, sigma: f64, alpha: f64) -> Result<f64> {
    if q == 0.0 || sigma == f64::INFINITY {
        return Ok(0.0);
    }
    if alpha == f64::INFINITY || sigma == 0.0 {
        return Ok(f64::INFINITY);
    }
    if q == 1.0 {
        return Ok(alpha / (2.0 * sigma * sigma));
    }
    Ok(log_moment(sampler, q, sigma, alpha)? / (alpha - 1.0))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct StepKey {
    q_bits: u64,
    sigma_bits: u64,
    sampler: Sampler,
}

impl StepKey {
    fn new(sampler: Sampler, q: f64, sigma: f64) -> Self {
        Self {
            q_bits: q.to_bits(),
            sigma_bits: sigma.to_bits(),
            sampler,
        }
    }
}

/// Distinct `(sampler, q, σ)` curves kept before the cache is flushed.
const MAX_CACHED_CURVES: usize = 64;

/// Running RDP curve over a fixed set of orders.
#[derive(Clone, Debug)]
pub struct RdpAccountant {
    orders: Vec<f64>,
    rdp: Vec<f64>,
    step_cache: HashMap<StepKey, Vec<f64>>,
}

impl Default for RdpAccountant {
    fn default() -> Self {
        Self::new()
    }
}

impl RdpAccountant {
    /// Create an accountant with default Rényi orders.
    pub fn new() -> Self {
        let orders = default_orders();
        let rdp = vec![0.0; orders.len()];
        Self {
            orders,
            rdp,
            step_cache: HashMap::new(),
        }
    }

    /// Create an accountant with custom orders.
    pub fn with_orders(orders: Vec<f64>) -> Result<Self> {
        if orders.is_empty() {
            return Err(DpError::invalid("orders must not be empty"));
        }
        validate_orders(&orders)?;
        let rdp = vec![0.0; orders.len()];
        Ok(Self {
            orders,
            rdp,
            step_cache: HashMap::new(),
        })
    }

    /// Orders tracked by this accountant.
    pub fn orders(&self) -> &[f64] {
        &self.orders
    }

    /// Accumulated RDP, aligned with [`orders`](Self::orders).
    pub fn rdp(&self) -> &[f64] {
        &self.rdp
    }

    /// Record one Poisson-subsampled Gaussian step.
    pub fn step(&mut self, noise_multiplier: f64, sampling_prob: f64) -> Result<()> {
        self.steps(noise_multiplier, sampling_prob, 1)
    }

    /// Record `n` identical Poisson-subsampled Gaussian steps.
    pub fn steps(&mut self, noise_multiplier: f64, sampling_prob: f64, n: u64) -> Result<()> {
        let mechanism = GaussianMechanism::new(sampling_prob, noise_multiplier, n)?;
        self.compose_mechanism(Sampler::Poisson, &mechanism)
    }

    /// Record `n` identical steps on batches sampled without replacement.
    pub fn steps_without_replacement(
        &mut self,
        noise_multiplier: f64,
        sampling_prob: f64,
        n: u64,
    ) -> Result<()> {
        let mechanism = GaussianMechanism::new(sampling_prob, noise_multiplier, n)?;
        self.compose_mechanism(Sampler::WithoutReplacement, &mechanism)
    }

    /// Record a mechanism under the given sampling discipline.
    pub fn compose_mechanism(
        &mut self,
        sampler: Sampler,
        mechanism: &GaussianMechanism,
    ) -> Result<()> {
        mechanism.validate()?;
        if mechanism.steps == 0 {
            return Ok(());
        }
        let q = mechanism.sampling_prob;
        let sigma = mechanism.noise_multiplier;

        let key = StepKey::new(sampler, q, sigma);
        if self.step_cache.len() >= MAX_CACHED_CURVES && !self.step_cache.contains_key(&key) {
            self.step_cache.clear();
        }
        let per_step = match self.step_cache.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let curve = self
                    .orders
                    .iter()
                    .map(|&alpha| single_step_rdp(sampler, q, sigma, alpha))
                    .collect::<Result<Vec<_>>>()?;
                entry.insert(curve)
            }
        };

        let n = mechanism.steps as f64;
        for (total, &r) in self.rdp.iter_mut().zip(per_step.iter()) {
            *total += r * n;
        }
        tracing::debug!(
            ?sampler,
            sampling_prob = q,
            noise_multiplier = sigma,
            steps = mechanism.steps,
            "composed Gaussian mechanism"
        );
        self.warn_if_vacuous();
        Ok(())
    }

    /// Record a tree-aggregation schedule.
    pub fn tree_restart(
        &mut self,
        noise_multiplier: f64,
        schedule: impl Into<TreeSchedule>,
    ) -> Result<()> {
        let curve = compute_rdp_tree_restart(noise_multiplier, schedule, &self.orders)?;
        self.add_curve(&curve);
        Ok(())
    }

    /// Record an arbitrary event.
    pub fn compose_event(&mut self, event: &DpEvent) -> Result<()> {
        let curve = event.rdp(&self.orders)?;
        self.add_curve(&curve);
        Ok(())
    }

    fn add_curve(&mut self, curve: &[f64]) {
        for (total, &r) in self.rdp.iter_mut().zip(curve) {
            *total += r;
        }
        self.warn_if_vacuous();
    }

    fn warn_if_vacuous(&self) {
        if self.rdp.iter().all(|r| r.is_infinite()) {
            tracing::warn!("RDP is infinite at every order; the guarantee is vacuous");
        }
    }

    /// Smallest epsilon over the tracked orders at the given delta.
    pub fn epsilon(&self, delta: f64) -> Result<f64> {
        Ok(self.privacy_spent(PrivacyTarget::Delta(delta))?.epsilon)
    }

    /// Smallest delta over the tracked orders at the given epsilon.
    pub fn delta(&self, epsilon: f64) -> Result<f64> {
        Ok(self.privacy_spent(PrivacyTarget::Epsilon(epsilon))?.delta)
    }

    /// Convert the running curve to an `(epsilon, delta)` guarantee.
    pub fn privacy_spent(&self, target: PrivacyTarget) -> Result<PrivacySpent> {
        privacy_spent(&self.orders, &self.rdp, target)
    }

    /// Reset the accumulated privacy loss.
    pub fn reset(&mut self) {
        self.rdp.fill(0.0);
        self.step_cache.clear();
    }
}
