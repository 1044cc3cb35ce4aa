//! Composable descriptions of DP mechanisms.
//!
//! Events are evaluated against an order grid by the RDP machinery in this
//! crate; composition is additive in RDP.

use serde::{Deserialize, Serialize};

use rdp_accounting_core::{DpError, Result};

use crate::conversion::{compute_epsilon, privacy_spent, PrivacySpent, PrivacyTarget};
use crate::orders::{default_orders, validate_orders, Orders};
use crate::params::{
    validate_noise_multiplier, validate_sampling_prob, GaussianMechanism, Sampler,
};
use crate::rdp::{composed_rdp, single_step_rdp};
use crate::tree::{compute_rdp_tree_restart, TreeSchedule};

/// A composable description of a DP mechanism.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DpEvent {
    /// A Gaussian mechanism with the given noise multiplier.
    Gaussian {
        /// Noise multiplier (standard deviation divided by sensitivity).
        noise_multiplier: f64,
    },
    /// Poisson subsampling applied to an inner event.
    PoissonSampled {
        /// Poisson sampling probability.
        sampling_prob: f64,
        /// The inner event.
        event: Box<DpEvent>,
    },
    /// Fixed-size sampling without replacement applied to an inner event.
    SampledWithoutReplacement {
        /// Batch size divided by dataset size.
        sampling_prob: f64,
        /// The inner event.
        event: Box<DpEvent>,
    },
    /// An event composed with itself multiple times.
    SelfComposed {
        /// The inner event.
        event: Box<DpEvent>,
        /// Number of compositions.
        count: u64,
    },
    /// Sequential composition of heterogeneous events.
    Composed(Vec<DpEvent>),
    /// Gaussian tree aggregation with restarts.
    TreeAggregation {
        /// Noise multiplier of every tree node.
        noise_multiplier: f64,
        /// Steps between restarts.
        schedule: TreeSchedule,
    },
}

impl DpEvent {
    /// RDP of this event at the given orders.
    ///
    /// The whole event is validated before any numerical work.
    pub fn rdp<O: Orders>(&self, orders: O) -> Result<O::Curve> {
        validate_orders(orders.as_slice())?;
        self.validate()?;
        orders.map_orders(|alpha| self.rdp_at(alpha))
    }

    /// Epsilon at `delta` over the default orders.
    pub fn epsilon(&self, delta: f64) -> Result<f64> {
        let orders = default_orders();
        let curve = self.rdp(&orders)?;
        let (epsilon, _) = compute_epsilon(&orders, &curve, delta)?;
        Ok(epsilon)
    }

    /// Convert this event to an `(epsilon, delta)` guarantee over `orders`.
    pub fn privacy_spent(&self, orders: &[f64], target: PrivacyTarget) -> Result<PrivacySpent> {
        let curve = self.rdp(orders)?;
        privacy_spent(orders, &curve, target)
    }

    /// Check parameters and structure of the event tree.
    pub fn validate(&self) -> Result<()> {
        match self {
            DpEvent::Gaussian { noise_multiplier } => validate_noise_multiplier(*noise_multiplier),
            DpEvent::PoissonSampled {
                sampling_prob,
                event,
            } => validate_sampled(Sampler::Poisson, *sampling_prob, event),
            DpEvent::SampledWithoutReplacement {
                sampling_prob,
                event,
            } => validate_sampled(Sampler::WithoutReplacement, *sampling_prob, event),
            DpEvent::SelfComposed { event, .. } => event.validate(),
            DpEvent::Composed(events) => events.iter().try_for_each(DpEvent::validate),
            DpEvent::TreeAggregation {
                noise_multiplier,
                schedule,
            } => {
                validate_noise_multiplier(*noise_multiplier)?;
                schedule.validate()
            }
        }
    }

    fn rdp_at(&self, alpha: f64) -> Result<f64> {
        match self {
            DpEvent::Gaussian { noise_multiplier } => {
                let mechanism = GaussianMechanism::gaussian(*noise_multiplier, 1)?;
                composed_rdp(Sampler::Poisson, &mechanism, alpha)
            }
            DpEvent::PoissonSampled {
                sampling_prob,
                event,
            } => sampled_rdp(Sampler::Poisson, *sampling_prob, event, alpha),
            DpEvent::SampledWithoutReplacement {
                sampling_prob,
                event,
            } => sampled_rdp(Sampler::WithoutReplacement, *sampling_prob, event, alpha),
            DpEvent::SelfComposed { event, count } => {
                if *count == 0 {
                    return Ok(0.0);
                }
                Ok(event.rdp_at(alpha)? * *count as f64)
            }
            DpEvent::Composed(events) => events.iter().map(|e| e.rdp_at(alpha)).sum(),
            DpEvent::TreeAggregation {
                noise_multiplier,
                schedule,
            } => compute_rdp_tree_restart(*noise_multiplier, schedule.clone(), alpha),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            DpEvent::Gaussian { .. } => "gaussian",
            DpEvent::PoissonSampled { .. } => "poisson sampled",
            DpEvent::SampledWithoutReplacement { .. } => "sampled without replacement",
            DpEvent::SelfComposed { .. } => "self composed",
            DpEvent::Composed(_) => "composed",
            DpEvent::TreeAggregation { .. } => "tree aggregation",
        }
    }
}

fn validate_sampled(sampler: Sampler, sampling_prob: f64, event: &DpEvent) -> Result<()> {
    validate_sampling_prob(sampling_prob)?;
    match (sampler, event) {
        (_, DpEvent::Gaussian { noise_multiplier }) => validate_noise_multiplier(*noise_multiplier),
        (_, DpEvent::SelfComposed { event, .. }) => validate_sampled(sampler, sampling_prob, event),
        (
            Sampler::Poisson,
            DpEvent::PoissonSampled {
                sampling_prob: inner,
                event,
            },
        ) => {
            validate_sampling_prob(*inner)?;
            validate_sampled(sampler, sampling_prob * inner, event)
        }
        (_, other) => Err(DpError::unsupported(format!(
            "{sampler:?} sampling of {} events is not supported",
            other.kind()
        ))),
    }
}

/// Sampling distributes over repetitions; nested Poisson rates multiply.
fn sampled_rdp(sampler: Sampler, sampling_prob: f64, event: &DpEvent, alpha: f64) -> Result<f64> {
    match (sampler, event) {
        (_, DpEvent::Gaussian { noise_multiplier }) => {
            single_step_rdp(sampler, sampling_prob, *noise_multiplier, alpha)
        }
        (_, DpEvent::SelfComposed { event, count }) => {
            if *count == 0 {
                return Ok(0.0);
            }
            Ok(sampled_rdp(sampler, sampling_prob, event, alpha)? * *count as f64)
        }
        (
            Sampler::Poisson,
            DpEvent::PoissonSampled {
                sampling_prob: inner,
                event,
            },
        ) => sampled_rdp(sampler, sampling_prob * inner, event, alpha),
        (_, other) => Err(DpError::unsupported(format!(
            "{sampler:?} sampling of {} events is not supported",
            other.kind()
        ))),
    }
}

/// DP-SGD event: Poisson sampled Gaussian repeated `iterations` times.
pub fn dpsgd_event(noise_multiplier: f64, iterations: u64, sampling_prob: f64) -> DpEvent {
    let gaussian = DpEvent::Gaussian { noise_multiplier };
    let sampled = DpEvent::PoissonSampled {
        sampling_prob,
        event: Box::new(gaussian),
    };
    DpEvent::SelfComposed {
        event: Box::new(sampled),
        count: iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdp::{compute_rdp, compute_rdp_sample_without_replacement, RdpAccountant};
    use proptest::prelude::*;

    const ORDERS: [f64; 6] = [1.5, 2.0, 3.5, 8.0, 32.0, 128.0];

    #[test]
    fn epsilon_increases_with_iterations() {
        let e1 = dpsgd_event(2.0, 10, 0.1).epsilon(1e-6).expect("epsilon");
        let e2 = dpsgd_event(2.0, 20, 0.1).epsilon(1e-6).expect("epsilon");
        assert!(e2 >= e1);
    }

    #[test]
    fn dpsgd_event_matches_rdp_accountant() {
        let sigma = 1.5;
        let q = 0.2;
        let steps = 25u64;
        let delta = 1e-6;

        let event_eps = dpsgd_event(sigma, steps, q).epsilon(delta).expect("epsilon");

        let mut acct = RdpAccountant::new();
        acct.steps(sigma, q, steps).expect("steps");
        let acct_eps = acct.epsilon(delta).expect("epsilon");

        assert!((event_eps - acct_eps).abs() <= 1e-9);
    }

    #[test]
    fn plain_gaussian_is_the_full_batch_mechanism() {
        let event = DpEvent::Gaussian {
            noise_multiplier: 2.0,
        };
        let curve = event.rdp(vec![2.0, 8.0, f64::INFINITY]).expect("rdp");
        assert_eq!(curve, vec![2.0 / 8.0, 8.0 / 8.0, f64::INFINITY]);
        let noiseless = DpEvent::Gaussian {
            noise_multiplier: f64::INFINITY,
        };
        assert_eq!(noiseless.rdp(4.0).expect("rdp"), 0.0);
    }

    #[test]
    fn composition_is_additive() {
        let a = dpsgd_event(1.1, 100, 0.01);
        let b = DpEvent::SampledWithoutReplacement {
            sampling_prob: 0.05,
            event: Box::new(DpEvent::Gaussian {
                noise_multiplier: 2.0,
            }),
        };
        let both = DpEvent::Composed(vec![a, b]).rdp(ORDERS).expect("rdp");

        let poisson = compute_rdp(0.01, 1.1, 100, ORDERS).expect("rdp");
        let wor = compute_rdp_sample_without_replacement(0.05, 2.0, 1, ORDERS).expect("rdp");
        for i in 0..ORDERS.len() {
            let expected = poisson[i] + wor[i];
            assert!((both[i] - expected).abs() <= 1e-12 * expected);
        }
    }

    #[test]
    fn empty_and_zero_count_compositions_are_free() {
        assert_eq!(DpEvent::Composed(Vec::new()).rdp(2.0).expect("rdp"), 0.0);
        let never = DpEvent::SelfComposed {
            event: Box::new(DpEvent::Gaussian {
                noise_multiplier: 0.0,
            }),
            count: 0,
        };
        assert_eq!(never.rdp(f64::INFINITY).expect("rdp"), 0.0);
    }

    #[test]
    fn nested_poisson_rates_multiply() {
        let nested = DpEvent::PoissonSampled {
            sampling_prob: 0.5,
            event: Box::new(DpEvent::PoissonSampled {
                sampling_prob: 0.1,
                event: Box::new(DpEvent::Gaussian {
                    noise_multiplier: 1.3,
                }),
            }),
        };
        let direct = compute_rdp(0.05, 1.3, 1, ORDERS).expect("rdp");
        assert_eq!(nested.rdp(ORDERS).expect("rdp"), direct);
    }

    #[test]
    fn tree_aggregation_event() {
        let event = DpEvent::TreeAggregation {
            noise_multiplier: 2.0,
            schedule: TreeSchedule::Restarts(vec![1000, 24]),
        };
        let rdp = event.rdp(3.0).expect("rdp");
        assert!((rdp - 45.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn sampling_a_tree_is_unsupported() {
        let event = DpEvent::PoissonSampled {
            sampling_prob: 0.1,
            event: Box::new(DpEvent::TreeAggregation {
                noise_multiplier: 1.0,
                schedule: TreeSchedule::Single(8),
            }),
        };
        let err = event.rdp(ORDERS).unwrap_err();
        assert!(matches!(err, DpError::UnsupportedFeature { .. }));
    }

    #[test]
    fn invalid_leaf_fails_before_evaluation() {
        let event = DpEvent::Composed(vec![
            dpsgd_event(1.0, 10, 0.01),
            dpsgd_event(-1.0, 10, 0.01),
        ]);
        assert!(event.rdp(ORDERS).unwrap_err().is_invalid());
        assert!(dpsgd_event(1.0, 10, 1.5).epsilon(1e-5).is_err());
        assert!(dpsgd_event(1.0, 10, 0.01).epsilon(0.0).is_err());
    }

    #[test]
    fn events_round_trip_through_json() {
        let event = DpEvent::Composed(vec![
            dpsgd_event(1.0, 10, 0.01),
            DpEvent::TreeAggregation {
                noise_multiplier: 3.0,
                schedule: TreeSchedule::Single(64),
            },
        ]);
        let json = serde_json::to_string(&event).expect("serialize");
        let back: DpEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, event);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 8, .. ProptestConfig::default() })]

        #[test]
        fn more_noise_reduces_epsilon(
            noise_a in 0.5f64..10.0,
            noise_b in 0.5f64..10.0,
            iterations in 1u64..200,
            sampling_prob in 0.01f64..0.9,
        ) {
            let low = noise_a.min(noise_b);
            let high = noise_a.max(noise_b);
            let eps_low = dpsgd_event(low, iterations, sampling_prob).epsilon(1e-6).expect("epsilon");
            let eps_high = dpsgd_event(high, iterations, sampling_prob).epsilon(1e-6).expect("epsilon");
            prop_assert!(eps_high <= eps_low + 1e-9 * eps_low.max(1.0));
        }

        #[test]
        fn higher_sampling_increases_epsilon(
            noise in 0.5f64..5.0,
            iterations in 1u64..200,
            q_a in 0.01f64..0.9,
            q_b in 0.01f64..0.9,
        ) {
            let low_q = q_a.min(q_b);
            let high_q = q_a.max(q_b);
            let eps_low = dpsgd_event(noise, iterations, low_q).epsilon(1e-6).expect("epsilon");
            let eps_high = dpsgd_event(noise, iterations, high_q).epsilon(1e-6).expect("epsilon");
            prop_assert!(eps_high >= eps_low - 1e-9 * eps_high.max(1.0));
        }
    }
}
