//! Accountant configuration.

use serde::{Deserialize, Serialize};

use rdp_accounting_core::{DpError, Result};

use crate::orders::default_orders;
use crate::rdp::RdpAccountant;

/// Configuration for constructing a privacy accountant with a fresh state.
pub trait DpAccountantConfig {
    /// Accountant type created by this config.
    type Accountant;

    /// Create a new accountant instance.
    fn create_accountant(&self) -> Result<Self::Accountant>;
}

/// Configuration for the RDP accountant.
///
/// Deserializes from `{}` to the default orders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RdpAccountantConfig {
    /// Rényi orders to evaluate.
    pub orders: Vec<f64>,
}

impl Default for RdpAccountantConfig {
    fn default() -> Self {
        Self {
            orders: default_orders(),
        }
    }
}

impl RdpAccountantConfig {
    /// Create a config with explicit orders.
    pub fn new(orders: Vec<f64>) -> Self {
        Self { orders }
    }
}

impl DpAccountantConfig for RdpAccountantConfig {
    type Accountant = RdpAccountant;

    fn create_accountant(&self) -> Result<Self::Accountant> {
        RdpAccountant::with_orders(self.orders.clone())
            .map_err(|err| DpError::config(format!("invalid RDP accountant config: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rdp_config_creates_finite_accountant() {
        let cfg = RdpAccountantConfig::default();
        let mut acc = cfg.create_accountant().expect("accountant");
        acc.step(1.0, 0.01).expect("step");
        assert!(acc.epsilon(1e-5).expect("epsilon").is_finite());
    }

    #[test]
    fn empty_json_uses_default_orders() {
        let cfg: RdpAccountantConfig = serde_json::from_str("{}").expect("config");
        assert_eq!(cfg, RdpAccountantConfig::default());
    }

    #[test]
    fn explicit_orders_from_json() {
        let cfg: RdpAccountantConfig =
            serde_json::from_str(r#"{"orders": [1.5, 2.0, 64.0]}"#).expect("config");
        let acc = cfg.create_accountant().expect("accountant");
        assert_eq!(acc.orders(), &[1.5, 2.0, 64.0]);
    }

    #[test]
    fn invalid_orders_are_config_errors() {
        let err = RdpAccountantConfig::new(vec![0.5])
            .create_accountant()
            .unwrap_err();
        assert!(matches!(err, DpError::ConfigError { .. }));
        assert!(RdpAccountantConfig::new(Vec::new())
            .create_accountant()
            .is_err());
    }
}
