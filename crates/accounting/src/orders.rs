//! Rényi orders and the scalar/sequence order arguments accepted by the API.

use rdp_accounting_core::{DpError, Result};

/// An order argument: a single order or an ordered collection of orders.
///
/// The curve produced for a scalar is a scalar; for a collection it is a
/// `Vec<f64>` positionally aligned with the input.
pub trait Orders {
    /// Shape of the RDP values produced for these orders.
    type Curve;

    /// The orders as a slice, in caller order.
    fn as_slice(&self) -> &[f64];

    /// Evaluate `f` at every order, preserving shape and position.
    fn map_orders<F>(&self, f: F) -> Result<Self::Curve>
    where
        F: FnMut(f64) -> Result<f64>;
}

impl Orders for f64 {
    type Curve = f64;

    fn as_slice(&self) -> &[f64] {
        std::slice::from_ref(self)
    }

    fn map_orders<F>(&self, mut f: F) -> Result<f64>
    where
        F: FnMut(f64) -> Result<f64>,
    {
        f(*self)
    }
}

fn map_slice<F>(orders: &[f64], f: F) -> Result<Vec<f64>>
where
    F: FnMut(f64) -> Result<f64>,
{
    orders.iter().copied().map(f).collect()
}

impl<'a> Orders for &'a [f64] {
    type Curve = Vec<f64>;

    fn as_slice(&self) -> &[f64] {
        self
    }

    fn map_orders<F>(&self, f: F) -> Result<Vec<f64>>
    where
        F: FnMut(f64) -> Result<f64>,
    {
        map_slice(self, f)
    }
}

impl Orders for Vec<f64> {
    type Curve = Vec<f64>;

    fn as_slice(&self) -> &[f64] {
        self
    }

    fn map_orders<F>(&self, f: F) -> Result<Vec<f64>>
    where
        F: FnMut(f64) -> Result<f64>,
    {
        map_slice(self, f)
    }
}

impl<'a> Orders for &'a Vec<f64> {
    type Curve = Vec<f64>;

    fn as_slice(&self) -> &[f64] {
        self
    }

    fn map_orders<F>(&self, f: F) -> Result<Vec<f64>>
    where
        F: FnMut(f64) -> Result<f64>,
    {
        map_slice(self, f)
    }
}

impl<const N: usize> Orders for [f64; N] {
    type Curve = Vec<f64>;

    fn as_slice(&self) -> &[f64] {
        self
    }

    fn map_orders<F>(&self, f: F) -> Result<Vec<f64>>
    where
        F: FnMut(f64) -> Result<f64>,
    {
        map_slice(self, f)
    }
}

impl<'a, const N: usize> Orders for &'a [f64; N] {
    type Curve = Vec<f64>;

    fn as_slice(&self) -> &[f64] {
        *self
    }

    fn map_orders<F>(&self, f: F) -> Result<Vec<f64>>
    where
        F: FnMut(f64) -> Result<f64>,
    {
        map_slice(*self, f)
    }
}

/// Check that every order is `> 1` (infinity allowed).
pub fn validate_orders(orders: &[f64]) -> Result<()> {
    for &alpha in orders {
        validate_order(alpha)?;
    }
    Ok(())
}

/// Check that a single order is `> 1` (infinity allowed).
pub fn validate_order(alpha: f64) -> Result<()> {
    if alpha.is_nan() || alpha <= 1.0 {
        return Err(DpError::invalid(format!(
            "Rényi order must be > 1, got {alpha}"
        )));
    }
    Ok(())
}

/// Whether `alpha` is a finite whole number.
pub(crate) fn is_integer(alpha: f64) -> bool {
    alpha.is_finite() && alpha.fract() == 0.0
}

/// Default Rényi orders.
///
/// - `linspace(1.01, 8, 50)`
/// - `8..64`
/// - `linspace(65, 512, 10)` rounded to integers
pub fn default_orders() -> Vec<f64> {
    let mut orders = Vec::new();

    orders.extend(linspace(1.01, 8.0, 50));
    for a in 8..64 {
        orders.push(a as f64);
    }
    for a in linspace(65.0, 512.0, 10) {
        orders.push(a.round());
    }

    orders
}

fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    if num == 0 {
        return Vec::new();
    }
    if num == 1 {
        return vec![start];
    }
    let step = (end - start) / (num as f64 - 1.0);
    (0..num).map(|i| start + step * i as f64).collect()
}
