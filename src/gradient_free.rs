//! Gradient-free Stein kernels.
//!
//! When the score of the target `p` is unavailable, a proxy `q` with a known score is used
//! instead and the Stein kernel of the proxy is reweighted by the importance ratio `q / p`:
//!
//! ```text
//! k_gf(i, j) = exp(r_i + r_j) · k_q(x_i, x_j, ∇log q(x_i), ∇log q(x_j)),   r = log q − log p
//! ```
//!
//! `r` is shifted so that its minimum is zero. Normalising constants of `p` and `q` cancel in
//! the shift, so unnormalised log-densities can be supplied.

use crate::error::{Error, Result};
use crate::kernel::SteinKernel;
use crate::ksd::SteinIntegrand;
use ndarray::prelude::*;
use ndarray::Zip;
use ndarray_stats::QuantileExt;

/// Range of the shifted log-weights above which the proxy is considered a poor match for the
/// target. `exp(2 · 200)` is still representable as an `f64`.
pub const LOG_WEIGHT_RANGE_WARNING: f64 = 200.0;

/// Shifted log importance weights `log q − log p − min(log q − log p)`, clipped above at
/// `range_cap` if one is given.
///
/// Logs a warning when the unclipped range exceeds [`LOG_WEIGHT_RANGE_WARNING`]; the
/// computation still proceeds.
pub fn log_weights(
    log_p: ArrayView1<f64>,
    log_q: ArrayView1<f64>,
    range_cap: Option<f64>,
) -> Result<Array1<f64>> {
    if log_p.len() != log_q.len() {
        return Err(Error::ShapeMismatch {
            name: "log_q",
            found: vec![log_q.len()],
            expected: vec![log_p.len()],
        });
    }
    if let Some(cap) = range_cap {
        if !(cap.is_finite() && cap > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "range cap must be positive and finite, got {cap}"
            )));
        }
    }
    let mut weights = &log_q - &log_p;
    let min = *weights
        .min()
        .map_err(|_| Error::EmptyInput("log-densities"))?;
    weights.mapv_inplace(|w| w - min);

    let range = *weights
        .max()
        .map_err(|_| Error::NonFinite("log-densities"))?;
    if range > LOG_WEIGHT_RANGE_WARNING {
        log::warn!(
            "log importance weights span {range:.1} (> {LOG_WEIGHT_RANGE_WARNING}); \
             the proxy distribution may be a poor match for the target"
        );
    }
    if let Some(cap) = range_cap {
        weights.mapv_inplace(|w| w.min(cap));
    }
    Ok(weights)
}

/// A proxy Stein integrand reweighted by importance ratios.
#[derive(Debug, Clone)]
pub struct WeightedIntegrand<K> {
    inner: SteinIntegrand<K>,
    log_weights: Array1<f64>,
}

impl<K: SteinKernel> WeightedIntegrand<K> {
    /// `inner` must be built from the proxy scores; `log_weights` holds one entry per point.
    pub fn new(inner: SteinIntegrand<K>, log_weights: Array1<f64>) -> Result<Self> {
        if log_weights.len() != inner.len() {
            return Err(Error::ShapeMismatch {
                name: "log_weights",
                found: vec![log_weights.len()],
                expected: vec![inner.len()],
            });
        }
        Ok(Self { inner, log_weights })
    }

    pub fn eval(&self, i: usize, j: usize) -> f64 {
        (self.log_weights[i] + self.log_weights[j]).exp() * self.inner.eval(i, j)
    }

    /// Weighted `k(j, j)` for every point `j`.
    pub fn diagonal(&self) -> Result<Array1<f64>> {
        let mut diag = self.inner.diagonal()?;
        Zip::from(&mut diag)
            .and(&self.log_weights)
            .for_each(|k, &w| *k *= (w + w).exp());
        Ok(diag)
    }

    /// Weighted `k(j, s)` for every point `j`.
    ///
    /// # Panics
    ///
    /// If `s >= self.len()`.
    pub fn column(&self, s: usize) -> Result<Array1<f64>> {
        let mut col = self.inner.column(s)?;
        let ws = self.log_weights[s];
        Zip::from(&mut col)
            .and(&self.log_weights)
            .for_each(|k, &w| *k *= (w + ws).exp());
        Ok(col)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn log_weights(&self) -> ArrayView1<'_, f64> {
        self.log_weights.view()
    }

    pub fn inner(&self) -> &SteinIntegrand<K> {
        &self.inner
    }
}
