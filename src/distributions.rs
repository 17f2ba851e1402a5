/*!
Densities with known scores, used to generate inputs for Stein thinning.

Each density implements [`LogDensity`], which exposes the log-density and its gradient
(the *score*) at a point, plus batched versions over the rows of a sample.

# Examples

```rust
use ndarray::{array, Array2};
use rand::{rngs::SmallRng, SeedableRng};
use stein_thinning::distributions::{Gaussian, LogDensity};

let gauss = Gaussian::new(array![0.0, 0.0], Array2::eye(2)).unwrap();
let mut rng = SmallRng::seed_from_u64(42);
let sample = gauss.sample(100, &mut rng);
let gradient = gauss.score_rows(sample.view());
assert_eq!(gradient.dim(), (100, 2));
```
*/

use crate::error::{Error, Result};
use nalgebra as na;
use ndarray::prelude::*;
use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use std::f64::consts::PI;

/// A differentiable log-density.
pub trait LogDensity {
    /// Dimension of the points the density is defined on.
    fn dim(&self) -> usize;

    /// Normalised log-density at `x`.
    fn log_prob(&self, x: ArrayView1<f64>) -> f64;

    /// Gradient of the log-density at `x`.
    fn score(&self, x: ArrayView1<f64>) -> Array1<f64>;

    /// Log-density at each row of `xs`.
    fn log_prob_rows(&self, xs: ArrayView2<f64>) -> Array1<f64> {
        xs.outer_iter().map(|x| self.log_prob(x)).collect()
    }

    /// Score at each row of `xs`.
    fn score_rows(&self, xs: ArrayView2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros(xs.raw_dim());
        for (mut row, x) in out.outer_iter_mut().zip(xs.outer_iter()) {
            row.assign(&self.score(x));
        }
        out
    }
}

/**
A multivariate Gaussian parameterised by its mean and covariance.

The covariance is factorised once on construction.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Gaussian {
    mean: Array1<f64>,
    chol: Array2<f64>,
    cov_inv: Array2<f64>,
    log_norm: f64,
}

impl Gaussian {
    /// Fails if `cov` is not a `d × d` positive-definite matrix matching `mean`.
    pub fn new(mean: Array1<f64>, cov: Array2<f64>) -> Result<Self> {
        let d = mean.len();
        if d == 0 {
            return Err(Error::EmptyInput("mean"));
        }
        if cov.dim() != (d, d) {
            return Err(Error::ShapeMismatch {
                name: "cov",
                found: cov.shape().to_vec(),
                expected: vec![d, d],
            });
        }
        let cov = na::DMatrix::from_fn(d, d, |i, j| cov[[i, j]]);
        let chol = na::Cholesky::new(cov).ok_or_else(|| {
            Error::InvalidParameter("covariance matrix is not positive definite".into())
        })?;
        let l = chol.l();
        let inv = chol.inverse();
        let log_det: f64 = 2.0 * l.diagonal().iter().map(|v| v.ln()).sum::<f64>();

        Ok(Self {
            mean,
            chol: Array2::from_shape_fn((d, d), |(i, j)| l[(i, j)]),
            cov_inv: Array2::from_shape_fn((d, d), |(i, j)| inv[(i, j)]),
            log_norm: -0.5 * (d as f64 * (2.0 * PI).ln() + log_det),
        })
    }

    pub fn mean(&self) -> ArrayView1<'_, f64> {
        self.mean.view()
    }

    /// Draws `n` independent points, one per row.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Array2<f64> {
        let d = self.mean.len();
        let z = Array2::from_shape_simple_fn((n, d), || {
            let v: f64 = StandardNormal.sample(&mut *rng);
            v
        });
        z.dot(&self.chol.t()) + &self.mean
    }
}

impl LogDensity for Gaussian {
    fn dim(&self) -> usize {
        self.mean.len()
    }

    fn log_prob(&self, x: ArrayView1<f64>) -> f64 {
        let diff = &x - &self.mean;
        self.log_norm - 0.5 * diff.dot(&self.cov_inv.dot(&diff))
    }

    fn score(&self, x: ArrayView1<f64>) -> Array1<f64> {
        let diff = &x - &self.mean;
        -self.cov_inv.dot(&diff)
    }
}

/// A finite mixture of Gaussians.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    log_weights: Array1<f64>,
    components: Vec<Gaussian>,
    picker: WeightedIndex<f64>,
}

impl GaussianMixture {
    /// `weights` are normalised to sum to one; all components must share a dimension.
    pub fn new(weights: Vec<f64>, components: Vec<Gaussian>) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::EmptyInput("mixture components"));
        }
        if weights.len() != components.len() {
            return Err(Error::ShapeMismatch {
                name: "weights",
                found: vec![weights.len()],
                expected: vec![components.len()],
            });
        }
        let d = components[0].dim();
        if components.iter().any(|c| c.dim() != d) {
            return Err(Error::InvalidParameter(
                "mixture components differ in dimension".into(),
            ));
        }
        let picker = WeightedIndex::new(&weights)
            .map_err(|e| Error::InvalidParameter(format!("mixture weights: {e}")))?;
        let total: f64 = weights.iter().sum();
        let log_weights = weights.iter().map(|w| (w / total).ln()).collect();
        Ok(Self {
            log_weights,
            components,
            picker,
        })
    }

    /// Draws `n` independent points, one per row.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Array2<f64> {
        let mut out = Array2::zeros((n, self.dim()));
        for mut row in out.outer_iter_mut() {
            let k = self.picker.sample(&mut *rng);
            row.assign(&self.components[k].sample(1, &mut *rng).row(0));
        }
        out
    }

    /// Log of each component's weighted density at `x`.
    fn joint_log_probs(&self, x: ArrayView1<f64>) -> Array1<f64> {
        self.components
            .iter()
            .zip(self.log_weights.iter())
            .map(|(c, lw)| lw + c.log_prob(x))
            .collect()
    }
}

fn log_sum_exp(values: &Array1<f64>) -> f64 {
    let max = values.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + values.mapv(|v| (v - max).exp()).sum().ln()
}

impl LogDensity for GaussianMixture {
    fn dim(&self) -> usize {
        self.components[0].dim()
    }

    fn log_prob(&self, x: ArrayView1<f64>) -> f64 {
        log_sum_exp(&self.joint_log_probs(x))
    }

    fn score(&self, x: ArrayView1<f64>) -> Array1<f64> {
        let joint = self.joint_log_probs(x);
        let total = log_sum_exp(&joint);
        let mut out = Array1::zeros(self.dim());
        for (c, lp) in self.components.iter().zip(joint.iter()) {
            out.scaled_add((lp - total).exp(), &c.score(x));
        }
        out
    }
}
