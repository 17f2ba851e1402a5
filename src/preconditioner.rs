/*!
Preconditioners reshape the distance used by the Stein kernel to the scale of the sample.

Every policy here produces the **inverse** scaling matrix `Λ`, which is what
[`ImqKernel`](crate::kernel::ImqKernel) consumes: the base kernel is `(c + δᵀΛδ)^β`.

# Examples

```rust
use ndarray::array;
use stein_thinning::preconditioner::Preconditioner;

let sample = array![[1.0, 2.0], [3.0, 5.0], [6.0, 9.0]];
let pre: Preconditioner = "med".parse().unwrap();
let linv = pre.build(sample.view()).unwrap();
assert!((linv[[0, 0]] - 1.0 / 25.0).abs() < 1e-12);
```
*/

use crate::error::{Error, Result};
use crate::stats::{median_pairwise_sq, sample_covariance, MEDIAN_SUBSAMPLE_SIZE};
use nalgebra as na;
use ndarray::prelude::*;
use std::fmt;
use std::str::FromStr;

/// Policy used to derive the kernel's inverse scaling matrix from a sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Preconditioner {
    /// `Λ = I`.
    #[default]
    Identity,
    /// `Λ = I / med²`, with `med` the median pairwise distance.
    Median,
    /// `Λ = I · ln(min(1000, n)) / med²`.
    ScaledMedian,
    /// `Λ = Σ⁻¹`, the inverse sample covariance.
    SampleCovariance,
    /// Isotropic length scale `λ`: the scaling is `λ·I`, so `Λ = I / λ`.
    Scale(f64),
}

impl FromStr for Preconditioner {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "id" | "identity" => Ok(Preconditioner::Identity),
            "med" | "median" => Ok(Preconditioner::Median),
            "sclmed" | "scaled-median" => Ok(Preconditioner::ScaledMedian),
            "smpcov" | "sample-covariance" => Ok(Preconditioner::SampleCovariance),
            other => other
                .parse::<f64>()
                .map(Preconditioner::Scale)
                .map_err(|_| Error::UnknownPreconditioner(s.to_string())),
        }
    }
}

impl fmt::Display for Preconditioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preconditioner::Identity => write!(f, "identity"),
            Preconditioner::Median => write!(f, "median"),
            Preconditioner::ScaledMedian => write!(f, "scaled-median"),
            Preconditioner::SampleCovariance => write!(f, "sample-covariance"),
            Preconditioner::Scale(scale) => write!(f, "{scale}"),
        }
    }
}

impl Preconditioner {
    /// Builds the `d × d` inverse scaling matrix for `sample` (`n × d`).
    ///
    /// # Errors
    ///
    /// * [`Error::TooFewUniqueSamples`] if the median pairwise distance is zero or the
    ///   sample covariance is singular.
    /// * [`Error::InvalidParameter`] for a non-positive or non-finite length scale.
    pub fn build(&self, sample: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (n, d) = sample.dim();
        if n == 0 || d == 0 {
            return Err(Error::EmptyInput("sample"));
        }
        let linv = match *self {
            Preconditioner::Identity => Array2::<f64>::eye(d),
            Preconditioner::Median => Array2::<f64>::eye(d) / nonzero_median_sq(sample)?,
            Preconditioner::ScaledMedian => {
                let m2 = nonzero_median_sq(sample)?;
                let log_n = (n.min(MEDIAN_SUBSAMPLE_SIZE) as f64).ln();
                Array2::<f64>::eye(d) * (log_n / m2)
            }
            Preconditioner::SampleCovariance => inverse_covariance(sample)?,
            Preconditioner::Scale(scale) => {
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(Error::InvalidParameter(format!(
                        "length scale must be positive and finite, got {scale}"
                    )));
                }
                Array2::<f64>::eye(d) / scale
            }
        };
        log::debug!("built {self} preconditioner for a {n} x {d} sample");
        Ok(linv)
    }
}

fn nonzero_median_sq(sample: ArrayView2<f64>) -> Result<f64> {
    let m2 = median_pairwise_sq(sample)?;
    if m2 > 0.0 {
        Ok(m2)
    } else {
        Err(Error::TooFewUniqueSamples(
            "median pairwise distance is zero".into(),
        ))
    }
}

fn inverse_covariance(sample: ArrayView2<f64>) -> Result<Array2<f64>> {
    let cov = sample_covariance(sample)?;
    let d = cov.nrows();
    let cov = na::DMatrix::from_fn(d, d, |i, j| cov[[i, j]]);

    let singular =
        || Error::TooFewUniqueSamples("covariance matrix of the sample is singular".into());
    if cov
        .clone()
        .symmetric_eigen()
        .eigenvalues
        .iter()
        .any(|&ev| ev <= 0.0)
    {
        return Err(singular());
    }
    let inv = na::Cholesky::new(cov).ok_or_else(singular)?.inverse();
    Ok(Array2::from_shape_fn((d, d), |(i, j)| inv[(i, j)]))
}
