/*!
Stein kernels built from the inverse multiquadric (IMQ) base kernel.

For points `x, y` with scores `sx, sy` and inverse preconditioner `Λ`, the base kernel is
`k(x, y) = (c + δᵀΛδ)^β` with `δ = x − y`, and the Stein kernel is

```text
k0 = −4β(β−1) · δᵀΛΛδ / qf^(2−β)
     − 2β · (tr Λ + δᵀΛ(sx − sy)) / qf^(1−β)
     + sx·sy / qf^(−β)                             where qf = c + δᵀΛδ
```

With the default `c = 1`, `β = −1/2` this is the kernel used for Stein thinning.

# Examples

```rust
use ndarray::{array, Array2};
use stein_thinning::kernel::{ImqKernel, SteinKernel};

let kernel = ImqKernel::new(Array2::eye(3)).unwrap();
let value = kernel.eval(
    array![1.0, 2.0, 3.0].view(),
    array![2.0, 3.0, 4.0].view(),
    array![0.5, 0.75, 1.5].view(),
    array![1.0, 1.5, 3.0].view(),
);
assert!((value - 3.5).abs() < 1e-12);
```
*/

use crate::error::{Error, Result};
use crate::preconditioner::Preconditioner;
use ndarray::prelude::*;
use rayon::prelude::*;

/// A Stein kernel: a symmetric function of two points and the scores at those points.
///
/// Implementors must satisfy `eval(x, y, sx, sy) == eval(y, x, sy, sx)`.
pub trait SteinKernel: Sync {
    /// Evaluates the kernel for a single pair of points.
    fn eval(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        sx: ArrayView1<f64>,
        sy: ArrayView1<f64>,
    ) -> f64;

    /// Dimension of the points the kernel accepts, if it is fixed.
    fn dim(&self) -> Option<usize> {
        None
    }

    /// Evaluates the kernel row by row over paired batches, in parallel.
    ///
    /// Each argument holds either `n` rows or a single row that is broadcast against the others.
    fn eval_rows(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        sx: ArrayView2<f64>,
        sy: ArrayView2<f64>,
    ) -> Result<Array1<f64>> {
        let inputs = [
            ("x", x.view()),
            ("y", y.view()),
            ("sx", sx.view()),
            ("sy", sy.view()),
        ];
        let n = inputs.iter().map(|(_, a)| a.nrows()).max().unwrap_or(0);
        let d = self.dim().unwrap_or(x.ncols());
        for (name, a) in inputs.iter() {
            if (a.nrows() != n && a.nrows() != 1) || a.ncols() != d {
                return Err(Error::ShapeMismatch {
                    name: *name,
                    found: a.shape().to_vec(),
                    expected: vec![n, d],
                });
            }
        }
        let values: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|i| {
                self.eval(
                    broadcast_row(&x, i),
                    broadcast_row(&y, i),
                    broadcast_row(&sx, i),
                    broadcast_row(&sy, i),
                )
            })
            .collect();
        Ok(Array1::from(values))
    }
}

fn broadcast_row<'a>(a: &'a ArrayView2<'_, f64>, i: usize) -> ArrayView1<'a, f64> {
    a.row(if a.nrows() == 1 { 0 } else { i })
}

/// Stein kernel with an inverse multiquadric base kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct ImqKernel {
    linv: Array2<f64>,
    linv_sq: Array2<f64>,
    trace: f64,
    c: f64,
    beta: f64,
}

impl ImqKernel {
    /// Creates the standard IMQ Stein kernel (`c = 1`, `β = −1/2`) for the inverse
    /// preconditioner `linv`.
    pub fn new(linv: Array2<f64>) -> Result<Self> {
        Self::with_params(linv, 1.0, -0.5)
    }

    /// Creates an IMQ Stein kernel with base kernel `(c + δᵀΛδ)^β`.
    ///
    /// Requires a square, finite `linv`, `c > 0` and `−1 < β < 0`.
    pub fn with_params(linv: Array2<f64>, c: f64, beta: f64) -> Result<Self> {
        let (rows, cols) = linv.dim();
        if rows == 0 {
            return Err(Error::EmptyInput("preconditioner"));
        }
        if rows != cols {
            return Err(Error::ShapeMismatch {
                name: "preconditioner",
                found: vec![rows, cols],
                expected: vec![rows, rows],
            });
        }
        if linv.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFinite("preconditioner"));
        }
        if !(c.is_finite() && c > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "IMQ offset c must be positive, got {c}"
            )));
        }
        if !(beta > -1.0 && beta < 0.0) {
            return Err(Error::InvalidParameter(format!(
                "IMQ exponent beta must lie in (-1, 0), got {beta}"
            )));
        }
        Ok(Self {
            linv_sq: linv.dot(&linv),
            trace: linv.diag().sum(),
            linv,
            c,
            beta,
        })
    }

    /// Builds the preconditioner for `sample` with `preconditioner` and wraps it in the
    /// standard IMQ Stein kernel.
    pub fn from_sample(sample: ArrayView2<f64>, preconditioner: &Preconditioner) -> Result<Self> {
        Self::new(preconditioner.build(sample)?)
    }

    /// The inverse preconditioner `Λ`.
    pub fn linv(&self) -> ArrayView2<'_, f64> {
        self.linv.view()
    }

}

impl SteinKernel for ImqKernel {
    fn eval(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        sx: ArrayView1<f64>,
        sy: ArrayView1<f64>,
    ) -> f64 {
        let beta = self.beta;
        let delta = &x - &y;
        let qf = self.c + delta.dot(&self.linv.dot(&delta));

        let t1 = -4.0 * beta * (beta - 1.0) * delta.dot(&self.linv_sq.dot(&delta))
            / qf.powf(2.0 - beta);
        let score_diff = &sx - &sy;
        let t2 = -2.0 * beta * (self.trace + delta.dot(&self.linv.dot(&score_diff)))
            / qf.powf(1.0 - beta);
        let t3 = sx.dot(&sy) / qf.powf(-beta);
        t1 + t2 + t3
    }

    fn dim(&self) -> Option<usize> {
        Some(self.linv.nrows())
    }
}
