/*!
Kernel Stein discrepancy diagnostics.

Both diagnostics consume an *integrand*: any `Fn(usize, usize) -> f64` returning the Stein
kernel value for a pair of point indices. [`SteinIntegrand`] binds a kernel to a sample and its
gradients to produce one; the gradient-free adapter produces a weighted one.

# Examples

```rust
use stein_thinning::ksd::{kernel_matrix, ksd_sequence};

let x: [f64; 4] = [1.0, 2.0, 5.0, 7.0];
let integrand = |i: usize, j: usize| (x[i] - x[j]).powi(2);

let km = kernel_matrix(integrand, 4);
assert_eq!(km[[0, 3]], 36.0);

let ksd: Vec<f64> = ksd_sequence(integrand, 4).collect();
assert_eq!(ksd.len(), 4);
assert!((ksd[1] - 2f64.sqrt() / 2.0).abs() < 1e-12);
```
*/

use crate::error::{Error, Result};
use crate::kernel::SteinKernel;
use ndarray::prelude::*;
use std::iter::FusedIterator;

/// Builds the symmetric `n × n` matrix `M[i][j] = integrand(i, j)`.
///
/// Only the upper triangle (diagonal included) is evaluated; the lower triangle is mirrored.
pub fn kernel_matrix<F>(integrand: F, n: usize) -> Array2<f64>
where
    F: Fn(usize, usize) -> f64,
{
    let mut km = Array2::zeros((n, n));
    for i in 0..n {
        for j in i..n {
            let kij = integrand(i, j);
            km[[i, j]] = kij;
            km[[j, i]] = kij;
        }
    }
    km
}

/// Cumulative KSD of the leading `1, 2, ..., n` points, in their existing order.
///
/// Entry `i` is `sqrt(S_i) / (i + 1)` where `S_i` is the sum of the leading
/// `(i + 1) × (i + 1)` block of the kernel matrix. Each step adds only the new row,
/// `integrand(i, i) + 2 Σ_{k<i} integrand(i, k)`, to the running sum.
pub fn ksd_sequence<F>(integrand: F, n: usize) -> KsdSequence<F>
where
    F: Fn(usize, usize) -> f64,
{
    KsdSequence {
        integrand,
        n,
        next: 0,
        sum: 0.0,
    }
}

/// Lazy iterator returned by [`ksd_sequence`].
#[derive(Debug, Clone)]
pub struct KsdSequence<F> {
    integrand: F,
    n: usize,
    next: usize,
    sum: f64,
}

impl<F> Iterator for KsdSequence<F>
where
    F: Fn(usize, usize) -> f64,
{
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.next >= self.n {
            return None;
        }
        let i = self.next;
        let cross: f64 = (0..i).map(|k| (self.integrand)(i, k)).sum();
        self.sum += (self.integrand)(i, i) + 2.0 * cross;
        self.next += 1;
        Some(self.sum.sqrt() / (i + 1) as f64)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.n - self.next;
        (remaining, Some(remaining))
    }
}

impl<F> ExactSizeIterator for KsdSequence<F> where F: Fn(usize, usize) -> f64 {}

impl<F> FusedIterator for KsdSequence<F> where F: Fn(usize, usize) -> f64 {}

/// A Stein kernel bound to a sample and the scores at each sample point.
#[derive(Debug, Clone)]
pub struct SteinIntegrand<K> {
    sample: Array2<f64>,
    gradient: Array2<f64>,
    kernel: K,
}

impl<K: SteinKernel> SteinIntegrand<K> {
    /// Binds `kernel` to `sample` and `gradient`, which must have the same shape and, for
    /// kernels of fixed dimension, as many columns as the kernel accepts.
    pub fn new(sample: Array2<f64>, gradient: Array2<f64>, kernel: K) -> Result<Self> {
        if sample.dim() != gradient.dim() {
            return Err(Error::ShapeMismatch {
                name: "gradient",
                found: gradient.shape().to_vec(),
                expected: sample.shape().to_vec(),
            });
        }
        if let Some(d) = kernel.dim() {
            if sample.ncols() != d {
                return Err(Error::ShapeMismatch {
                    name: "sample",
                    found: sample.shape().to_vec(),
                    expected: vec![sample.nrows(), d],
                });
            }
        }
        Ok(Self {
            sample,
            gradient,
            kernel,
        })
    }

    /// Kernel value for points `i` and `j`.
    pub fn eval(&self, i: usize, j: usize) -> f64 {
        self.kernel.eval(
            self.sample.row(i),
            self.sample.row(j),
            self.gradient.row(i),
            self.gradient.row(j),
        )
    }

    /// `k0(j, j)` for every point `j`.
    pub fn diagonal(&self) -> Result<Array1<f64>> {
        self.kernel.eval_rows(
            self.sample.view(),
            self.sample.view(),
            self.gradient.view(),
            self.gradient.view(),
        )
    }

    /// `k0(j, s)` for every point `j`, with point `s` broadcast against all rows.
    ///
    /// # Panics
    ///
    /// If `s >= self.len()`.
    pub fn column(&self, s: usize) -> Result<Array1<f64>> {
        self.kernel.eval_rows(
            self.sample.view(),
            self.sample.slice(s![s..s + 1, ..]),
            self.gradient.view(),
            self.gradient.slice(s![s..s + 1, ..]),
        )
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.sample.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.sample.nrows() == 0
    }

    pub fn sample(&self) -> ArrayView2<'_, f64> {
        self.sample.view()
    }

    pub fn gradient(&self) -> ArrayView2<'_, f64> {
        self.gradient.view()
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Kernel Stein matrix over all points.
    pub fn kernel_matrix(&self) -> Array2<f64> {
        kernel_matrix(|i, j| self.eval(i, j), self.len())
    }

    /// Cumulative KSD over all points, in sample order.
    pub fn ksd(&self) -> Array1<f64> {
        ksd_sequence(|i, j| self.eval(i, j), self.len()).collect()
    }

    /// KSD of the point set given by `indices` (repeats allowed), in that order.
    ///
    /// # Panics
    ///
    /// If any index is out of range for the sample.
    pub fn ksd_of(&self, indices: &[usize]) -> Array1<f64> {
        ksd_sequence(|i, j| self.eval(indices[i], indices[j]), indices.len()).collect()
    }
}

/// Kernel Stein matrix of `sample` with scores `gradient` under `kernel`.
pub fn stein_kmat<K: SteinKernel>(
    sample: ArrayView2<f64>,
    gradient: ArrayView2<f64>,
    kernel: K,
) -> Result<Array2<f64>> {
    Ok(SteinIntegrand::new(sample.to_owned(), gradient.to_owned(), kernel)?.kernel_matrix())
}

/// Cumulative KSD sequence of `sample` with scores `gradient` under `kernel`.
pub fn stein_ksd<K: SteinKernel>(
    sample: ArrayView2<f64>,
    gradient: ArrayView2<f64>,
    kernel: K,
) -> Result<Array1<f64>> {
    Ok(SteinIntegrand::new(sample.to_owned(), gradient.to_owned(), kernel)?.ksd())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::ImqKernel;
    use approx::assert_abs_diff_eq;

    /// `(x - y)²` on the first coordinate, ignoring the scores.
    struct SquaredDistance;

    impl SteinKernel for SquaredDistance {
        fn eval(
            &self,
            x: ArrayView1<f64>,
            y: ArrayView1<f64>,
            _sx: ArrayView1<f64>,
            _sy: ArrayView1<f64>,
        ) -> f64 {
            (x[0] - y[0]).powi(2)
        }
    }

    fn line() -> Array2<f64> {
        array![[1.0], [2.0], [5.0], [7.0]]
    }

    #[test]
    fn test_kernel_matrix_squared_distance() {
        let x: [f64; 4] = [1.0, 2.0, 5.0, 7.0];
        let km = kernel_matrix(|i, j| (x[i] - x[j]).powi(2), 4);
        let expected = array![
            [0., 1., 16., 36.],
            [1., 0., 9., 25.],
            [16., 9., 0., 4.],
            [36., 25., 4., 0.],
        ];
        assert_eq!(km, expected);
    }

    #[test]
    fn test_kernel_matrix_evaluates_upper_triangle_only() {
        let calls = std::cell::Cell::new(0usize);
        let km = kernel_matrix(
            |i, j| {
                calls.set(calls.get() + 1);
                assert!(i <= j);
                (i * 10 + j) as f64
            },
            5,
        );
        assert_eq!(calls.get(), 15);
        assert_eq!(km, km.t());
    }

    #[test]
    fn test_ksd_sequence_squared_distance() {
        let integrand = SteinIntegrand::new(line(), Array2::zeros((4, 1)), SquaredDistance).unwrap();
        let ksd = integrand.ksd();
        let expected = array![
            0.0,
            2f64.sqrt() / 2.0,
            52f64.sqrt() / 3.0,
            182f64.sqrt() / 4.0
        ];
        assert_abs_diff_eq!(ksd, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_ksd_sequence_is_lazy_and_exact_size() {
        let x: [f64; 4] = [1.0, 2.0, 5.0, 7.0];
        let mut seq = ksd_sequence(|i: usize, j: usize| (x[i] - x[j]).powi(2), 4);
        assert_eq!(seq.len(), 4);
        assert_eq!(seq.next(), Some(0.0));
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.by_ref().count(), 3);
        assert_eq!(seq.next(), None);
    }

    #[test]
    fn test_ksd_sequence_matches_kernel_matrix_blocks() {
        let sample = array![[0.0, 0.1], [1.0, -0.5], [0.3, 0.3], [-1.2, 2.0], [0.7, 0.0]];
        let gradient = -sample.clone();
        let kernel = ImqKernel::new(Array2::eye(2)).unwrap();
        let integrand = SteinIntegrand::new(sample, gradient, kernel).unwrap();

        let ksd = integrand.ksd();
        for i in 0..integrand.len() {
            let block = kernel_matrix(|a, b| integrand.eval(a, b), i + 1);
            let direct = block.sum().sqrt() / (i + 1) as f64;
            assert_abs_diff_eq!(ksd[i], direct, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_stein_kmat_symmetric_nonnegative_diagonal() {
        let sample = array![[0.0, 0.1], [1.0, -0.5], [0.3, 0.3], [-1.2, 2.0]];
        let gradient = array![[0.5, 0.2], [-1.0, 0.5], [0.0, 0.0], [1.2, -2.0]];
        let kernel = ImqKernel::new(Array2::<f64>::eye(2) * 0.5).unwrap();
        let km = stein_kmat(sample.view(), gradient.view(), kernel).unwrap();
        assert_eq!(km, km.t());
        assert!(km.diag().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_ksd_of_subset() {
        let integrand = SteinIntegrand::new(line(), Array2::zeros((4, 1)), SquaredDistance).unwrap();
        let ksd = integrand.ksd_of(&[2, 3]);
        assert_abs_diff_eq!(ksd, array![0.0, 8f64.sqrt() / 2.0], epsilon = 1e-12);
    }

    #[test]
    #[should_panic]
    fn test_ksd_of_out_of_range_panics() {
        let integrand = SteinIntegrand::new(line(), Array2::zeros((4, 1)), SquaredDistance).unwrap();
        integrand.ksd_of(&[0, 4]);
    }

    #[test]
    fn test_diagonal_and_column_match_eval() {
        let sample = array![[0.0, 0.1], [1.0, -0.5], [0.3, 0.3], [-1.2, 2.0]];
        let gradient = array![[0.5, 0.2], [-1.0, 0.5], [0.0, 0.0], [1.2, -2.0]];
        let kernel = ImqKernel::new(Array2::<f64>::eye(2) * 0.7).unwrap();
        let integrand = SteinIntegrand::new(sample, gradient, kernel).unwrap();

        let diag = integrand.diagonal().unwrap();
        let col = integrand.column(2).unwrap();
        for j in 0..4 {
            assert_eq!(diag[j], integrand.eval(j, j));
            assert_eq!(col[j], integrand.eval(j, 2));
        }
    }

    #[test]
    fn test_kernel_dimension_must_match_sample() {
        let x = Array2::<f64>::zeros((5, 3));
        let kernel = ImqKernel::new(Array2::<f64>::eye(2)).unwrap();
        match stein_kmat(x.view(), x.view(), kernel.clone()) {
            Err(Error::ShapeMismatch { name, found, expected }) => {
                assert_eq!(name, "sample");
                assert_eq!(found, vec![5, 3]);
                assert_eq!(expected, vec![5, 2]);
            }
            other => panic!("expected shape mismatch, got {other:?}"),
        }
        assert!(matches!(
            stein_ksd(x.view(), x.view(), kernel),
            Err(Error::ShapeMismatch { name: "sample", .. })
        ));
    }

    #[test]
    fn test_integrand_shape_mismatch() {
        assert!(matches!(
            SteinIntegrand::new(line(), Array2::zeros((3, 1)), SquaredDistance),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
