/*!
# Stein Thinning

Selects a small subset of points from a large sample, typically MCMC output, such that the
empirical distribution of the subset has low kernel Stein discrepancy (KSD) with respect to a
target distribution. Only the gradient of the target's log-density at each sample point is
needed; [`thin_gradient_free`] works from log-density values and a proxy distribution instead.

```rust
use ndarray::Array2;
use rand::{rngs::SmallRng, SeedableRng};
use stein_thinning::distributions::{Gaussian, LogDensity};
use stein_thinning::thin;

let target = Gaussian::new(ndarray::array![0.0, 0.0], Array2::eye(2)).unwrap();
let mut rng = SmallRng::seed_from_u64(42);
let sample = target.sample(500, &mut rng);
let gradient = target.score_rows(sample.view());

let idx = thin(sample.view(), gradient.view(), 20).unwrap();
assert_eq!(idx.len(), 20);
```
*/

pub mod distributions;
pub mod error;
pub mod gradient_free;
pub mod greedy;
pub mod io;
pub mod kernel;
pub mod ksd;
pub mod preconditioner;
pub mod stats;
pub mod thinning;
pub mod validate;

pub use error::{Error, Result};
pub use greedy::greedy_select;
pub use kernel::{ImqKernel, SteinKernel};
pub use ksd::{kernel_matrix, ksd_sequence};
pub use preconditioner::Preconditioner;
pub use thinning::{thin, thin_gradient_free, SteinThinning};
