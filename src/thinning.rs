/*!
Stein thinning entry points.

[`SteinThinning`] holds the configuration of one thinning run; [`thin`] and
[`thin_gradient_free`] run it with default settings.

The pipeline is: validate, standardize (optional), build the preconditioner on the whole
sample, drop exact duplicate rows from the candidate set, then greedily select points. Returned
indices always refer to rows of the caller's arrays.

# Examples

```rust
use ndarray::Array2;
use stein_thinning::preconditioner::Preconditioner;
use stein_thinning::thinning::SteinThinning;

// Points on a line with the score of a standard normal.
let sample = Array2::from_shape_fn((50, 1), |(i, _)| -2.5 + 0.1 * i as f64);
let gradient = -&sample;

let idx = SteinThinning::new(5)
    .preconditioner(Preconditioner::Median)
    .thin(sample.view(), gradient.view())
    .unwrap();
assert_eq!(idx.len(), 5);
assert!(idx.iter().all(|&i| i < 50));
```
*/

use crate::error::{Error, Result};
use crate::gradient_free::{log_weights, WeightedIntegrand};
use crate::greedy::{progress_bar, select_by_columns};
use crate::kernel::ImqKernel;
use crate::ksd::SteinIntegrand;
use crate::preconditioner::Preconditioner;
use crate::validate::{standardize, unique_rows, validate_sample, validate_vector};
use indicatif::ProgressBar;
use ndarray::prelude::*;

/// Configuration for a Stein thinning run.
#[derive(Debug, Clone, PartialEq)]
pub struct SteinThinning {
    n_points: usize,
    standardize: bool,
    preconditioner: Preconditioner,
    show_progress: bool,
}

impl SteinThinning {
    /// Thinning to `n_points` points, with standardization on, the identity preconditioner
    /// and no progress bar.
    pub fn new(n_points: usize) -> Self {
        Self {
            n_points,
            standardize: true,
            preconditioner: Preconditioner::default(),
            show_progress: false,
        }
    }

    /// Whether to rescale each dimension to unit mean absolute deviation before thinning.
    pub fn standardize(mut self, standardize: bool) -> Self {
        self.standardize = standardize;
        self
    }

    /// Preconditioner policy for the IMQ kernel.
    pub fn preconditioner(mut self, preconditioner: Preconditioner) -> Self {
        self.preconditioner = preconditioner;
        self
    }

    /// Whether to draw a progress bar over the selection steps.
    pub fn show_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn n_points(&self) -> usize {
        self.n_points
    }

    /// Selects `n_points` rows of `sample` (`n × d`) given the target scores `gradient`.
    pub fn thin(&self, sample: ArrayView2<f64>, gradient: ArrayView2<f64>) -> Result<Vec<usize>> {
        validate_sample(sample, gradient)?;
        self.check_size(sample.nrows())?;
        let unique = unique_rows(sample);
        let (sample, gradient) = self.rescale(sample, gradient)?;
        self.select(&unique, sample, gradient, None, "Stein")
    }

    /// Selects `n_points` rows of `sample` using a proxy distribution `q` in place of the
    /// target's score.
    ///
    /// `log_p` and `log_q` are the (possibly unnormalised) log-densities of the target and
    /// the proxy at each row; `gradient_q` holds the proxy's scores. `range_cap` clips the
    /// shifted log importance weights from above.
    pub fn thin_gradient_free(
        &self,
        sample: ArrayView2<f64>,
        log_p: ArrayView1<f64>,
        log_q: ArrayView1<f64>,
        gradient_q: ArrayView2<f64>,
        range_cap: Option<f64>,
    ) -> Result<Vec<usize>> {
        validate_sample(sample, gradient_q)?;
        validate_vector(log_p, sample.nrows(), "log_p")?;
        validate_vector(log_q, sample.nrows(), "log_q")?;
        self.check_size(sample.nrows())?;
        let weights = log_weights(log_p, log_q, range_cap)?;
        let unique = unique_rows(sample);
        let (sample, gradient_q) = self.rescale(sample, gradient_q)?;
        self.select(&unique, sample, gradient_q, Some(weights), "Stein-GF")
    }

    /// The integrand used for selection, bound to every row of the (rescaled) sample.
    ///
    /// Useful to measure the KSD of a selection with the same kernel that produced it, e.g.
    /// `integrand.ksd_of(&indices)`.
    pub fn integrand(
        &self,
        sample: ArrayView2<f64>,
        gradient: ArrayView2<f64>,
    ) -> Result<SteinIntegrand<ImqKernel>> {
        validate_sample(sample, gradient)?;
        let (sample, gradient) = self.rescale(sample, gradient)?;
        let kernel = ImqKernel::from_sample(sample.view(), &self.preconditioner)?;
        SteinIntegrand::new(sample, gradient, kernel)
    }

    fn check_size(&self, n: usize) -> Result<()> {
        if self.n_points == 0 {
            return Err(Error::InvalidParameter(
                "number of points to select must be positive".into(),
            ));
        }
        if self.n_points > n {
            return Err(Error::TooManyPoints {
                requested: self.n_points,
                available: n,
            });
        }
        Ok(())
    }

    fn rescale(
        &self,
        sample: ArrayView2<f64>,
        gradient: ArrayView2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>)> {
        if self.standardize {
            let st = standardize(sample, gradient)?;
            Ok((st.sample, st.gradient))
        } else {
            Ok((sample.to_owned(), gradient.to_owned()))
        }
    }

    /// Runs the greedy loop on the rows listed in `unique` and maps the picks back to rows
    /// of `sample`. The kernel is built from every row of `sample`, repeats included.
    fn select(
        &self,
        unique: &[usize],
        sample: Array2<f64>,
        gradient: Array2<f64>,
        log_weights: Option<Array1<f64>>,
        label: &'static str,
    ) -> Result<Vec<usize>> {
        if unique.len() < sample.nrows() {
            log::debug!(
                "dropped {} duplicate rows out of {}",
                sample.nrows() - unique.len(),
                sample.nrows()
            );
        }
        let kernel = ImqKernel::from_sample(sample.view(), &self.preconditioner)?;
        let sample = sample.select(Axis(0), unique);
        let gradient = gradient.select(Axis(0), unique);
        let integrand = SteinIntegrand::new(sample, gradient, kernel)?;

        let pb = if self.show_progress {
            progress_bar(self.n_points, label)
        } else {
            ProgressBar::hidden()
        };
        let selected = match log_weights {
            None => select_by_columns(
                integrand.diagonal()?,
                |s| integrand.column(s),
                self.n_points,
                &pb,
            )?,
            Some(w) => {
                let weighted = WeightedIntegrand::new(integrand, w.select(Axis(0), unique))?;
                select_by_columns(
                    weighted.diagonal()?,
                    |s| weighted.column(s),
                    self.n_points,
                    &pb,
                )?
            }
        };
        Ok(selected.into_iter().map(|k| unique[k]).collect())
    }
}

/// Stein thinning with default settings: standardized sample, identity preconditioner.
pub fn thin(
    sample: ArrayView2<f64>,
    gradient: ArrayView2<f64>,
    n_points: usize,
) -> Result<Vec<usize>> {
    SteinThinning::new(n_points).thin(sample, gradient)
}

/// Gradient-free Stein thinning with default settings.
pub fn thin_gradient_free(
    sample: ArrayView2<f64>,
    log_p: ArrayView1<f64>,
    log_q: ArrayView1<f64>,
    gradient_q: ArrayView2<f64>,
    n_points: usize,
    range_cap: Option<f64>,
) -> Result<Vec<usize>> {
    SteinThinning::new(n_points).thin_gradient_free(sample, log_p, log_q, gradient_q, range_cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::greedy::greedy_select;

    fn grid_sample() -> (Array2<f64>, Array2<f64>) {
        let sample = Array2::from_shape_fn((30, 2), |(i, k)| {
            let t = i as f64 / 29.0;
            if k == 0 {
                -2.0 + 4.0 * t
            } else {
                (6.0 * t).sin()
            }
        });
        let gradient = -&sample;
        (sample, gradient)
    }

    #[test]
    fn test_thin_returns_valid_indices() {
        let (x, g) = grid_sample();
        let idx = thin(x.view(), g.view(), 10).unwrap();
        assert_eq!(idx.len(), 10);
        assert!(idx.iter().all(|&i| i < 30));
    }

    #[test]
    fn test_thin_matches_greedy_on_integrand() {
        let (x, g) = grid_sample();
        let config = SteinThinning::new(8).preconditioner(Preconditioner::ScaledMedian);
        let idx = config.thin(x.view(), g.view()).unwrap();
        let integrand = config.integrand(x.view(), g.view()).unwrap();
        let direct = greedy_select(|i, j| integrand.eval(i, j), integrand.len(), 8).unwrap();
        assert_eq!(idx, direct);
    }

    #[test]
    fn test_duplicates_map_back_to_first_occurrence() {
        let (x, g) = grid_sample();
        // Prepend copies of rows 10 and 20 so every later row shifts by two.
        let rows: Vec<usize> = [10, 20].into_iter().chain(0..30).collect();
        let x_dup = x.select(Axis(0), &rows);
        let g_dup = g.select(Axis(0), &rows);

        let config = SteinThinning::new(6).standardize(false);
        let plain = config.thin(x.view(), g.view()).unwrap();
        let with_dup = config.thin(x_dup.view(), g_dup.view()).unwrap();

        let remap = |i: usize| match i {
            10 => 0,
            20 => 1,
            other => other + 2,
        };
        let expected: Vec<usize> = plain.into_iter().map(remap).collect();
        assert_eq!(with_dup, expected);
    }

    #[test]
    fn test_preconditioner_uses_every_row() {
        // Repeated states, as left behind by rejected MCMC proposals.
        let x = array![
            [0.0, 0.0],
            [0.0, 0.0],
            [0.0, 0.0],
            [0.0, 0.0],
            [1.0, 2.0],
            [1.0, 2.0],
            [3.0, -1.0],
            [-2.0, 0.5]
        ];
        let g = -&x;
        let config = SteinThinning::new(3).preconditioner(Preconditioner::Median);

        let integrand = config.integrand(x.view(), g.view()).unwrap();
        let st = standardize(x.view(), g.view()).unwrap();
        let full = Preconditioner::Median.build(st.sample.view()).unwrap();
        assert_eq!(integrand.kernel().linv(), full);

        let unique = Preconditioner::Median
            .build(st.sample.select(Axis(0), &unique_rows(x.view())).view())
            .unwrap();
        assert_ne!(full, unique);

        // The selection runs with the same kernel as the exposed integrand.
        let idx = config.thin(x.view(), g.view()).unwrap();
        let candidates = [0, 4, 6, 7];
        let direct = greedy_select(
            |i, j| integrand.eval(candidates[i], candidates[j]),
            candidates.len(),
            3,
        )
        .unwrap();
        let expected: Vec<usize> = direct.into_iter().map(|k| candidates[k]).collect();
        assert_eq!(idx, expected);
    }

    #[test]
    fn test_thin_input_not_mutated() {
        let (x, g) = grid_sample();
        let (x0, g0) = (x.clone(), g.clone());
        thin(x.view(), g.view(), 5).unwrap();
        assert_eq!(x, x0);
        assert_eq!(g, g0);
    }

    #[test]
    fn test_thin_errors() {
        let (x, g) = grid_sample();
        assert!(matches!(
            thin(x.view(), g.view(), 31),
            Err(Error::TooManyPoints { .. })
        ));
        assert!(matches!(
            thin(x.view(), g.view(), 0),
            Err(Error::InvalidParameter(_))
        ));
        let mut bad = x.clone();
        bad[[3, 1]] = f64::NAN;
        assert!(matches!(
            thin(bad.view(), g.view(), 5),
            Err(Error::NonFinite("sample"))
        ));
        let constant = Array2::from_elem((5, 2), 1.0);
        assert!(matches!(
            thin(constant.view(), constant.view(), 2),
            Err(Error::TooFewUniqueSamples(_))
        ));
    }

    #[test]
    fn test_more_points_than_unique_rows_is_allowed() {
        let x = array![[0.0], [1.0], [0.0], [1.0], [0.0]];
        let g = -&x;
        let idx = SteinThinning::new(4)
            .standardize(false)
            .thin(x.view(), g.view())
            .unwrap();
        assert_eq!(idx.len(), 4);
        assert!(idx.iter().all(|&i| i == 0 || i == 1));
    }

    #[test]
    fn test_gradient_free_equal_densities_match_standard_thinning() {
        let (x, g) = grid_sample();
        let log_p = Array1::from_iter(x.outer_iter().map(|r| -0.5 * r.dot(&r)));
        let config = SteinThinning::new(7).preconditioner(Preconditioner::Median);
        let standard = config.thin(x.view(), g.view()).unwrap();
        let gf = config
            .thin_gradient_free(x.view(), log_p.view(), log_p.view(), g.view(), None)
            .unwrap();
        assert_eq!(gf, standard);
    }

    #[test]
    fn test_gradient_free_validates_log_densities() {
        let (x, g) = grid_sample();
        let short = Array1::zeros(29);
        let full = Array1::zeros(30);
        assert!(matches!(
            thin_gradient_free(x.view(), short.view(), full.view(), g.view(), 5, None),
            Err(Error::ShapeMismatch { name: "log_p", .. })
        ));
    }
}
