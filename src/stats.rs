//! Sample statistics used to standardize samples and build preconditioners.

use crate::error::{Error, Result};
use ndarray::prelude::*;
use ndarray_stats::CorrelationExt;
use std::cmp::Ordering;

/// Largest number of rows used when estimating the median pairwise distance.
pub const MEDIAN_SUBSAMPLE_SIZE: usize = 1000;

/// Indices of `m` rows spread evenly over `0..n`, always including the first and last row.
///
/// Returns `0..n` when `n <= m`.
pub fn systematic_subsample(n: usize, m: usize) -> Vec<usize> {
    if n <= m {
        return (0..n).collect();
    }
    if m == 1 {
        return vec![0];
    }
    let step = (n - 1) as f64 / (m - 1) as f64;
    (0..m)
        .map(|i| if i == m - 1 { n - 1 } else { (i as f64 * step) as usize })
        .collect()
}

/// Squared median of the Euclidean distances between all pairs of rows.
///
/// When the sample has more than [`MEDIAN_SUBSAMPLE_SIZE`] rows, the median is taken over a
/// systematic subsample of that size. Returns an error if fewer than two rows are available.
pub fn median_pairwise_sq(sample: ArrayView2<f64>) -> Result<f64> {
    let rows = systematic_subsample(sample.nrows(), MEDIAN_SUBSAMPLE_SIZE);
    if rows.len() < 2 {
        return Err(Error::TooFewUniqueSamples(
            "median pairwise distance needs at least two points".into(),
        ));
    }
    let sub = sample.select(Axis(0), &rows);

    let mut dists = Vec::with_capacity(rows.len() * (rows.len() - 1) / 2);
    for i in 0..sub.nrows() {
        for j in (i + 1)..sub.nrows() {
            let diff = &sub.row(i) - &sub.row(j);
            dists.push(diff.dot(&diff).sqrt());
        }
    }
    let med = median(&mut dists);
    Ok(med * med)
}

/// Median of a non-empty slice, averaging the two middle values for even lengths.
fn median(values: &mut [f64]) -> f64 {
    values.sort_unstable_by(cmp_f64);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

fn cmp_f64(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Unbiased (ddof = 1) covariance of the columns of `sample`.
pub fn sample_covariance(sample: ArrayView2<f64>) -> Result<Array2<f64>> {
    if sample.nrows() < 2 {
        return Err(Error::TooFewUniqueSamples(
            "sample covariance needs at least two points".into(),
        ));
    }
    // `cov` treats rows as variables and columns as observations.
    sample
        .t()
        .cov(1.0)
        .map_err(|_| Error::EmptyInput("sample"))
}

/// Per-column mean and mean absolute deviation from that mean.
pub fn location_scale(sample: ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
    let loc = sample
        .mean_axis(Axis(0))
        .ok_or(Error::EmptyInput("sample"))?;
    let scale = (&sample - &loc)
        .mapv(f64::abs)
        .mean_axis(Axis(0))
        .ok_or(Error::EmptyInput("sample"))?;
    Ok((loc, scale))
}
