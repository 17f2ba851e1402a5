//! Input validation, standardization and duplicate removal.
//!
//! Every check here runs before any kernel is built, so malformed input never reaches the
//! selection loop.

use crate::error::{Error, Result};
use crate::stats::location_scale;
use ndarray::prelude::*;
use std::collections::HashSet;

/// Checks that `sample` and `gradient` are non-empty, have the same shape and hold only
/// finite values.
pub fn validate_sample(sample: ArrayView2<f64>, gradient: ArrayView2<f64>) -> Result<()> {
    let (n, d) = sample.dim();
    if n == 0 {
        return Err(Error::EmptyInput("sample has no rows"));
    }
    if d == 0 {
        return Err(Error::EmptyInput("sample has no columns"));
    }
    if gradient.dim() != (n, d) {
        return Err(Error::ShapeMismatch {
            name: "gradient",
            found: gradient.shape().to_vec(),
            expected: vec![n, d],
        });
    }
    ensure_finite(sample.iter(), "sample")?;
    ensure_finite(gradient.iter(), "gradient")?;
    Ok(())
}

/// Checks that a per-point vector (e.g. log-densities) has length `n` and only finite values.
pub fn validate_vector(values: ArrayView1<f64>, n: usize, name: &'static str) -> Result<()> {
    if values.len() != n {
        return Err(Error::ShapeMismatch {
            name,
            found: vec![values.len()],
            expected: vec![n],
        });
    }
    ensure_finite(values.iter(), name)
}

fn ensure_finite<'a>(mut values: impl Iterator<Item = &'a f64>, name: &'static str) -> Result<()> {
    if values.all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(Error::NonFinite(name))
    }
}

/// A sample and gradient rescaled so that every dimension has unit mean absolute deviation.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardized {
    pub sample: Array2<f64>,
    pub gradient: Array2<f64>,
    /// Per-dimension scale that was divided out of the sample.
    pub scale: Array1<f64>,
}

/// Divides each sample column by its mean absolute deviation and multiplies the matching
/// gradient column by the same factor (chain rule for `x / s`).
///
/// The inputs are left untouched. Fails if any column has zero spread.
pub fn standardize(sample: ArrayView2<f64>, gradient: ArrayView2<f64>) -> Result<Standardized> {
    let (_, scale) = location_scale(sample)?;
    if let Some(dim) = scale.iter().position(|&s| s <= 0.0) {
        return Err(Error::TooFewUniqueSamples(format!(
            "dimension {dim} of the sample has zero spread"
        )));
    }
    Ok(Standardized {
        sample: &sample / &scale,
        gradient: &gradient * &scale,
        scale,
    })
}

/// Indices of the first occurrence of each distinct row, in their original order.
///
/// Rows are compared bitwise, with `-0.0` treated as equal to `0.0`.
pub fn unique_rows(sample: ArrayView2<f64>) -> Vec<usize> {
    let mut seen: HashSet<Vec<u64>> = HashSet::with_capacity(sample.nrows());
    sample
        .outer_iter()
        .enumerate()
        .filter_map(|(i, row)| {
            let key: Vec<u64> = row
                .iter()
                .map(|&v| if v == 0.0 { 0 } else { v.to_bits() })
                .collect();
            seen.insert(key).then_some(i)
        })
        .collect()
}
