//! Greedy minimisation of the cumulative kernel Stein discrepancy.
//!
//! After `i` points have been chosen, the squared KSD of the set extended by candidate `j` is,
//! up to terms that do not depend on `j`, `k0(j, j) + 2 Σ_{selected s} k0(j, s)`. The running
//! vector of these objectives is updated with one kernel column per step, so selecting `m`
//! points from `n` costs `O(n·m)` kernel evaluations.

use crate::error::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, ArrayView1};
use ndarray_stats::errors::MinMaxError;
use ndarray_stats::QuantileExt;
use rayon::prelude::*;

/// Selects `n_points` indices from `0..n`, each minimising the running objective.
///
/// `integrand(i, j)` must return the Stein kernel value for points `i` and `j`. Ties resolve to
/// the lowest index. An index already selected is not excluded; it is re-selected whenever it
/// is still the minimiser.
///
/// # Errors
///
/// * [`Error::EmptyInput`] if `n == 0`.
/// * [`Error::InvalidParameter`] if `n_points == 0`.
/// * [`Error::TooManyPoints`] if `n_points > n`.
/// * [`Error::UndefinedKernelValue`] if the objective becomes NaN.
pub fn greedy_select<F>(integrand: F, n: usize, n_points: usize) -> Result<Vec<usize>>
where
    F: Fn(usize, usize) -> f64 + Sync,
{
    greedy_select_with_progress(integrand, n, n_points, &ProgressBar::hidden())
}

/// Like [`greedy_select`], advancing `pb` once per selected point.
///
/// The progress bar is purely observational.
pub fn greedy_select_with_progress<F>(
    integrand: F,
    n: usize,
    n_points: usize,
    pb: &ProgressBar,
) -> Result<Vec<usize>>
where
    F: Fn(usize, usize) -> f64 + Sync,
{
    if n > 0 && n_points > n {
        return Err(Error::TooManyPoints {
            requested: n_points,
            available: n,
        });
    }
    select_points(integrand, n, n_points, pb)
}

/// Builds kernel columns from a pairwise integrand, in parallel over candidates.
fn select_points<F>(
    integrand: F,
    n: usize,
    n_points: usize,
    pb: &ProgressBar,
) -> Result<Vec<usize>>
where
    F: Fn(usize, usize) -> f64 + Sync,
{
    let diagonal: Vec<f64> = (0..n).into_par_iter().map(|j| integrand(j, j)).collect();
    select_by_columns(
        Array1::from(diagonal),
        |s| {
            let column: Vec<f64> = (0..n).into_par_iter().map(|j| integrand(j, s)).collect();
            Ok(Array1::from(column))
        },
        n_points,
        pb,
    )
}

/// The selection loop over whole kernel columns.
///
/// `diagonal[j]` is `k0(j, j)` and `column(s)[j]` is `k0(j, s)`. The number of picks is not
/// bounded by the number of candidates: after duplicate rows have been removed more points may
/// be requested than there are distinct candidates, and later picks then repeat earlier ones.
pub(crate) fn select_by_columns<C>(
    diagonal: Array1<f64>,
    column: C,
    n_points: usize,
    pb: &ProgressBar,
) -> Result<Vec<usize>>
where
    C: Fn(usize) -> Result<Array1<f64>>,
{
    let n = diagonal.len();
    if n == 0 {
        return Err(Error::EmptyInput("no candidate points"));
    }
    if n_points == 0 {
        return Err(Error::InvalidParameter(
            "number of points to select must be positive".into(),
        ));
    }
    pb.set_length(n_points as u64);

    let mut objective = diagonal;
    let mut selected = Vec::with_capacity(n_points);
    selected.push(argmin(objective.view())?);
    pb.inc(1);

    for _ in 1..n_points {
        let last = selected[selected.len() - 1];
        let col = column(last)?;
        if col.len() != n {
            return Err(Error::ShapeMismatch {
                name: "kernel column",
                found: vec![col.len()],
                expected: vec![n],
            });
        }
        objective.scaled_add(2.0, &col);
        selected.push(argmin(objective.view())?);
        pb.inc(1);
    }
    pb.finish_with_message("Done!");
    Ok(selected)
}

/// Index of the smallest value; the first one wins ties.
fn argmin(values: ArrayView1<f64>) -> Result<usize> {
    values.argmin().map_err(|e| match e {
        MinMaxError::EmptyInput => Error::EmptyInput("no candidate points"),
        MinMaxError::UndefinedOrder => Error::UndefinedKernelValue,
    })
}

/// Progress bar for the selection loop, styled like the sampler progress bars.
pub fn progress_bar(n_points: usize, prefix: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(n_points as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:8} {bar:40.white} ETA {eta:3} | {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix);
    pb
}
