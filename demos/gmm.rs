//! Thins a sample from a 2D Gaussian mixture, once with exact scores and once gradient-free
//! with a Gaussian proxy fitted to the sample, and reports the KSD of each selection.

use ndarray::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::error::Error;
use stein_thinning::distributions::{Gaussian, GaussianMixture, LogDensity};
use stein_thinning::stats::sample_covariance;
use stein_thinning::{Preconditioner, SteinThinning};

fn main() -> Result<(), Box<dyn Error>> {
    const SAMPLE_SIZE: usize = 2_000;
    const N_POINTS: usize = 40;
    const SEED: u64 = 42;

    let target = GaussianMixture::new(
        vec![0.3, 0.7],
        vec![
            Gaussian::new(array![-1.0, -1.0], array![[0.5, 0.25], [0.25, 1.0]])?,
            Gaussian::new(array![1.0, 1.0], array![[2.0, -1.2], [-1.2, 1.5]])?,
        ],
    )?;
    let mut rng = SmallRng::seed_from_u64(SEED);
    let sample = target.sample(SAMPLE_SIZE, &mut rng);
    let gradient = target.score_rows(sample.view());
    println!("Generated {} samples", sample.nrows());

    let config = SteinThinning::new(N_POINTS)
        .preconditioner(Preconditioner::ScaledMedian)
        .show_progress(true);

    let idx = config.thin(sample.view(), gradient.view())?;
    let integrand = config.integrand(sample.view(), gradient.view())?;
    let head: Vec<usize> = (0..N_POINTS).collect();
    println!("Selected: {:?}", idx);
    println!(
        "KSD of {} thinned points: {:.4} (first {} draws: {:.4})",
        N_POINTS,
        integrand.ksd_of(&idx)[N_POINTS - 1],
        N_POINTS,
        integrand.ksd_of(&head)[N_POINTS - 1]
    );

    // Gradient-free: scores from a Gaussian fitted to the sample, reweighted by p / q.
    let proxy = Gaussian::new(
        sample
            .mean_axis(Axis(0))
            .ok_or("cannot take the mean of an empty sample")?,
        sample_covariance(sample.view())?,
    )?;
    let log_p = target.log_prob_rows(sample.view());
    let log_q = proxy.log_prob_rows(sample.view());
    let gradient_q = proxy.score_rows(sample.view());
    let idx_gf =
        config.thin_gradient_free(sample.view(), log_p.view(), log_q.view(), gradient_q.view(), None)?;
    println!("Selected (gradient-free): {:?}", idx_gf);
    println!(
        "KSD of {} gradient-free points: {:.4}",
        N_POINTS,
        integrand.ksd_of(&idx_gf)[N_POINTS - 1]
    );

    let mean = sample.select(Axis(0), &idx).mean_axis(Axis(0)).ok_or("empty selection")?;
    println!("Mean of thinned points: ({:.2}, {:.2})", mean[0], mean[1]);
    Ok(())
}
