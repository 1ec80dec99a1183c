//! Particles, resampling strategies and population averaging.
//!
//! Resampling is expressed as a pure function of the weight vector: a strategy draws `n` indices and
//! [`resample_population`] materializes the new population from them. The filter engine owns the only
//! mutable copy of the population, so the swap happens in one place.
use crate::{Pose2D, angle_difference, wrap_to_2pi};

use log::warn;
use nalgebra::{Matrix3, Point2, Vector3};
use rand::Rng;
use rand::distr::weighted::WeightedIndex;
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Added to the sum of squared weights so the effective sample size never divides by zero
pub const NEFF_EPSILON: f64 = 1e-12;

/// A weighted pose hypothesis.
///
/// Particles have no identity beyond their position in the population and are freely copied when
/// the population is resampled.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    /// Heading in radians, kept in [0, 2π)
    pub theta: f64,
    pub weight: f64,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("x", &self.x)
            .field("y", &self.y)
            .field("theta", &self.theta)
            .field("weight", &self.weight)
            .finish()
    }
}
impl Particle {
    /// Create a particle. The heading is wrapped into [0, 2π).
    pub fn new(x: f64, y: f64, theta: f64, weight: f64) -> Particle {
        Particle {
            x,
            y,
            theta: wrap_to_2pi(theta),
            weight,
        }
    }
    pub fn from_pose(pose: Pose2D, weight: f64) -> Particle {
        Particle::new(pose.x, pose.y, pose.theta, weight)
    }
    pub fn pose(&self) -> Pose2D {
        Pose2D::new(self.x, self.y, self.theta)
    }
    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// Effective sample size of a weight vector.
///
/// $$
/// N_{eff} = \frac{1}{\sum_i w_i^2 + \epsilon}
/// $$
///
/// The result is clamped to the number of weights, so an all-zero (degenerate) weight vector reports
/// a full population instead of an arbitrarily large number. An empty slice yields zero.
///
/// # Example
/// ```rust
/// use rangenav::particle::effective_sample_size;
///
/// let uniform = vec![0.25; 4];
/// assert!((effective_sample_size(&uniform) - 4.0).abs() < 1e-6);
/// assert!((effective_sample_size(&[0.0, 1.0, 0.0]) - 1.0).abs() < 1e-6);
/// ```
pub fn effective_sample_size(weights: &[f64]) -> f64 {
    if weights.is_empty() {
        return 0.0;
    }
    let sum_of_squares: f64 = weights.iter().map(|w| w * w).sum();
    let n_eff = 1.0 / (sum_of_squares + NEFF_EPSILON);
    if n_eff.is_nan() {
        return 0.0;
    }
    n_eff.min(weights.len() as f64)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum ParticleResamplingStrategy {
    /// Independent draws with replacement from the weight distribution
    #[default]
    Multinomial,
    Systematic,
    Stratified,
    Residual,
}
impl ParticleResamplingStrategy {
    /// Draw `n` population indices according to `weights`.
    pub fn indices<R: Rng + ?Sized>(&self, weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
        match self {
            ParticleResamplingStrategy::Multinomial => multinomial_resample(weights, n, rng),
            ParticleResamplingStrategy::Systematic => systematic_resample(weights, n, rng),
            ParticleResamplingStrategy::Stratified => stratified_resample(weights, n, rng),
            ParticleResamplingStrategy::Residual => residual_resample(weights, n, rng),
        }
    }
}

/// Total mass of a weight vector if it can define a distribution
fn usable_mass(weights: &[f64]) -> Option<f64> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return None;
    }
    let total: f64 = weights.iter().sum();
    if total > 0.0 && total.is_finite() {
        Some(total)
    } else {
        None
    }
}

fn uniform_indices<R: Rng + ?Sized>(len: usize, n: usize, rng: &mut R) -> Vec<usize> {
    warn!("Weights carry no usable mass; falling back to uniform resampling of {len} particles");
    (0..n).map(|_| rng.random_range(0..len)).collect()
}

/// Walk the cumulative weight distribution at sorted `positions` (in units of total mass).
fn cumulative_walk(weights: &[f64], positions: impl Iterator<Item = f64>) -> Vec<usize> {
    let last = weights.len() - 1;
    let mut indices = Vec::new();
    let mut i = 0;
    let mut cumsum = weights[0];
    for position in positions {
        while position > cumsum && i < last {
            i += 1;
            cumsum += weights[i];
        }
        indices.push(i);
    }
    indices
}

/// Multinomial resampling: `n` independent draws from the discrete distribution defined by
/// `weights`. Falls back to uniform draws when the weights carry no usable mass.
pub fn multinomial_resample<R: Rng + ?Sized>(
    weights: &[f64],
    n: usize,
    rng: &mut R,
) -> Vec<usize> {
    if weights.is_empty() {
        return Vec::new();
    }
    if usable_mass(weights).is_none() {
        return uniform_indices(weights.len(), n, rng);
    }
    match WeightedIndex::new(weights) {
        Ok(distribution) => (0..n).map(|_| distribution.sample(rng)).collect(),
        Err(e) => {
            warn!("Cannot build weighted index: {e}");
            uniform_indices(weights.len(), n, rng)
        }
    }
}

/// Systematic resampling: a single uniform offset and `n` evenly spaced positions.
pub fn systematic_resample<R: Rng + ?Sized>(
    weights: &[f64],
    n: usize,
    rng: &mut R,
) -> Vec<usize> {
    if weights.is_empty() || n == 0 {
        return Vec::new();
    }
    let Some(total) = usable_mass(weights) else {
        return uniform_indices(weights.len(), n, rng);
    };
    let step = total / n as f64;
    let offset = rng.random::<f64>() * step;
    cumulative_walk(weights, (0..n).map(|k| offset + k as f64 * step))
}

/// Stratified resampling: one uniform draw inside each of `n` equal strata.
pub fn stratified_resample<R: Rng + ?Sized>(
    weights: &[f64],
    n: usize,
    rng: &mut R,
) -> Vec<usize> {
    if weights.is_empty() || n == 0 {
        return Vec::new();
    }
    let Some(total) = usable_mass(weights) else {
        return uniform_indices(weights.len(), n, rng);
    };
    let step = total / n as f64;
    let positions: Vec<f64> = (0..n)
        .map(|k| (k as f64 + rng.random::<f64>()) * step)
        .collect();
    cumulative_walk(weights, positions.into_iter())
}

/// Residual resampling: deterministic copies of `floor(n * w)` followed by a systematic pass over
/// the fractional remainders.
pub fn residual_resample<R: Rng + ?Sized>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    if weights.is_empty() || n == 0 {
        return Vec::new();
    }
    let Some(total) = usable_mass(weights) else {
        return uniform_indices(weights.len(), n, rng);
    };
    let mut indices = Vec::with_capacity(n);
    let mut residual = vec![0.0; weights.len()];
    for (i, &w) in weights.iter().enumerate() {
        let expected = w / total * n as f64;
        let copies = expected.floor() as usize;
        residual[i] = expected - copies as f64;
        for _ in 0..copies {
            if indices.len() < n {
                indices.push(i);
            }
        }
    }
    let remaining = n - indices.len();
    if remaining > 0 {
        indices.extend(systematic_resample(&residual, remaining, rng));
    }
    indices
}

/// Build the new population from drawn indices. Weights travel with the copied particles.
pub fn resample_population(particles: &[Particle], indices: &[usize]) -> Vec<Particle> {
    indices.iter().map(|&i| particles[i]).collect()
}

/// How a population is reduced to a single pose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum ParticleAveragingStrategy {
    /// Arithmetic mean of positions and circular mean of headings, every particle counted once
    #[default]
    UnweightedAverage,
    /// Weight-weighted means
    WeightedAverage,
    /// Pose of the single heaviest particle
    HighestWeight,
}
impl ParticleAveragingStrategy {
    /// Per-particle averaging factors and their total, or `None` for an empty population
    fn factors(&self, particles: &[Particle]) -> Option<(Vec<f64>, f64)> {
        if particles.is_empty() {
            return None;
        }
        let uniform = || (vec![1.0; particles.len()], particles.len() as f64);
        match self {
            ParticleAveragingStrategy::UnweightedAverage => Some(uniform()),
            ParticleAveragingStrategy::WeightedAverage => {
                let weights: Vec<f64> = particles.iter().map(|p| p.weight).collect();
                match usable_mass(&weights) {
                    Some(total) => Some((weights, total)),
                    None => {
                        warn!("Weighted average requested on degenerate weights; using unweighted");
                        Some(uniform())
                    }
                }
            }
            ParticleAveragingStrategy::HighestWeight => {
                let best = particles
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.weight.total_cmp(&b.1.weight))
                    .map(|(i, _)| i)?;
                let mut factors = vec![0.0; particles.len()];
                factors[best] = 1.0;
                Some((factors, 1.0))
            }
        }
    }
    /// Reduce the population to a pose. Returns `None` for an empty population.
    ///
    /// Headings are averaged on the unit circle:
    /// $\hat\theta = \operatorname{atan2}(\overline{\sin\theta}, \overline{\cos\theta})$, reported in [0, 2π).
    pub fn estimate(&self, particles: &[Particle]) -> Option<Pose2D> {
        let (factors, total) = self.factors(particles)?;
        let mut x = 0.0;
        let mut y = 0.0;
        let mut sin_sum = 0.0;
        let mut cos_sum = 0.0;
        for (particle, factor) in particles.iter().zip(factors.iter()) {
            x += factor * particle.x;
            y += factor * particle.y;
            sin_sum += factor * particle.theta.sin();
            cos_sum += factor * particle.theta.cos();
        }
        let theta = (sin_sum / total).atan2(cos_sum / total);
        Some(Pose2D::new(x / total, y / total, wrap_to_2pi(theta)))
    }
    /// Spread of the population about `mean` as a 3x3 covariance over `[x, y, theta]`.
    ///
    /// Heading deviations are the signed angular differences from the mean heading. The
    /// highest-weight strategy reports a zero matrix.
    pub fn covariance(&self, particles: &[Particle], mean: &Pose2D) -> Option<Matrix3<f64>> {
        let (factors, total) = self.factors(particles)?;
        let mut cov = Matrix3::<f64>::zeros();
        if *self == ParticleAveragingStrategy::HighestWeight {
            return Some(cov);
        }
        for (particle, factor) in particles.iter().zip(factors.iter()) {
            let diff = Vector3::new(
                particle.x - mean.x,
                particle.y - mean.y,
                angle_difference(particle.theta, mean.theta),
            );
            cov += *factor * diff * diff.transpose();
        }
        Some(cov / total)
    }
}
