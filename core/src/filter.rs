//! Range-aided particle filter engine
//!
//! The engine owns a fixed-size population of [`Particle`]s and a [`NoiseModel`] stream. Each tick
//! runs a strict linear pipeline: predict, weight, resample when the effective sample size falls
//! below a fraction of the population, and estimate.
//!
//! # Example
//!
//! ```rust
//! use rangenav::{Control, FilterConfig, Landmark, ParticleFilter, Pose2D};
//!
//! let config = FilterConfig::new(0.1, 0.05, 0.3, 200).with_seed(42);
//! let mut pf = ParticleFilter::new(config, Pose2D::new(1.0, 1.0, 0.0)).unwrap();
//! let landmarks = vec![Landmark::new(0.0, 0.0), Landmark::new(10.0, 0.0)];
//!
//! let estimate = pf
//!     .step(Control::forward(1.0), &[2.24, 8.06], &landmarks)
//!     .unwrap();
//! assert!((estimate.x - 2.0).abs() < 0.5);
//! ```
use crate::error::{FilterError, Result};
use crate::measurements::{Landmark, check_alignment, check_finite, expected_range};
use crate::noise::{NoiseConfig, NoiseModel};
use crate::particle::{
    Particle, ParticleAveragingStrategy, ParticleResamplingStrategy, effective_sample_size,
    resample_population,
};
use crate::{Control, Pose2D, wrap_to_2pi};

use log::{debug, trace, warn};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Particles handed to each parallel prediction worker
#[cfg(feature = "parallel")]
const PARALLEL_CHUNK: usize = 256;

fn default_threshold() -> f64 {
    0.5
}

/// Filter construction parameters.
///
/// Noise standard deviations and the particle count have no defaults and must be supplied through
/// [`FilterConfig::new`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub num_particles: usize,
    pub noise: NoiseConfig,
    #[serde(default)]
    pub resampling_strategy: ParticleResamplingStrategy,
    #[serde(default)]
    pub averaging_strategy: ParticleAveragingStrategy,
    /// Resample when N_eff < threshold * N
    #[serde(default = "default_threshold")]
    pub effective_sample_threshold: f64,
    /// Seed for the noise stream; `None` seeds from entropy
    #[serde(default)]
    pub seed: Option<u64>,
}
impl FilterConfig {
    pub fn new(sigma_pos: f64, sigma_rot: f64, sigma_sense: f64, num_particles: usize) -> Self {
        FilterConfig {
            num_particles,
            noise: NoiseConfig::new(sigma_pos, sigma_rot, sigma_sense),
            resampling_strategy: ParticleResamplingStrategy::default(),
            averaging_strategy: ParticleAveragingStrategy::default(),
            effective_sample_threshold: default_threshold(),
            seed: None,
        }
    }
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn with_resampling_strategy(mut self, strategy: ParticleResamplingStrategy) -> Self {
        self.resampling_strategy = strategy;
        self
    }
    pub fn with_averaging_strategy(mut self, strategy: ParticleAveragingStrategy) -> Self {
        self.averaging_strategy = strategy;
        self
    }
    pub fn with_effective_sample_threshold(mut self, threshold: f64) -> Self {
        self.effective_sample_threshold = threshold;
        self
    }
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(FilterError::InvalidConfiguration(
                "particle count must be positive".to_string(),
            ));
        }
        if !(self.effective_sample_threshold > 0.0 && self.effective_sample_threshold <= 1.0) {
            return Err(FilterError::InvalidConfiguration(format!(
                "effective sample threshold must lie in (0, 1] (got {})",
                self.effective_sample_threshold
            )));
        }
        self.noise.validate()
    }
    fn noise_model(&self) -> Result<NoiseModel> {
        match self.seed {
            Some(seed) => NoiseModel::new(self.noise, seed),
            None => NoiseModel::from_entropy(self.noise),
        }
    }
}

/// Result of a weighting pass
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WeightingOutcome {
    /// Weights were divided by `total_mass` and now sum to one
    Normalized { total_mass: f64 },
    /// Every likelihood underflowed; weights were left as computed
    Degenerate { total_mass: f64 },
}
impl WeightingOutcome {
    pub fn total_mass(&self) -> f64 {
        match self {
            WeightingOutcome::Normalized { total_mass }
            | WeightingOutcome::Degenerate { total_mass } => *total_mass,
        }
    }
    pub fn is_degenerate(&self) -> bool {
        matches!(self, WeightingOutcome::Degenerate { .. })
    }
}

/// Sequential Monte Carlo estimator of a planar pose from odometry and landmark ranges.
#[derive(Clone)]
pub struct ParticleFilter {
    config: FilterConfig,
    particles: Vec<Particle>,
    noise: NoiseModel,
    resample_count: usize,
}
impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self
            .particles
            .iter()
            .map(|p| p.weight)
            .fold(f64::INFINITY, f64::min);
        let max_weight = self.particles.iter().map(|p| p.weight).fold(0.0, f64::max);
        let mut debug = f.debug_struct("ParticleFilter");
        debug
            .field("num_particles", &self.particles.len())
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field("resample_count", &self.resample_count);
        if let Ok(mean) = self.estimate() {
            debug.field(
                "mean_pose",
                &format_args!("({:.3}, {:.3}, {:.3} rad)", mean.x, mean.y, mean.theta),
            );
        }
        debug.finish()
    }
}
impl ParticleFilter {
    /// Initialize a population around `initial_pose`.
    ///
    /// Positions are drawn from N(x0, sigma_pos) and N(y0, sigma_pos), headings from
    /// N(theta0, sigma_rot), and every weight is 1/N.
    ///
    /// # Errors
    /// [`FilterError::InvalidConfiguration`] when N is zero, a standard deviation is negative or
    /// non-finite, sigma_sense is zero, or the resampling threshold is outside (0, 1].
    pub fn new(config: FilterConfig, initial_pose: Pose2D) -> Result<Self> {
        config.validate()?;
        let mut noise = config.noise_model()?;
        let particles = Self::sample_population(&config, &mut noise, initial_pose)?;
        debug!(
            "Initialized {} particles around {} (seed {})",
            particles.len(),
            initial_pose,
            noise.seed()
        );
        Ok(ParticleFilter {
            config,
            particles,
            noise,
            resample_count: 0,
        })
    }
    /// Build a filter from an explicit population. The population size must match the configured
    /// particle count.
    pub fn from_particles(config: FilterConfig, particles: Vec<Particle>) -> Result<Self> {
        config.validate()?;
        if particles.len() != config.num_particles {
            return Err(FilterError::InvalidConfiguration(format!(
                "expected {} particles, got {}",
                config.num_particles,
                particles.len()
            )));
        }
        let noise = config.noise_model()?;
        let particles = particles
            .into_iter()
            .map(|p| Particle::new(p.x, p.y, p.theta, p.weight))
            .collect();
        Ok(ParticleFilter {
            config,
            particles,
            noise,
            resample_count: 0,
        })
    }
    fn sample_population(
        config: &FilterConfig,
        noise: &mut NoiseModel,
        center: Pose2D,
    ) -> Result<Vec<Particle>> {
        let weight = 1.0 / config.num_particles as f64;
        let mut particles = Vec::with_capacity(config.num_particles);
        for _ in 0..config.num_particles {
            let x = noise.sample_normal(center.x, config.noise.sigma_pos)?;
            let y = noise.sample_normal(center.y, config.noise.sigma_pos)?;
            let theta = noise.sample_normal(center.theta, config.noise.sigma_rot)?;
            particles.push(Particle::new(x, y, theta, weight));
        }
        Ok(particles)
    }
    /// Redraw the population around a new pose, keeping the noise stream.
    pub fn reset(&mut self, pose: Pose2D) -> Result<()> {
        self.particles = Self::sample_population(&self.config, &mut self.noise, pose)?;
        self.resample_count = 0;
        Ok(())
    }

    /// Motion update.
    ///
    /// Every particle draws its own noisy distance and noisy rotation, advances along its current
    /// heading, then turns. Headings are wrapped into [0, 2π).
    pub fn predict(&mut self, control: Control) {
        #[cfg(feature = "parallel")]
        {
            let mut workers: Vec<NoiseModel> = (0..self.particles.len().div_ceil(PARALLEL_CHUNK))
                .map(|_| self.noise.fork())
                .collect();
            self.particles
                .par_chunks_mut(PARALLEL_CHUNK)
                .zip(workers.par_iter_mut())
                .for_each(|(chunk, noise)| {
                    for particle in chunk {
                        move_particle(particle, control, noise);
                    }
                });
        }
        #[cfg(not(feature = "parallel"))]
        for particle in &mut self.particles {
            move_particle(particle, control, &mut self.noise);
        }
    }

    /// Measurement update.
    ///
    /// Each particle's weight becomes the product over landmarks of the Gaussian density of the range
    /// residual. When the total mass is positive the weights are normalized to sum to one. If some
    /// products overflowed, those particles share the mass equally and all others get zero. When
    /// every product underflowed the weights are left as computed and the outcome is degenerate.
    ///
    /// # Errors
    /// [`FilterError::InputContractViolation`] when the measurement and landmark vectors differ in
    /// length, [`FilterError::NonFiniteMeasurement`] when a range is NaN or infinite. No weight is
    /// modified in either case.
    pub fn weight(
        &mut self,
        measurements: &[f64],
        landmarks: &[Landmark],
    ) -> Result<WeightingOutcome> {
        check_alignment(measurements, landmarks)?;
        check_finite(measurements)?;
        let noise = &self.noise;
        #[cfg(feature = "parallel")]
        self.particles.par_iter_mut().for_each(|particle| {
            particle.weight = likelihood(particle, measurements, landmarks, noise);
        });
        #[cfg(not(feature = "parallel"))]
        for particle in &mut self.particles {
            particle.weight = likelihood(particle, measurements, landmarks, noise);
        }

        let total_mass: f64 = self.particles.iter().map(|p| p.weight).sum();
        if total_mass == f64::INFINITY {
            // Overflowed products dominate every finite one; share the mass among them.
            let saturated = self.particles.iter().filter(|p| p.weight.is_infinite()).count();
            debug!("Likelihood overflow in {saturated} particles; splitting mass evenly");
            for particle in &mut self.particles {
                particle.weight = if particle.weight.is_infinite() {
                    1.0 / saturated as f64
                } else {
                    0.0
                };
            }
            Ok(WeightingOutcome::Normalized { total_mass })
        } else if total_mass > 0.0 && total_mass.is_finite() {
            for particle in &mut self.particles {
                particle.weight /= total_mass;
            }
            Ok(WeightingOutcome::Normalized { total_mass })
        } else {
            warn!(
                "Degenerate weights: total likelihood mass {total_mass:e} across {} particles",
                self.particles.len()
            );
            Ok(WeightingOutcome::Degenerate { total_mass })
        }
    }

    /// N_eff = 1 / (sum of squared weights + epsilon), clamped to N
    pub fn effective_sample_size(&self) -> f64 {
        effective_sample_size(&self.weights())
    }
    /// Whether the population has degenerated below the configured fraction of N
    pub fn needs_resampling(&self) -> bool {
        self.effective_sample_size()
            < self.config.effective_sample_threshold * self.particles.len() as f64
    }
    /// Replace the population with `N` draws according to the current weights.
    pub fn resample(&mut self) {
        let n = self.particles.len();
        let weights = self.weights();
        let indices = self
            .config
            .resampling_strategy
            .indices(&weights, n, self.noise.rng_mut());
        self.particles = resample_population(&self.particles, &indices);
        self.resample_count += 1;
    }
    /// Resample only when [`needs_resampling`](Self::needs_resampling). Returns whether it did.
    pub fn resample_if_needed(&mut self) -> bool {
        let n_eff = self.effective_sample_size();
        if !self.needs_resampling() {
            return false;
        }
        debug!(
            "Resampling {} particles ({:?}), N_eff = {:.2}",
            self.particles.len(),
            self.config.resampling_strategy,
            n_eff
        );
        self.resample();
        true
    }

    /// Reduce the population to a pose estimate using the configured averaging strategy.
    ///
    /// # Errors
    /// [`FilterError::EmptyPopulation`] when there are no particles.
    pub fn estimate(&self) -> Result<Pose2D> {
        self.config
            .averaging_strategy
            .estimate(&self.particles)
            .ok_or(FilterError::EmptyPopulation)
    }
    /// Covariance of `[x, y, theta]` about the current estimate.
    pub fn covariance(&self) -> Result<Matrix3<f64>> {
        let mean = self.estimate()?;
        self.config
            .averaging_strategy
            .covariance(&self.particles, &mean)
            .ok_or(FilterError::EmptyPopulation)
    }

    /// One filter tick: predict, weight, resample if needed, estimate.
    ///
    /// A contract violation in the weighting step aborts the tick before resampling or estimation.
    pub fn step(
        &mut self,
        control: Control,
        measurements: &[f64],
        landmarks: &[Landmark],
    ) -> Result<Pose2D> {
        self.predict(control);
        self.weight(measurements, landmarks)?;
        self.resample_if_needed();
        let estimate = self.estimate()?;
        trace!("Estimate after {:?}: {}", control, estimate);
        Ok(estimate)
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    pub fn weights(&self) -> Vec<f64> {
        self.particles.iter().map(|p| p.weight).collect()
    }
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
    /// Number of resampling passes since construction or the last reset
    pub fn resample_count(&self) -> usize {
        self.resample_count
    }
}

fn move_particle(particle: &mut Particle, control: Control, noise: &mut NoiseModel) {
    let noisy_distance = control.distance + noise.sample_translation();
    particle.x += noisy_distance * particle.theta.cos();
    particle.y += noisy_distance * particle.theta.sin();
    let noisy_rotation = control.rotation + noise.sample_rotation();
    particle.theta = wrap_to_2pi(particle.theta + noisy_rotation);
}

fn likelihood(
    particle: &Particle,
    measurements: &[f64],
    landmarks: &[Landmark],
    noise: &NoiseModel,
) -> f64 {
    let mut product = 1.0;
    for (measured, landmark) in measurements.iter().zip(landmarks.iter()) {
        let residual = measured - expected_range(particle.x, particle.y, landmark);
        let density = noise.measurement_likelihood(residual);
        // stop before an overflowed product meets a zero density (inf * 0 = NaN)
        if density == 0.0 {
            return 0.0;
        }
        product *= density;
    }
    product
}
