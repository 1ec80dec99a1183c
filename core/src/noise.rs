//! Gaussian noise model shared by the prediction and weighting steps
//!
//! The noise model owns its random stream explicitly. A filter holds one `NoiseModel`, the simulated
//! robot holds another, and parallel workers receive forked children, so no two consumers ever draw
//! from the same generator. Seeding the model makes an entire filter trajectory reproducible.
use crate::error::{FilterError, Result};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Standard deviations of the process and measurement noise.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Translation (forward distance) process noise standard deviation
    pub sigma_pos: f64,
    /// Rotation (heading change) process noise standard deviation, radians
    pub sigma_rot: f64,
    /// Range measurement noise standard deviation
    pub sigma_sense: f64,
}
impl NoiseConfig {
    pub fn new(sigma_pos: f64, sigma_rot: f64, sigma_sense: f64) -> Self {
        NoiseConfig {
            sigma_pos,
            sigma_rot,
            sigma_sense,
        }
    }
    /// Check that every standard deviation is usable.
    ///
    /// Process noise may be zero (deterministic motion). Measurement noise must be strictly positive,
    /// with a variance that does not underflow to zero.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("sigma_pos", self.sigma_pos),
            ("sigma_rot", self.sigma_rot),
            ("sigma_sense", self.sigma_sense),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(FilterError::InvalidConfiguration(format!(
                    "{name} must be a finite, non-negative standard deviation (got {value})"
                )));
            }
        }
        if self.sigma_sense * self.sigma_sense == 0.0 {
            return Err(FilterError::InvalidConfiguration(
                "sigma_sense must be strictly positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Seeded Gaussian sampler for translation, rotation and range noise.
#[derive(Clone, Debug)]
pub struct NoiseModel {
    config: NoiseConfig,
    translation: Normal<f64>,
    rotation: Normal<f64>,
    measurement: Normal<f64>,
    seed: u64,
    rng: StdRng,
}
impl NoiseModel {
    /// Create a noise model with a deterministic stream.
    ///
    /// # Example
    /// ```rust
    /// use rangenav::noise::{NoiseConfig, NoiseModel};
    ///
    /// let mut a = NoiseModel::new(NoiseConfig::new(0.1, 0.05, 0.3), 7).unwrap();
    /// let mut b = NoiseModel::new(NoiseConfig::new(0.1, 0.05, 0.3), 7).unwrap();
    /// assert_eq!(a.sample_translation(), b.sample_translation());
    /// ```
    pub fn new(config: NoiseConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(NoiseModel {
            config,
            translation: normal(0.0, config.sigma_pos)?,
            rotation: normal(0.0, config.sigma_rot)?,
            measurement: normal(0.0, config.sigma_sense)?,
            seed,
            rng: StdRng::seed_from_u64(seed),
        })
    }
    /// Create a noise model seeded from the thread-local entropy source.
    pub fn from_entropy(config: NoiseConfig) -> Result<Self> {
        Self::new(config, rand::random())
    }
    pub fn config(&self) -> &NoiseConfig {
        &self.config
    }
    /// Seed this stream was created with
    pub fn seed(&self) -> u64 {
        self.seed
    }
    /// Draw a translation perturbation from N(0, sigma_pos)
    pub fn sample_translation(&mut self) -> f64 {
        self.translation.sample(&mut self.rng)
    }
    /// Draw a rotation perturbation from N(0, sigma_rot)
    pub fn sample_rotation(&mut self) -> f64 {
        self.rotation.sample(&mut self.rng)
    }
    /// Draw a range perturbation from N(0, sigma_sense)
    pub fn sample_measurement(&mut self) -> f64 {
        self.measurement.sample(&mut self.rng)
    }
    /// Draw from N(mean, std) using this model's stream.
    pub fn sample_normal(&mut self, mean: f64, std: f64) -> Result<f64> {
        Ok(normal(mean, std)?.sample(&mut self.rng))
    }
    /// Univariate Gaussian density N(0, sigma_sense) evaluated at `residual`
    pub fn measurement_likelihood(&self, residual: f64) -> f64 {
        let variance = self.config.sigma_sense * self.config.sigma_sense;
        (2.0 * PI * variance).sqrt().recip() * (-(residual * residual) / (2.0 * variance)).exp()
    }
    /// Split off an independent child stream.
    ///
    /// The child is seeded from the next value of this model's stream, so forking is itself
    /// reproducible.
    pub fn fork(&mut self) -> NoiseModel {
        let seed: u64 = self.rng.random();
        NoiseModel {
            config: self.config,
            translation: self.translation,
            rotation: self.rotation,
            measurement: self.measurement,
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }
    /// Mutable access to the underlying generator, used by the resampling routines
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

fn normal(mean: f64, std: f64) -> Result<Normal<f64>> {
    Normal::new(mean, std).map_err(|e| {
        FilterError::InvalidConfiguration(format!(
            "cannot build normal distribution N({mean}, {std}): {e}"
        ))
    })
}
