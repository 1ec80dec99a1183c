//! Range-aided planar localization toolbox
//!
//! This crate estimates the pose (position and heading) of a mobile robot moving in the plane using a
//! sequential Monte Carlo estimator, better known as a particle filter. The robot reports a control
//! input every tick (a commanded forward distance and a commanded heading change) and a vector of
//! noisy ranges to a set of known landmarks. The filter keeps a population of weighted pose hypotheses
//! and runs the classic cycle on each tick:
//!
//! 1. **Predict**: every particle is moved by the control input plus its own independent process noise.
//! 2. **Weight**: every particle is scored by the likelihood of the observed ranges given its position.
//! 3. **Resample**: when the effective sample size drops below half of the population, a new population
//!    is drawn with replacement in proportion to the weights.
//! 4. **Estimate**: the population is reduced to a single pose, using a circular mean for the heading.
//!
//! Landmark identity is assumed known: the i-th range always corresponds to the i-th landmark. The map is
//! fixed and is never estimated.
//!
//! ## State definition
//!
//! $$
//! x = [p_x, p_y, \theta]
//! $$
//!
//! Positions are in arbitrary but consistent length units and the heading $\theta$ is in radians. All
//! headings held by the crate are normalized into $[0, 2\pi)$ after every mutation, and estimates are
//! reported in the same range.
//!
//! ## Motion model
//!
//! Given a control $(d, \delta)$ and independent samples $\epsilon_d \sim N(0, \sigma_{pos})$,
//! $\epsilon_\theta \sim N(0, \sigma_{rot})$:
//!
//! $$
//! p_x(+) = p_x(-) + (d + \epsilon_d) \cos\theta(-), \quad
//! p_y(+) = p_y(-) + (d + \epsilon_d) \sin\theta(-), \quad
//! \theta(+) = \theta(-) + \delta + \epsilon_\theta
//! $$
//!
//! ## Measurement model
//!
//! For landmarks $l_i$ and measured ranges $z_i$, the likelihood of a particle at $p$ is
//!
//! $$
//! w = \prod_i \frac{1}{\sqrt{2\pi\sigma_{sense}^2}} \exp\left(-\frac{(z_i - \lVert l_i - p \rVert)^2}{2\sigma_{sense}^2}\right)
//! $$
//!
//! Primarily built off of:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): landmark points, pose vectors and covariance matrices.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr):
//!   seeded random streams and Gaussian sampling.
pub mod error;
pub mod filter;
pub mod measurements;
pub mod noise;
pub mod particle;
pub mod sim;

pub use error::{FilterError, Result};
pub use filter::{FilterConfig, ParticleFilter, WeightingOutcome};
pub use measurements::Landmark;
pub use noise::{NoiseConfig, NoiseModel};
pub use particle::{Particle, ParticleAveragingStrategy, ParticleResamplingStrategy};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::fmt::{self, Display};

/// Planar pose: position plus heading.
///
/// Used for the initial guess handed to the filter, for the ground truth of the simulated robot, and
/// for the estimate produced by the filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    /// Heading in radians
    pub theta: f64,
}
impl Pose2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose2D { x, y, theta }
    }
    /// Pose as an nalgebra vector `[x, y, theta]`.
    ///
    /// # Example
    /// ```rust
    /// use rangenav::Pose2D;
    ///
    /// let pose = Pose2D::new(1.0, 2.0, 0.5);
    /// let v = pose.to_vector();
    /// assert_eq!(v[1], 2.0);
    /// ```
    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.theta)
    }
    /// Euclidean distance between the positions of two poses
    pub fn distance_to(&self, other: &Pose2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}
impl From<Vector3<f64>> for Pose2D {
    fn from(v: Vector3<f64>) -> Self {
        Pose2D::new(v[0], v[1], v[2])
    }
}
impl Display for Pose2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose2D(x: {:.4}, y: {:.4}, theta: {:.4} rad)",
            self.x, self.y, self.theta
        )
    }
}

/// Control input supplied by the driver each tick: commanded forward displacement and commanded
/// heading change since the previous tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub distance: f64,
    pub rotation: f64,
}
impl Control {
    pub fn new(distance: f64, rotation: f64) -> Self {
        Control { distance, rotation }
    }
    /// Pure forward motion
    pub fn forward(distance: f64) -> Self {
        Control::new(distance, 0.0)
    }
    /// Turn in place
    pub fn turn(rotation: f64) -> Self {
        Control::new(0.0, rotation)
    }
}

// --- Angle helpers ---
/// Wrap an angle to the range $[0, 2\pi)$ radians
///
/// The upper bound is exclusive: a tiny negative angle whose wrapped value rounds up to exactly
/// $2\pi$ is returned as zero.
///
/// # Example
/// ```rust
/// use rangenav::wrap_to_2pi;
/// use std::f64::consts::PI;
/// assert!((wrap_to_2pi(5.0 * PI) - PI).abs() < 1e-12);
/// assert!((wrap_to_2pi(-PI / 2.0) - 1.5 * PI).abs() < 1e-12);
/// assert_eq!(wrap_to_2pi(-1e-20), 0.0);
/// ```
pub fn wrap_to_2pi(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped >= TAU { 0.0 } else { wrapped }
}
/// Wrap an angle to the range $(-\pi, \pi]$ radians
///
/// # Example
/// ```rust
/// use rangenav::wrap_to_pi;
/// use std::f64::consts::PI;
/// assert!((wrap_to_pi(1.5 * PI) + PI / 2.0).abs() < 1e-12);
/// ```
pub fn wrap_to_pi(angle: f64) -> f64 {
    let wrapped = wrap_to_2pi(angle);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}
/// Signed smallest difference `a - b` between two angles, in $(-\pi, \pi]$
pub fn angle_difference(a: f64, b: f64) -> f64 {
    wrap_to_pi(a - b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_wrap_to_2pi() {
        assert_eq!(wrap_to_2pi(0.0), 0.0);
        assert_approx_eq!(wrap_to_2pi(TAU + 1.0), 1.0, 1e-12);
        assert_approx_eq!(wrap_to_2pi(-1.0), TAU - 1.0, 1e-12);
        assert_approx_eq!(wrap_to_2pi(7.0 * PI), PI, 1e-12);
        assert_eq!(wrap_to_2pi(TAU), 0.0);
        // rounds up to TAU before the guard
        assert_eq!(wrap_to_2pi(-1e-18), 0.0);
    }
    #[test]
    fn test_wrap_to_pi() {
        assert_approx_eq!(wrap_to_pi(1.5 * PI), -0.5 * PI, 1e-12);
        assert_approx_eq!(wrap_to_pi(-1.5 * PI), 0.5 * PI, 1e-12);
        assert_approx_eq!(wrap_to_pi(PI), PI, 1e-12);
        assert_eq!(wrap_to_pi(0.0), 0.0);
    }
    #[test]
    fn test_angle_difference_across_wraparound() {
        assert_approx_eq!(angle_difference(0.01, TAU - 0.01), 0.02, 1e-12);
        assert_approx_eq!(angle_difference(TAU - 0.01, 0.01), -0.02, 1e-12);
        assert_approx_eq!(angle_difference(PI / 2.0, 0.0), PI / 2.0, 1e-12);
    }
    #[test]
    fn test_pose_conversions() {
        let pose = Pose2D::new(1.0, -2.0, 0.25);
        let v = pose.to_vector();
        assert_eq!(Pose2D::from(v), pose);
        assert_approx_eq!(pose.distance_to(&Pose2D::new(4.0, 2.0, 0.0)), 5.0, 1e-12);
        assert_eq!(
            pose.to_string(),
            "Pose2D(x: 1.0000, y: -2.0000, theta: 0.2500 rad)"
        );
    }
    #[test]
    fn test_control_constructors() {
        assert_eq!(Control::forward(1.5), Control::new(1.5, 0.0));
        assert_eq!(Control::turn(-0.5), Control::new(0.0, -0.5));
    }
}
