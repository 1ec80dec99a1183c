//! Range measurements to known landmarks.
//!
//! A measurement vector is an ordered list of ranges that is positionally aligned with the landmark
//! list: the i-th range was taken to the i-th landmark. No data association is performed.

use crate::error::{FilterError, Result};

use nalgebra::Point2;

/// Known landmark position in the plane
pub type Landmark = Point2<f64>;

/// Euclidean distance from `(x, y)` to a landmark
pub fn expected_range(x: f64, y: f64, landmark: &Landmark) -> f64 {
    (landmark.x - x).hypot(landmark.y - y)
}

/// Ranges from `(x, y)` to every landmark, in landmark order.
///
/// # Example
/// ```rust
/// use rangenav::measurements::{expected_ranges, Landmark};
///
/// let landmarks = [Landmark::new(3.0, 4.0), Landmark::new(0.0, 0.0)];
/// let ranges = expected_ranges(0.0, 0.0, &landmarks);
/// assert!((ranges[0] - 5.0).abs() < 1e-12);
/// assert_eq!(ranges[1], 0.0);
/// ```
pub fn expected_ranges(x: f64, y: f64, landmarks: &[Landmark]) -> Vec<f64> {
    landmarks
        .iter()
        .map(|landmark| expected_range(x, y, landmark))
        .collect()
}

/// Verify that a measurement vector lines up with the landmark list.
pub fn check_alignment(measurements: &[f64], landmarks: &[Landmark]) -> Result<()> {
    if measurements.len() != landmarks.len() {
        return Err(FilterError::InputContractViolation {
            measurements: measurements.len(),
            landmarks: landmarks.len(),
        });
    }
    Ok(())
}

/// Reject NaN or infinite ranges before they reach any weight.
pub fn check_finite(measurements: &[f64]) -> Result<()> {
    match measurements.iter().position(|z| !z.is_finite()) {
        Some(index) => Err(FilterError::NonFiniteMeasurement {
            index,
            value: measurements[index],
        }),
        None => Ok(()),
    }
}
