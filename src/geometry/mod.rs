use nalgebra::{Point2, Vector2};

pub mod anisotropy;
pub mod variogram_tolerance;

pub use anisotropy::{anisotropic_distance, anisotropic_transform, Anisotropy};
pub use variogram_tolerance::DirectionTolerance;

/// Euclidean distance between two points of the planar projection.
#[inline(always)]
pub fn distance(a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    (b - a).norm()
}

/// Unsigned direction of the vector a -> b in degrees, counter-clockwise from
/// the +x axis and normalized to [0, 180).
///
/// h and -h describe the same lag, so (a, b) and (b, a) share a direction.
#[inline(always)]
pub fn direction(a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    lag_direction(&(b - a))
}

/// Direction of a lag vector, see [`direction`].
#[inline(always)]
pub fn lag_direction(h: &Vector2<f64>) -> f64 {
    normalize_direction(h.y.atan2(h.x).to_degrees())
}

/// Wrap an angle in degrees onto [0, 180).
#[inline(always)]
pub fn normalize_direction(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(180.0);
    // rem_euclid can round up to the modulus for tiny negative inputs
    if wrapped >= 180.0 {
        0.0
    } else {
        wrapped
    }
}

/// Smallest separation between two unsigned directions, in [0, 90].
#[inline(always)]
pub fn angular_difference(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(180.0);
    d.min(180.0 - d)
}

/// Lag vector of the given length pointing along `direction` (degrees).
#[inline(always)]
pub fn lag_vector(distance: f64, direction: f64) -> Vector2<f64> {
    let theta = direction.to_radians();
    Vector2::new(distance * theta.cos(), distance * theta.sin())
}
