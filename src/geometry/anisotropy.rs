use nalgebra::{Point2, Rotation2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::{GeostatError, Result};

use super::normalize_direction;

/// Geometric anisotropy: the direction of greatest continuity and the ratio
/// of the minor range to the major range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anisotropy {
    /// Direction of the major axis in degrees, counter-clockwise from +x.
    pub major_direction: f64,
    /// minor range / major range, in (0, 1].
    pub minor_range_ratio: f64,
}

impl Anisotropy {
    pub fn new(major_direction: f64, minor_range_ratio: f64) -> Result<Self> {
        let anisotropy = Self {
            major_direction,
            minor_range_ratio,
        };
        anisotropy.validate()?;
        Ok(anisotropy)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.major_direction.is_finite() {
            return Err(GeostatError::invalid(
                "major_direction",
                self.major_direction,
                "must be finite",
            ));
        }
        if !(self.minor_range_ratio > 0.0 && self.minor_range_ratio <= 1.0) {
            return Err(GeostatError::invalid(
                "minor_range_ratio",
                self.minor_range_ratio,
                "must lie in (0, 1]",
            ));
        }
        Ok(())
    }

    /// Rotation taking the major axis onto +x.
    #[inline(always)]
    pub fn rotation(&self) -> Rotation2<f64> {
        Rotation2::new(-normalize_direction(self.major_direction).to_radians())
    }

    /// Transform a lag vector into the space where the model is isotropic.
    #[inline(always)]
    pub fn transform(&self, h: &Vector2<f64>) -> Vector2<f64> {
        let mut local = self.rotation() * *h;
        local.y /= self.minor_range_ratio;
        local
    }
}

/// Rotate the lag so the major anisotropy axis lies on x, then stretch the
/// minor axis by 1 / ratio. The norm of the result is the effective isotropic
/// distance.
#[inline(always)]
pub fn anisotropic_transform(h: &Vector2<f64>, anisotropy: &Anisotropy) -> Vector2<f64> {
    anisotropy.transform(h)
}

/// Effective isotropic distance between two points.
#[inline(always)]
pub fn anisotropic_distance(a: &Point2<f64>, b: &Point2<f64>, anisotropy: &Anisotropy) -> f64 {
    anisotropy.transform(&(b - a)).norm()
}
