use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::error::{GeostatError, Result};

use super::{angular_difference, lag_direction, normalize_direction};

/// Angular window used to select pairs for a directional variogram.
///
/// A lag h is accepted when its unsigned direction lies within `tolerance`
/// degrees of `direction` and, if a bandwidth is set, when its offset
/// perpendicular to `direction` does not exceed the bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionTolerance {
    pub direction: f64,
    pub tolerance: f64,
    #[serde(default)]
    pub bandwidth: Option<f64>,
}

impl DirectionTolerance {
    pub fn new(direction: f64, tolerance: f64) -> Self {
        Self {
            direction: normalize_direction(direction),
            tolerance,
            bandwidth: None,
        }
    }

    pub fn with_bandwidth(mut self, bandwidth: f64) -> Self {
        self.bandwidth = Some(bandwidth);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.direction.is_finite() {
            return Err(GeostatError::invalid(
                "direction",
                self.direction,
                "must be finite",
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(GeostatError::invalid(
                "tolerance",
                self.tolerance,
                "angular tolerance must be positive",
            ));
        }
        if let Some(bandwidth) = self.bandwidth {
            if !(bandwidth.is_finite() && bandwidth > 0.0) {
                return Err(GeostatError::invalid(
                    "bandwidth",
                    bandwidth,
                    "must be positive",
                ));
            }
        }
        Ok(())
    }

    /// Whether a lag with the given direction (degrees) falls in the window.
    #[inline(always)]
    pub fn contains_direction(&self, direction: f64) -> bool {
        // a tolerance of 90 degrees or more covers the half circle
        self.tolerance >= 90.0 || angular_difference(direction, self.direction) <= self.tolerance
    }

    /// Whether the lag vector falls in the window.
    ///
    /// A zero lag has no direction and is accepted by every window.
    #[inline(always)]
    pub fn contains(&self, h: &Vector2<f64>) -> bool {
        let length = h.norm();
        if length == 0.0 {
            return true;
        }

        let direction = lag_direction(h);
        if !self.contains_direction(direction) {
            return false;
        }

        match self.bandwidth {
            Some(bandwidth) => {
                let offset = angular_difference(direction, self.direction).to_radians();
                length * offset.sin() <= bandwidth
            }
            None => true,
        }
    }
}
