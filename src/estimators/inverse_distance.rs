use nalgebra::Point2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{GeostatError, Result};
use crate::geometry::Anisotropy;
use crate::spatial_database::SpatialPointSet;

use super::{Prediction, Predictor};

pub const DEFAULT_IDW_POWER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdwConfig {
    pub power: f64,
    /// Measure distances in the anisotropically transformed space.
    pub anisotropy: Option<Anisotropy>,
}

impl Default for IdwConfig {
    fn default() -> Self {
        Self {
            power: DEFAULT_IDW_POWER,
            anisotropy: None,
        }
    }
}

impl IdwConfig {
    pub fn with_power(power: f64) -> Self {
        Self {
            power,
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.power.is_finite() && self.power > 0.0) {
            return Err(GeostatError::invalid(
                "idw_power",
                self.power,
                "must be finite and positive",
            ));
        }
        if let Some(anisotropy) = &self.anisotropy {
            anisotropy.validate()?;
        }
        Ok(())
    }
}

/// Inverse distance weighting: `sum(w_i v_i) / sum(w_i)` with
/// `w_i = d_i^-power`.
#[derive(Debug, Clone)]
pub struct InverseDistance {
    points: Vec<Point2<f64>>,
    values: Vec<f64>,
    config: IdwConfig,
}

impl InverseDistance {
    pub fn new(data: &SpatialPointSet, config: IdwConfig) -> Result<Self> {
        config.validate()?;
        if data.is_empty() {
            return Err(GeostatError::insufficient("inverse distance", 1, 0));
        }
        Ok(Self {
            points: data.points().to_vec(),
            values: data.values().to_vec(),
            config,
        })
    }

    pub fn power(&self) -> f64 {
        self.config.power
    }

    /// Estimate at `target`. A target on top of a sample takes that sample's
    /// value (the first one, for collocated samples).
    pub fn estimate(&self, target: &Point2<f64>) -> f64 {
        let distances = self
            .points
            .iter()
            .map(|p| {
                let h = target - p;
                match &self.config.anisotropy {
                    Some(anisotropy) => anisotropy.transform(&h).norm(),
                    None => h.norm(),
                }
            })
            .collect::<Vec<_>>();

        if let Some(i) = distances.iter().position(|d| *d == 0.0) {
            return self.values[i];
        }

        //weights relative to the nearest sample, so large powers do not underflow
        let nearest = distances.iter().copied().fold(f64::INFINITY, f64::min);
        let (num, den) = distances
            .iter()
            .zip(self.values.iter())
            .fold((0f64, 0f64), |(num, den), (d, v)| {
                let w = (nearest / d).powf(self.config.power);
                (num + w * v, den + w)
            });
        num / den
    }

    pub fn estimate_many(&self, targets: &[Point2<f64>]) -> Vec<f64> {
        targets.par_iter().map(|t| self.estimate(t)).collect()
    }
}

impl Predictor for InverseDistance {
    fn predict_at(&self, target: &Point2<f64>) -> Result<Prediction> {
        Ok(Prediction {
            value: self.estimate(target),
            variance: None,
        })
    }
}
