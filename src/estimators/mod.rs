use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod inverse_distance;
pub mod ordinary_kriging;

pub use inverse_distance::{IdwConfig, InverseDistance};
pub use ordinary_kriging::{KrigingConfig, KrigingResult, KrigingWeights, OrdinaryKriging};

/// Value predicted at one location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub value: f64,
    /// Prediction variance, for predictors that provide one.
    pub variance: Option<f64>,
}

/// A spatial predictor built from a set of conditioning samples.
pub trait Predictor: Send + Sync {
    fn predict_at(&self, target: &Point2<f64>) -> Result<Prediction>;
}
