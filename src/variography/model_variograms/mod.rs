use std::fmt;
use std::str::FromStr;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::error::GeostatError;

pub mod composite;
pub mod fitter;
pub mod iso_exponential;
pub mod iso_gaussian;
pub mod iso_nugget;
pub mod iso_spherical;
pub mod structure;

pub use composite::CompositeVariogram;
pub use structure::VariogramStructure;

/// Isotropic variogram shape evaluated at a scalar lag.
pub trait IsoVariogramModel {
    /// Covariance at the origin, i.e. the sill of the structure.
    fn c_0(&self) -> f64;
    fn variogram(&self, h: f64) -> f64;

    fn covariogram(&self, h: f64) -> f64 {
        self.c_0() - self.variogram(h)
    }
}

/// Variogram model evaluated at a planar lag vector.
///
/// Implementors apply their own anisotropy, so the same lag vector gives the
/// same semivariance whether the model is being fitted or used to build a
/// kriging system.
pub trait VariogramModel: Clone + Send + Sync {
    /// Total sill, C(0).
    fn c_0(&self) -> f64;

    /// Reject non-positive ranges, negative sills and invalid anisotropy.
    fn validate(&self) -> crate::error::Result<()>;

    fn variogram(&self, h: &Vector2<f64>) -> f64;

    /// Semivariance at a lag given by its length and unsigned direction in
    /// degrees. `None` evaluates along the major axis (isotropic distance).
    fn evaluate(&self, distance: f64, direction: Option<f64>) -> f64;

    #[inline(always)]
    fn covariogram(&self, h: &Vector2<f64>) -> f64 {
        self.c_0() - self.variogram(h)
    }
}

/// Family of a single variogram structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(alias = "Exp")]
    Exponential,
    #[serde(alias = "Sph")]
    Spherical,
    #[serde(alias = "Gau")]
    Gaussian,
    #[serde(alias = "Nug")]
    Nugget,
}

impl ModelKind {
    /// Whether the structure has a range parameter.
    pub fn has_range(&self) -> bool {
        !matches!(self, ModelKind::Nugget)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::Exponential => "Exp",
            ModelKind::Spherical => "Sph",
            ModelKind::Gaussian => "Gau",
            ModelKind::Nugget => "Nug",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ModelKind {
    type Err = GeostatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exp" | "exponential" => Ok(ModelKind::Exponential),
            "sph" | "spherical" => Ok(ModelKind::Spherical),
            "gau" | "gaussian" => Ok(ModelKind::Gaussian),
            "nug" | "nugget" => Ok(ModelKind::Nugget),
            _ => Err(GeostatError::invalid(
                "model_kind",
                s,
                "expected one of Exp, Sph, Gau, Nug",
            )),
        }
    }
}
