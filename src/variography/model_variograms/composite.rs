use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::error::{GeostatError, Result};
use crate::geometry::Anisotropy;

use super::{VariogramModel, VariogramStructure};

/// Nested model: the semivariance is the sum of its structures.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeVariogram {
    pub structures: Vec<VariogramStructure>,
}

impl CompositeVariogram {
    pub fn new(structures: Vec<VariogramStructure>) -> Result<Self> {
        let composite = Self { structures };
        composite.validate()?;
        Ok(composite)
    }

    pub fn validate(&self) -> Result<()> {
        if self.structures.is_empty() {
            return Err(GeostatError::invalid(
                "structures",
                0,
                "a composite variogram needs at least one structure",
            ));
        }
        self.structures.iter().try_for_each(|s| s.validate())
    }

    /// Apply the same anisotropy to every structure.
    pub fn set_anisotropy(&mut self, anisotropy: Anisotropy) -> Result<()> {
        anisotropy.validate()?;
        for structure in self.structures.iter_mut() {
            structure.anisotropy = Some(anisotropy);
        }
        Ok(())
    }

    pub fn nugget(&self) -> f64 {
        self.structures.iter().map(|s| s.nugget).sum()
    }

    pub fn sill(&self) -> f64 {
        self.c_0()
    }
}

impl From<VariogramStructure> for CompositeVariogram {
    fn from(structure: VariogramStructure) -> Self {
        Self {
            structures: vec![structure],
        }
    }
}

impl VariogramModel for CompositeVariogram {
    fn c_0(&self) -> f64 {
        self.structures.iter().map(VariogramModel::c_0).sum()
    }

    fn validate(&self) -> Result<()> {
        CompositeVariogram::validate(self)
    }

    fn variogram(&self, h: &Vector2<f64>) -> f64 {
        self.structures
            .iter()
            .fold(0f64, |acc, v| acc + v.variogram(h))
    }

    fn evaluate(&self, distance: f64, direction: Option<f64>) -> f64 {
        self.structures
            .iter()
            .fold(0f64, |acc, v| acc + v.evaluate(distance, direction))
    }
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn sum_of_structures() {
        let nug = VariogramStructure::pure_nugget(0.2).unwrap();
        let sph = VariogramStructure::spherical(0.0, 1.0, 50.0).unwrap();
        let exp = VariogramStructure::exponential(0.0, 0.5, 200.0).unwrap();
        let composite = CompositeVariogram::new(vec![nug, sph, exp]).unwrap();

        assert_abs_diff_eq!(composite.sill(), 1.7);
        assert_abs_diff_eq!(composite.nugget(), 0.2);
        assert_eq!(composite.evaluate(0.0, None), 0.0);
        for h in [1.0, 25.0, 75.0, 400.0] {
            assert_abs_diff_eq!(
                composite.evaluate(h, None),
                nug.evaluate(h, None) + sph.evaluate(h, None) + exp.evaluate(h, None),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn empty_is_invalid() {
        assert!(CompositeVariogram::new(vec![]).is_err());
    }
}
