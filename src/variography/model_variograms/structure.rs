use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::{GeostatError, Result};
use crate::geometry::{lag_vector, Anisotropy};

use super::iso_exponential::IsoExponential;
use super::iso_gaussian::IsoGaussian;
use super::iso_nugget::IsoNugget;
use super::iso_spherical::IsoSpherical;
use super::{IsoVariogramModel, ModelKind, VariogramModel};

/// A single parametrized variogram structure: one family plus its nugget,
/// partial sill, range and optional geometric anisotropy.
///
/// `gamma(0) = 0` for every family; the nugget is the jump just off the
/// origin. For [`ModelKind::Nugget`] the whole sill is discontinuous, so
/// `gamma(h > 0) = nugget + partial_sill` and the range is unused.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariogramStructure {
    pub kind: ModelKind,
    pub nugget: f64,
    pub partial_sill: f64,
    pub range: f64,
    #[serde(default)]
    pub anisotropy: Option<Anisotropy>,
}

impl VariogramStructure {
    pub fn new(kind: ModelKind, nugget: f64, partial_sill: f64, range: f64) -> Result<Self> {
        let structure = Self {
            kind,
            nugget,
            partial_sill,
            range,
            anisotropy: None,
        };
        structure.validate()?;
        Ok(structure)
    }

    pub fn exponential(nugget: f64, partial_sill: f64, range: f64) -> Result<Self> {
        Self::new(ModelKind::Exponential, nugget, partial_sill, range)
    }

    pub fn spherical(nugget: f64, partial_sill: f64, range: f64) -> Result<Self> {
        Self::new(ModelKind::Spherical, nugget, partial_sill, range)
    }

    pub fn gaussian(nugget: f64, partial_sill: f64, range: f64) -> Result<Self> {
        Self::new(ModelKind::Gaussian, nugget, partial_sill, range)
    }

    pub fn pure_nugget(nugget: f64) -> Result<Self> {
        Self::new(ModelKind::Nugget, nugget, 0.0, 1.0)
    }

    pub fn with_anisotropy(mut self, anisotropy: Anisotropy) -> Result<Self> {
        anisotropy.validate()?;
        self.anisotropy = Some(anisotropy);
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.nugget.is_finite() && self.nugget >= 0.0) {
            return Err(GeostatError::invalid(
                "nugget",
                self.nugget,
                "must be finite and non-negative",
            ));
        }
        if !(self.partial_sill.is_finite() && self.partial_sill >= 0.0) {
            return Err(GeostatError::invalid(
                "partial_sill",
                self.partial_sill,
                "must be finite and non-negative",
            ));
        }
        if !(self.range.is_finite() && self.range > 0.0) {
            return Err(GeostatError::invalid(
                "range",
                self.range,
                "must be finite and strictly positive",
            ));
        }
        if let Some(anisotropy) = &self.anisotropy {
            anisotropy.validate()?;
        }
        Ok(())
    }

    /// nugget + partial sill
    #[inline(always)]
    pub fn sill(&self) -> f64 {
        self.nugget + self.partial_sill
    }

    /// Length of the lag in the space where this structure is isotropic.
    #[inline(always)]
    pub fn effective_distance(&self, h: &Vector2<f64>) -> f64 {
        match &self.anisotropy {
            Some(anisotropy) => anisotropy.transform(h).norm(),
            None => h.norm(),
        }
    }

    /// Semivariance at an (already effective) isotropic distance.
    #[inline(always)]
    pub fn isotropic_variogram(&self, h: f64) -> f64 {
        if h <= 0.0 {
            return 0.0;
        }
        let structured = match self.kind {
            ModelKind::Exponential => IsoExponential::new(self.range, self.partial_sill).variogram(h),
            ModelKind::Spherical => IsoSpherical::new(self.range, self.partial_sill).variogram(h),
            ModelKind::Gaussian => IsoGaussian::new(self.range, self.partial_sill).variogram(h),
            ModelKind::Nugget => IsoNugget::new(self.partial_sill).variogram(h),
        };
        IsoNugget::new(self.nugget).variogram(h) + structured
    }

    pub fn semivariance_between(&self, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
        self.variogram(&(b - a))
    }

    /// Partial derivatives of gamma at effective distance `h` with respect to
    /// (nugget, partial sill, range).
    pub fn gradient(&self, h: f64) -> [f64; 3] {
        if h <= 0.0 {
            return [0.0; 3];
        }
        let dn = IsoNugget::new(self.nugget).variogram_dn(h);
        let (ds, dr) = match self.kind {
            ModelKind::Exponential => {
                let v = IsoExponential::new(self.range, self.partial_sill);
                (v.variogram_ds(h), v.variogram_dr(h))
            }
            ModelKind::Spherical => {
                let v = IsoSpherical::new(self.range, self.partial_sill);
                (v.variogram_ds(h), v.variogram_dr(h))
            }
            ModelKind::Gaussian => {
                let v = IsoGaussian::new(self.range, self.partial_sill);
                (v.variogram_ds(h), v.variogram_dr(h))
            }
            ModelKind::Nugget => (1.0, 0.0),
        };
        [dn, ds, dr]
    }
}

impl VariogramModel for VariogramStructure {
    #[inline(always)]
    fn c_0(&self) -> f64 {
        self.sill()
    }

    fn validate(&self) -> Result<()> {
        VariogramStructure::validate(self)
    }

    #[inline(always)]
    fn variogram(&self, h: &Vector2<f64>) -> f64 {
        self.isotropic_variogram(self.effective_distance(h))
    }

    fn evaluate(&self, distance: f64, direction: Option<f64>) -> f64 {
        match direction {
            Some(direction) => self.variogram(&lag_vector(distance, direction)),
            None => self.isotropic_variogram(distance),
        }
    }
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn families() -> Vec<VariogramStructure> {
        vec![
            VariogramStructure::exponential(0.5, 2.0, 10.0).unwrap(),
            VariogramStructure::spherical(0.5, 2.0, 10.0).unwrap(),
            VariogramStructure::gaussian(0.5, 2.0, 10.0).unwrap(),
            VariogramStructure::pure_nugget(0.7).unwrap(),
        ]
    }

    #[test]
    fn zero_at_origin() {
        for vgram in families() {
            assert_eq!(vgram.evaluate(0.0, None), 0.0);
            assert_eq!(vgram.variogram(&Vector2::zeros()), 0.0);
            assert_abs_diff_eq!(vgram.covariogram(&Vector2::zeros()), vgram.sill());
        }
        let aniso = VariogramStructure::spherical(1.0, 1.0, 5.0)
            .unwrap()
            .with_anisotropy(Anisotropy::new(30.0, 0.3).unwrap())
            .unwrap();
        assert_eq!(aniso.evaluate(0.0, Some(120.0)), 0.0);
    }

    #[test]
    fn nugget_is_jump_off_origin() {
        let vgram = VariogramStructure::exponential(0.5, 2.0, 10.0).unwrap();
        let tiny = vgram.evaluate(1e-9, None);
        assert_abs_diff_eq!(tiny, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(
            VariogramStructure::pure_nugget(0.7).unwrap().evaluate(3.0, None),
            0.7
        );
    }

    #[test]
    fn monotone_in_lag() {
        for vgram in [
            VariogramStructure::exponential(0.1, 3.0, 4.0).unwrap(),
            VariogramStructure::spherical(0.1, 3.0, 4.0).unwrap(),
        ] {
            let mut last = 0.0;
            for i in 0..400 {
                let g = vgram.evaluate(i as f64 * 0.05, None);
                assert!(g >= last, "{:?} decreased at step {}", vgram.kind, i);
                last = g;
            }
        }
    }

    #[test]
    fn spherical_flat_beyond_range() {
        let vgram = VariogramStructure::spherical(0.3, 1.2, 7.5).unwrap();
        for h in [7.5, 7.6, 20.0, 1e6] {
            assert_eq!(vgram.evaluate(h, None), vgram.sill());
        }
        assert!(vgram.evaluate(7.4, None) < vgram.sill());
    }

    #[test]
    fn anisotropy_shortens_minor_range() {
        let vgram = VariogramStructure::spherical(0.0, 1.0, 10.0)
            .unwrap()
            .with_anisotropy(Anisotropy::new(90.0, 0.5).unwrap())
            .unwrap();
        // along the major axis (north) the full range applies
        assert!(vgram.evaluate(8.0, Some(90.0)) < 1.0);
        // along the minor axis the range is 5
        assert_abs_diff_eq!(vgram.evaluate(5.0, Some(0.0)), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            vgram.evaluate(4.0, Some(0.0)),
            vgram.evaluate(8.0, Some(90.0)),
            epsilon = 1e-12
        );
        // pairs evaluated from coordinates agree with the direction form
        let a = Point2::new(1.0, 1.0);
        let b = Point2::new(5.0, 1.0);
        assert_abs_diff_eq!(
            vgram.semivariance_between(&a, &b),
            vgram.evaluate(4.0, Some(0.0)),
            epsilon = 1e-12
        );
    }

    #[test]
    fn validation() {
        assert!(VariogramStructure::exponential(-0.1, 1.0, 1.0).is_err());
        assert!(VariogramStructure::exponential(0.0, -1.0, 1.0).is_err());
        assert!(VariogramStructure::exponential(0.0, 1.0, 0.0).is_err());
        assert!(VariogramStructure::spherical(0.0, 1.0, f64::NAN).is_err());
    }

    #[test]
    fn gradient_matches_difference() {
        let vgram = VariogramStructure::gaussian(0.2, 1.5, 3.0).unwrap();
        let h = 2.0;
        let eps = 1e-6;
        let [dn, ds, dr] = vgram.gradient(h);

        let mut hi = vgram;
        hi.nugget += eps;
        assert_abs_diff_eq!(dn, (hi.isotropic_variogram(h) - vgram.isotropic_variogram(h)) / eps, epsilon = 1e-6);

        let mut hi = vgram;
        hi.partial_sill += eps;
        assert_abs_diff_eq!(ds, (hi.isotropic_variogram(h) - vgram.isotropic_variogram(h)) / eps, epsilon = 1e-6);

        let mut hi = vgram;
        let mut lo = vgram;
        hi.range += eps;
        lo.range -= eps;
        assert_abs_diff_eq!(
            dr,
            (hi.isotropic_variogram(h) - lo.isotropic_variogram(h)) / (2.0 * eps),
            epsilon = 1e-6
        );
    }
}
