use super::IsoVariogramModel;

/// Exponential structure without nugget: `sill * (1 - exp(-h / range))`.
///
/// `range` is the scale parameter; the practical range (95% of the sill) is
/// `3 * range`.
#[derive(Debug, Clone, Default, Copy)]
pub struct IsoExponential {
    pub range: f64,
    pub sill: f64,
}

impl IsoExponential {
    pub fn new(range: f64, sill: f64) -> Self {
        Self { range, sill }
    }

    //derivative of variogram with respect to range
    pub fn variogram_dr(&self, h: f64) -> f64 {
        if h <= 0.0 {
            return 0.0;
        }
        let r = self.range;
        -self.sill * h / (r * r) * (-h / r).exp()
    }

    //derivative of variogram with respect to sill
    pub fn variogram_ds(&self, h: f64) -> f64 {
        if h <= 0.0 {
            return 0.0;
        }
        1.0 - (-h / self.range).exp()
    }
}

impl IsoVariogramModel for IsoExponential {
    fn c_0(&self) -> f64 {
        self.sill
    }

    fn variogram(&self, h: f64) -> f64 {
        if h <= 0.0 {
            return 0.0;
        }
        self.sill * (1.0 - (-h / self.range).exp())
    }
}
