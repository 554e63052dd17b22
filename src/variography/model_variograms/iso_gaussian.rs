use super::IsoVariogramModel;

/// Gaussian structure without nugget: `sill * (1 - exp(-(h / range)^2))`.
#[derive(Debug, Clone, Default, Copy)]
pub struct IsoGaussian {
    pub range: f64,
    pub sill: f64,
}

impl IsoGaussian {
    pub fn new(range: f64, sill: f64) -> Self {
        Self { range, sill }
    }

    //derivative of variogram with respect to range
    pub fn variogram_dr(&self, h: f64) -> f64 {
        if h <= 0.0 {
            return 0.0;
        }
        let r = self.range;

        -self.sill * 2.0 * h * h / (r * r * r) * (-h * h / (r * r)).exp()
    }

    //derivative of variogram with respect to sill
    pub fn variogram_ds(&self, h: f64) -> f64 {
        if h <= 0.0 {
            return 0.0;
        }
        1.0 - (-h * h / (self.range * self.range)).exp()
    }
}

impl IsoVariogramModel for IsoGaussian {
    fn c_0(&self) -> f64 {
        self.sill
    }

    fn variogram(&self, h: f64) -> f64 {
        if h <= 0.0 {
            return 0.0;
        }
        self.sill * (1.0 - (-h * h / (self.range * self.range)).exp())
    }
}
