use super::IsoVariogramModel;

/// Spherical structure without nugget. Reaches `sill` exactly at `range`.
#[derive(Debug, Clone, Default, Copy)]
pub struct IsoSpherical {
    pub range: f64,
    pub sill: f64,
}

impl IsoSpherical {
    pub fn new(range: f64, sill: f64) -> Self {
        Self { range, sill }
    }

    //derivative of variogram with respect to range
    pub fn variogram_dr(&self, h: f64) -> f64 {
        let r = self.range;
        if h <= 0.0 || h >= r {
            return 0.0;
        }

        self.sill * (1.5 * h * h * h / (r * r * r * r) - 1.5 * h / (r * r))
    }

    //derivative of variogram with respect to sill
    pub fn variogram_ds(&self, h: f64) -> f64 {
        let r = self.range;
        if h <= 0.0 {
            return 0.0;
        }
        if h < r {
            return 1.5 * h / r - 0.5 * (h / r).powi(3);
        }

        1.0
    }
}

impl IsoVariogramModel for IsoSpherical {
    fn c_0(&self) -> f64 {
        self.sill
    }

    fn variogram(&self, h: f64) -> f64 {
        if h <= 0.0 {
            return 0.0;
        }
        if h < self.range {
            return self.sill * (1.5 * h / self.range - 0.5 * (h / self.range).powi(3));
        }
        self.sill
    }
}
