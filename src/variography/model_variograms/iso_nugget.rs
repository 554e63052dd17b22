use super::IsoVariogramModel;

/// Pure nugget effect: 0 at the origin, `nugget` everywhere else.
#[derive(Debug, Clone, Default, Copy)]
pub struct IsoNugget {
    pub nugget: f64,
}

impl IsoNugget {
    pub fn new(nugget: f64) -> Self {
        Self { nugget }
    }

    //derivative of variogram with respect to nugget
    pub fn variogram_dn(&self, h: f64) -> f64 {
        if h <= 0.0 {
            return 0.0;
        }
        1.0
    }
}

impl IsoVariogramModel for IsoNugget {
    fn c_0(&self) -> f64 {
        self.nugget
    }

    fn variogram(&self, h: f64) -> f64 {
        if h <= 0.0 {
            return 0f64;
        }
        self.nugget
    }
}
