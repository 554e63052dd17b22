use nalgebra::{DMatrix, DVector, Point2};

use crate::variography::model_variograms::VariogramModel;

/// Assembles the covariance terms of an ordinary kriging system from a
/// variogram model. The model applies its own anisotropy to every lag.
pub struct OKSystemBuilder;

impl OKSystemBuilder {
    /// `C[i, j] = sill - gamma(p_j - p_i)` for every pair of conditioning points.
    pub fn build_cov_mat<V: VariogramModel>(cond: &[Point2<f64>], vgram: &V) -> DMatrix<f64> {
        let n = cond.len();
        let mut cov_mat = DMatrix::zeros(n, n);

        //lower triangle, mirrored
        for (i, p1) in cond.iter().enumerate() {
            for (j, p2) in cond.iter().enumerate().take(i + 1) {
                let cov = vgram.covariogram(&(p2 - p1));
                cov_mat[(i, j)] = cov;
                cov_mat[(j, i)] = cov;
            }
        }
        cov_mat
    }

    /// `c[i] = sill - gamma(target - p_i)`, written into `cov_vec`.
    pub fn build_cov_vec<V: VariogramModel>(
        cov_vec: &mut DVector<f64>,
        cond: &[Point2<f64>],
        target: &Point2<f64>,
        vgram: &V,
    ) {
        for (c, p) in cov_vec.iter_mut().zip(cond.iter()) {
            *c = vgram.covariogram(&(target - p));
        }
    }
}
