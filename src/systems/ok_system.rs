use nalgebra::{Cholesky, DMatrix, DVector, Dyn, FullPivLU};

/// Smallest accepted ratio between the smallest and largest pivot of a
/// factorization before the system is treated as singular.
pub const SINGULARITY_TOLERANCE: f64 = 1e-12;

/// Ordinary kriging weights for one target.
#[derive(Debug, Clone, PartialEq)]
pub struct OKWeights {
    pub weights: DVector<f64>,
    /// Multiplier of the unbiasedness constraint in the covariance form
    /// `C w + mu 1 = c`.
    pub lagrange_multiplier: f64,
}

#[derive(Clone)]
enum Factorization {
    // C = L L^T, with C^-1 1 and 1^T C^-1 1 cached
    Cholesky {
        llt: Cholesky<f64, Dyn>,
        lambda_e: DVector<f64>,
        denom: f64,
    },
    // [C 1; 1^T 0] = P L U Q
    Augmented(FullPivLU<f64, Dyn, Dyn>),
    Singular,
}

/// Factored ordinary kriging system for a fixed set of conditioning points.
///
/// The covariance matrix is factored once; every target then only needs
/// triangular solves. When `C` is positive definite and well conditioned the
/// OK weights are assembled from simple kriging weights (Davis and Grivet
/// 1984): `w = w_sk + (1 - 1^T w_sk) / (1^T C^-1 1) * C^-1 1`. Otherwise the
/// bordered system is factored with full pivoting.
#[derive(Clone)]
pub struct OKSystem {
    n_cond: usize,
    factorization: Factorization,
    pivot_ratio: f64,
}

impl OKSystem {
    pub fn new(cov_mat: DMatrix<f64>) -> Self {
        let n_cond = cov_mat.nrows();

        if let Some(llt) = cov_mat.clone().cholesky() {
            let pivot_ratio = cholesky_pivot_ratio(&llt);
            if pivot_ratio >= SINGULARITY_TOLERANCE {
                let lambda_e = llt.solve(&DVector::from_element(n_cond, 1.0));
                let denom = lambda_e.sum();
                if denom.is_finite() && denom > 0.0 {
                    tracing::debug!(n_cond, pivot_ratio, "ordinary kriging system factored with cholesky");
                    return Self {
                        n_cond,
                        factorization: Factorization::Cholesky {
                            llt,
                            lambda_e,
                            denom,
                        },
                        pivot_ratio,
                    };
                }
            }
        }

        //bordered system
        let mut augmented = DMatrix::zeros(n_cond + 1, n_cond + 1);
        augmented.view_mut((0, 0), (n_cond, n_cond)).copy_from(&cov_mat);
        augmented.view_mut((n_cond, 0), (1, n_cond)).fill(1.0);
        augmented.view_mut((0, n_cond), (n_cond, 1)).fill(1.0);

        let lu = augmented.full_piv_lu();
        let pivot_ratio = lu_pivot_ratio(&lu);
        if pivot_ratio < SINGULARITY_TOLERANCE {
            tracing::warn!(n_cond, pivot_ratio, "ordinary kriging system is singular");
            return Self {
                n_cond,
                factorization: Factorization::Singular,
                pivot_ratio,
            };
        }

        tracing::debug!(n_cond, pivot_ratio, "ordinary kriging system factored with full pivot lu");
        Self {
            n_cond,
            factorization: Factorization::Augmented(lu),
            pivot_ratio,
        }
    }

    pub fn n_cond(&self) -> usize {
        self.n_cond
    }

    /// Ratio of smallest to largest pivot of the factorization in use.
    pub fn pivot_ratio(&self) -> f64 {
        self.pivot_ratio
    }

    pub fn is_singular(&self) -> bool {
        matches!(self.factorization, Factorization::Singular)
    }

    /// Weights for the covariance vector `cov_vec` between the conditioning
    /// points and one target. Returns the pivot ratio when the system is
    /// singular.
    pub fn solve(&self, cov_vec: &DVector<f64>) -> Result<OKWeights, f64> {
        match &self.factorization {
            Factorization::Cholesky {
                llt,
                lambda_e,
                denom,
            } => {
                let lambda_sk = llt.solve(cov_vec);
                let mu = (lambda_sk.sum() - 1.0) / denom;
                let weights = lambda_sk - lambda_e * mu;
                Ok(OKWeights {
                    weights,
                    lagrange_multiplier: mu,
                })
            }
            Factorization::Augmented(lu) => {
                let mut rhs = DVector::from_element(self.n_cond + 1, 1.0);
                rhs.rows_mut(0, self.n_cond).copy_from(cov_vec);
                let x = lu.solve(&rhs).ok_or(self.pivot_ratio)?;
                if x.iter().any(|v| !v.is_finite()) {
                    return Err(self.pivot_ratio);
                }
                Ok(OKWeights {
                    weights: x.rows(0, self.n_cond).into_owned(),
                    lagrange_multiplier: x[self.n_cond],
                })
            }
            Factorization::Singular => Err(self.pivot_ratio),
        }
    }
}

fn cholesky_pivot_ratio(llt: &Cholesky<f64, Dyn>) -> f64 {
    //pivots of C are the squared diagonal of L
    let diag = llt.l_dirty().diagonal();
    let (min, max) = diag
        .iter()
        .fold((f64::INFINITY, 0f64), |(lo, hi), v| (lo.min(v * v), hi.max(v * v)));
    if max > 0.0 {
        min / max
    } else {
        0.0
    }
}

fn lu_pivot_ratio(lu: &FullPivLU<f64, Dyn, Dyn>) -> f64 {
    let u = lu.u();
    let (min, max) = u
        .diagonal()
        .iter()
        .fold((f64::INFINITY, 0f64), |(lo, hi), v| (lo.min(v.abs()), hi.max(v.abs())));
    if max > 0.0 && min.is_finite() {
        min / max
    } else {
        0.0
    }
}
