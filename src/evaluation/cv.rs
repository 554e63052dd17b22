use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{GeostatError, Result};
use crate::estimators::Predictor;
use crate::spatial_database::SpatialPointSet;

pub const DEFAULT_CV_FOLDS: usize = 5;
pub const DEFAULT_CV_SEED: u64 = 0;

/// Number of folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CvFolds {
    KFold(usize),
    /// One fold per sample; sample `i` is held out in fold `i`.
    LeaveOneOut,
}

impl Default for CvFolds {
    fn default() -> Self {
        CvFolds::KFold(DEFAULT_CV_FOLDS)
    }
}

/// How samples are dealt into folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FoldAssignment {
    /// Shuffle the sample indices with a seeded `StdRng`, then cut the
    /// shuffled order into contiguous folds.
    #[default]
    Random,
    /// Cut the samples into folds in their input order.
    Contiguous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossValidationConfig {
    pub folds: CvFolds,
    pub assignment: FoldAssignment,
    pub seed: u64,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            folds: CvFolds::default(),
            assignment: FoldAssignment::default(),
            seed: DEFAULT_CV_SEED,
        }
    }
}

impl CrossValidationConfig {
    pub fn k_fold(k: usize) -> Self {
        Self {
            folds: CvFolds::KFold(k),
            ..Default::default()
        }
    }

    pub fn leave_one_out() -> Self {
        Self {
            folds: CvFolds::LeaveOneOut,
            ..Default::default()
        }
    }

    pub fn with_assignment(mut self, assignment: FoldAssignment) -> Self {
        self.assignment = assignment;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sample indices of every fold, in fold order.
    pub fn folds(&self, n: usize) -> Result<Vec<Vec<usize>>> {
        if n < 2 {
            return Err(GeostatError::insufficient("cross-validation", 2, n));
        }

        let k = match self.folds {
            CvFolds::LeaveOneOut => return Ok((0..n).map(|i| vec![i]).collect()),
            CvFolds::KFold(k) => k,
        };
        if k < 2 || k > n {
            return Err(GeostatError::invalid(
                "cv_folds",
                k,
                format!("k must lie in [2, {}] for {} samples", n, n),
            ));
        }

        let mut order = (0..n).collect::<Vec<_>>();
        if self.assignment == FoldAssignment::Random {
            let mut rng = StdRng::seed_from_u64(self.seed);
            order.shuffle(&mut rng);
        }

        //the first n % k folds take one extra sample
        let (base, extra) = (n / k, n % k);
        let mut folds = Vec::with_capacity(k);
        let mut start = 0;
        for f in 0..k {
            let size = base + usize::from(f < extra);
            let mut fold = order[start..start + size].to_vec();
            fold.sort_unstable();
            folds.push(fold);
            start += size;
        }
        Ok(folds)
    }
}

/// Held-out prediction of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationRecord {
    pub sample_index: usize,
    pub fold: usize,
    pub observed: f64,
    pub predicted: f64,
    /// observed - predicted
    pub residual: f64,
    pub variance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    /// One record per sample, ordered by sample index.
    pub records: Vec<CrossValidationRecord>,
    pub rmse: f64,
    pub mean_error: f64,
    pub mean_absolute_error: f64,
    /// Mean of residual^2 / variance; close to 1 when the prediction
    /// variances are well calibrated. Only available when every record has
    /// a positive variance.
    pub mean_squared_deviation_ratio: Option<f64>,
}

impl CrossValidation {
    fn from_records(records: Vec<CrossValidationRecord>) -> Self {
        let n = records.len() as f64;
        let rmse = (records.iter().map(|r| r.residual * r.residual).sum::<f64>() / n).sqrt();
        let mean_error = records.iter().map(|r| r.residual).sum::<f64>() / n;
        let mean_absolute_error = records.iter().map(|r| r.residual.abs()).sum::<f64>() / n;
        let mean_squared_deviation_ratio = records
            .iter()
            .map(|r| match r.variance {
                Some(v) if v > 0.0 => Some(r.residual * r.residual / v),
                _ => None,
            })
            .sum::<Option<f64>>()
            .map(|s| s / n);

        Self {
            records,
            rmse,
            mean_error,
            mean_absolute_error,
            mean_squared_deviation_ratio,
        }
    }

    pub fn residuals(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.residual).collect()
    }
}

/// Cross-validate the predictor produced by `build` on `data`.
///
/// `build` receives each fold's training samples. An error from `build` or
/// from a held-out prediction aborts the run.
pub fn cross_validate<P, F>(
    data: &SpatialPointSet,
    config: &CrossValidationConfig,
    build: F,
) -> Result<CrossValidation>
where
    P: Predictor,
    F: Fn(&SpatialPointSet) -> Result<P> + Sync,
{
    let folds = config.folds(data.len())?;

    let mut held_out = vec![usize::MAX; data.len()];
    for (f, fold) in folds.iter().enumerate() {
        for &i in fold {
            held_out[i] = f;
        }
    }

    let per_fold = folds
        .par_iter()
        .enumerate()
        .map(|(f, fold)| {
            let train = (0..data.len())
                .filter(|i| held_out[*i] != f)
                .collect::<Vec<_>>();
            let predictor = build(&data.subset(&train))?;

            tracing::trace!(fold = f, train = train.len(), test = fold.len(), "cross-validation fold");

            fold.iter()
                .map(|&i| {
                    let prediction = predictor
                        .predict_at(&data.points()[i])
                        .map_err(|err| match err {
                            //name the held-out sample rather than the predictor's own index
                            GeostatError::SingularKrigingSystem { pivot_ratio, .. } => {
                                GeostatError::SingularKrigingSystem {
                                    target_index: i,
                                    pivot_ratio,
                                }
                            }
                            err => err,
                        })?;
                    let observed = data.values()[i];
                    Ok(CrossValidationRecord {
                        sample_index: i,
                        fold: f,
                        observed,
                        predicted: prediction.value,
                        residual: observed - prediction.value,
                        variance: prediction.variance,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let mut records = per_fold.into_iter().flatten().collect::<Vec<_>>();
    records.sort_by_key(|r| r.sample_index);

    let cv = CrossValidation::from_records(records);
    tracing::debug!(
        folds = folds.len(),
        samples = data.len(),
        rmse = cv.rmse,
        mean_error = cv.mean_error,
        "cross-validation"
    );
    Ok(cv)
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;
    use nalgebra::Point2;
    use rand::Rng;
    use rand_distr::Uniform;

    use super::*;
    use crate::estimators::{IdwConfig, InverseDistance, OrdinaryKriging};
    use crate::variography::model_variograms::VariogramStructure;

    fn data(n: usize) -> SpatialPointSet {
        let mut rng = StdRng::seed_from_u64(99);
        let coord = Uniform::new(0.0, 20.0);
        let points = (0..n)
            .map(|_| Point2::new(rng.sample(coord), rng.sample(coord)))
            .collect::<Vec<_>>();
        let values = points.iter().map(|p| p.x * 0.3 - p.y * 0.1 + 5.0).collect();
        SpatialPointSet::from_points(points, values).unwrap()
    }

    fn idw(train: &SpatialPointSet) -> Result<InverseDistance> {
        InverseDistance::new(train, IdwConfig::default())
    }

    #[test]
    fn k_outside_range_is_invalid() {
        let data = data(10);
        for k in [0, 1, 11] {
            assert!(matches!(
                cross_validate(&data, &CrossValidationConfig::k_fold(k), idw),
                Err(GeostatError::InvalidParameter { name: "cv_folds", .. })
            ));
        }

        let single = SpatialPointSet::from_points(vec![Point2::new(0.0, 0.0)], vec![1.0]).unwrap();
        assert!(matches!(
            cross_validate(&single, &CrossValidationConfig::leave_one_out(), idw),
            Err(GeostatError::InsufficientData { .. })
        ));
    }

    #[test]
    fn folds_partition_samples() {
        for assignment in [FoldAssignment::Random, FoldAssignment::Contiguous] {
            let config = CrossValidationConfig::k_fold(4).with_assignment(assignment);
            let folds = config.folds(23).unwrap();
            assert_eq!(folds.len(), 4);
            assert_eq!(
                folds.iter().map(|f| f.len()).collect::<Vec<_>>(),
                vec![6, 6, 6, 5]
            );
            let mut all = folds.concat();
            all.sort();
            assert_eq!(all, (0..23).collect::<Vec<_>>());
        }

        let contiguous = CrossValidationConfig::k_fold(3)
            .with_assignment(FoldAssignment::Contiguous)
            .folds(6)
            .unwrap();
        assert_eq!(contiguous, vec![vec![0, 1], vec![2, 3], vec![4, 5]]);
    }

    #[test]
    fn random_folds_follow_seed() {
        let a = CrossValidationConfig::k_fold(5).with_seed(7).folds(40).unwrap();
        let b = CrossValidationConfig::k_fold(5).with_seed(7).folds(40).unwrap();
        let c = CrossValidationConfig::k_fold(5).with_seed(8).folds(40).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn leave_one_out_is_reproducible() {
        let data = data(30);
        let config = CrossValidationConfig::leave_one_out();
        let first = cross_validate(&data, &config, idw).unwrap();
        let second = cross_validate(&data, &config, idw).unwrap();
        assert_eq!(first, second);

        assert_eq!(first.records.len(), 30);
        for (i, record) in first.records.iter().enumerate() {
            assert_eq!(record.sample_index, i);
            assert_eq!(record.fold, i);
            assert_eq!(record.residual, record.observed - record.predicted);
            assert!(record.variance.is_none());
        }
        assert!(first.rmse >= 0.0);
        assert!(first.mean_squared_deviation_ratio.is_none());
    }

    #[test]
    fn summary_statistics() {
        let data = data(25);
        let cv = cross_validate(&data, &CrossValidationConfig::k_fold(5), idw).unwrap();
        let residuals = cv.residuals();
        let n = residuals.len() as f64;
        assert_abs_diff_eq!(
            cv.rmse,
            (residuals.iter().map(|r| r * r).sum::<f64>() / n).sqrt(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(cv.mean_error, residuals.iter().sum::<f64>() / n, epsilon = 1e-12);
        assert!(cv.mean_absolute_error >= cv.mean_error.abs());
        assert!(cv.rmse >= cv.mean_absolute_error);
    }

    #[test]
    fn constant_field_has_zero_error() {
        let points = (0..12)
            .map(|i| Point2::new((i % 4) as f64, (i / 4) as f64))
            .collect::<Vec<_>>();
        let data = SpatialPointSet::from_points(points, vec![3.5; 12]).unwrap();
        let cv = cross_validate(&data, &CrossValidationConfig::k_fold(3), idw).unwrap();
        assert_abs_diff_eq!(cv.rmse, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn singular_fold_names_held_out_sample() {
        // samples 0 and 1 share a location, so only the fold holding out 2
        // trains on a singular system
        let data = SpatialPointSet::from_points(
            vec![Point2::new(0.0, 0.0), Point2::new(0.0, 0.0), Point2::new(2.0, 1.0)],
            vec![1.0, 1.5, 3.0],
        )
        .unwrap();
        let model = VariogramStructure::spherical(0.0, 1.0, 10.0).unwrap();
        let err = cross_validate(&data, &CrossValidationConfig::leave_one_out(), |train| {
            OrdinaryKriging::new(train, model)
        })
        .unwrap_err();
        match err {
            GeostatError::SingularKrigingSystem { target_index, .. } => assert_eq!(target_index, 2),
            other => panic!("expected a singular system, got {:?}", other),
        }
    }

    #[test]
    fn kriging_reports_variances() {
        let data = data(30);
        let model = VariogramStructure::exponential(0.1, 4.0, 10.0).unwrap();
        let cv = cross_validate(&data, &CrossValidationConfig::k_fold(6), |train| {
            OrdinaryKriging::new(train, model)
        })
        .unwrap();
        assert!(cv.records.iter().all(|r| r.variance.unwrap() > 0.0));
        assert!(cv.mean_squared_deviation_ratio.unwrap() >= 0.0);
        assert!(cv.rmse >= 0.0);
    }
}
