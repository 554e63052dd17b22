use indicatif::{ParallelProgressIterator, ProgressBar};
use nalgebra::{DVector, Point2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{GeostatError, Result};
use crate::spatial_database::SpatialPointSet;
use crate::systems::{OKSystem, OKSystemBuilder};
use crate::variography::model_variograms::VariogramModel;

use super::{Prediction, Predictor};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KrigingConfig {
    /// Show a progress bar while predicting many targets.
    pub progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KrigingResult {
    pub location: Point2<f64>,
    pub predicted: f64,
    /// Always >= 0.
    pub prediction_variance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KrigingWeights {
    /// One weight per conditioning sample; they sum to 1.
    pub weights: Vec<f64>,
    /// Multiplier of the unbiasedness constraint in the covariance form.
    pub lagrange_multiplier: f64,
}

/// Ordinary kriging (unknown constant mean) over every sample of a point set.
///
/// The covariance matrix of the samples is factored when the predictor is
/// built and reused for every target.
#[derive(Clone)]
pub struct OrdinaryKriging<V> {
    points: Vec<Point2<f64>>,
    values: DVector<f64>,
    model: V,
    sill: f64,
    system: OKSystem,
    config: KrigingConfig,
}

impl<V> OrdinaryKriging<V>
where
    V: VariogramModel,
{
    pub fn new(data: &SpatialPointSet, model: V) -> Result<Self> {
        Self::with_config(data, model, KrigingConfig::default())
    }

    pub fn with_config(data: &SpatialPointSet, model: V, config: KrigingConfig) -> Result<Self> {
        model.validate()?;
        if data.is_empty() {
            return Err(GeostatError::insufficient("ordinary kriging", 1, 0));
        }

        let points = data.points().to_vec();
        let cov_mat = OKSystemBuilder::build_cov_mat(&points, &model);
        let system = OKSystem::new(cov_mat);

        Ok(Self {
            values: DVector::from_column_slice(data.values()),
            points,
            sill: model.c_0(),
            model,
            system,
            config,
        })
    }

    pub fn model(&self) -> &V {
        &self.model
    }

    pub fn system(&self) -> &OKSystem {
        &self.system
    }

    fn solve_target(
        &self,
        target_index: usize,
        target: &Point2<f64>,
        cov_vec: &mut DVector<f64>,
    ) -> Result<KrigingResult> {
        OKSystemBuilder::build_cov_vec(cov_vec, &self.points, target, &self.model);
        let ok = self
            .system
            .solve(cov_vec)
            .map_err(|pivot_ratio| GeostatError::SingularKrigingSystem {
                target_index,
                pivot_ratio,
            })?;

        let predicted = ok.weights.dot(&self.values);
        let variance = self.sill - ok.weights.dot(cov_vec) - ok.lagrange_multiplier;

        Ok(KrigingResult {
            location: *target,
            predicted,
            //round-off can leave a tiny negative variance
            prediction_variance: variance.max(0.0),
        })
    }

    /// Kriging weights and Lagrange multiplier for one target. A singular
    /// system is reported with target index 0.
    pub fn weights(&self, target: &Point2<f64>) -> Result<KrigingWeights> {
        let mut cov_vec = DVector::zeros(self.points.len());
        OKSystemBuilder::build_cov_vec(&mut cov_vec, &self.points, target, &self.model);
        let ok = self
            .system
            .solve(&cov_vec)
            .map_err(|pivot_ratio| GeostatError::SingularKrigingSystem {
                target_index: 0,
                pivot_ratio,
            })?;
        Ok(KrigingWeights {
            weights: ok.weights.iter().copied().collect(),
            lagrange_multiplier: ok.lagrange_multiplier,
        })
    }

    pub fn predict(&self, target: &Point2<f64>) -> Result<KrigingResult> {
        let mut cov_vec = DVector::zeros(self.points.len());
        self.solve_target(0, target, &mut cov_vec)
    }

    /// One result per target, in target order. A singular system is
    /// reported for each affected target rather than for the whole batch.
    pub fn predict_many(&self, targets: &[Point2<f64>]) -> Vec<Result<KrigingResult>> {
        let bar = if self.config.progress {
            ProgressBar::new(targets.len() as u64)
        } else {
            ProgressBar::hidden()
        };

        let results = targets
            .par_iter()
            .enumerate()
            .progress_with(bar)
            .map_init(
                || DVector::zeros(self.points.len()),
                |cov_vec, (i, target)| self.solve_target(i, target, cov_vec),
            )
            .collect::<Vec<_>>();

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::warn!(failed, targets = targets.len(), "kriging failed for some targets");
        }
        tracing::debug!(targets = targets.len(), samples = self.points.len(), "ordinary kriging");
        results
    }
}

impl<V> Predictor for OrdinaryKriging<V>
where
    V: VariogramModel,
{
    fn predict_at(&self, target: &Point2<f64>) -> Result<Prediction> {
        let result = self.predict(target)?;
        Ok(Prediction {
            value: result.predicted,
            variance: Some(result.prediction_variance),
        })
    }
}
