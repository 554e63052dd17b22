use nalgebra::Point2;

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::estimators::{InverseDistance, KrigingResult, OrdinaryKriging};
use crate::evaluation::{cross_validate, CrossValidation};
use crate::spatial_database::SpatialPointSet;
use crate::variography::experimental::{estimate, ExperimentalVariogram};
use crate::variography::model_variograms::fitter::{fit_variogram, FitOutcome};
use crate::variography::model_variograms::VariogramStructure;

#[derive(Debug)]
pub struct AnalysisReport {
    pub empirical: ExperimentalVariogram,
    pub fit: FitOutcome<VariogramStructure>,
    /// One result per target, in target order.
    pub predictions: Vec<Result<KrigingResult>>,
}

/// Cross-validation of the fitted kriging model next to the IDW baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorComparison {
    pub kriging: CrossValidation,
    pub idw: CrossValidation,
}

pub struct Analysis;

impl Analysis {
    /// Estimate the empirical variogram of `points`, fit `template` to it and
    /// krige every target with the fitted model. A fit that did not converge
    /// is still used; its warning is kept in the report.
    pub fn run(
        points: &SpatialPointSet,
        template: &VariogramStructure,
        targets: &[Point2<f64>],
        config: &AnalysisConfig,
    ) -> Result<AnalysisReport> {
        config.validate()?;

        let empirical = estimate(points, &config.variogram)?;
        let fit = fit_variogram(&empirical.points, template, &config.fit)?;
        tracing::info!(
            kind = %fit.model.kind,
            nugget = fit.model.nugget,
            partial_sill = fit.model.partial_sill,
            range = fit.model.range,
            converged = fit.converged(),
            "fitted variogram"
        );

        let kriging = OrdinaryKriging::with_config(points, fit.model, config.kriging)?;
        let predictions = kriging.predict_many(targets);

        Ok(AnalysisReport {
            empirical,
            fit,
            predictions,
        })
    }

    /// Cross-validate ordinary kriging with `model` and IDW on the same folds.
    pub fn compare_predictors(
        points: &SpatialPointSet,
        model: &VariogramStructure,
        config: &AnalysisConfig,
    ) -> Result<PredictorComparison> {
        config.validate()?;

        let kriging = cross_validate(points, &config.cross_validation, |train| {
            OrdinaryKriging::with_config(train, *model, config.kriging)
        })?;
        let idw = cross_validate(points, &config.cross_validation, |train| {
            InverseDistance::new(train, config.idw)
        })?;
        tracing::info!(kriging_rmse = kriging.rmse, idw_rmse = idw.rmse, "predictor comparison");

        Ok(PredictorComparison { kriging, idw })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::GeostatError;
    use crate::variography::experimental::VariogramConfig;

    fn unit_square() -> SpatialPointSet {
        SpatialPointSet::from_points(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(0.0, 1.0),
                Point2::new(1.0, 1.0),
            ],
            vec![10.0, 12.0, 9.0, 11.0],
        )
        .unwrap()
    }

    #[test]
    fn unit_square_pipeline() {
        let config = AnalysisConfig {
            variogram: VariogramConfig::new(2.0, 1.0),
            ..Default::default()
        };
        let template = VariogramStructure::exponential(0.0, 2.0, 1.0).unwrap();
        let targets = [Point2::new(0.5, 0.5), Point2::new(1.0, 0.0)];
        let report = Analysis::run(&unit_square(), &template, &targets, &config).unwrap();

        assert_eq!(report.empirical.len(), 2);
        assert!(report.fit.converged());
        assert_eq!(report.predictions.len(), 2);

        let centre = report.predictions[0].as_ref().unwrap();
        assert!((9.0..=12.0).contains(&centre.predicted));
        let corner = report.predictions[1].as_ref().unwrap();
        assert!((corner.predicted - 12.0).abs() < 1e-8);
    }

    #[test]
    fn invalid_config_is_fatal() {
        let config = AnalysisConfig {
            variogram: VariogramConfig::new(-1.0, 1.0),
            ..Default::default()
        };
        let template = VariogramStructure::exponential(0.0, 2.0, 1.0).unwrap();
        assert!(matches!(
            Analysis::run(&unit_square(), &template, &[], &config),
            Err(GeostatError::InvalidParameter { .. })
        ));
    }
}
