pub mod analysis;
pub mod config;
pub mod error;
pub mod estimators;
pub mod evaluation;
pub mod geometry;
pub mod spatial_database;
pub mod systems;
pub mod variography;

pub mod prelude {

    pub mod re_exports {
        pub use nalgebra;
    }

    pub use crate::analysis::{Analysis, AnalysisReport, PredictorComparison};
    pub use crate::config::AnalysisConfig;
    pub use crate::error::{GeostatError, Result};
    pub use crate::estimators::{
        IdwConfig, InverseDistance, KrigingConfig, KrigingResult, KrigingWeights, OrdinaryKriging,
        Prediction, Predictor,
    };
    pub use crate::evaluation::{
        cross_validate, CrossValidation, CrossValidationConfig, CrossValidationRecord, CvFolds,
        FoldAssignment,
    };
    pub use crate::geometry::{
        anisotropic_distance, anisotropic_transform, direction, distance, Anisotropy,
        DirectionTolerance,
    };
    pub use crate::spatial_database::{Sample, SpatialPointSet};
    pub use crate::variography::experimental::{
        cloud, estimate, BinEdges, CloudPoint, EmpiricalVariogramPoint, ExperimentalVariogram,
        LagBin, VariogramConfig,
    };
    pub use crate::variography::model_variograms::fitter::{
        fit_composite, fit_variogram, FitConfig, FitOutcome, FitWarning, FittingScheme, NuggetFit,
    };
    pub use crate::variography::model_variograms::{
        CompositeVariogram, ModelKind, VariogramModel, VariogramStructure,
    };
}
