use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::estimators::{IdwConfig, KrigingConfig};
use crate::evaluation::CrossValidationConfig;
use crate::variography::experimental::VariogramConfig;
use crate::variography::model_variograms::fitter::FitConfig;

/// Settings of a full analysis. Missing sections and fields take their
/// defaults, so an empty document is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub variogram: VariogramConfig,
    pub fit: FitConfig,
    pub kriging: KrigingConfig,
    pub idw: IdwConfig,
    pub cross_validation: CrossValidationConfig,
}

impl AnalysisConfig {
    /// Check every section that can be checked without data.
    pub fn validate(&self) -> Result<()> {
        self.variogram.validate()?;
        self.fit.validate()?;
        self.idw.validate()
    }
}
