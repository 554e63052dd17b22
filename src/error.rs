use thiserror::Error;

/// Main error type for geostatistical operations.
///
/// Every variant carries the offending values so a failure can be traced
/// back to the sample, bin, fold or parameter that caused it.
#[derive(Error, Debug)]
pub enum GeostatError {
    #[error("insufficient data for {operation}: need at least {required}, got {available}")]
    InsufficientData {
        operation: &'static str,
        required: usize,
        available: usize,
    },

    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("singular kriging system at target {target_index} (pivot ratio {pivot_ratio:e})")]
    SingularKrigingSystem { target_index: usize, pivot_ratio: f64 },

    #[error("missing column '{column}'")]
    MissingColumn { column: String },

    #[error("could not parse '{value}' in column '{column}' at row {row}")]
    ParseValue {
        column: String,
        value: String,
        row: usize,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GeostatError {
    pub(crate) fn invalid(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        GeostatError::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn insufficient(operation: &'static str, required: usize, available: usize) -> Self {
        GeostatError::InsufficientData {
            operation,
            required,
            available,
        }
    }
}

/// Result type alias for geostatistical operations.
pub type Result<T> = std::result::Result<T, GeostatError>;
