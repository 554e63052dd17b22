pub mod cv;

pub use cv::{
    cross_validate, CrossValidation, CrossValidationConfig, CrossValidationRecord, CvFolds,
    FoldAssignment,
};
