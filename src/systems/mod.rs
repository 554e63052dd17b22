pub mod ok_system;
pub mod system_builder;

pub use ok_system::{OKSystem, OKWeights, SINGULARITY_TOLERANCE};
pub use system_builder::OKSystemBuilder;
