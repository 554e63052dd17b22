pub mod point_set;

pub use point_set::{Sample, SpatialPointSet};
