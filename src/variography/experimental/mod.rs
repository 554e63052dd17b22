use serde::{Deserialize, Serialize};

use crate::error::{GeostatError, Result};
use crate::geometry::{Anisotropy, DirectionTolerance};
use crate::spatial_database::SpatialPointSet;

pub mod cpu_calculator;

pub use cpu_calculator::CPUCalculator;

/// Default cutoff as a fraction of the largest pairwise distance.
pub const DEFAULT_CUTOFF_FRACTION: f64 = 1.0 / 3.0;

/// Default number of lag bins between 0 and the cutoff when no width is given.
pub const DEFAULT_LAG_COUNT: usize = 15;

/// Largest number of lag bins a cutoff and width may produce.
pub const MAX_LAG_BINS: usize = 10_000;

/// Which end of each lag interval is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BinEdges {
    /// `(lower, upper]`, with the first bin also closed at 0. A pair whose
    /// distance is an exact multiple of the width belongs to the bin ending
    /// there.
    #[default]
    UpperClosed,
    /// `[lower, upper)`, with the last bin also closed at the cutoff.
    LowerClosed,
}

/// Distance interval (and optional direction window) of one lag class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LagBin {
    pub lower: f64,
    pub upper: f64,
    pub lower_closed: bool,
    pub upper_closed: bool,
    pub direction: Option<f64>,
    pub tolerance: Option<f64>,
}

impl LagBin {
    #[inline(always)]
    pub fn contains_distance(&self, d: f64) -> bool {
        let above = d > self.lower || (self.lower_closed && d == self.lower);
        let below = d < self.upper || (self.upper_closed && d == self.upper);
        above && below
    }
}

/// One non-empty lag class of an empirical variogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmpiricalVariogramPoint {
    pub bin: LagBin,
    /// Mean distance of the pairs actually found in the bin.
    pub mean_distance: f64,
    pub semivariance: f64,
    pub pair_count: usize,
}

/// Unaggregated semivariance of one sample pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CloudPoint {
    pub i: usize,
    pub j: usize,
    pub distance: f64,
    pub direction: f64,
    pub semivariance: f64,
}

/// Empirical variogram together with the lag settings that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalVariogram {
    pub cutoff: f64,
    pub width: f64,
    /// Ordered by direction (in the order requested), then by mean distance.
    pub points: Vec<EmpiricalVariogramPoint>,
}

impl ExperimentalVariogram {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn total_pairs(&self) -> usize {
        self.points.iter().map(|p| p.pair_count).sum()
    }
}

/// Lag, direction and distance settings for variogram estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariogramConfig {
    /// Largest pair distance considered. Defaults to
    /// [`DEFAULT_CUTOFF_FRACTION`] of the largest pairwise distance.
    pub cutoff: Option<f64>,
    /// Lag bin width. Defaults to `cutoff / DEFAULT_LAG_COUNT`. At most
    /// [`MAX_LAG_BINS`] bins may fit under the cutoff.
    pub width: Option<f64>,
    /// Directional windows; empty for an omnidirectional variogram.
    pub directions: Vec<DirectionTolerance>,
    pub bin_edges: BinEdges,
    /// Measure pair distances in the anisotropically transformed space.
    pub anisotropy: Option<Anisotropy>,
}

impl Default for VariogramConfig {
    fn default() -> Self {
        Self {
            cutoff: None,
            width: None,
            directions: Vec::new(),
            bin_edges: BinEdges::default(),
            anisotropy: None,
        }
    }
}

impl VariogramConfig {
    pub fn new(cutoff: f64, width: f64) -> Self {
        Self {
            cutoff: Some(cutoff),
            width: Some(width),
            ..Default::default()
        }
    }

    pub fn with_directions(mut self, directions: Vec<DirectionTolerance>) -> Self {
        self.directions = directions;
        self
    }

    pub fn with_bin_edges(mut self, bin_edges: BinEdges) -> Self {
        self.bin_edges = bin_edges;
        self
    }

    pub fn with_anisotropy(mut self, anisotropy: Anisotropy) -> Self {
        self.anisotropy = Some(anisotropy);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(cutoff) = self.cutoff {
            if !(cutoff.is_finite() && cutoff > 0.0) {
                return Err(GeostatError::invalid("cutoff", cutoff, "must be positive"));
            }
        }
        if let Some(width) = self.width {
            if !(width.is_finite() && width > 0.0) {
                return Err(GeostatError::invalid("width", width, "must be positive"));
            }
        }
        for direction in &self.directions {
            direction.validate()?;
        }
        if let Some(anisotropy) = &self.anisotropy {
            anisotropy.validate()?;
        }
        Ok(())
    }
}

/// Binned empirical variogram of `points`. Every pair is visited, so the cost
/// grows as O(n^2).
pub fn estimate(points: &SpatialPointSet, config: &VariogramConfig) -> Result<ExperimentalVariogram> {
    CPUCalculator::new(points, config)?.calculate()
}

/// Variogram cloud: one point per sample pair within the cutoff.
pub fn cloud(points: &SpatialPointSet, config: &VariogramConfig) -> Result<Vec<CloudPoint>> {
    Ok(CPUCalculator::new(points, config)?.cloud())
}
