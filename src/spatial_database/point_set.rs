use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use itertools::izip;
use nalgebra::Point2;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{GeostatError, Result};
use crate::geometry::distance;

/// One measurement: planar coordinates, the measured value and any covariates
/// recorded alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub coordinates: Point2<f64>,
    pub value: f64,
    #[serde(default)]
    pub covariates: BTreeMap<String, f64>,
}

impl Sample {
    pub fn new(x: f64, y: f64, value: f64) -> Self {
        Self {
            coordinates: Point2::new(x, y),
            value,
            covariates: BTreeMap::new(),
        }
    }

    pub fn with_covariate(mut self, name: impl Into<String>, value: f64) -> Self {
        self.covariates.insert(name.into(), value);
        self
    }
}

/// Ordered, immutable set of samples sharing one planar projection.
///
/// Coordinates and values are stored column-wise so the variogram and kriging
/// loops can walk them as slices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialPointSet {
    points: Vec<Point2<f64>>,
    values: Vec<f64>,
    covariates: Vec<BTreeMap<String, f64>>,
}

impl SpatialPointSet {
    pub fn new(samples: Vec<Sample>) -> Result<Self> {
        let mut points = Vec::with_capacity(samples.len());
        let mut values = Vec::with_capacity(samples.len());
        let mut covariates = Vec::with_capacity(samples.len());

        for (i, sample) in samples.into_iter().enumerate() {
            check_sample(i, &sample.coordinates, sample.value)?;
            points.push(sample.coordinates);
            values.push(sample.value);
            covariates.push(sample.covariates);
        }

        Ok(Self {
            points,
            values,
            covariates,
        })
    }

    pub fn from_points(points: Vec<Point2<f64>>, values: Vec<f64>) -> Result<Self> {
        if points.len() != values.len() {
            return Err(GeostatError::invalid(
                "values",
                values.len(),
                format!("expected one value per point ({} points)", points.len()),
            ));
        }
        for (i, (point, value)) in izip!(points.iter(), values.iter()).enumerate() {
            check_sample(i, point, *value)?;
        }
        let covariates = vec![BTreeMap::new(); points.len()];
        Ok(Self {
            points,
            values,
            covariates,
        })
    }

    /// Read a point set from a csv file with a header row.
    ///
    /// `x_col`, `y_col` and `value_col` name the projected coordinates and the
    /// measured value; every other column that parses as a number is kept as
    /// a covariate. Rows with an empty value are skipped.
    pub fn from_csv<P: AsRef<Path>>(
        csv_path: P,
        x_col: &str,
        y_col: &str,
        value_col: &str,
    ) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(csv_path)?;
        let headers = rdr.headers()?.clone();
        for column in [x_col, y_col, value_col] {
            if !headers.iter().any(|h| h == column) {
                return Err(GeostatError::MissingColumn {
                    column: column.to_string(),
                });
            }
        }

        let mut samples = Vec::new();
        for (row, result) in rdr.deserialize().enumerate() {
            let record: HashMap<String, String> = result?;

            let raw_value = record[value_col].trim();
            if raw_value.is_empty() {
                continue;
            }

            let x = parse_field(&record, x_col, row)?;
            let y = parse_field(&record, y_col, row)?;
            let value = parse_field(&record, value_col, row)?;

            let covariates = record
                .iter()
                .filter(|(name, _)| {
                    name.as_str() != x_col && name.as_str() != y_col && name.as_str() != value_col
                })
                .filter_map(|(name, raw)| raw.trim().parse::<f64>().ok().map(|v| (name.clone(), v)))
                .collect();

            samples.push(Sample {
                coordinates: Point2::new(x, y),
                value,
                covariates,
            });
        }

        tracing::debug!(samples = samples.len(), "read point set from csv");
        Self::new(samples)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline(always)]
    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    #[inline(always)]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn covariates(&self, ind: usize) -> &BTreeMap<String, f64> {
        &self.covariates[ind]
    }

    pub fn sample(&self, ind: usize) -> Sample {
        Sample {
            coordinates: self.points[ind],
            value: self.values[ind],
            covariates: self.covariates[ind].clone(),
        }
    }

    /// New point set holding the samples at `inds`, in the given order.
    pub fn subset(&self, inds: &[usize]) -> Self {
        let mut points = Vec::with_capacity(inds.len());
        let mut values = Vec::with_capacity(inds.len());
        let mut covariates = Vec::with_capacity(inds.len());
        for &i in inds {
            points.push(self.points[i]);
            values.push(self.values[i]);
            covariates.push(self.covariates[i].clone());
        }
        Self {
            points,
            values,
            covariates,
        }
    }

    /// Largest distance between any two samples (0 for fewer than 2 samples).
    pub fn max_pairwise_distance(&self) -> f64 {
        self.points
            .iter()
            .enumerate()
            .flat_map(|(i, p1)| self.points[i + 1..].iter().map(move |p2| distance(p1, p2)))
            .max_by_key(|d| OrderedFloat(*d))
            .unwrap_or(0.0)
    }

    /// Axis aligned bounds as (min, max), or None for an empty set.
    pub fn bounding_box(&self) -> Option<(Point2<f64>, Point2<f64>)> {
        let first = self.points.first()?;
        Some(self.points.iter().fold((*first, *first), |(lo, hi), p| {
            (
                Point2::new(lo.x.min(p.x), lo.y.min(p.y)),
                Point2::new(hi.x.max(p.x), hi.y.max(p.y)),
            )
        }))
    }
}

fn check_sample(ind: usize, point: &Point2<f64>, value: f64) -> Result<()> {
    if !(point.x.is_finite() && point.y.is_finite()) {
        return Err(GeostatError::invalid(
            "coordinates",
            format!("sample {} at ({}, {})", ind, point.x, point.y),
            "coordinates must be finite",
        ));
    }
    if !value.is_finite() {
        return Err(GeostatError::invalid(
            "value",
            format!("sample {} = {}", ind, value),
            "missing or non-finite values must be removed before analysis",
        ));
    }
    Ok(())
}

fn parse_field(record: &HashMap<String, String>, column: &str, row: usize) -> Result<f64> {
    let raw = record[column].trim();
    raw.parse::<f64>().map_err(|_| GeostatError::ParseValue {
        column: column.to_string(),
        value: raw.to_string(),
        row,
    })
}
