use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{GeostatError, Result};
use crate::geometry::{lag_vector, normalize_direction, Anisotropy};
use crate::variography::experimental::EmpiricalVariogramPoint;

use super::{CompositeVariogram, ModelKind, VariogramModel, VariogramStructure};

pub const DEFAULT_MAX_ITERATIONS: usize = 200;
pub const DEFAULT_TOLERANCE: f64 = 1e-8;
pub const DEFAULT_MAX_RANGE_FACTOR: f64 = 10.0;

const MIN_RANGE_FRACTION: f64 = 1e-6;
const MIN_RATIO: f64 = 0.01;
const INITIAL_DAMPING: f64 = 1e-3;
const MAX_DAMPING: f64 = 1e12;
const DIRECTION_STEP: f64 = 1e-3;
const RATIO_STEP: f64 = 1e-6;

/// Weighting of the empirical points in the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FittingScheme {
    /// `N_k / h_k^2`
    #[default]
    Weighted,
    /// Unweighted least squares.
    Ordinary,
    /// `N_k`
    PairCount,
}

/// Whether the nugget takes part in the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NuggetFit {
    /// Fit the nugget of every structure whose template nugget is positive,
    /// and the jump of every pure nugget structure.
    #[default]
    Auto,
    /// As `Auto`, and free the first structure's nugget when no template
    /// nugget is positive.
    Free,
    /// Keep every template nugget.
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub scheme: FittingScheme,
    pub nugget: NuggetFit,
    /// Also fit the major direction and range ratio of the template's
    /// anisotropy. Needs directional empirical points.
    pub fit_anisotropy: bool,
    pub max_iterations: usize,
    /// Relative decrease of the weighted SSE below which the fit has converged.
    pub tolerance: f64,
    /// Upper bound on the range, as a multiple of the largest lag.
    pub max_range_factor: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            scheme: FittingScheme::default(),
            nugget: NuggetFit::default(),
            fit_anisotropy: false,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            max_range_factor: DEFAULT_MAX_RANGE_FACTOR,
        }
    }
}

impl FitConfig {
    pub fn with_scheme(mut self, scheme: FittingScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_nugget(mut self, nugget: NuggetFit) -> Self {
        self.nugget = nugget;
        self
    }

    pub fn with_anisotropy_fit(mut self, fit_anisotropy: bool) -> Self {
        self.fit_anisotropy = fit_anisotropy;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(GeostatError::invalid(
                "max_iterations",
                self.max_iterations,
                "must be at least 1",
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(GeostatError::invalid(
                "tolerance",
                self.tolerance,
                "must be positive",
            ));
        }
        if !(self.max_range_factor.is_finite() && self.max_range_factor > 0.0) {
            return Err(GeostatError::invalid(
                "max_range_factor",
                self.max_range_factor,
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Soft failure attached to a fit that is still usable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FitWarning {
    DidNotConverge {
        iterations: usize,
        relative_decrease: f64,
        weighted_sse: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOutcome<M> {
    /// Best model found.
    pub model: M,
    pub weighted_sse: f64,
    pub iterations: usize,
    pub warning: Option<FitWarning>,
}

impl<M> FitOutcome<M> {
    pub fn converged(&self) -> bool {
        self.warning.is_none()
    }

    pub fn map<N>(self, f: impl FnOnce(M) -> N) -> FitOutcome<N> {
        FitOutcome {
            model: f(self.model),
            weighted_sse: self.weighted_sse,
            iterations: self.iterations,
            warning: self.warning,
        }
    }
}

/// Fit a single structure. The family of `template` is kept; its parameters
/// seed the iteration.
pub fn fit_variogram(
    points: &[EmpiricalVariogramPoint],
    template: &VariogramStructure,
    config: &FitConfig,
) -> Result<FitOutcome<VariogramStructure>> {
    let outcome = fit_structures(points, vec![*template], config)?;
    Ok(outcome.map(|structures| structures[0]))
}

/// Fit a nested model whose semivariance is the sum of its structures.
pub fn fit_composite(
    points: &[EmpiricalVariogramPoint],
    template: &CompositeVariogram,
    config: &FitConfig,
) -> Result<FitOutcome<CompositeVariogram>> {
    template.validate()?;
    let outcome = fit_structures(points, template.structures.clone(), config)?;
    Ok(outcome.map(|structures| CompositeVariogram { structures }))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Parameter {
    Nugget(usize),
    PartialSill(usize),
    Range(usize),
    Direction,
    Ratio,
}

struct Problem<'a> {
    points: Vec<&'a EmpiricalVariogramPoint>,
    sqrt_weights: Vec<f64>,
    template: Vec<VariogramStructure>,
    parameters: Vec<Parameter>,
    range_bounds: (f64, f64),
}

impl<'a> Problem<'a> {
    fn new(
        points: &'a [EmpiricalVariogramPoint],
        template: Vec<VariogramStructure>,
        config: &FitConfig,
    ) -> Result<Self> {
        let mut usable = Vec::with_capacity(points.len());
        let mut sqrt_weights = Vec::with_capacity(points.len());
        for point in points {
            let d = point.mean_distance;
            let n = point.pair_count as f64;
            let weight = match config.scheme {
                FittingScheme::Weighted if d <= 0.0 => continue,
                FittingScheme::Weighted => n / (d * d),
                FittingScheme::Ordinary => 1.0,
                FittingScheme::PairCount => n,
            };
            usable.push(point);
            sqrt_weights.push(weight.sqrt());
        }
        if usable.len() < points.len() {
            tracing::debug!(
                excluded = points.len() - usable.len(),
                "empirical points at zero distance left out of the weighted fit"
            );
        }

        let max_lag = usable
            .iter()
            .map(|p| p.mean_distance)
            .fold(0f64, f64::max);
        if max_lag <= 0.0 {
            return Err(GeostatError::insufficient("variogram fit", 2, 0));
        }

        let mut parameters = Vec::new();
        let any_nugget = template
            .iter()
            .any(|s| s.nugget > 0.0 || s.kind == ModelKind::Nugget);
        for (i, structure) in template.iter().enumerate() {
            //a pure nugget structure has nugget and partial sill on the same jump
            if structure.kind == ModelKind::Nugget {
                if config.nugget != NuggetFit::Fixed {
                    parameters.push(Parameter::Nugget(i));
                }
                continue;
            }
            let nugget_free = match config.nugget {
                NuggetFit::Auto => structure.nugget > 0.0,
                NuggetFit::Free => structure.nugget > 0.0 || (!any_nugget && i == 0),
                NuggetFit::Fixed => false,
            };
            if nugget_free {
                parameters.push(Parameter::Nugget(i));
            }
            parameters.push(Parameter::PartialSill(i));
            parameters.push(Parameter::Range(i));
        }

        if config.fit_anisotropy {
            if !template.iter().any(|s| s.anisotropy.is_some()) {
                return Err(GeostatError::invalid(
                    "fit_anisotropy",
                    true,
                    "the template carries no anisotropy to start from",
                ));
            }
            if !usable.iter().any(|p| p.bin.direction.is_some()) {
                return Err(GeostatError::invalid(
                    "fit_anisotropy",
                    true,
                    "anisotropy can only be fit to directional empirical points",
                ));
            }
            parameters.push(Parameter::Direction);
            parameters.push(Parameter::Ratio);
        }

        let required = parameters.len().max(2);
        if usable.len() < required {
            return Err(GeostatError::insufficient("variogram fit", required, usable.len()));
        }

        Ok(Self {
            points: usable,
            sqrt_weights,
            template,
            parameters,
            range_bounds: (max_lag * MIN_RANGE_FRACTION, max_lag * config.max_range_factor),
        })
    }

    fn seed_anisotropy(&self) -> Anisotropy {
        self.template
            .iter()
            .find_map(|s| s.anisotropy)
            .unwrap_or(Anisotropy {
                major_direction: 0.0,
                minor_range_ratio: 1.0,
            })
    }

    fn initial(&self) -> Vec<f64> {
        let mut theta = self
            .parameters
            .iter()
            .map(|p| match *p {
                Parameter::Nugget(i) => self.template[i].nugget,
                Parameter::PartialSill(i) => self.template[i].partial_sill,
                Parameter::Range(i) => self.template[i].range,
                Parameter::Direction => self.seed_anisotropy().major_direction,
                Parameter::Ratio => self.seed_anisotropy().minor_range_ratio,
            })
            .collect::<Vec<_>>();
        self.project(&mut theta);
        theta
    }

    fn bounds(&self, parameter: Parameter) -> (f64, f64) {
        match parameter {
            Parameter::Nugget(_) | Parameter::PartialSill(_) => (0.0, f64::INFINITY),
            Parameter::Range(_) => self.range_bounds,
            Parameter::Direction => (f64::NEG_INFINITY, f64::INFINITY),
            Parameter::Ratio => (MIN_RATIO, 1.0),
        }
    }

    fn project(&self, theta: &mut [f64]) {
        for (value, parameter) in theta.iter_mut().zip(self.parameters.iter()) {
            if *parameter == Parameter::Direction {
                *value = normalize_direction(*value);
                continue;
            }
            let (lo, hi) = self.bounds(*parameter);
            *value = value.clamp(lo, hi);
        }
    }

    fn structures(&self, theta: &[f64]) -> Vec<VariogramStructure> {
        let mut structures = self.template.clone();
        let mut anisotropy = self.seed_anisotropy();
        let mut fit_anisotropy = false;
        for (value, parameter) in theta.iter().zip(self.parameters.iter()) {
            match *parameter {
                Parameter::Nugget(i) => structures[i].nugget = *value,
                Parameter::PartialSill(i) => structures[i].partial_sill = *value,
                Parameter::Range(i) => structures[i].range = *value,
                Parameter::Direction => {
                    anisotropy.major_direction = *value;
                    fit_anisotropy = true;
                }
                Parameter::Ratio => {
                    anisotropy.minor_range_ratio = *value;
                    fit_anisotropy = true;
                }
            }
        }
        if fit_anisotropy {
            structures
                .iter_mut()
                .for_each(|s| s.anisotropy = Some(anisotropy));
        }
        structures
    }

    #[inline(always)]
    fn model_at(structures: &[VariogramStructure], point: &EmpiricalVariogramPoint) -> f64 {
        structures
            .iter()
            .map(|s| s.evaluate(point.mean_distance, point.bin.direction))
            .sum()
    }

    fn residuals(&self, theta: &[f64]) -> DVector<f64> {
        let structures = self.structures(theta);
        DVector::from_iterator(
            self.points.len(),
            self.points
                .iter()
                .zip(self.sqrt_weights.iter())
                .map(|(p, w)| w * (p.semivariance - Self::model_at(&structures, p))),
        )
    }

    /// Weighted derivatives of the model with respect to every parameter.
    fn jacobian(&self, theta: &[f64]) -> DMatrix<f64> {
        let structures = self.structures(theta);
        let mut jacobian = DMatrix::zeros(self.points.len(), self.parameters.len());

        for (k, (point, w)) in self.points.iter().zip(self.sqrt_weights.iter()).enumerate() {
            let effective = structures
                .iter()
                .map(|s| match point.bin.direction {
                    Some(direction) => s.effective_distance(&lag_vector(point.mean_distance, direction)),
                    None => point.mean_distance,
                })
                .collect::<Vec<_>>();

            for (p, parameter) in self.parameters.iter().enumerate() {
                let derivative = match *parameter {
                    Parameter::Nugget(i) => structures[i].gradient(effective[i])[0],
                    Parameter::PartialSill(i) => structures[i].gradient(effective[i])[1],
                    Parameter::Range(i) => structures[i].gradient(effective[i])[2],
                    Parameter::Direction | Parameter::Ratio => {
                        let step = if *parameter == Parameter::Direction {
                            DIRECTION_STEP
                        } else {
                            RATIO_STEP
                        };
                        let mut hi = theta.to_vec();
                        let mut lo = theta.to_vec();
                        hi[p] += step;
                        lo[p] -= step;
                        (Self::model_at(&self.structures(&hi), point)
                            - Self::model_at(&self.structures(&lo), point))
                            / (2.0 * step)
                    }
                };
                jacobian[(k, p)] = w * derivative;
            }
        }
        jacobian
    }

    /// Parameters sitting on a bound that the descent direction pushes past.
    fn pinned(&self, theta: &[f64], gradient: &DVector<f64>) -> Vec<bool> {
        self.parameters
            .iter()
            .enumerate()
            .map(|(p, parameter)| {
                let (lo, hi) = self.bounds(*parameter);
                (theta[p] <= lo && gradient[p] < 0.0) || (theta[p] >= hi && gradient[p] > 0.0)
            })
            .collect()
    }
}

//levenberg-marquardt with every trial point projected onto the admissible box
fn fit_structures(
    points: &[EmpiricalVariogramPoint],
    template: Vec<VariogramStructure>,
    config: &FitConfig,
) -> Result<FitOutcome<Vec<VariogramStructure>>> {
    config.validate()?;
    for structure in template.iter() {
        structure.validate()?;
    }

    let problem = Problem::new(points, template, config)?;
    let n_params = problem.parameters.len();

    let mut theta = problem.initial();
    let mut residuals = problem.residuals(&theta);
    let mut sse = residuals.norm_squared();
    let scale = problem
        .points
        .iter()
        .zip(problem.sqrt_weights.iter())
        .map(|(p, w)| (w * p.semivariance).powi(2))
        .sum::<f64>();

    let mut damping = INITIAL_DAMPING;
    let mut iterations = 0;
    let mut relative_decrease = f64::INFINITY;
    let mut converged = n_params == 0 || sse <= f64::EPSILON * scale;

    while !converged && iterations < config.max_iterations {
        iterations += 1;

        let jacobian = problem.jacobian(&theta);
        let normal = jacobian.tr_mul(&jacobian);
        let gradient = jacobian.tr_mul(&residuals);
        let pinned = problem.pinned(&theta, &gradient);

        let mut accepted = None;
        while damping <= MAX_DAMPING {
            let mut system = normal.clone();
            let mut rhs = gradient.clone();
            for p in 0..n_params {
                if pinned[p] {
                    system.row_mut(p).fill(0.0);
                    system.column_mut(p).fill(0.0);
                    system[(p, p)] = 1.0;
                    rhs[p] = 0.0;
                } else {
                    system[(p, p)] += damping * normal[(p, p)].max(f64::EPSILON);
                }
            }

            let Some(step) = system.cholesky().map(|c| c.solve(&rhs)) else {
                damping *= 10.0;
                continue;
            };

            let mut trial = theta.iter().zip(step.iter()).map(|(t, s)| t + s).collect::<Vec<_>>();
            problem.project(&mut trial);
            let trial_residuals = problem.residuals(&trial);
            let trial_sse = trial_residuals.norm_squared();

            if trial_sse < sse {
                damping = (damping / 10.0).max(f64::EPSILON);
                accepted = Some((trial, trial_residuals, trial_sse));
                break;
            }
            damping *= 10.0;
        }

        let Some((trial, trial_residuals, trial_sse)) = accepted else {
            //no damped step decreases the objective
            tracing::trace!(iterations, sse, "stationary point");
            converged = true;
            break;
        };

        relative_decrease = (sse - trial_sse) / sse;
        tracing::trace!(iterations, sse = trial_sse, relative_decrease, damping, "fit step");
        theta = trial;
        residuals = trial_residuals;
        sse = trial_sse;

        if relative_decrease < config.tolerance || sse <= f64::EPSILON * scale {
            converged = true;
        }
    }

    let warning = if converged {
        None
    } else {
        tracing::warn!(
            iterations,
            relative_decrease,
            weighted_sse = sse,
            "variogram fit did not converge, returning best iterate"
        );
        Some(FitWarning::DidNotConverge {
            iterations,
            relative_decrease,
            weighted_sse: sse,
        })
    };

    let structures = problem.structures(&theta);
    tracing::debug!(
        iterations,
        weighted_sse = sse,
        sill = structures.iter().map(|s| s.sill()).sum::<f64>(),
        "variogram fit"
    );

    Ok(FitOutcome {
        model: structures,
        weighted_sse: sse,
        iterations,
        warning,
    })
}
