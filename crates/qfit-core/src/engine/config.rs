use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

fn invalid(parameter: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        parameter,
        reason: reason.into(),
    }
}

/// Settings of the hierarchical conformer builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildConfig {
    /// Sample rotatable bonds; when off the pool is the input conformer only.
    pub build: bool,
    /// Rotatable bonds sampled together per level.
    pub build_stepsize: usize,
    /// Dihedral sampling step in degrees.
    pub stepsize: f64,
    pub local_search: bool,
    /// Dihedral perturbation used by local search, in degrees.
    pub local_search_step: f64,
    pub local_search_passes: usize,
    /// Score conformers by the weighted mean instead of the weighted sum of density.
    pub scale: bool,
    /// Candidates kept after each level.
    pub max_candidates: usize,
    /// Fraction of the summed van der Waals radii below which two atoms clash.
    pub clash_tolerance: f64,
    /// Name of the atom anchoring the root fragment; the graph centre when unset.
    pub root_atom: Option<String>,
}

pub const DEFAULT_STEPSIZE: f64 = 1.0;
pub const DEFAULT_MAX_CANDIDATES: usize = 256;
pub const DEFAULT_CLASH_TOLERANCE: f64 = 0.75;
pub const DEFAULT_LOCAL_SEARCH_PASSES: usize = 2;
const MIN_LOCAL_SEARCH_STEP: f64 = 0.5;

fn default_local_search_step(stepsize: f64) -> f64 {
    (stepsize / 2.0).max(MIN_LOCAL_SEARCH_STEP)
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build: true,
            build_stepsize: 1,
            stepsize: DEFAULT_STEPSIZE,
            local_search: true,
            local_search_step: default_local_search_step(DEFAULT_STEPSIZE),
            local_search_passes: DEFAULT_LOCAL_SEARCH_PASSES,
            scale: true,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            clash_tolerance: DEFAULT_CLASH_TOLERANCE,
            root_atom: None,
        }
    }
}

impl BuildConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build_stepsize == 0 {
            return Err(invalid("build_stepsize", "must be at least 1"));
        }
        if !(self.stepsize.is_finite() && self.stepsize > 0.0 && self.stepsize <= 360.0) {
            return Err(invalid(
                "stepsize",
                format!("{} is not in (0, 360] degrees", self.stepsize),
            ));
        }
        if !(self.local_search_step.is_finite() && self.local_search_step > 0.0) {
            return Err(invalid(
                "local_search_step",
                format!("{} is not a positive angle", self.local_search_step),
            ));
        }
        if self.max_candidates == 0 {
            return Err(invalid("max_candidates", "must be at least 1"));
        }
        if !(self.clash_tolerance.is_finite() && self.clash_tolerance > 0.0) {
            return Err(invalid(
                "clash_tolerance",
                format!("{} is not a positive factor", self.clash_tolerance),
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct BuildConfigBuilder {
    build: Option<bool>,
    build_stepsize: Option<usize>,
    stepsize: Option<f64>,
    local_search: Option<bool>,
    local_search_step: Option<f64>,
    local_search_passes: Option<usize>,
    scale: Option<bool>,
    max_candidates: Option<usize>,
    clash_tolerance: Option<f64>,
    root_atom: Option<String>,
}

impl BuildConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(mut self, enabled: bool) -> Self {
        self.build = Some(enabled);
        self
    }
    pub fn build_stepsize(mut self, bonds_per_level: usize) -> Self {
        self.build_stepsize = Some(bonds_per_level);
        self
    }
    pub fn stepsize(mut self, degrees: f64) -> Self {
        self.stepsize = Some(degrees);
        self
    }
    pub fn local_search(mut self, enabled: bool) -> Self {
        self.local_search = Some(enabled);
        self
    }
    pub fn local_search_step(mut self, degrees: f64) -> Self {
        self.local_search_step = Some(degrees);
        self
    }
    pub fn local_search_passes(mut self, passes: usize) -> Self {
        self.local_search_passes = Some(passes);
        self
    }
    pub fn scale(mut self, enabled: bool) -> Self {
        self.scale = Some(enabled);
        self
    }
    pub fn max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = Some(max);
        self
    }
    pub fn clash_tolerance(mut self, tolerance: f64) -> Self {
        self.clash_tolerance = Some(tolerance);
        self
    }
    pub fn root_atom(mut self, name: impl Into<String>) -> Self {
        self.root_atom = Some(name.into());
        self
    }

    /// Fills unset values with defaults and validates the result.
    ///
    /// The local search step defaults to half the sampling step (at least 0.5°).
    pub fn finish(self) -> Result<BuildConfig, ConfigError> {
        let defaults = BuildConfig::default();
        let stepsize = self.stepsize.unwrap_or(defaults.stepsize);
        let config = BuildConfig {
            build: self.build.unwrap_or(defaults.build),
            build_stepsize: self.build_stepsize.unwrap_or(defaults.build_stepsize),
            stepsize,
            local_search: self.local_search.unwrap_or(defaults.local_search),
            local_search_step: self
                .local_search_step
                .unwrap_or_else(|| default_local_search_step(stepsize)),
            local_search_passes: self
                .local_search_passes
                .unwrap_or(defaults.local_search_passes),
            scale: self.scale.unwrap_or(defaults.scale),
            max_candidates: self.max_candidates.unwrap_or(defaults.max_candidates),
            clash_tolerance: self.clash_tolerance.unwrap_or(defaults.clash_tolerance),
            root_atom: self.root_atom,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Settings of a sparse selection solve and of the cardinality sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SelectionConfig {
    /// Maximum number of conformers with non-zero occupancy.
    pub cardinality: usize,
    /// Minimum occupancy of a selected conformer.
    pub threshold: Option<f64>,
    /// Solve the binary formulation exactly instead of relax-and-round.
    pub exact: bool,
    /// Occupancies sum to exactly one (otherwise at most one).
    pub sum_to_one: bool,
    /// Upper bound of the exact cardinality sweep (exclusive).
    pub sweep_limit: usize,
}

pub const DEFAULT_CARDINALITY: usize = 5;
pub const DEFAULT_SWEEP_LIMIT: usize = 6;

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            cardinality: DEFAULT_CARDINALITY,
            threshold: None,
            exact: false,
            sum_to_one: true,
            sweep_limit: DEFAULT_SWEEP_LIMIT,
        }
    }
}

impl SelectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cardinality == 0 {
            return Err(invalid("cardinality", "must be at least 1"));
        }
        if let Some(threshold) = self.threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(invalid(
                    "threshold",
                    format!("{} is not in (0, 1]", threshold),
                ));
            }
        }
        if self.sweep_limit < 2 {
            return Err(invalid("sweep_limit", "must be at least 2"));
        }
        Ok(())
    }

    /// Same settings with a different cardinality and solve mode.
    pub fn with_cardinality(&self, cardinality: usize, exact: bool) -> Self {
        Self {
            cardinality,
            exact,
            ..self.clone()
        }
    }
}

#[derive(Default)]
pub struct SelectionConfigBuilder {
    cardinality: Option<usize>,
    threshold: Option<f64>,
    exact: Option<bool>,
    sum_to_one: Option<bool>,
    sweep_limit: Option<usize>,
}

impl SelectionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cardinality(mut self, cardinality: usize) -> Self {
        self.cardinality = Some(cardinality);
        self
    }
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
    pub fn exact(mut self, exact: bool) -> Self {
        self.exact = Some(exact);
        self
    }
    pub fn sum_to_one(mut self, sum_to_one: bool) -> Self {
        self.sum_to_one = Some(sum_to_one);
        self
    }
    pub fn sweep_limit(mut self, limit: usize) -> Self {
        self.sweep_limit = Some(limit);
        self
    }

    pub fn finish(self) -> Result<SelectionConfig, ConfigError> {
        let defaults = SelectionConfig::default();
        let config = SelectionConfig {
            cardinality: self.cardinality.unwrap_or(defaults.cardinality),
            threshold: self.threshold,
            exact: self.exact.unwrap_or(defaults.exact),
            sum_to_one: self.sum_to_one.unwrap_or(defaults.sum_to_one),
            sweep_limit: self.sweep_limit.unwrap_or(defaults.sweep_limit),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Seconds allowed for one solve.
pub const DEFAULT_TIME_LIMIT: f64 = 60.0;

/// Limits and tolerances of the quadratic solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SolverConfig {
    /// Branch-and-bound nodes explored before giving up.
    pub max_nodes: usize,
    /// Wall-clock limit of one solve, in seconds.
    pub time_limit: Option<f64>,
    /// Iterations of the continuous relaxation.
    pub max_iterations: usize,
    /// Convergence tolerance of the continuous relaxation.
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_nodes: 20_000,
            time_limit: Some(DEFAULT_TIME_LIMIT),
            max_iterations: 5_000,
            tolerance: 1e-10,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_nodes == 0 {
            return Err(invalid("max_nodes", "must be at least 1"));
        }
        if let Some(limit) = self.time_limit {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(invalid("time_limit", format!("{} is not a positive duration", limit)));
            }
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be at least 1"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(invalid("tolerance", format!("{} is not positive", self.tolerance)));
        }
        Ok(())
    }
}
