use crate::cli::Cli;
use crate::error::{CliError, Result};
use qfit::engine::config::{
    BuildConfig, BuildConfigBuilder, SelectionConfig, SelectionConfigBuilder, SolverConfig,
};
use qfit::workflows::multiconformer::MulticonformerConfig;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialBuildConfig {
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

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialSelectionConfig {
    cardinality: Option<usize>,
    threshold: Option<f64>,
    sum_to_one: Option<bool>,
    sweep_limit: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialSolverConfig {
    max_nodes: Option<usize>,
    time_limit: Option<f64>,
    max_iterations: Option<usize>,
    tolerance: Option<f64>,
}

/// Settings read from a TOML file; every key is optional.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    build: Option<PartialBuildConfig>,
    selection: Option<PartialSelectionConfig>,
    solver: Option<PartialSolverConfig>,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Resolves the final configuration: command-line flags first, then
    /// `--set` values and the file, then library defaults.
    pub fn merge_with_cli(mut self, args: &Cli) -> Result<MulticonformerConfig> {
        self.apply_set_values(&args.set_values)?;

        let build = Self::merge_build(self.build.take().unwrap_or_default(), args)?;
        let selection = Self::merge_selection(self.selection.take().unwrap_or_default(), args)?;
        let solver = Self::merge_solver(self.solver.take().unwrap_or_default())?;

        let config = MulticonformerConfig {
            build,
            selection,
            solver,
        };
        config
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;
        Ok(config)
    }

    fn merge_build(file: PartialBuildConfig, args: &Cli) -> Result<BuildConfig> {
        let mut builder = BuildConfigBuilder::new()
            .build(!args.no_build && file.build.unwrap_or(true))
            .local_search(!args.no_local && file.local_search.unwrap_or(true))
            .scale(!args.no_scale && file.scale.unwrap_or(true));

        if let Some(n) = args.build_stepsize.or(file.build_stepsize) {
            builder = builder.build_stepsize(n);
        }
        if let Some(step) = args.stepsize.or(file.stepsize) {
            builder = builder.stepsize(step);
        }
        if let Some(step) = file.local_search_step {
            builder = builder.local_search_step(step);
        }
        if let Some(passes) = file.local_search_passes {
            builder = builder.local_search_passes(passes);
        }
        if let Some(max) = file.max_candidates {
            builder = builder.max_candidates(max);
        }
        if let Some(tolerance) = file.clash_tolerance {
            builder = builder.clash_tolerance(tolerance);
        }
        if let Some(root) = file.root_atom {
            builder = builder.root_atom(root);
        }

        builder.finish().map_err(|e| CliError::Config(e.to_string()))
    }

    fn merge_selection(file: PartialSelectionConfig, args: &Cli) -> Result<SelectionConfig> {
        let mut builder = SelectionConfigBuilder::new();

        if let Some(cardinality) = args.cardinality.or(file.cardinality) {
            builder = builder.cardinality(cardinality);
        }
        // A zero threshold disables the occupancy threshold.
        if let Some(threshold) = args.threshold.or(file.threshold).filter(|&t| t != 0.0) {
            builder = builder.threshold(threshold);
        }
        if let Some(sum_to_one) = file.sum_to_one {
            builder = builder.sum_to_one(sum_to_one);
        }
        if let Some(limit) = file.sweep_limit {
            builder = builder.sweep_limit(limit);
        }

        builder.finish().map_err(|e| CliError::Config(e.to_string()))
    }

    fn merge_solver(file: PartialSolverConfig) -> Result<SolverConfig> {
        let defaults = SolverConfig::default();
        let config = SolverConfig {
            max_nodes: file.max_nodes.unwrap_or(defaults.max_nodes),
            time_limit: file.time_limit.or(defaults.time_limit),
            max_iterations: file.max_iterations.unwrap_or(defaults.max_iterations),
            tolerance: file.tolerance.unwrap_or(defaults.tolerance),
        };
        config
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;
        Ok(config)
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };
            let (key, value_str) = (key.trim(), value_str.trim());

            let known = match key.split_once('.') {
                Some(("build", field)) => self
                    .build
                    .get_or_insert_with(Default::default)
                    .set(key, field, value_str)?,
                Some(("selection", field)) => self
                    .selection
                    .get_or_insert_with(Default::default)
                    .set(key, field, value_str)?,
                Some(("solver", field)) => self
                    .solver
                    .get_or_insert_with(Default::default)
                    .set(key, field, value_str)?,
                _ => false,
            };
            if !known {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
        Ok(())
    }
}

impl PartialBuildConfig {
    /// Returns `false` for an unknown field.
    fn set(&mut self, key: &str, field: &str, value: &str) -> Result<bool> {
        match field {
            "build" => self.build = Some(parse_value(key, value)?),
            "build-stepsize" => self.build_stepsize = Some(parse_value(key, value)?),
            "stepsize" => self.stepsize = Some(parse_value(key, value)?),
            "local-search" => self.local_search = Some(parse_value(key, value)?),
            "local-search-step" => self.local_search_step = Some(parse_value(key, value)?),
            "local-search-passes" => self.local_search_passes = Some(parse_value(key, value)?),
            "scale" => self.scale = Some(parse_value(key, value)?),
            "max-candidates" => self.max_candidates = Some(parse_value(key, value)?),
            "clash-tolerance" => self.clash_tolerance = Some(parse_value(key, value)?),
            "root-atom" => self.root_atom = Some(value.to_string()),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl PartialSelectionConfig {
    fn set(&mut self, key: &str, field: &str, value: &str) -> Result<bool> {
        match field {
            "cardinality" => self.cardinality = Some(parse_value(key, value)?),
            "threshold" => self.threshold = Some(parse_value(key, value)?),
            "sum-to-one" => self.sum_to_one = Some(parse_value(key, value)?),
            "sweep-limit" => self.sweep_limit = Some(parse_value(key, value)?),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl PartialSolverConfig {
    fn set(&mut self, key: &str, field: &str, value: &str) -> Result<bool> {
        match field {
            "max-nodes" => self.max_nodes = Some(parse_value(key, value)?),
            "time-limit" => self.time_limit = Some(parse_value(key, value)?),
            "max-iterations" => self.max_iterations = Some(parse_value(key, value)?),
            "tolerance" => self.tolerance = Some(parse_value(key, value)?),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        CliError::Config(format!(
            "Invalid {} value for {}: {}",
            std::any::type_name::<T>(),
            key,
            value
        ))
    })
}
