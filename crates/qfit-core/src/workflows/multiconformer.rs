use super::build::{self, BuildInput, BuildOutput};
use super::select;
use crate::engine::config::{BuildConfig, SelectionConfig, SolverConfig};
use crate::engine::error::{EngineError, SolverError};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::selection::miqp::BranchAndBoundSolver;
use crate::engine::selection::problem::SelectionProblem;
use crate::engine::selection::{SelectionResult, max_sweep_cardinality};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Every setting of a complete run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MulticonformerConfig {
    pub build: BuildConfig,
    pub selection: SelectionConfig,
    pub solver: SolverConfig,
}

impl MulticonformerConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.build.validate()?;
        self.selection.validate()?;
        self.solver.validate()?;
        Ok(())
    }
}

/// Outcome of one exact solve of the cardinality sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepEntry {
    pub cardinality: usize,
    pub outcome: Result<SelectionResult, SolverError>,
}

#[derive(Debug, Clone)]
pub struct MulticonformerOutput {
    pub build: BuildOutput,
    pub problem: SelectionProblem,
    /// Approximate fit at the configured cardinality.
    pub initial: Result<SelectionResult, SolverError>,
    pub sweep: Vec<SweepEntry>,
}

/// Builds the conformer pool, fits it approximately at the configured
/// cardinality, then solves exactly for each cardinality of the sweep.
///
/// Every solve is restricted to the support of the continuous fit over the
/// whole pool. Solver failures of the initial fit or of a sweep step are
/// recorded and the run moves on; all other errors abort it.
#[instrument(skip_all, name = "multiconformer_workflow")]
pub fn run(
    input: &BuildInput,
    config: &MulticonformerConfig,
    reporter: &ProgressReporter,
) -> Result<MulticonformerOutput, EngineError> {
    config.validate()?;

    let build = build::run(input, &config.build, reporter)?;

    reporter.report(Progress::PhaseStart { name: "Selection" });
    let problem = SelectionProblem::from_pool(
        &build.pool,
        input.ligand,
        input.map,
        input.resolution,
        config.build.scale,
    )?;
    let solver = BranchAndBoundSolver::new(config.solver.clone());
    let solver = match solver.clone().screened(&problem, config.selection.sum_to_one) {
        Ok(screened) => screened,
        Err(e) => {
            warn!(error = %e, "Screening the pool failed; solving over every candidate.");
            solver
        }
    };

    let initial_config = config
        .selection
        .with_cardinality(config.selection.cardinality, false);
    let initial = recoverable(select::run(&problem, &initial_config, &solver))?;
    match &initial {
        Ok(result) => info!(
            conformers = result.len(),
            residual = result.residual,
            "Initial fit complete."
        ),
        Err(e) => warn!(error = %e, "Initial fit failed; continuing with the sweep."),
    }

    let nmax = max_sweep_cardinality(
        build.pool.len(),
        config.selection.threshold,
        config.selection.sweep_limit,
    );
    reporter.report(Progress::TaskStart {
        total_steps: nmax.saturating_sub(1) as u64,
    });
    let mut sweep = Vec::new();
    for cardinality in 1..nmax {
        let exact_config = config.selection.with_cardinality(cardinality, true);
        let outcome = recoverable(select::run(&problem, &exact_config, &solver))?;
        if let Err(e) = &outcome {
            warn!(cardinality, error = %e, "Exact selection failed; continuing the sweep.");
        }
        sweep.push(SweepEntry {
            cardinality,
            outcome,
        });
        reporter.report(Progress::TaskIncrement);
    }
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    Ok(MulticonformerOutput {
        build,
        problem,
        initial,
        sweep,
    })
}

/// Splits solver failures, which the run survives, from every other error.
fn recoverable(
    result: Result<SelectionResult, EngineError>,
) -> Result<Result<SelectionResult, SolverError>, EngineError> {
    match result {
        Ok(selection) => Ok(Ok(selection)),
        Err(EngineError::Solver { source }) => Ok(Err(source)),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::density::map::DensityMap;
    use crate::core::models::ligand::Ligand;
    use crate::core::topology::build_tree;
    use crate::engine::config::{BuildConfigBuilder, SelectionConfigBuilder};
    use crate::engine::fixtures::{alkane, blob_map, rotated};
    use nalgebra::Point3;

    fn config(selection: SelectionConfig) -> MulticonformerConfig {
        MulticonformerConfig {
            build: BuildConfigBuilder::new()
                .stepsize(30.0)
                .local_search(false)
                .max_candidates(40)
                .finish()
                .unwrap(),
            selection,
            solver: SolverConfig::default(),
        }
    }

    /// Butane density with its last carbon split over two positions.
    fn two_state_map() -> (Ligand, DensityMap) {
        let ligand = alkane(4);
        let topology = build_tree(&ligand, None).unwrap();
        let mut centres: Vec<Point3<f64>> = ligand.positions().to_vec();
        centres.push(rotated(&ligand, &topology, &[120.0])[3]);
        let map = blob_map(&centres);
        (ligand, map)
    }

    #[test]
    fn full_run_produces_an_initial_fit_and_a_sweep() {
        let (ligand, map) = two_state_map();
        let input = BuildInput {
            ligand: &ligand,
            map: &map,
            resolution: 1.5,
            receptor: None,
        };
        let output = run(&input, &config(SelectionConfig::default()), &ProgressReporter::new()).unwrap();

        assert_eq!(output.build.pool.len(), 12);
        let initial = output.initial.as_ref().unwrap();
        assert!(!initial.is_empty());
        assert!(initial.len() <= 5);
        assert!((initial.total_weight() - 1.0).abs() < 1e-9);

        let cardinalities: Vec<_> = output.sweep.iter().map(|e| e.cardinality).collect();
        assert_eq!(cardinalities, vec![1, 2, 3, 4, 5]);
        for entry in &output.sweep {
            let result = entry.outcome.as_ref().unwrap();
            assert!(result.len() <= entry.cardinality);
            assert!((result.total_weight() - 1.0).abs() < 1e-9);
        }
        let single = output.sweep[0].outcome.as_ref().unwrap();
        assert_eq!(single.conformers[0].weight, 1.0);
    }

    #[test]
    fn threshold_limits_the_sweep_and_the_selection() {
        let (ligand, map) = two_state_map();
        let input = BuildInput {
            ligand: &ligand,
            map: &map,
            resolution: 1.5,
            receptor: None,
        };
        let selection = SelectionConfigBuilder::new().threshold(0.3).finish().unwrap();
        let output = run(&input, &config(selection), &ProgressReporter::new()).unwrap();

        assert!(output.initial.as_ref().unwrap().len() <= 3);
        assert_eq!(output.sweep.len(), 2);
        for entry in &output.sweep {
            let result = entry.outcome.as_ref().unwrap();
            assert!(result.len() <= 3);
            assert!(result.conformers.iter().all(|c| c.weight >= 0.3 - 1e-6));
        }
    }

    #[test]
    fn invalid_selection_fails_before_building() {
        let (ligand, map) = two_state_map();
        let input = BuildInput {
            ligand: &ligand,
            map: &map,
            resolution: 1.5,
            receptor: None,
        };
        let selection = SelectionConfig {
            threshold: Some(2.0),
            ..SelectionConfig::default()
        };
        let result = run(&input, &config(selection), &ProgressReporter::new());
        assert!(matches!(result, Err(EngineError::Configuration { .. })));
    }

    #[test]
    fn runs_are_reproducible() {
        let (ligand, map) = two_state_map();
        let input = BuildInput {
            ligand: &ligand,
            map: &map,
            resolution: 1.5,
            receptor: None,
        };
        let settings = config(SelectionConfig::default());
        let first = run(&input, &settings, &ProgressReporter::new()).unwrap();
        let second = run(&input, &settings, &ProgressReporter::new()).unwrap();
        assert_eq!(first.build.pool, second.build.pool);
        assert_eq!(first.initial, second.initial);
        assert_eq!(first.sweep, second.sweep);
    }

    #[test]
    fn solver_timeouts_do_not_abort_the_run() {
        let (ligand, map) = two_state_map();
        let input = BuildInput {
            ligand: &ligand,
            map: &map,
            resolution: 1.5,
            receptor: None,
        };
        let mut settings = config(SelectionConfig::default());
        settings.solver.time_limit = Some(1e-12);
        let output = run(&input, &settings, &ProgressReporter::new()).unwrap();

        assert!(matches!(output.initial, Err(SolverError::Timeout { .. })));
        assert_eq!(output.sweep.len(), 5);
        assert!(
            output.sweep[1..]
                .iter()
                .all(|e| matches!(e.outcome, Err(SolverError::Timeout { .. })))
        );
    }

    #[test]
    fn larger_ligands_at_low_resolution_complete() {
        let ligand = alkane(8);
        let map = blob_map(ligand.positions());
        let input = BuildInput {
            ligand: &ligand,
            map: &map,
            resolution: 2.8,
            receptor: None,
        };
        let settings = MulticonformerConfig {
            build: BuildConfigBuilder::new()
                .stepsize(60.0)
                .local_search(false)
                .max_candidates(24)
                .finish()
                .unwrap(),
            selection: SelectionConfig::default(),
            solver: SolverConfig::default(),
        };
        let output = run(&input, &settings, &ProgressReporter::new()).unwrap();
        assert!(output.problem.mask_len() > 300);
        assert!(output.initial.is_ok());
        assert!(output.sweep[0].outcome.is_ok());
    }
}
