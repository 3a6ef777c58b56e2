use crate::engine::config::SelectionConfig;
use crate::engine::error::EngineError;
use crate::engine::selection::problem::SelectionProblem;
use crate::engine::selection::{QuadraticSolver, SelectionConstraints, SelectionResult};
use tracing::{info, instrument};

/// Solves one sparse selection over the pool behind `problem`.
#[instrument(skip_all, name = "select_workflow", fields(cardinality = config.cardinality, exact = config.exact))]
pub fn run(
    problem: &SelectionProblem,
    config: &SelectionConfig,
    solver: &dyn QuadraticSolver,
) -> Result<SelectionResult, EngineError> {
    config.validate()?;
    let constraints = SelectionConstraints::from(config);
    let solution = solver.solve(problem, &constraints)?;
    let result = SelectionResult::from_solution(&solution, &constraints);
    info!(
        selected = result.len(),
        residual = result.residual,
        nodes = result.nodes,
        "Selection solved."
    );
    Ok(result)
}
