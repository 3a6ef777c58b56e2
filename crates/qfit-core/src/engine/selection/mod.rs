//! # Selection Module
//!
//! Chooses a sparse, weighted subset of the conformer pool whose summed model
//! density best explains the observed map.
//!
//! The problem is a least-squares fit with non-negative occupancies summing to
//! one (or at most one), at most `cardinality` non-zero occupancies, and an
//! optional minimum occupancy. [`problem::SelectionProblem`] assembles the
//! design matrix; solvers implement [`QuadraticSolver`], with
//! [`miqp::BranchAndBoundSolver`] as the default.

pub mod miqp;
pub mod problem;
pub mod qp;

use crate::engine::config::SelectionConfig;
use crate::engine::error::SolverError;
use problem::SelectionProblem;
use serde::Serialize;

/// Constraints of one solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionConstraints {
    pub cardinality: usize,
    pub threshold: Option<f64>,
    pub exact: bool,
    pub sum_to_one: bool,
}

impl From<&SelectionConfig> for SelectionConstraints {
    fn from(config: &SelectionConfig) -> Self {
        Self {
            cardinality: config.cardinality,
            threshold: config.threshold,
            exact: config.exact,
            sum_to_one: config.sum_to_one,
        }
    }
}

/// Raw solver output: one weight per candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub weights: Vec<f64>,
    pub objective: f64,
    /// Branch-and-bound nodes, or rounding iterations.
    pub nodes: usize,
}

pub trait QuadraticSolver: Send + Sync {
    fn solve(
        &self,
        problem: &SelectionProblem,
        constraints: &SelectionConstraints,
    ) -> Result<Solution, SolverError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedConformer {
    /// Index into the candidate pool.
    pub candidate: usize,
    pub weight: f64,
}

/// Selected conformers with non-zero occupancy, heaviest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionResult {
    pub conformers: Vec<SelectedConformer>,
    pub cardinality: usize,
    pub threshold: Option<f64>,
    pub exact: bool,
    /// Squared residual between the weighted model and the target density.
    pub residual: f64,
    pub nodes: usize,
}

impl SelectionResult {
    pub fn from_solution(solution: &Solution, constraints: &SelectionConstraints) -> Self {
        let mut conformers: Vec<SelectedConformer> = solution
            .weights
            .iter()
            .enumerate()
            .filter(|&(_, &w)| w > 0.0)
            .map(|(candidate, &weight)| SelectedConformer { candidate, weight })
            .collect();
        conformers.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then(a.candidate.cmp(&b.candidate))
        });
        Self {
            conformers,
            cardinality: constraints.cardinality,
            threshold: constraints.threshold,
            exact: constraints.exact,
            residual: solution.objective,
            nodes: solution.nodes,
        }
    }

    pub fn len(&self) -> usize {
        self.conformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conformers.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.conformers.iter().map(|c| c.weight).sum()
    }

    /// Full weight vector over a pool of `pool_len` candidates.
    pub fn weights(&self, pool_len: usize) -> Vec<f64> {
        let mut weights = vec![0.0; pool_len];
        for conformer in &self.conformers {
            weights[conformer.candidate] = conformer.weight;
        }
        weights
    }
}

/// Exclusive upper bound of the cardinality sweep.
///
/// Bounded by the pool size plus one, the sweep limit, and `⌊1/threshold⌋`
/// when a threshold is set.
pub fn max_sweep_cardinality(pool_len: usize, threshold: Option<f64>, sweep_limit: usize) -> usize {
    let mut nmax = (pool_len + 1).min(sweep_limit);
    if let Some(t) = threshold {
        nmax = nmax.min((1.0 / t + 1e-9).floor() as usize);
    }
    nmax
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_bound_follows_pool_size_limit_and_threshold() {
        assert_eq!(max_sweep_cardinality(2, None, 6), 3);
        assert_eq!(max_sweep_cardinality(100, None, 6), 6);
        assert_eq!(max_sweep_cardinality(100, Some(0.3), 6), 3);
        assert_eq!(max_sweep_cardinality(100, Some(1.0 / 3.0), 6), 3);
        assert_eq!(max_sweep_cardinality(100, Some(1.0), 6), 1);
    }

    #[test]
    fn result_lists_heaviest_conformers_first() {
        let solution = Solution {
            weights: vec![0.0, 0.25, 0.5, 0.25],
            objective: 1.5,
            nodes: 3,
        };
        let constraints = SelectionConstraints {
            cardinality: 3,
            threshold: None,
            exact: true,
            sum_to_one: true,
        };
        let result = SelectionResult::from_solution(&solution, &constraints);
        let order: Vec<_> = result.conformers.iter().map(|c| c.candidate).collect();
        assert_eq!(order, vec![2, 1, 3]);
        assert_eq!(result.total_weight(), 1.0);
        assert_eq!(result.weights(4), solution.weights);
    }
}
