use super::problem::SelectionProblem;
use super::qp::{Relaxation, RelaxationSettings, ZERO_WEIGHT, solve_relaxation};
use super::{QuadraticSolver, SelectionConstraints, Solution};
use crate::engine::config::SolverConfig;
use crate::engine::error::SolverError;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, trace};

/// Allowed shortfall below the threshold before a weight counts as violating it.
const THRESHOLD_SLACK: f64 = 1e-6;
/// Nodes whose bound is within this margin of the incumbent are pruned.
const BOUND_MARGIN: f64 = 1e-12;
/// Relaxation tolerance inside the search tree. The final incumbent is
/// re-solved at the configured tolerance.
const NODE_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Free,
    Excluded,
    Included,
}

/// Sparse occupancy solver: relax-and-round, or exact branch-and-bound.
///
/// Every node solves the continuous relaxation over its non-excluded
/// candidates. Included candidates carry the threshold as lower bound and count
/// towards the cardinality. A relaxed solution that already satisfies the
/// cardinality and threshold is optimal for its subtree.
///
/// A screened solver only considers the candidates that carry weight in the
/// unconstrained relaxation over the whole pool.
#[derive(Debug, Clone, Default)]
pub struct BranchAndBoundSolver {
    config: SolverConfig,
    candidates: Option<Vec<usize>>,
}

impl BranchAndBoundSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            candidates: None,
        }
    }

    /// Restricts later solves to the support of the continuous relaxation
    /// over every candidate of `problem`.
    #[instrument(skip_all, name = "miqp_screen", fields(candidates = problem.candidate_count()))]
    pub fn screened(mut self, problem: &SelectionProblem, sum_to_one: bool) -> Result<Self, SolverError> {
        let all: Vec<usize> = (0..problem.candidate_count()).collect();
        let lower = vec![0.0; all.len()];
        let relaxation = solve_relaxation(problem, &all, &lower, sum_to_one, None, &self.settings())?;
        let support = positive_entries(&relaxation.weights);
        debug!(support = support.len(), "Screened the candidate pool.");
        self.candidates = (!support.is_empty()).then_some(support);
        Ok(self)
    }

    /// Candidates a solve may select from.
    pub fn candidates(&self, pool_len: usize) -> Vec<usize> {
        let screened: Vec<usize> = self
            .candidates
            .iter()
            .flatten()
            .copied()
            .filter(|&i| i < pool_len)
            .collect();
        if screened.is_empty() {
            (0..pool_len).collect()
        } else {
            screened
        }
    }

    fn settings(&self) -> RelaxationSettings {
        RelaxationSettings {
            max_iterations: self.config.max_iterations,
            tolerance: self.config.tolerance,
        }
    }

    fn node_settings(&self) -> RelaxationSettings {
        RelaxationSettings {
            tolerance: self.config.tolerance.max(NODE_TOLERANCE),
            ..self.settings()
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.config
            .time_limit
            .map(|seconds| Instant::now() + Duration::from_secs_f64(seconds))
    }

    fn expired(deadline: Option<Instant>) -> bool {
        deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Relaxes, then repeatedly drops the smallest positive weight until the
    /// constraints hold.
    fn round(
        &self,
        problem: &SelectionProblem,
        constraints: &SelectionConstraints,
    ) -> Result<Solution, SolverError> {
        let settings = self.settings();
        let deadline = self.deadline();
        let mut support = self.candidates(problem.candidate_count());
        let mut start: Option<Vec<f64>> = None;
        let mut rounds = 0;
        loop {
            rounds += 1;
            if Self::expired(deadline) {
                return Err(SolverError::Timeout { nodes: rounds });
            }
            let lower = vec![0.0; support.len()];
            let relaxation = solve_relaxation(
                problem,
                &support,
                &lower,
                constraints.sum_to_one,
                start.as_deref(),
                &settings,
            )?;
            let positive = positive_entries(&relaxation.weights);
            if satisfies(&relaxation.weights, &positive, constraints) {
                return Ok(finish(problem, relaxation.weights, constraints, rounds));
            }
            let Some(&smallest) = positive
                .iter()
                .min_by(|&&a, &&b| relaxation.weights[a].total_cmp(&relaxation.weights[b]))
            else {
                return Err(SolverError::Infeasible);
            };
            support = positive.into_iter().filter(|&i| i != smallest).collect();
            if support.is_empty() && constraints.sum_to_one {
                return Err(SolverError::Infeasible);
            }
            start = Some(relaxation.weights);
        }
    }

    /// Exact cardinality-one solve: every candidate at its best occupancy.
    fn best_single(
        &self,
        problem: &SelectionProblem,
        constraints: &SelectionConstraints,
    ) -> Result<Solution, SolverError> {
        let gram = problem.gram();
        let linear = problem.linear();
        let threshold = constraints.threshold.unwrap_or(0.0);
        let candidates = self.candidates(problem.candidate_count());

        let mut best: Option<(usize, f64, f64)> = None;
        for &i in &candidates {
            let curvature = gram[(i, i)];
            let weight = if constraints.sum_to_one {
                1.0
            } else if curvature > 0.0 {
                (linear[i] / curvature).clamp(threshold, 1.0)
            } else {
                1.0
            };
            let objective = problem.constant() - 2.0 * weight * linear[i] + weight * weight * curvature;
            if best.is_none_or(|(_, _, b)| objective < b) {
                best = Some((i, weight, objective));
            }
        }

        let Some((pick, weight, objective)) = best else {
            return Err(SolverError::Infeasible);
        };
        let mut weights = vec![0.0; problem.candidate_count()];
        if constraints.sum_to_one || objective < problem.constant() {
            weights[pick] = weight;
        }
        Ok(finish(problem, weights, constraints, candidates.len()))
    }

    fn branch_and_bound(
        &self,
        problem: &SelectionProblem,
        constraints: &SelectionConstraints,
    ) -> Result<Solution, SolverError> {
        let n = problem.candidate_count();
        let settings = self.node_settings();
        let deadline = self.deadline();
        let threshold = constraints.threshold.unwrap_or(0.0);

        let mut incumbent: Option<(Vec<f64>, f64)> = self
            .round(problem, constraints)
            .ok()
            .map(|s| (s.weights, s.objective));

        let mut root = vec![Decision::Excluded; n];
        for i in self.candidates(n) {
            root[i] = Decision::Free;
        }
        let root_start = incumbent.as_ref().map(|(weights, _)| weights.clone());
        let mut stack: Vec<(Vec<Decision>, Option<Vec<f64>>)> = vec![(root, root_start)];
        let mut nodes = 0;

        while let Some((decisions, start)) = stack.pop() {
            nodes += 1;
            if nodes > self.config.max_nodes || Self::expired(deadline) {
                return Err(SolverError::Timeout { nodes });
            }
            let included = decisions.iter().filter(|&&d| d == Decision::Included).count();
            let support: Vec<usize> = (0..n)
                .filter(|&i| match decisions[i] {
                    Decision::Included => true,
                    Decision::Free => included < constraints.cardinality,
                    Decision::Excluded => false,
                })
                .collect();
            let lower: Vec<f64> = support
                .iter()
                .map(|&i| if decisions[i] == Decision::Included { threshold } else { 0.0 })
                .collect();

            let relaxation: Relaxation = match solve_relaxation(
                problem,
                &support,
                &lower,
                constraints.sum_to_one,
                start.as_deref(),
                &settings,
            ) {
                Ok(r) => r,
                Err(SolverError::Infeasible) => continue,
                Err(e) => return Err(e),
            };
            if let Some((_, best)) = &incumbent {
                if relaxation.objective >= *best - BOUND_MARGIN {
                    continue;
                }
            }

            let positive = positive_entries(&relaxation.weights);
            if satisfies(&relaxation.weights, &positive, constraints) {
                trace!(nodes, objective = relaxation.objective, "New incumbent.");
                incumbent = Some((relaxation.weights, relaxation.objective));
                continue;
            }

            // Branch on a free weight: the smallest one below the threshold if
            // any, otherwise the smallest positive one.
            let free_positive = positive.iter().copied().filter(|&i| decisions[i] == Decision::Free);
            let below: Vec<usize> = free_positive
                .clone()
                .filter(|&i| relaxation.weights[i] < threshold - THRESHOLD_SLACK)
                .collect();
            let pool: Vec<usize> = if below.is_empty() { free_positive.collect() } else { below };
            let Some(&branch) = pool
                .iter()
                .min_by(|&&a, &&b| relaxation.weights[a].total_cmp(&relaxation.weights[b]))
            else {
                continue;
            };

            let mut include = decisions.clone();
            include[branch] = Decision::Included;
            let mut exclude = decisions;
            exclude[branch] = Decision::Excluded;
            // Depth-first with the exclusion explored first.
            stack.push((include, Some(relaxation.weights.clone())));
            stack.push((exclude, Some(relaxation.weights)));
        }

        debug!(nodes, "Branch-and-bound finished.");
        match incumbent {
            Some((weights, _)) => {
                let weights = self.polish(problem, weights, constraints);
                Ok(finish(problem, weights, constraints, nodes))
            }
            None => Err(SolverError::Infeasible),
        }
    }

    /// Re-solves the incumbent's support at full precision, keeping every
    /// selected weight at or above the threshold.
    fn polish(
        &self,
        problem: &SelectionProblem,
        weights: Vec<f64>,
        constraints: &SelectionConstraints,
    ) -> Vec<f64> {
        let support = positive_entries(&weights);
        let lower = vec![constraints.threshold.unwrap_or(0.0); support.len()];
        match solve_relaxation(
            problem,
            &support,
            &lower,
            constraints.sum_to_one,
            Some(&weights),
            &self.settings(),
        ) {
            Ok(polished) if polished.objective <= problem.objective(&weights) => polished.weights,
            _ => weights,
        }
    }
}

impl QuadraticSolver for BranchAndBoundSolver {
    #[instrument(skip_all, name = "miqp_solve", fields(cardinality = constraints.cardinality, exact = constraints.exact))]
    fn solve(
        &self,
        problem: &SelectionProblem,
        constraints: &SelectionConstraints,
    ) -> Result<Solution, SolverError> {
        if problem.candidate_count() == 0 {
            return Err(SolverError::Infeasible);
        }
        if constraints.exact && constraints.cardinality == 1 {
            self.best_single(problem, constraints)
        } else if constraints.exact {
            self.branch_and_bound(problem, constraints)
        } else {
            self.round(problem, constraints)
        }
    }
}

fn positive_entries(weights: &[f64]) -> Vec<usize> {
    (0..weights.len()).filter(|&i| weights[i] > ZERO_WEIGHT).collect()
}

fn satisfies(weights: &[f64], positive: &[usize], constraints: &SelectionConstraints) -> bool {
    if positive.len() > constraints.cardinality {
        return false;
    }
    match constraints.threshold {
        Some(t) => positive.iter().all(|&i| weights[i] >= t - THRESHOLD_SLACK),
        None => true,
    }
}

/// Zeroes negligible weights, restores the sum and evaluates the residual.
fn finish(
    problem: &SelectionProblem,
    mut weights: Vec<f64>,
    constraints: &SelectionConstraints,
    nodes: usize,
) -> Solution {
    for w in weights.iter_mut() {
        if *w <= ZERO_WEIGHT {
            *w = 0.0;
        }
    }
    let total: f64 = weights.iter().sum();
    if total > 0.0 && (constraints.sum_to_one || total > 1.0) {
        for w in weights.iter_mut() {
            *w /= total;
        }
    }
    let objective = problem.objective(&weights);
    Solution {
        weights,
        objective,
        nodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, DVector};

    /// Columns are unit spikes plus a broad column; the target mixes spikes.
    fn mixture_problem(mix: &[(usize, f64)], columns: usize) -> SelectionProblem {
        let rows = columns + 2;
        let design = DMatrix::from_fn(rows, columns, |r, c| {
            let spike = if r == c { 1.0 } else { 0.0 };
            spike + 0.1 * ((r + 2 * c) % 3) as f64
        });
        let mut weights = vec![0.0; columns];
        for &(i, w) in mix {
            weights[i] = w;
        }
        let target = &design * DVector::from_vec(weights);
        SelectionProblem::from_parts(Default::default(), design, target)
    }

    fn constraints(cardinality: usize, threshold: Option<f64>, exact: bool) -> SelectionConstraints {
        SelectionConstraints {
            cardinality,
            threshold,
            exact,
            sum_to_one: true,
        }
    }

    #[test]
    fn exact_solver_recovers_a_sparse_mixture() {
        let problem = mixture_problem(&[(1, 0.6), (4, 0.4)], 6);
        let solution = BranchAndBoundSolver::default()
            .solve(&problem, &constraints(2, None, true))
            .unwrap();
        assert!((solution.weights[1] - 0.6).abs() < 1e-4);
        assert!((solution.weights[4] - 0.4).abs() < 1e-4);
        assert!(solution.objective < 1e-6);
    }

    #[test]
    fn single_conformer_gets_all_the_weight() {
        let problem = mixture_problem(&[(2, 0.7), (3, 0.3)], 5);
        for exact in [true, false] {
            let solution = BranchAndBoundSolver::default()
                .solve(&problem, &constraints(1, None, exact))
                .unwrap();
            let nonzero: Vec<_> = solution.weights.iter().filter(|&&w| w > 0.0).collect();
            assert_eq!(nonzero, vec![&1.0]);
            assert_eq!(solution.weights[2], 1.0);
        }
    }

    #[test]
    fn exact_single_pick_minimises_the_residual() {
        let problem = mixture_problem(&[(0, 0.5), (3, 0.5)], 4);
        let solution = BranchAndBoundSolver::default()
            .solve(&problem, &constraints(1, None, true))
            .unwrap();
        let best_single = (0..4)
            .map(|i| {
                let mut w = vec![0.0; 4];
                w[i] = 1.0;
                problem.objective(&w)
            })
            .fold(f64::INFINITY, f64::min);
        assert!((solution.objective - best_single).abs() < 1e-9);
    }

    #[test]
    fn threshold_bounds_every_selected_weight() {
        let problem = mixture_problem(&[(0, 0.5), (1, 0.3), (2, 0.15), (3, 0.05)], 6);
        for exact in [true, false] {
            let solution = BranchAndBoundSolver::default()
                .solve(&problem, &constraints(6, Some(0.3), exact))
                .unwrap();
            let selected: Vec<f64> = solution.weights.iter().copied().filter(|&w| w > 0.0).collect();
            assert!(selected.len() <= 3);
            assert!(selected.iter().all(|&w| w >= 0.3 - 1e-6), "{selected:?}");
            assert!((selected.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn exact_is_never_worse_than_rounding() {
        let problem = mixture_problem(&[(0, 0.35), (2, 0.33), (5, 0.32)], 7);
        for k in 1..=3 {
            let approx = BranchAndBoundSolver::default()
                .solve(&problem, &constraints(k, None, false))
                .unwrap();
            let exact = BranchAndBoundSolver::default()
                .solve(&problem, &constraints(k, None, true))
                .unwrap();
            assert!(exact.objective <= approx.objective + 1e-9);
            assert!(exact.weights.iter().filter(|&&w| w > 0.0).count() <= k);
        }
    }

    #[test]
    fn node_limit_reports_a_timeout() {
        let problem = mixture_problem(&[(0, 0.25), (1, 0.25), (2, 0.25), (3, 0.25)], 8);
        let solver = BranchAndBoundSolver::new(SolverConfig {
            max_nodes: 1,
            ..SolverConfig::default()
        });
        let result = solver.solve(&problem, &constraints(2, None, true));
        assert!(matches!(result, Err(SolverError::Timeout { .. })));
    }

    #[test]
    fn empty_problem_is_infeasible() {
        let problem = SelectionProblem::from_parts(
            Default::default(),
            DMatrix::zeros(3, 0),
            DVector::zeros(3),
        );
        let result = BranchAndBoundSolver::default().solve(&problem, &constraints(1, None, false));
        assert_eq!(result.unwrap_err(), SolverError::Infeasible);
    }

    #[test]
    fn screening_keeps_the_relaxed_support() {
        let problem = mixture_problem(&[(1, 0.6), (4, 0.4)], 6);
        let solver = BranchAndBoundSolver::default().screened(&problem, true).unwrap();
        let candidates = solver.candidates(problem.candidate_count());
        assert!(candidates.contains(&1) && candidates.contains(&4));
        assert!(candidates.len() < problem.candidate_count());

        let solution = solver.solve(&problem, &constraints(2, None, true)).unwrap();
        assert!((solution.weights[1] - 0.6).abs() < 1e-4);
        assert!((solution.weights[4] - 0.4).abs() < 1e-4);
    }

    #[test]
    fn screened_sweep_over_a_large_pool_finishes() {
        let problem = mixture_problem(&[(3, 0.5), (17, 0.3), (40, 0.2)], 64);
        let solver = BranchAndBoundSolver::default().screened(&problem, true).unwrap();
        for k in 1..6 {
            let solution = solver.solve(&problem, &constraints(k, None, true)).unwrap();
            assert!(solution.weights.iter().filter(|&&w| w > 0.0).count() <= k);
            assert!(solution.nodes < 1_000, "k = {k}: {} nodes", solution.nodes);
        }
        let three = solver.solve(&problem, &constraints(3, None, true)).unwrap();
        assert!(three.objective < 1e-6);
    }

    #[test]
    fn single_pick_without_sum_constraint_scales_the_weight() {
        let design = DMatrix::identity(2, 2);
        let target = DVector::from_vec(vec![0.4, 0.1]);
        let problem = SelectionProblem::from_parts(Default::default(), design, target);
        let solution = BranchAndBoundSolver::default()
            .solve(
                &problem,
                &SelectionConstraints {
                    cardinality: 1,
                    threshold: None,
                    exact: true,
                    sum_to_one: false,
                },
            )
            .unwrap();
        assert!((solution.weights[0] - 0.4).abs() < 1e-12);
        assert_eq!(solution.weights[1], 0.0);
    }

    #[test]
    fn expired_time_limit_reports_a_timeout() {
        let problem = mixture_problem(&[(0, 0.5), (1, 0.5)], 4);
        let solver = BranchAndBoundSolver::new(SolverConfig {
            time_limit: Some(1e-12),
            ..SolverConfig::default()
        });
        for exact in [false, true] {
            let result = solver.solve(&problem, &constraints(2, None, exact));
            assert!(matches!(result, Err(SolverError::Timeout { .. })));
        }
    }
}
