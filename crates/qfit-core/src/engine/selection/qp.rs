use super::problem::SelectionProblem;
use crate::engine::error::SolverError;

/// Weights at or below this value count as zero.
pub const ZERO_WEIGHT: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaxationSettings {
    pub max_iterations: usize,
    pub tolerance: f64,
}

/// Solution of the continuous problem restricted to a support set.
#[derive(Debug, Clone, PartialEq)]
pub struct Relaxation {
    /// One weight per candidate; zero outside the support.
    pub weights: Vec<f64>,
    pub objective: f64,
}

/// Euclidean projection onto `{x ≥ 0, Σx = total}`.
pub fn project_simplex(values: &mut [f64], total: f64) {
    if values.is_empty() {
        return;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (i, &v) in sorted.iter().enumerate() {
        cumulative += v;
        let candidate = (cumulative - total) / (i + 1) as f64;
        if v - candidate > 0.0 {
            theta = candidate;
        }
    }
    for v in values.iter_mut() {
        *v = (*v - theta).max(0.0);
    }
}

/// Projection onto `{x ≥ lower, Σx = 1}`, or `Σx ≤ 1` when `sum_to_one` is off.
fn project_feasible(values: &mut [f64], lower: &[f64], sum_to_one: bool) {
    let spare = 1.0 - lower.iter().sum::<f64>();
    for (v, &l) in values.iter_mut().zip(lower) {
        *v -= l;
    }
    if !sum_to_one {
        let clipped: f64 = values.iter().map(|v| v.max(0.0)).sum();
        if clipped <= spare {
            for v in values.iter_mut() {
                *v = v.max(0.0);
            }
            for (v, &l) in values.iter_mut().zip(lower) {
                *v += l;
            }
            return;
        }
    }
    project_simplex(values, spare);
    for (v, &l) in values.iter_mut().zip(lower) {
        *v += l;
    }
}

/// Minimises `‖Aw − y‖²` over the candidates in `support` with FISTA.
///
/// `lower` gives the lower bound of each support entry. The start point is
/// `start` restricted to the support (uniform when absent), projected onto the
/// feasible set. Momentum restarts whenever the objective rises.
pub fn solve_relaxation(
    problem: &SelectionProblem,
    support: &[usize],
    lower: &[f64],
    sum_to_one: bool,
    start: Option<&[f64]>,
    settings: &RelaxationSettings,
) -> Result<Relaxation, SolverError> {
    let n = problem.candidate_count();
    if support.is_empty() {
        return if sum_to_one {
            Err(SolverError::Infeasible)
        } else {
            Ok(Relaxation {
                weights: vec![0.0; n],
                objective: problem.constant(),
            })
        };
    }
    if lower.iter().sum::<f64>() > 1.0 + 1e-12 {
        return Err(SolverError::Infeasible);
    }

    let gram = problem.gram();
    let linear = problem.linear();
    let m = support.len();
    let sub_gram = |i: usize, j: usize| gram[(support[i], support[j])];

    let lipschitz = 2.0
        * (0..m)
            .map(|i| (0..m).map(|j| sub_gram(i, j).abs()).sum::<f64>())
            .fold(0.0, f64::max);
    let step = if lipschitz > 0.0 { 1.0 / lipschitz } else { 1.0 };

    let objective = |x: &[f64]| -> f64 {
        let mut value = problem.constant();
        for i in 0..m {
            let gx: f64 = (0..m).map(|j| sub_gram(i, j) * x[j]).sum();
            value += x[i] * gx - 2.0 * linear[support[i]] * x[i];
        }
        value
    };

    let mut x: Vec<f64> = match start {
        Some(weights) => support.iter().map(|&i| weights[i]).collect(),
        None => vec![1.0 / m as f64; m],
    };
    project_feasible(&mut x, lower, sum_to_one);
    let mut y = x.clone();
    let mut momentum: f64 = 1.0;
    let mut value = objective(&x);

    for _ in 0..settings.max_iterations {
        let mut next: Vec<f64> = (0..m)
            .map(|i| {
                let gy: f64 = (0..m).map(|j| sub_gram(i, j) * y[j]).sum();
                y[i] - step * 2.0 * (gy - linear[support[i]])
            })
            .collect();
        project_feasible(&mut next, lower, sum_to_one);

        let next_value = objective(&next);
        if !next_value.is_finite() {
            return Err(SolverError::Numerical(
                "relaxation objective is not finite".to_string(),
            ));
        }
        let change = next
            .iter()
            .zip(&x)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);

        if next_value > value {
            // Restart from the last iterate without momentum.
            momentum = 1.0;
            y.clone_from(&x);
            if change < settings.tolerance {
                break;
            }
            continue;
        }

        let next_momentum = (1.0 + (1.0 + 4.0 * momentum * momentum).sqrt()) / 2.0;
        let blend = (momentum - 1.0) / next_momentum;
        y = next
            .iter()
            .zip(&x)
            .map(|(a, b)| a + blend * (a - b))
            .collect();
        x = next;
        value = next_value;
        momentum = next_momentum;
        if change < settings.tolerance {
            break;
        }
    }

    let mut weights = vec![0.0; n];
    for (&i, &w) in support.iter().zip(&x) {
        weights[i] = w;
    }
    Ok(Relaxation {
        weights,
        objective: value,
    })
}
