use crate::core::utils::geometry::{rotate_atoms_about_axis, wrap_degrees};
use crate::engine::context::BuildContext;
use crate::engine::state::{ActiveSet, Candidate};
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A score must rise by more than this to count as an improvement.
const IMPROVEMENT_EPSILON: f64 = 1e-9;

/// Perturbation of one sampled bond during local search.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMove {
    pub bond: usize,
    /// Active fragments carried along by the rotation.
    pub fragments: Vec<usize>,
    pub moved: Vec<Vec<usize>>,
    pub fixed: Vec<usize>,
}

/// One move per bond sampled so far, in processing order.
pub fn plan_moves(context: &BuildContext, active: &ActiveSet) -> Vec<LocalMove> {
    let topology = context.topology;
    (0..active.processed())
        .map(|bond| {
            let fragments: Vec<usize> = topology
                .subtree_bonds(bond)
                .into_iter()
                .filter(|&b| b < active.processed())
                .map(|b| topology.bond(b).child_fragment)
                .collect();
            let moved = context.fragment_atoms(&fragments);
            let fixed = active.atoms().filter(|a| !moved.contains(a)).collect();
            LocalMove {
                bond,
                fragments,
                moved: vec![moved],
                fixed,
            }
        })
        .collect()
}

fn refine(context: &BuildContext, mut candidate: Candidate, moves: &[LocalMove]) -> (Candidate, usize) {
    let step = context.config.local_search_step;
    let mut improvements = 0;
    for _ in 0..context.config.local_search_passes {
        let mut improved = false;
        for local in moves {
            let axis = context.topology.bond(local.bond);
            for delta in [step, -step] {
                let mut trial = candidate.clone();
                let origin = trial.coordinates[axis.parent_atom];
                let axis_end = trial.coordinates[axis.child_atom];
                rotate_atoms_about_axis(
                    &mut trial.coordinates,
                    &origin,
                    &axis_end,
                    &axis.moving_atoms,
                    delta,
                );
                if context
                    .clash_filter
                    .has_clash(&trial.coordinates, &local.moved, &local.fixed)
                {
                    continue;
                }
                context.scorer.refresh(&mut trial, &local.fragments, &[]);
                if trial.score > candidate.score + IMPROVEMENT_EPSILON {
                    trial.dihedrals[local.bond] = wrap_degrees(trial.dihedrals[local.bond] + delta);
                    candidate = trial;
                    improved = true;
                    improvements += 1;
                    break;
                }
            }
        }
        if !improved {
            break;
        }
    }
    (candidate, improvements)
}

/// Greedy dihedral refinement of every candidate.
///
/// Each pass tries `±local_search_step` on each sampled bond and keeps the
/// first change that raises the score without clashing.
#[instrument(skip_all, name = "local_search_task", fields(candidates = candidates.len()))]
pub fn run(
    context: &BuildContext,
    candidates: Vec<Candidate>,
    active: &ActiveSet,
) -> (Vec<Candidate>, usize) {
    let moves = plan_moves(context, active);
    if moves.is_empty() || context.config.local_search_passes == 0 {
        return (candidates, 0);
    }

    #[cfg(not(feature = "parallel"))]
    let iterator = candidates.into_iter();

    #[cfg(feature = "parallel")]
    let iterator = candidates.into_par_iter();

    let refined: Vec<(Candidate, usize)> = iterator.map(|c| refine(context, c, &moves)).collect();
    let improvements = refined.iter().map(|(_, n)| n).sum();
    debug!(improvements, "Local search finished.");
    (refined.into_iter().map(|(c, _)| c).collect(), improvements)
}
