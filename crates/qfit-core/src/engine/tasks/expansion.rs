use crate::core::utils::geometry::rotate_atoms_about_axis;
use crate::engine::context::BuildContext;
use crate::engine::progress::Progress;
use crate::engine::state::{ActiveSet, Candidate};
use crate::engine::utils::sampling::offset_combinations;
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// What one build level samples, shared by every parent candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelPlan {
    pub bonds: Vec<usize>,
    /// Fragments that become active at this level, one per bond.
    pub activated: Vec<usize>,
    /// Atoms of each activated fragment; each group moves rigidly.
    pub moved_groups: Vec<Vec<usize>>,
    /// Atoms active before this level.
    pub fixed: Vec<usize>,
    pub combinations: Vec<Vec<f64>>,
}

impl LevelPlan {
    pub fn new(context: &BuildContext, active: &ActiveSet, bonds: &[usize]) -> Self {
        let topology = context.topology;
        let activated: Vec<usize> = bonds.iter().map(|&b| topology.bond(b).child_fragment).collect();
        let moved_groups = activated
            .iter()
            .map(|&f| topology.fragments()[f].atoms.clone())
            .collect();
        let ranges: Vec<f64> = bonds.iter().map(|&b| topology.bond(b).range_degrees).collect();
        Self {
            bonds: bonds.to_vec(),
            activated,
            moved_groups,
            fixed: active.atoms().collect(),
            combinations: offset_combinations(&ranges, context.config.stepsize),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionStats {
    pub samples: usize,
    pub clashes: usize,
}

fn expand_parent(
    context: &BuildContext,
    parent: &Candidate,
    plan: &LevelPlan,
) -> (Vec<Candidate>, usize) {
    let mut children = Vec::with_capacity(plan.combinations.len());
    let mut clashes = 0;
    for offsets in &plan.combinations {
        let mut coordinates = parent.coordinates.clone();
        for (&bond, &offset) in plan.bonds.iter().zip(offsets) {
            let axis = context.topology.bond(bond);
            let origin = coordinates[axis.parent_atom];
            let axis_end = coordinates[axis.child_atom];
            rotate_atoms_about_axis(&mut coordinates, &origin, &axis_end, &axis.moving_atoms, offset);
        }
        if context
            .clash_filter
            .has_clash(&coordinates, &plan.moved_groups, &plan.fixed)
        {
            clashes += 1;
            continue;
        }

        let mut child = Candidate {
            coordinates,
            ..parent.clone()
        };
        for (&bond, &offset) in plan.bonds.iter().zip(offsets) {
            child.dihedrals[bond] = offset;
        }
        context.scorer.refresh(&mut child, &[], &plan.activated);
        children.push(child);
    }
    (children, clashes)
}

/// Samples the level's bonds on every parent and keeps the clash-free children.
///
/// Children come out grouped by parent, in combination order, and are numbered
/// in that order.
#[instrument(skip_all, name = "expansion_task", fields(bonds = ?plan.bonds, parents = parents.len()))]
pub fn run(
    context: &BuildContext,
    parents: &[Candidate],
    plan: &LevelPlan,
) -> (Vec<Candidate>, ExpansionStats) {
    context.reporter.report(Progress::TaskStart {
        total_steps: parents.len() as u64,
    });

    #[cfg(not(feature = "parallel"))]
    let iterator = parents.iter();

    #[cfg(feature = "parallel")]
    let iterator = parents.par_iter();

    let per_parent: Vec<(Vec<Candidate>, usize)> = iterator
        .map(|parent| {
            let result = expand_parent(context, parent, plan);
            context.reporter.report(Progress::TaskIncrement);
            result
        })
        .collect();

    context.reporter.report(Progress::TaskFinish);

    let stats = ExpansionStats {
        samples: parents.len() * plan.combinations.len(),
        clashes: per_parent.iter().map(|(_, c)| c).sum(),
    };
    let mut children: Vec<Candidate> = per_parent.into_iter().flat_map(|(c, _)| c).collect();
    for (index, child) in children.iter_mut().enumerate() {
        child.index = index;
    }
    debug!(
        samples = stats.samples,
        clashes = stats.clashes,
        children = children.len(),
        "Level expanded."
    );
    (children, stats)
}
