use super::context::BuildContext;
use super::error::EngineError;
use super::progress::Progress;
use super::state::{ActiveSet, Candidate, CandidatePool, LevelStats};
use super::tasks::expansion::{self, LevelPlan};
use super::tasks::{local_search, pruning};
use nalgebra::Point3;
use tracing::{info, instrument};

/// Builds the conformer pool level by level, walking the fragment tree from the root.
///
/// Level `i` samples the next `build_stepsize` rotatable bonds for every
/// surviving candidate, drops clashing children, refines and prunes the rest.
/// Without rotatable bonds, or with building disabled, the pool holds the
/// input conformer alone.
#[instrument(skip_all, name = "hierarchical_build")]
pub fn build_pool(
    context: &BuildContext,
    input: &[Point3<f64>],
) -> Result<CandidatePool, EngineError> {
    let topology = context.topology;
    let config = context.config;
    let bond_count = topology.rotatable_bond_count();
    let all_fragments: Vec<usize> = (0..topology.fragments().len()).collect();

    if !config.build || bond_count == 0 {
        info!(bonds = bond_count, "Keeping the input conformer only.");
        let conformer = context
            .scorer
            .evaluate(0, vec![0.0; bond_count], input.to_vec(), &all_fragments);
        return Ok(CandidatePool::new(vec![conformer], Vec::new()));
    }

    let mut active = ActiveSet::new(topology);
    let mut candidates: Vec<Candidate> =
        vec![context.scorer.evaluate(0, vec![0.0; bond_count], input.to_vec(), &[0])];
    let bond_order: Vec<usize> = (0..bond_count).collect();
    let levels: Vec<&[usize]> = bond_order.chunks(config.build_stepsize).collect();
    let mut stats = Vec::with_capacity(levels.len());

    for (level, bonds) in levels.iter().enumerate() {
        context.reporter.report(Progress::Message(format!(
            "Level {}/{}: sampling {} bond(s) on {} candidate(s)",
            level + 1,
            levels.len(),
            bonds.len(),
            candidates.len()
        )));
        let plan = LevelPlan::new(context, &active, bonds);
        let parents = candidates.len();
        let (children, expansion) = expansion::run(context, &candidates, &plan);
        if children.is_empty() {
            return Err(EngineError::BuildExhaustion {
                level,
                bond: bonds[0],
            });
        }
        active.activate(topology, bonds);

        let survivors = children.len();
        let (children, local_improvements) = if config.local_search {
            local_search::run(context, children, &active)
        } else {
            (children, 0)
        };
        candidates = pruning::run(children, config.max_candidates);

        let level_stats = LevelStats {
            level,
            bonds: bonds.to_vec(),
            parents,
            samples: expansion.samples,
            clashes: expansion.clashes,
            survivors,
            local_improvements,
            kept: candidates.len(),
        };
        info!(
            level,
            samples = level_stats.samples,
            clashes = level_stats.clashes,
            kept = level_stats.kept,
            best = candidates[0].score,
            "Build level complete."
        );
        context.reporter.report(Progress::LevelComplete {
            level,
            levels: levels.len(),
            survivors,
            kept: candidates.len(),
        });
        stats.push(level_stats);
    }

    Ok(CandidatePool::new(candidates, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::element::Element;
    use crate::core::models::ligand::Ligand;
    use crate::core::models::structure::Structure;
    use crate::core::topology::{LigandTopology, build_tree};
    use crate::engine::cache::ScoreCache;
    use crate::engine::clash::ClashFilter;
    use crate::engine::config::{BuildConfig, BuildConfigBuilder};
    use crate::engine::fixtures::{alkane, blob_map, rotated};
    use crate::engine::progress::ProgressReporter;
    use crate::engine::scoring::DensityScorer;

    fn build(
        ligand: &Ligand,
        topology: &LigandTopology,
        target: &[Point3<f64>],
        receptor: Option<&Structure>,
        config: &BuildConfig,
    ) -> Result<CandidatePool, EngineError> {
        let map = blob_map(target).normalized();
        let cache = ScoreCache::default();
        let scorer = DensityScorer::new(&map, ligand, topology, &cache, config.scale);
        let clash_filter = ClashFilter::new(ligand, receptor, config.clash_tolerance);
        let reporter = ProgressReporter::new();
        let context = BuildContext::new(topology, &scorer, &clash_filter, config, &reporter);
        build_pool(&context, ligand.positions())
    }

    fn coarse() -> BuildConfigBuilder {
        BuildConfigBuilder::new().stepsize(30.0).local_search(false)
    }

    #[test]
    fn rigid_ligand_yields_the_input_conformer() {
        let ligand = alkane(3);
        let topology = build_tree(&ligand, None).unwrap();
        let config = coarse().finish().unwrap();
        let pool = build(&ligand, &topology, ligand.positions(), None, &config).unwrap();

        assert_eq!(pool.len(), 1);
        assert!(pool.levels().is_empty());
        assert_eq!(pool.best().unwrap().coordinates, ligand.positions());
    }

    #[test]
    fn disabled_build_keeps_the_input_conformer() {
        let ligand = alkane(5);
        let topology = build_tree(&ligand, None).unwrap();
        let config = coarse().build(false).finish().unwrap();
        let pool = build(&ligand, &topology, ligand.positions(), None, &config).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.best().unwrap().dihedrals, vec![0.0, 0.0]);
    }

    #[test]
    fn one_bond_at_thirty_degrees_samples_twelve_conformers() {
        let ligand = alkane(4);
        let topology = build_tree(&ligand, None).unwrap();
        let config = coarse().finish().unwrap();
        let pool = build(&ligand, &topology, ligand.positions(), None, &config).unwrap();

        assert_eq!(pool.levels().len(), 1);
        assert_eq!(pool.levels()[0].samples, 12);
        assert_eq!(pool.len(), 12);
        // The unrotated conformer sits on the density.
        assert_eq!(pool.best().unwrap().dihedrals, vec![0.0]);
    }

    #[test]
    fn build_recovers_the_modelled_dihedrals() {
        let ligand = alkane(5);
        let topology = build_tree(&ligand, None).unwrap();
        let target = rotated(&ligand, &topology, &[60.0, -90.0]);
        let config = coarse().finish().unwrap();
        let pool = build(&ligand, &topology, &target, None, &config).unwrap();

        let best = pool.best().unwrap();
        assert_eq!(best.dihedrals, vec![60.0, -90.0]);
        for (a, b) in best.coordinates.iter().zip(&target) {
            assert!((a - b).norm() < 1e-6);
        }
    }

    #[test]
    fn batched_levels_match_sequential_levels_on_clean_data() {
        let ligand = alkane(5);
        let topology = build_tree(&ligand, None).unwrap();
        let target = rotated(&ligand, &topology, &[-60.0, 90.0]);
        let config = coarse().build_stepsize(2).finish().unwrap();
        let pool = build(&ligand, &topology, &target, None, &config).unwrap();

        assert_eq!(pool.levels().len(), 1);
        assert_eq!(pool.levels()[0].samples, 144);
        assert_eq!(pool.best().unwrap().dihedrals, vec![-60.0, 90.0]);
    }

    #[test]
    fn pool_never_exceeds_the_candidate_cap() {
        let ligand = alkane(6);
        let topology = build_tree(&ligand, None).unwrap();
        let config = coarse().max_candidates(5).finish().unwrap();
        let pool = build(&ligand, &topology, ligand.positions(), None, &config).unwrap();

        assert!(pool.len() <= 5);
        for level in pool.levels() {
            assert!(level.kept <= 5);
            assert!(level.survivors + level.clashes == level.samples);
        }
    }

    #[test]
    fn scores_are_sorted_best_first() {
        let ligand = alkane(5);
        let topology = build_tree(&ligand, None).unwrap();
        let config = coarse().finish().unwrap();
        let pool = build(&ligand, &topology, ligand.positions(), None, &config).unwrap();
        for pair in pool.candidates().windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn receptor_never_enlarges_the_pool() {
        let ligand = alkane(4);
        let topology = build_tree(&ligand, None).unwrap();
        // Occupy the spot atom C4 reaches after a 90° turn.
        let blocked = rotated(&ligand, &topology, &[90.0])[3];
        let mut receptor = Structure::new();
        receptor.add_atom(Atom::new("OW", Element::O, blocked));

        let config = coarse().max_candidates(1000).finish().unwrap();
        let free = build(&ligand, &topology, ligand.positions(), None, &config).unwrap();
        let crowded = build(&ligand, &topology, ligand.positions(), Some(&receptor), &config).unwrap();

        assert!(crowded.len() <= free.len());
        assert!(crowded.levels()[0].clashes > 0);
        assert!(crowded.candidates().iter().all(|c| c.dihedrals[0] != 90.0));
    }

    #[test]
    fn fully_blocked_level_is_an_error() {
        let ligand = alkane(4);
        let topology = build_tree(&ligand, None).unwrap();
        let bond = topology.bond(0);
        let mut receptor = Structure::new();
        // Surround the rotating atom's whole circle.
        for step in 0..36 {
            let position = rotated(&ligand, &topology, &[step as f64 * 10.0])[bond.moving_atoms[1]];
            receptor.add_atom(Atom::new("OW", Element::O, position));
        }
        let config = coarse().finish().unwrap();
        let result = build(&ligand, &topology, ligand.positions(), Some(&receptor), &config);
        assert!(matches!(
            result,
            Err(EngineError::BuildExhaustion { level: 0, bond: 0 })
        ));
    }

    #[test]
    fn local_search_only_improves_scores() {
        let ligand = alkane(5);
        let topology = build_tree(&ligand, None).unwrap();
        let target = rotated(&ligand, &topology, &[47.0, -73.0]);
        let plain = coarse().finish().unwrap();
        let refined = coarse()
            .local_search(true)
            .local_search_step(5.0)
            .local_search_passes(4)
            .finish()
            .unwrap();

        let before = build(&ligand, &topology, &target, None, &plain).unwrap();
        let after = build(&ligand, &topology, &target, None, &refined).unwrap();
        assert!(after.best().unwrap().score >= before.best().unwrap().score);
        assert!(after.levels().iter().any(|l| l.local_improvements > 0));
    }

    #[test]
    fn repeated_builds_are_identical() {
        let ligand = alkane(6);
        let topology = build_tree(&ligand, None).unwrap();
        let target = rotated(&ligand, &topology, &[30.0, -60.0, 180.0]);
        let config = BuildConfigBuilder::new()
            .stepsize(20.0)
            .max_candidates(20)
            .finish()
            .unwrap();

        let first = build(&ligand, &topology, &target, None, &config).unwrap();
        let second = build(&ligand, &topology, &target, None, &config).unwrap();
        assert_eq!(first, second);
    }
}
