use crate::core::density::map::DensityMap;
use crate::core::models::ligand::Ligand;
use crate::core::models::structure::Structure;
use crate::core::topology::{LigandTopology, build_tree};
use crate::engine::builder::build_pool;
use crate::engine::cache::{CacheStats, ScoreCache};
use crate::engine::clash::ClashFilter;
use crate::engine::config::{BuildConfig, ConfigError};
use crate::engine::context::BuildContext;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::scoring::DensityScorer;
use crate::engine::state::CandidatePool;
use tracing::{info, instrument};

/// What the builder works on.
#[derive(Debug, Clone, Copy)]
pub struct BuildInput<'a> {
    pub ligand: &'a Ligand,
    pub map: &'a DensityMap,
    pub resolution: f64,
    /// Surrounding atoms to avoid; hydrogens are ignored.
    pub receptor: Option<&'a Structure>,
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub topology: LigandTopology,
    pub pool: CandidatePool,
    pub cache: CacheStats,
}

#[instrument(skip_all, name = "build_workflow")]
pub fn run(
    input: &BuildInput,
    config: &BuildConfig,
    reporter: &ProgressReporter,
) -> Result<BuildOutput, EngineError> {
    // === Phase 0: Validation and topology ===
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    config.validate()?;
    if !(input.resolution.is_finite() && input.resolution > 0.0) {
        return Err(ConfigError::InvalidValue {
            parameter: "resolution",
            reason: format!("{} is not a positive resolution", input.resolution),
        }
        .into());
    }

    let topology = build_tree(input.ligand, config.root_atom.as_deref())?;
    info!(
        atoms = input.ligand.len(),
        fragments = topology.fragments().len(),
        rotatable_bonds = topology.rotatable_bond_count(),
        root = %input.ligand.names()[topology.root_atom()],
        "Ligand topology built."
    );

    let scoring_map = input.map.normalized();
    let cache = ScoreCache::default();
    let scorer = DensityScorer::new(&scoring_map, input.ligand, &topology, &cache, config.scale);
    let clash_filter = ClashFilter::new(input.ligand, input.receptor, config.clash_tolerance);
    if !clash_filter.has_receptor() {
        info!("No receptor atoms; only intra-ligand clashes are checked.");
    }
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Hierarchical build ===
    reporter.report(Progress::PhaseStart { name: "Building" });
    let context = BuildContext::new(&topology, &scorer, &clash_filter, config, reporter);
    let pool = build_pool(&context, input.ligand.positions())?;
    reporter.report(Progress::PhaseFinish);

    let cache_stats = cache.stats();
    info!(
        conformers = pool.len(),
        best_score = pool.best().map(|c| c.score),
        cache_hits = cache_stats.hits,
        cache_misses = cache_stats.misses,
        "Conformer pool complete."
    );

    Ok(BuildOutput {
        topology,
        pool,
        cache: cache_stats,
    })
}
