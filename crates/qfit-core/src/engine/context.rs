use super::clash::ClashFilter;
use super::config::BuildConfig;
use super::progress::ProgressReporter;
use super::scoring::DensityScorer;
use crate::core::topology::LigandTopology;

/// Read-only view shared by the build tasks.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub topology: &'a LigandTopology,
    pub scorer: &'a DensityScorer<'a>,
    pub clash_filter: &'a ClashFilter,
    pub config: &'a BuildConfig,
    pub reporter: &'a ProgressReporter<'a>,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        topology: &'a LigandTopology,
        scorer: &'a DensityScorer<'a>,
        clash_filter: &'a ClashFilter,
        config: &'a BuildConfig,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            topology,
            scorer,
            clash_filter,
            config,
            reporter,
        }
    }

    /// Atoms of the given fragments, concatenated.
    pub fn fragment_atoms(&self, fragments: &[usize]) -> Vec<usize> {
        fragments
            .iter()
            .flat_map(|&f| self.topology.fragments()[f].atoms.iter().copied())
            .collect()
    }
}
