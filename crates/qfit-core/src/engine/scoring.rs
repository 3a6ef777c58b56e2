use super::cache::{CacheKey, ScoreCache};
use super::state::{Candidate, FitAccumulator};
use crate::core::density::map::DensityMap;
use crate::core::models::ligand::Ligand;
use crate::core::topology::LigandTopology;
use nalgebra::Point3;
use std::sync::Arc;

/// Scores conformers against a sigma-normalised map.
///
/// Each atom contributes its map value weighted by atomic number. Densities are
/// sampled per rigid fragment through the shared [`ScoreCache`], so only the
/// fragments that move need to be re-read.
pub struct DensityScorer<'a> {
    map: &'a DensityMap,
    topology: &'a LigandTopology,
    cache: &'a ScoreCache,
    weights: Vec<f64>,
    scale: bool,
}

impl<'a> DensityScorer<'a> {
    pub fn new(
        map: &'a DensityMap,
        ligand: &Ligand,
        topology: &'a LigandTopology,
        cache: &'a ScoreCache,
        scale: bool,
    ) -> Self {
        let weights = ligand
            .elements()
            .iter()
            .map(|e| e.atomic_number() as f64)
            .collect();
        Self {
            map,
            topology,
            cache,
            weights,
            scale,
        }
    }

    fn fragment_density(&self, fragment: usize, coordinates: &[Point3<f64>]) -> Arc<[f64]> {
        let atoms = &self.topology.fragments()[fragment].atoms;
        let key = CacheKey::new(fragment, atoms.iter().map(|&a| coordinates[a]));
        self.cache
            .get_or_insert_with(key, |key| self.map.sample(&key.positions()))
    }

    /// Candidate with the given coordinates scored over `active` fragments.
    pub fn evaluate(
        &self,
        index: usize,
        dihedrals: Vec<f64>,
        coordinates: Vec<Point3<f64>>,
        active: &[usize],
    ) -> Candidate {
        let mut candidate = Candidate {
            index,
            dihedrals,
            atom_density: vec![0.0; coordinates.len()],
            coordinates,
            fit: FitAccumulator::default(),
            score: 0.0,
        };
        self.refresh(&mut candidate, &[], active);
        candidate
    }

    /// Updates the fit after the candidate's coordinates changed.
    ///
    /// `moved` are fragments that were already scored and have moved;
    /// `activated` are fragments scored for the first time.
    pub fn refresh(&self, candidate: &mut Candidate, moved: &[usize], activated: &[usize]) {
        for &fragment in moved {
            for &atom in &self.topology.fragments()[fragment].atoms {
                candidate
                    .fit
                    .remove(self.weights[atom], candidate.atom_density[atom]);
            }
        }
        for &fragment in moved.iter().chain(activated) {
            let densities = self.fragment_density(fragment, &candidate.coordinates);
            for (&atom, &density) in self.topology.fragments()[fragment].atoms.iter().zip(densities.iter()) {
                candidate.atom_density[atom] = density;
                candidate.fit.add(self.weights[atom], density);
            }
        }
        candidate.score = candidate.fit.score(self.scale);
    }
}
