use crate::core::topology::LigandTopology;
use nalgebra::Point3;
use serde::Serialize;
use std::cmp::Ordering;

/// Running weighted density sum over the active atoms of a conformer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FitAccumulator {
    pub weighted_sum: f64,
    pub weight_total: f64,
}

impl FitAccumulator {
    #[inline]
    pub fn add(&mut self, weight: f64, density: f64) {
        self.weighted_sum += weight * density;
        self.weight_total += weight;
    }

    #[inline]
    pub fn remove(&mut self, weight: f64, density: f64) {
        self.weighted_sum -= weight * density;
        self.weight_total -= weight;
    }

    /// Weighted mean when `scale` is set, weighted sum otherwise.
    pub fn score(&self, scale: bool) -> f64 {
        if !scale {
            return self.weighted_sum;
        }
        if self.weight_total > 0.0 {
            self.weighted_sum / self.weight_total
        } else {
            0.0
        }
    }
}

/// One ligand conformer in the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Position in the enumeration of its build level.
    pub index: usize,
    /// Offset from the input dihedral of each rotatable bond, in degrees.
    pub dihedrals: Vec<f64>,
    pub coordinates: Vec<Point3<f64>>,
    /// Map value at each atom; only meaningful for active atoms.
    pub atom_density: Vec<f64>,
    pub fit: FitAccumulator,
    pub score: f64,
}

impl Candidate {
    /// Descending score; equal scores keep their existing order under a stable sort.
    pub fn by_score_descending(a: &Candidate, b: &Candidate) -> Ordering {
        b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
    }
}

/// Fragments whose atoms take part in scoring and clash checks.
///
/// Starts with the root fragment; each processed bond adds its child fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSet {
    processed: usize,
    fragments: Vec<usize>,
    atoms: Vec<bool>,
}

impl ActiveSet {
    pub fn new(topology: &LigandTopology) -> Self {
        let atom_count = topology.fragments().iter().map(|f| f.atoms.len()).sum();
        let mut atoms = vec![false; atom_count];
        for &atom in &topology.root_fragment().atoms {
            atoms[atom] = true;
        }
        Self {
            processed: 0,
            fragments: vec![0],
            atoms,
        }
    }

    /// Marks `bonds` (the next ones in processing order) as sampled.
    pub fn activate(&mut self, topology: &LigandTopology, bonds: &[usize]) {
        for &bond in bonds {
            let fragment = topology.bond(bond).child_fragment;
            self.fragments.push(fragment);
            for &atom in &topology.fragments()[fragment].atoms {
                self.atoms[atom] = true;
            }
            self.processed = self.processed.max(bond + 1);
        }
    }

    /// Number of bonds already sampled; these are bonds `0..processed`.
    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn fragments(&self) -> &[usize] {
        &self.fragments
    }

    pub fn is_active(&self, atom: usize) -> bool {
        self.atoms[atom]
    }

    pub fn atoms(&self) -> impl Iterator<Item = usize> + '_ {
        self.atoms
            .iter()
            .enumerate()
            .filter_map(|(i, &active)| active.then_some(i))
    }
}

/// Counters of one build level.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelStats {
    pub level: usize,
    pub bonds: Vec<usize>,
    pub parents: usize,
    pub samples: usize,
    pub clashes: usize,
    pub survivors: usize,
    pub local_improvements: usize,
    pub kept: usize,
}

/// The conformers produced by the builder, best first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidatePool {
    candidates: Vec<Candidate>,
    levels: Vec<LevelStats>,
}

impl CandidatePool {
    pub fn new(candidates: Vec<Candidate>, levels: Vec<LevelStats>) -> Self {
        Self { candidates, levels }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.candidates.get(index)
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn levels(&self) -> &[LevelStats] {
        &self.levels
    }
}
