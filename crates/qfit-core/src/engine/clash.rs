use crate::core::models::ligand::Ligand;
use crate::core::models::structure::Structure;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;
use std::collections::VecDeque;
use std::fmt;

/// Atom pairs this many bonds apart or closer are never tested.
const EXCLUDED_BOND_SEPARATION: usize = 3;

struct ReceptorIndex {
    tree: KdTree<f64, 3>,
    radii: Vec<f64>,
    max_radius: f64,
}

/// Rejects conformers whose heavy atoms come closer than a fraction of their
/// summed van der Waals radii, to each other or to the receptor.
pub struct ClashFilter {
    receptor: Option<ReceptorIndex>,
    radii: Vec<f64>,
    heavy: Vec<bool>,
    /// Per atom, sorted atoms within the excluded bond separation.
    near: Vec<Vec<usize>>,
    tolerance: f64,
}

impl fmt::Debug for ClashFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClashFilter")
            .field("receptor_atoms", &self.receptor.as_ref().map_or(0, |r| r.radii.len()))
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl ClashFilter {
    pub fn new(ligand: &Ligand, receptor: Option<&Structure>, tolerance: f64) -> Self {
        let receptor = receptor.and_then(|structure| {
            let (points, radii): (Vec<[f64; 3]>, Vec<f64>) = structure
                .atoms_iter()
                .filter(|(_, atom)| !atom.is_hydrogen())
                .map(|(_, atom)| {
                    let p = atom.position;
                    ([p.x, p.y, p.z], atom.element.vdw_radius())
                })
                .unzip();
            if points.is_empty() {
                return None;
            }
            let max_radius = radii.iter().copied().fold(0.0, f64::max);
            let tree: KdTree<f64, 3> = (&points).into();
            Some(ReceptorIndex {
                tree,
                radii,
                max_radius,
            })
        });

        let n = ligand.len();
        Self {
            receptor,
            radii: ligand.elements().iter().map(|e| e.vdw_radius()).collect(),
            heavy: (0..n).map(|i| ligand.is_heavy(i)).collect(),
            near: (0..n).map(|i| atoms_within_bonds(ligand, i)).collect(),
            tolerance,
        }
    }

    pub fn has_receptor(&self) -> bool {
        self.receptor.is_some()
    }

    #[inline]
    fn pair_clashes(&self, coordinates: &[Point3<f64>], i: usize, j: usize) -> bool {
        if !self.heavy[j] || self.near[i].binary_search(&j).is_ok() {
            return false;
        }
        let limit = self.tolerance * (self.radii[i] + self.radii[j]);
        (coordinates[i] - coordinates[j]).norm_squared() < limit * limit
    }

    fn receptor_clashes(&self, position: &Point3<f64>, radius: f64) -> bool {
        let Some(receptor) = &self.receptor else {
            return false;
        };
        let reach = self.tolerance * (radius + receptor.max_radius);
        let query = [position.x, position.y, position.z];
        receptor
            .tree
            .within_unsorted::<SquaredEuclidean>(&query, reach * reach)
            .iter()
            .any(|neighbour| {
                let limit = self.tolerance * (radius + receptor.radii[neighbour.item as usize]);
                neighbour.distance < limit * limit
            })
    }

    /// Whether any moved atom clashes.
    ///
    /// `moved` lists groups of atoms that moved rigidly together; pairs inside a
    /// group keep their distance and are skipped. Each moved atom is tested
    /// against the receptor, the `fixed` atoms and the atoms of later groups.
    pub fn has_clash(&self, coordinates: &[Point3<f64>], moved: &[Vec<usize>], fixed: &[usize]) -> bool {
        for (g, group) in moved.iter().enumerate() {
            for &i in group {
                if !self.heavy[i] {
                    continue;
                }
                if self.receptor_clashes(&coordinates[i], self.radii[i]) {
                    return true;
                }
                if fixed.iter().any(|&j| self.pair_clashes(coordinates, i, j)) {
                    return true;
                }
                let later = moved[g + 1..].iter().flatten();
                if later.copied().any(|j| self.pair_clashes(coordinates, i, j)) {
                    return true;
                }
            }
        }
        false
    }
}

fn atoms_within_bonds(ligand: &Ligand, start: usize) -> Vec<usize> {
    let adjacency = ligand.adjacency();
    let mut depth = vec![usize::MAX; ligand.len()];
    depth[start] = 0;
    let mut queue = VecDeque::from([start]);
    let mut reached = vec![start];
    while let Some(atom) = queue.pop_front() {
        if depth[atom] == EXCLUDED_BOND_SEPARATION {
            continue;
        }
        for &neighbour in &adjacency[atom] {
            if depth[neighbour] == usize::MAX {
                depth[neighbour] = depth[atom] + 1;
                reached.push(neighbour);
                queue.push_back(neighbour);
            }
        }
    }
    reached.sort_unstable();
    reached
}
