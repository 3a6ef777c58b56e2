use crate::core::models::ligand::Ligand;
use petgraph::algo::{connected_components, dijkstra, has_path_connecting};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::{EdgeFiltered, EdgeRef};
use std::collections::VecDeque;
use thiserror::Error;

/// Default sampling range of a rotatable bond, in degrees.
pub const FULL_ROTATION: f64 = 360.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Ligand has no atoms")]
    Empty,
    #[error("Ligand bond graph is disconnected ({components} components)")]
    Disconnected { components: usize },
    #[error("Root atom '{name}' not found in ligand")]
    RootNotFound { name: String },
}

/// A rigid group of atoms that moves as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Atom indices, sorted.
    pub atoms: Vec<usize>,
    /// The rotatable bond connecting this fragment to its parent (`None` for the root).
    pub parent_bond: Option<usize>,
    /// Rotatable bonds leading to child fragments, in processing order.
    pub child_bonds: Vec<usize>,
}

/// A rotatable bond of the ligand tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RotatableBond {
    /// Axis atom on the root side.
    pub parent_atom: usize,
    /// Axis atom on the moving side.
    pub child_atom: usize,
    /// Fragment that becomes active when this bond is processed.
    pub child_fragment: usize,
    /// Rotatable bond above this one, if any.
    pub parent_bond: Option<usize>,
    /// Number of rotatable bonds between this bond and the root fragment.
    pub depth: usize,
    /// Every atom of the child subtree, sorted. These rotate about the axis.
    pub moving_atoms: Vec<usize>,
    pub range_degrees: f64,
    /// Heavy atoms `a-parent-child-d` defining the dihedral angle.
    pub dihedral_atoms: [usize; 4],
}

/// The ligand as a tree of rigid fragments joined by rotatable bonds.
///
/// Immutable after construction. `bonds` is in processing order (by depth,
/// then by parent and child atom index), and the child fragment of bond `k` is
/// fragment `k + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct LigandTopology {
    root_atom: usize,
    fragments: Vec<Fragment>,
    bonds: Vec<RotatableBond>,
    atom_fragment: Vec<usize>,
}

impl LigandTopology {
    pub fn root_atom(&self) -> usize {
        self.root_atom
    }

    pub fn root_fragment(&self) -> &Fragment {
        &self.fragments[0]
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn bonds(&self) -> &[RotatableBond] {
        &self.bonds
    }

    pub fn bond(&self, index: usize) -> &RotatableBond {
        &self.bonds[index]
    }

    pub fn rotatable_bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn fragment_of(&self, atom: usize) -> usize {
        self.atom_fragment[atom]
    }

    /// Atoms that become active when `bond` is processed.
    pub fn atoms_activated_by(&self, bond: usize) -> &[usize] {
        &self.fragments[self.bonds[bond].child_fragment].atoms
    }

    /// `bond` and every bond below it, in processing order.
    pub fn subtree_bonds(&self, bond: usize) -> Vec<usize> {
        (bond..self.bonds.len())
            .filter(|&j| self.descends_from(j, bond))
            .collect()
    }

    fn descends_from(&self, mut bond: usize, ancestor: usize) -> bool {
        loop {
            if bond == ancestor {
                return true;
            }
            match self.bonds[bond].parent_bond {
                Some(parent) => bond = parent,
                None => return false,
            }
        }
    }
}

struct DiscoveredFragment {
    atoms: Vec<usize>,
    parent_fragment: usize,
    parent_atom: usize,
    child_atom: usize,
    depth: usize,
}

/// Builds the fragment tree of a ligand.
///
/// When `root` is `None`, the heavy atom at the centre of the bond graph
/// (minimum eccentricity, lowest index on ties) anchors the root fragment.
pub fn build_tree(ligand: &Ligand, root: Option<&str>) -> Result<LigandTopology, TopologyError> {
    let n = ligand.len();
    if n == 0 {
        return Err(TopologyError::Empty);
    }

    let mut graph: UnGraph<usize, ()> = UnGraph::with_capacity(n, ligand.bonds().len());
    let nodes: Vec<NodeIndex> = (0..n).map(|i| graph.add_node(i)).collect();
    for &(a, b, _) in ligand.bonds() {
        graph.add_edge(nodes[a], nodes[b], ());
    }

    let components = connected_components(&graph);
    if components > 1 {
        return Err(TopologyError::Disconnected { components });
    }

    let root_atom = match root {
        Some(name) => ligand
            .index_of_name(name)
            .ok_or_else(|| TopologyError::RootNotFound {
                name: name.to_string(),
            })?,
        None => central_heavy_atom(ligand, &graph, &nodes),
    };

    let rotatable = find_rotatable_bonds(ligand, &graph, &nodes);
    let is_rotatable = |a: usize, b: usize| rotatable.contains(&(a.min(b), a.max(b)));

    let adjacency = ligand.adjacency();
    let mut atom_fragment = vec![usize::MAX; n];
    let flood = |seed: usize, id: usize, atom_fragment: &mut Vec<usize>| -> Vec<usize> {
        let mut atoms = vec![seed];
        atom_fragment[seed] = id;
        let mut queue = VecDeque::from([seed]);
        while let Some(atom) = queue.pop_front() {
            for &neighbor in &adjacency[atom] {
                if atom_fragment[neighbor] == usize::MAX && !is_rotatable(atom, neighbor) {
                    atom_fragment[neighbor] = id;
                    atoms.push(neighbor);
                    queue.push_back(neighbor);
                }
            }
        }
        atoms.sort_unstable();
        atoms
    };

    // Breadth-first discovery; fragment ids here are discovery order.
    let root_atoms = flood(root_atom, 0, &mut atom_fragment);
    let mut discovered: Vec<DiscoveredFragment> = Vec::new();
    let mut queue = VecDeque::from([(0usize, root_atoms.clone(), 0usize)]);
    while let Some((fragment_id, atoms, depth)) = queue.pop_front() {
        let mut exits: Vec<(usize, usize)> = atoms
            .iter()
            .flat_map(|&a| adjacency[a].iter().map(move |&b| (a, b)))
            .filter(|&(a, b)| is_rotatable(a, b) && atom_fragment[b] == usize::MAX)
            .collect();
        exits.sort_unstable();
        for (parent_atom, child_atom) in exits {
            if atom_fragment[child_atom] != usize::MAX {
                continue;
            }
            let id = discovered.len() + 1;
            let child_atoms = flood(child_atom, id, &mut atom_fragment);
            discovered.push(DiscoveredFragment {
                atoms: child_atoms.clone(),
                parent_fragment: fragment_id,
                parent_atom,
                child_atom,
                depth,
            });
            queue.push_back((id, child_atoms, depth + 1));
        }
    }

    // Processing order: by depth, then by the bond's atoms.
    let mut order: Vec<usize> = (0..discovered.len()).collect();
    order.sort_by_key(|&i| {
        let d = &discovered[i];
        (d.depth, d.parent_atom, d.child_atom)
    });
    // Discovery id (1-based) -> final fragment index.
    let mut final_index = vec![0usize; discovered.len() + 1];
    for (position, &i) in order.iter().enumerate() {
        final_index[i + 1] = position + 1;
    }

    let mut fragments = vec![Fragment {
        atoms: root_atoms,
        parent_bond: None,
        child_bonds: Vec::new(),
    }];
    let mut bonds = Vec::with_capacity(order.len());
    for (bond_index, &i) in order.iter().enumerate() {
        let d = &discovered[i];
        let parent_fragment = final_index[d.parent_fragment];
        let parent_bond = fragments[parent_fragment].parent_bond;
        fragments[parent_fragment].child_bonds.push(bond_index);
        fragments.push(Fragment {
            atoms: d.atoms.clone(),
            parent_bond: Some(bond_index),
            child_bonds: Vec::new(),
        });
        bonds.push(RotatableBond {
            parent_atom: d.parent_atom,
            child_atom: d.child_atom,
            child_fragment: bond_index + 1,
            parent_bond,
            depth: d.depth,
            moving_atoms: Vec::new(),
            range_degrees: FULL_ROTATION,
            dihedral_atoms: dihedral_reference(ligand, d.parent_atom, d.child_atom),
        });
    }
    for fragment in &mut atom_fragment {
        *fragment = final_index[*fragment];
    }

    // Deeper bonds come later, so accumulating in reverse sees children first.
    for bond_index in (0..bonds.len()).rev() {
        let mut moving = fragments[bonds[bond_index].child_fragment].atoms.clone();
        for &child in &fragments[bonds[bond_index].child_fragment].child_bonds {
            moving.extend_from_slice(&bonds[child].moving_atoms);
        }
        moving.sort_unstable();
        bonds[bond_index].moving_atoms = moving;
    }

    Ok(LigandTopology {
        root_atom,
        fragments,
        bonds,
        atom_fragment,
    })
}

fn central_heavy_atom(ligand: &Ligand, graph: &UnGraph<usize, ()>, nodes: &[NodeIndex]) -> usize {
    let heavy: Vec<usize> = (0..ligand.len()).filter(|&i| ligand.is_heavy(i)).collect();
    let candidates = if heavy.is_empty() {
        (0..ligand.len()).collect()
    } else {
        heavy
    };

    let mut best = (usize::MAX, candidates[0]);
    for &atom in &candidates {
        let distances = dijkstra(graph, nodes[atom], None, |_| 1usize);
        let eccentricity = candidates
            .iter()
            .filter_map(|&other| distances.get(&nodes[other]).copied())
            .max()
            .unwrap_or(0);
        if eccentricity < best.0 {
            best = (eccentricity, atom);
        }
    }
    best.1
}

fn heavy_neighbor_other_than(ligand: &Ligand, atom: usize, excluded: usize) -> Option<usize> {
    ligand.adjacency()[atom]
        .iter()
        .copied()
        .find(|&n| n != excluded && ligand.is_heavy(n))
}

/// Bonds (as sorted index pairs) that can be sampled.
///
/// A bond is rotatable when its order allows rotation, it is not part of a ring
/// and both of its atoms carry at least one other heavy-atom neighbour.
fn find_rotatable_bonds(
    ligand: &Ligand,
    graph: &UnGraph<usize, ()>,
    nodes: &[NodeIndex],
) -> Vec<(usize, usize)> {
    let mut rotatable = Vec::new();
    for &(a, b, order) in ligand.bonds() {
        if !order.allows_rotation() || !ligand.is_heavy(a) || !ligand.is_heavy(b) {
            continue;
        }
        if heavy_neighbor_other_than(ligand, a, b).is_none()
            || heavy_neighbor_other_than(ligand, b, a).is_none()
        {
            continue;
        }
        let Some(edge) = graph.find_edge(nodes[a], nodes[b]) else {
            continue;
        };
        let without_bond = EdgeFiltered::from_fn(graph, |e| e.id() != edge);
        if has_path_connecting(&without_bond, nodes[a], nodes[b], None) {
            continue;
        }
        rotatable.push((a, b));
    }
    rotatable
}

fn dihedral_reference(ligand: &Ligand, parent_atom: usize, child_atom: usize) -> [usize; 4] {
    let a = heavy_neighbor_other_than(ligand, parent_atom, child_atom).unwrap_or(parent_atom);
    let d = heavy_neighbor_other_than(ligand, child_atom, parent_atom).unwrap_or(child_atom);
    [a, parent_atom, child_atom, d]
}
