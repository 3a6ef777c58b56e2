use super::element::Element;
use super::ids::AtomId;
use super::structure::Structure;
use super::topology::BondOrder;
use nalgebra::Point3;
use std::collections::HashMap;
use thiserror::Error;

/// Distance slack added to covalent radii when a ligand file carries no bonds.
pub const BOND_INFERENCE_TOLERANCE: f64 = 0.45;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LigandError {
    #[error("Ligand contains no atoms")]
    Empty,
    #[error("Conformer has {actual} coordinates but the ligand has {expected} atoms")]
    CoordinateCount { expected: usize, actual: usize },
}

/// A single ligand molecule in index space.
///
/// The engine works with flat arrays (`positions[i]`, `elements[i]`,
/// `adjacency[i]`) so that candidates can be cloned and shared cheaply across
/// worker threads; the originating [`Structure`] is kept as the template used to
/// write conformers back out.
#[derive(Debug, Clone)]
pub struct Ligand {
    structure: Structure,
    atom_ids: Vec<AtomId>,
    names: Vec<String>,
    elements: Vec<Element>,
    positions: Vec<Point3<f64>>,
    adjacency: Vec<Vec<usize>>,
    bonds: Vec<(usize, usize, BondOrder)>,
}

impl Ligand {
    /// Builds a ligand from a structure.
    ///
    /// Only the primary conformer is kept: atoms with an alternate location other
    /// than blank or the first one encountered are dropped. When the structure
    /// carries no bonds at all, bonds are inferred from covalent radii.
    pub fn from_structure(structure: &Structure) -> Result<Self, LigandError> {
        let primary_alt_loc = structure
            .atoms_iter()
            .find_map(|(_, atom)| atom.alt_loc);

        let mut template = Structure::new();
        for line in structure.header_lines() {
            template.push_header_line(line.clone());
        }
        let mut id_map = HashMap::new();
        for (id, atom) in structure.atoms_iter() {
            if atom.alt_loc.is_some() && atom.alt_loc != primary_alt_loc {
                continue;
            }
            let mut atom = atom.clone();
            atom.alt_loc = None;
            id_map.insert(id, template.add_atom(atom));
        }
        if template.is_empty() {
            return Err(LigandError::Empty);
        }
        for bond in structure.bonds() {
            if let (Some(&a), Some(&b)) = (id_map.get(&bond.atom1_id), id_map.get(&bond.atom2_id)) {
                template.add_bond(a, b, bond.order);
            }
        }
        if template.bonds().is_empty() {
            template.infer_bonds(BOND_INFERENCE_TOLERANCE);
        }

        Ok(Self::index(template))
    }

    fn index(structure: Structure) -> Self {
        let atom_ids = structure.atom_ids().to_vec();
        let index_of: HashMap<AtomId, usize> =
            atom_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let mut names = Vec::with_capacity(atom_ids.len());
        let mut elements = Vec::with_capacity(atom_ids.len());
        let mut positions = Vec::with_capacity(atom_ids.len());
        for (_, atom) in structure.atoms_iter() {
            names.push(atom.name.trim().to_string());
            elements.push(atom.element);
            positions.push(atom.position);
        }

        let mut adjacency = vec![Vec::new(); atom_ids.len()];
        let mut bonds = Vec::with_capacity(structure.bonds().len());
        for bond in structure.bonds() {
            let a = index_of[&bond.atom1_id];
            let b = index_of[&bond.atom2_id];
            adjacency[a].push(b);
            adjacency[b].push(a);
            bonds.push((a.min(b), a.max(b), bond.order));
        }
        for neighbours in &mut adjacency {
            neighbours.sort_unstable();
        }
        bonds.sort_unstable_by_key(|&(a, b, _)| (a, b));

        Self {
            structure,
            atom_ids,
            names,
            elements,
            positions,
            adjacency,
            bonds,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    /// Sorted neighbour indices of every atom.
    pub fn adjacency(&self) -> &[Vec<usize>] {
        &self.adjacency
    }

    /// Bonds as `(lower index, higher index, order)`, sorted.
    pub fn bonds(&self) -> &[(usize, usize, BondOrder)] {
        &self.bonds
    }

    pub fn is_heavy(&self, index: usize) -> bool {
        !self.elements[index].is_hydrogen()
    }

    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.names.iter().position(|n| n == name)
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// Produces the structure written for one selected conformer.
    ///
    /// Every atom gets the given coordinates, occupancy and alternate location;
    /// all other labels come from the input ligand.
    pub fn conformer_structure(
        &self,
        coordinates: &[Point3<f64>],
        occupancy: f64,
        alt_loc: Option<char>,
    ) -> Result<Structure, LigandError> {
        if coordinates.len() != self.len() {
            return Err(LigandError::CoordinateCount {
                expected: self.len(),
                actual: coordinates.len(),
            });
        }
        let mut structure = self.structure.clone();
        for (&id, position) in self.atom_ids.iter().zip(coordinates) {
            if let Some(atom) = structure.atom_mut(id) {
                atom.position = *position;
                atom.occupancy = occupancy;
                atom.alt_loc = alt_loc;
            }
        }
        Ok(structure)
    }
}
