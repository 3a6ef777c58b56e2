use super::atom::{Atom, RecordKind};
use super::element::Element;
use super::ids::AtomId;
use super::topology::{Bond, BondOrder};
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;
use slotmap::{SecondaryMap, SlotMap};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bonds shorter than this are treated as overlapping atoms, not bonds.
const MIN_BOND_DISTANCE: f64 = 0.4;

/// Atom attribute used by [`Structure::select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionAttribute {
    Element,
    Name,
    ResidueName,
    Chain,
    ResidueNumber,
    AltLoc,
    Record,
}

/// Comparison used by [`Structure::select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionOperator {
    Equal,
    NotEqual,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionParseError {
    #[error("Unknown selection attribute '{0}'")]
    Attribute(String),
    #[error("Unknown selection operator '{0}'")]
    Operator(String),
}

impl FromStr for SelectionAttribute {
    type Err = SelectionParseError;

    /// Accepts the short names used on the command line (`e`, `name`, `resn`,
    /// `chain`, `resi`, `altloc`, `record`) and a few long forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "e" | "element" => Ok(Self::Element),
            "name" => Ok(Self::Name),
            "resn" | "resname" => Ok(Self::ResidueName),
            "chain" => Ok(Self::Chain),
            "resi" | "resseq" => Ok(Self::ResidueNumber),
            "altloc" => Ok(Self::AltLoc),
            "record" => Ok(Self::Record),
            other => Err(SelectionParseError::Attribute(other.to_string())),
        }
    }
}

impl FromStr for SelectionOperator {
    type Err = SelectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "==" | "=" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            other => Err(SelectionParseError::Operator(other.to_string())),
        }
    }
}

impl fmt::Display for SelectionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "=="),
            Self::NotEqual => write!(f, "!="),
        }
    }
}

/// A collection of atoms and the bonds between them.
///
/// Atoms are stored in a slot map for stable IDs and additionally kept in
/// insertion order, which is the order they are written back to files.
#[derive(Debug, Clone, Default)]
pub struct Structure {
    /// Primary storage for atoms.
    atoms: SlotMap<AtomId, Atom>,
    /// Atom IDs in file order.
    order: Vec<AtomId>,
    /// List of all bonds in the structure.
    bonds: Vec<Bond>,
    /// Cached adjacency list for bond connectivity, indexed by atom ID.
    bond_adjacency: SecondaryMap<AtomId, Vec<AtomId>>,
    /// Lines preceding the coordinate section (e.g. `CRYST1`), kept for output.
    header_lines: Vec<String>,
}

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn atom(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.get(id)
    }

    pub fn atom_mut(&mut self, id: AtomId) -> Option<&mut Atom> {
        self.atoms.get_mut(id)
    }

    /// Returns an iterator over all atoms in file order.
    pub fn atoms_iter(&self) -> impl Iterator<Item = (AtomId, &Atom)> {
        self.order.iter().map(move |&id| (id, &self.atoms[id]))
    }

    /// Atom IDs in file order.
    pub fn atom_ids(&self) -> &[AtomId] {
        &self.order
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn header_lines(&self) -> &[String] {
        &self.header_lines
    }

    pub fn push_header_line(&mut self, line: String) {
        self.header_lines.push(line);
    }

    /// Positions of all atoms in file order.
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.atoms_iter().map(|(_, atom)| atom.position).collect()
    }

    pub fn add_atom(&mut self, atom: Atom) -> AtomId {
        let atom_id = self.atoms.insert(atom);
        self.bond_adjacency.insert(atom_id, Vec::new());
        self.order.push(atom_id);
        atom_id
    }

    /// Adds a bond between two atoms.
    ///
    /// Adding an existing bond succeeds without creating a duplicate.
    ///
    /// # Return
    ///
    /// Returns `Some(())` if successful, otherwise `None` (an atom is missing or
    /// the two IDs are identical).
    pub fn add_bond(&mut self, atom1_id: AtomId, atom2_id: AtomId, order: BondOrder) -> Option<()> {
        if atom1_id == atom2_id
            || !self.atoms.contains_key(atom1_id)
            || !self.atoms.contains_key(atom2_id)
        {
            return None;
        }

        if let Some(neighbors) = self.bond_adjacency.get(atom1_id) {
            if neighbors.contains(&atom2_id) {
                return Some(());
            }
        }

        self.bonds.push(Bond::new(atom1_id, atom2_id, order));
        self.bond_adjacency[atom1_id].push(atom2_id);
        self.bond_adjacency[atom2_id].push(atom1_id);
        Some(())
    }

    /// Removes an atom together with every bond it takes part in.
    pub fn remove_atom(&mut self, atom_id: AtomId) -> Option<Atom> {
        let atom = self.atoms.remove(atom_id)?;
        self.order.retain(|&id| id != atom_id);
        self.bonds.retain(|bond| !bond.contains(atom_id));

        let neighbors = self.bond_adjacency.remove(atom_id).unwrap_or_default();
        for neighbor_id in neighbors {
            if let Some(adjacency) = self.bond_adjacency.get_mut(neighbor_id) {
                adjacency.retain(|&id| id != atom_id);
            }
        }

        Some(atom)
    }

    pub fn bonded_neighbors(&self, atom_id: AtomId) -> Option<&[AtomId]> {
        self.bond_adjacency.get(atom_id).map(|v| v.as_slice())
    }

    /// Finds the first atom with the given serial number.
    pub fn find_by_serial(&self, serial: usize) -> Option<AtomId> {
        self.atoms_iter()
            .find(|(_, atom)| atom.serial == serial)
            .map(|(id, _)| id)
    }

    /// Infers covalent bonds from interatomic distances.
    ///
    /// Two atoms are bonded when their distance is at most the sum of their
    /// covalent radii plus `tolerance`. Hydrogen-hydrogen pairs are never bonded.
    ///
    /// # Return
    ///
    /// The number of bonds added.
    pub fn infer_bonds(&mut self, tolerance: f64) -> usize {
        if self.order.len() < 2 {
            return 0;
        }

        let points: Vec<[f64; 3]> = self
            .atoms_iter()
            .map(|(_, atom)| [atom.position.x, atom.position.y, atom.position.z])
            .collect();
        let kdtree: KdTree<f64, 3> = (&points).into();

        let max_covalent = self
            .atoms_iter()
            .map(|(_, atom)| atom.element.covalent_radius())
            .fold(0.0_f64, f64::max);
        let search_radius = 2.0 * max_covalent + tolerance;

        let mut new_bonds = Vec::new();
        for (i, &id_i) in self.order.iter().enumerate() {
            let atom_i = &self.atoms[id_i];
            let mut neighbours =
                kdtree.within_unsorted::<SquaredEuclidean>(&points[i], search_radius.powi(2));
            neighbours.sort_unstable_by_key(|n| n.item);

            for neighbour in neighbours {
                let j = neighbour.item as usize;
                if j <= i {
                    continue;
                }
                let id_j = self.order[j];
                let atom_j = &self.atoms[id_j];
                if atom_i.is_hydrogen() && atom_j.is_hydrogen() {
                    continue;
                }
                let cutoff =
                    atom_i.element.covalent_radius() + atom_j.element.covalent_radius() + tolerance;
                let distance = neighbour.distance.sqrt();
                if distance >= MIN_BOND_DISTANCE && distance <= cutoff {
                    new_bonds.push((id_i, id_j));
                }
            }
        }

        let before = self.bonds.len();
        for (a, b) in new_bonds {
            self.add_bond(a, b, BondOrder::Unknown);
        }
        self.bonds.len() - before
    }

    /// Returns a new structure containing the atoms for which
    /// `attribute <operator> value` holds, together with the bonds among them.
    ///
    /// Element values are compared by element (so `"h"` matches hydrogen and
    /// deuterium); all other attributes are compared as trimmed strings.
    pub fn select(
        &self,
        attribute: SelectionAttribute,
        value: &str,
        operator: SelectionOperator,
    ) -> Structure {
        let wanted = value.trim();
        let wanted_element = Element::from_symbol_lossy(wanted);

        let matches = |atom: &Atom| -> bool {
            let equal = match attribute {
                SelectionAttribute::Element => atom.element == wanted_element,
                SelectionAttribute::Name => atom.name.trim() == wanted,
                SelectionAttribute::ResidueName => atom.residue_name.trim() == wanted,
                SelectionAttribute::Chain => atom.chain_id.to_string() == wanted,
                SelectionAttribute::ResidueNumber => atom.residue_number.to_string() == wanted,
                SelectionAttribute::AltLoc => {
                    atom.alt_loc.map(|c| c.to_string()).unwrap_or_default() == wanted
                }
                SelectionAttribute::Record => {
                    RecordKind::from_str(wanted).is_ok_and(|kind| kind == atom.record)
                }
            };
            match operator {
                SelectionOperator::Equal => equal,
                SelectionOperator::NotEqual => !equal,
            }
        };

        let mut selected = Structure {
            header_lines: self.header_lines.clone(),
            ..Structure::default()
        };
        let mut id_map: HashMap<AtomId, AtomId> = HashMap::new();
        for (id, atom) in self.atoms_iter() {
            if matches(atom) {
                id_map.insert(id, selected.add_atom(atom.clone()));
            }
        }
        for bond in &self.bonds {
            if let (Some(&a), Some(&b)) = (id_map.get(&bond.atom1_id), id_map.get(&bond.atom2_id)) {
                selected.add_bond(a, b, bond.order);
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ethanol() -> (Structure, Vec<AtomId>) {
        let mut structure = Structure::new();
        let c1 = structure.add_atom(Atom::new("C1", Element::C, Point3::new(0.0, 0.0, 0.0)));
        let c2 = structure.add_atom(Atom::new("C2", Element::C, Point3::new(1.52, 0.0, 0.0)));
        let o = structure.add_atom(Atom::new("O", Element::O, Point3::new(2.0, 1.35, 0.0)));
        let h = structure.add_atom(Atom::new("HO", Element::H, Point3::new(2.95, 1.3, 0.0)));
        (structure, vec![c1, c2, o, h])
    }

    #[test]
    fn atoms_are_iterated_in_insertion_order() {
        let (structure, ids) = ethanol();
        let names: Vec<_> = structure.atoms_iter().map(|(_, a)| a.name.as_str()).collect();
        assert_eq!(names, vec!["C1", "C2", "O", "HO"]);
        assert_eq!(structure.atom_ids(), ids.as_slice());
        assert_eq!(structure.len(), 4);
    }

    #[test]
    fn add_bond_is_idempotent_and_rejects_self_bonds() {
        let (mut structure, ids) = ethanol();
        assert!(structure.add_bond(ids[0], ids[1], BondOrder::Single).is_some());
        assert!(structure.add_bond(ids[1], ids[0], BondOrder::Single).is_some());
        assert!(structure.add_bond(ids[0], ids[0], BondOrder::Single).is_none());
        assert_eq!(structure.bonds().len(), 1);
        assert_eq!(structure.bonded_neighbors(ids[0]).unwrap(), &[ids[1]]);
    }

    #[test]
    fn infer_bonds_uses_covalent_radii() {
        let (mut structure, ids) = ethanol();
        let added = structure.infer_bonds(0.45);

        assert_eq!(added, 3);
        assert!(structure.bonded_neighbors(ids[1]).unwrap().contains(&ids[0]));
        assert!(structure.bonded_neighbors(ids[1]).unwrap().contains(&ids[2]));
        assert!(structure.bonded_neighbors(ids[2]).unwrap().contains(&ids[3]));
        assert!(!structure.bonded_neighbors(ids[0]).unwrap().contains(&ids[2]));
    }

    #[test]
    fn remove_atom_drops_its_bonds() {
        let (mut structure, ids) = ethanol();
        structure.infer_bonds(0.45);
        let removed = structure.remove_atom(ids[3]).unwrap();

        assert_eq!(removed.name, "HO");
        assert_eq!(structure.len(), 3);
        assert_eq!(structure.bonds().len(), 2);
        assert!(!structure.bonded_neighbors(ids[2]).unwrap().contains(&ids[3]));
    }

    #[test]
    fn select_excludes_hydrogens_and_keeps_internal_bonds() {
        let (mut structure, _) = ethanol();
        structure.infer_bonds(0.45);
        structure.push_header_line("CRYST1".to_string());

        let heavy = structure.select(SelectionAttribute::Element, "H", SelectionOperator::NotEqual);

        assert_eq!(heavy.len(), 3);
        assert!(heavy.atoms_iter().all(|(_, a)| !a.is_hydrogen()));
        assert_eq!(heavy.bonds().len(), 2);
        assert_eq!(heavy.header_lines(), &["CRYST1".to_string()]);
    }

    #[test]
    fn select_by_name_with_equality() {
        let (structure, _) = ethanol();
        let oxygen = structure.select(SelectionAttribute::Name, "O", SelectionOperator::Equal);
        assert_eq!(oxygen.len(), 1);
        assert_eq!(oxygen.atoms_iter().next().unwrap().1.element, Element::O);
    }

    #[test]
    fn selection_terms_parse_from_strings() {
        assert_eq!("e".parse::<SelectionAttribute>(), Ok(SelectionAttribute::Element));
        assert_eq!("resi".parse::<SelectionAttribute>(), Ok(SelectionAttribute::ResidueNumber));
        assert_eq!("!=".parse::<SelectionOperator>(), Ok(SelectionOperator::NotEqual));
        assert!("<".parse::<SelectionOperator>().is_err());
        assert!("mass".parse::<SelectionAttribute>().is_err());
    }
}
