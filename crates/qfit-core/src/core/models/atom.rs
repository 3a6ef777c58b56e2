use super::element::Element;
use nalgebra::Point3;
use std::str::FromStr;

/// The PDB record an atom was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum RecordKind {
    /// Standard polymer atom (`ATOM`).
    Atom,
    /// Hetero atom, used for ligands, waters and ions (`HETATM`).
    #[default]
    Hetatm,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Atom => "ATOM",
            RecordKind::Hetatm => "HETATM",
        }
    }
}

impl FromStr for RecordKind {
    type Err = ();

    /// Parses a record name. Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ATOM" => Ok(RecordKind::Atom),
            "HETATM" => Ok(RecordKind::Hetatm),
            _ => Err(()),
        }
    }
}

/// Represents an atom of a crystallographic model.
///
/// This struct carries the identity of the atom as it appears in a coordinate
/// file (names, residue and chain labels, alternate location) together with the
/// quantities the density and clash calculations need: element, position,
/// occupancy and B-factor.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// The serial number from the coordinate file (0 if the atom was created in memory).
    pub serial: usize,
    /// The name of the atom (e.g., "C1", "O2", "N").
    pub name: String,
    /// The chemical element.
    pub element: Element,
    /// The residue name (e.g., "LIG", "ALA").
    pub residue_name: String,
    /// The single-character chain identifier.
    pub chain_id: char,
    /// The residue sequence number.
    pub residue_number: isize,
    /// The residue insertion code, if any.
    pub insertion_code: Option<char>,
    /// The alternate location indicator, if any.
    pub alt_loc: Option<char>,
    /// The record this atom belongs to.
    pub record: RecordKind,
    /// The 3D coordinates of the atom in Angstroms.
    pub position: Point3<f64>,
    /// The fractional occupancy of this atom.
    pub occupancy: f64,
    /// The isotropic displacement parameter in square Angstroms.
    pub b_factor: f64,
}

impl Atom {
    /// Creates a new `Atom` with default values for the labelling fields.
    ///
    /// The atom is placed in residue `LIG 1` of chain `A` as a `HETATM` with
    /// full occupancy; callers reading from files overwrite these fields.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the atom.
    /// * `element` - The chemical element.
    /// * `position` - The 3D coordinates of the atom.
    pub fn new(name: &str, element: Element, position: Point3<f64>) -> Self {
        Self {
            serial: 0,
            name: name.to_string(),
            element,
            residue_name: "LIG".to_string(),
            chain_id: 'A',
            residue_number: 1,
            insertion_code: None,
            alt_loc: None,
            record: RecordKind::default(),
            position,
            occupancy: 1.0,
            b_factor: 20.0,
        }
    }

    pub fn is_hydrogen(&self) -> bool {
        self.element.is_hydrogen()
    }
}
