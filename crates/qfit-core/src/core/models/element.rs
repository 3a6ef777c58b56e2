use phf::phf_map;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Chemical elements recognised in ligand and receptor structures.
///
/// Only the elements that commonly occur in crystallographic models of
/// ligand-bound proteins are listed; anything else parses as
/// [`Element::Unknown`] through [`Element::from_symbol_lossy`] and falls back to
/// carbon-like parameters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Element {
    H,
    B,
    C,
    N,
    O,
    F,
    Na,
    Mg,
    P,
    S,
    Cl,
    K,
    Ca,
    Mn,
    Fe,
    Co,
    Ni,
    Cu,
    Zn,
    Se,
    Br,
    I,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ElementData {
    element: Element,
    atomic_number: u8,
    /// Bondi van der Waals radius in Angstroms.
    vdw_radius: f64,
    /// Single-bond covalent radius in Angstroms.
    covalent_radius: f64,
}

const UNKNOWN_DATA: ElementData = ElementData {
    element: Element::Unknown,
    atomic_number: 6,
    vdw_radius: 1.70,
    covalent_radius: 0.76,
};

static ELEMENT_TABLE: phf::Map<&'static str, ElementData> = phf_map! {
    "H" => ElementData { element: Element::H, atomic_number: 1, vdw_radius: 1.20, covalent_radius: 0.31 },
    "D" => ElementData { element: Element::H, atomic_number: 1, vdw_radius: 1.20, covalent_radius: 0.31 },
    "B" => ElementData { element: Element::B, atomic_number: 5, vdw_radius: 1.92, covalent_radius: 0.84 },
    "C" => ElementData { element: Element::C, atomic_number: 6, vdw_radius: 1.70, covalent_radius: 0.76 },
    "N" => ElementData { element: Element::N, atomic_number: 7, vdw_radius: 1.55, covalent_radius: 0.71 },
    "O" => ElementData { element: Element::O, atomic_number: 8, vdw_radius: 1.52, covalent_radius: 0.66 },
    "F" => ElementData { element: Element::F, atomic_number: 9, vdw_radius: 1.47, covalent_radius: 0.57 },
    "NA" => ElementData { element: Element::Na, atomic_number: 11, vdw_radius: 2.27, covalent_radius: 1.66 },
    "MG" => ElementData { element: Element::Mg, atomic_number: 12, vdw_radius: 1.73, covalent_radius: 1.41 },
    "P" => ElementData { element: Element::P, atomic_number: 15, vdw_radius: 1.80, covalent_radius: 1.07 },
    "S" => ElementData { element: Element::S, atomic_number: 16, vdw_radius: 1.80, covalent_radius: 1.05 },
    "CL" => ElementData { element: Element::Cl, atomic_number: 17, vdw_radius: 1.75, covalent_radius: 1.02 },
    "K" => ElementData { element: Element::K, atomic_number: 19, vdw_radius: 2.75, covalent_radius: 2.03 },
    "CA" => ElementData { element: Element::Ca, atomic_number: 20, vdw_radius: 2.31, covalent_radius: 1.76 },
    "MN" => ElementData { element: Element::Mn, atomic_number: 25, vdw_radius: 2.00, covalent_radius: 1.39 },
    "FE" => ElementData { element: Element::Fe, atomic_number: 26, vdw_radius: 2.00, covalent_radius: 1.32 },
    "CO" => ElementData { element: Element::Co, atomic_number: 27, vdw_radius: 2.00, covalent_radius: 1.26 },
    "NI" => ElementData { element: Element::Ni, atomic_number: 28, vdw_radius: 1.63, covalent_radius: 1.24 },
    "CU" => ElementData { element: Element::Cu, atomic_number: 29, vdw_radius: 1.40, covalent_radius: 1.32 },
    "ZN" => ElementData { element: Element::Zn, atomic_number: 30, vdw_radius: 1.39, covalent_radius: 1.22 },
    "SE" => ElementData { element: Element::Se, atomic_number: 34, vdw_radius: 1.90, covalent_radius: 1.20 },
    "BR" => ElementData { element: Element::Br, atomic_number: 35, vdw_radius: 1.85, covalent_radius: 1.20 },
    "I" => ElementData { element: Element::I, atomic_number: 53, vdw_radius: 1.98, covalent_radius: 1.39 },
};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unrecognised element symbol '{0}'")]
pub struct ParseElementError(pub String);

impl Element {
    pub fn symbol(self) -> &'static str {
        match self {
            Element::H => "H",
            Element::B => "B",
            Element::C => "C",
            Element::N => "N",
            Element::O => "O",
            Element::F => "F",
            Element::Na => "NA",
            Element::Mg => "MG",
            Element::P => "P",
            Element::S => "S",
            Element::Cl => "CL",
            Element::K => "K",
            Element::Ca => "CA",
            Element::Mn => "MN",
            Element::Fe => "FE",
            Element::Co => "CO",
            Element::Ni => "NI",
            Element::Cu => "CU",
            Element::Zn => "ZN",
            Element::Se => "SE",
            Element::Br => "BR",
            Element::I => "I",
            Element::Unknown => "X",
        }
    }

    fn data(self) -> &'static ElementData {
        ELEMENT_TABLE.get(self.symbol()).unwrap_or(&UNKNOWN_DATA)
    }

    /// Parses a symbol, falling back to [`Element::Unknown`] for anything unrecognised.
    pub fn from_symbol_lossy(symbol: &str) -> Self {
        symbol.parse().unwrap_or_default()
    }

    /// Guesses the element from a PDB atom name when the element columns are blank.
    ///
    /// Chlorine and bromine are the only two-letter elements recognised here; names
    /// such as `CA` or `NE` denote carbon and nitrogen positions in PDB files.
    pub fn from_atom_name(name: &str) -> Self {
        let letters: String = name
            .trim()
            .chars()
            .skip_while(|c| c.is_ascii_digit())
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();
        if letters.is_empty() {
            return Element::Unknown;
        }
        let first = &letters[..1];
        if letters.len() >= 2 {
            let two = &letters[..2];
            if matches!(two.to_ascii_uppercase().as_str(), "CL" | "BR") {
                return Element::from_symbol_lossy(two);
            }
        }
        Element::from_symbol_lossy(first)
    }

    pub fn atomic_number(self) -> u8 {
        self.data().atomic_number
    }

    pub fn vdw_radius(self) -> f64 {
        self.data().vdw_radius
    }

    pub fn covalent_radius(self) -> f64 {
        self.data().covalent_radius
    }

    pub fn is_hydrogen(self) -> bool {
        self == Element::H
    }
}

impl FromStr for Element {
    type Err = ParseElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_uppercase();
        ELEMENT_TABLE
            .get(key.as_str())
            .map(|data| data.element)
            .ok_or_else(|| ParseElementError(s.to_string()))
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = self.symbol();
        let mut chars = symbol.chars();
        match (chars.next(), chars.next()) {
            (Some(first), Some(second)) => write!(f, "{}{}", first, second.to_ascii_lowercase()),
            _ => write!(f, "{}", symbol),
        }
    }
}
