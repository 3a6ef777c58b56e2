use super::ids::AtomId;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BondOrder {
    #[default]
    Single,
    Double,
    Triple,
    Aromatic,
    /// Connectivity known (e.g. from CONECT or distance inference) but order not.
    Unknown,
}

impl BondOrder {
    /// Whether rotation about a bond of this order is physically meaningful.
    ///
    /// Bonds of unknown order are treated as single bonds; ring membership is
    /// what rules most of them out.
    pub fn allows_rotation(self) -> bool {
        matches!(self, BondOrder::Single | BondOrder::Unknown)
    }
}

#[derive(Debug, Error)]
#[error("Invalid bond order string")]
pub struct ParseBondOrderError;

impl FromStr for BondOrder {
    type Err = ParseBondOrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "s" | "single" => Ok(Self::Single),
            "2" | "d" | "double" => Ok(Self::Double),
            "3" | "t" | "triple" => Ok(Self::Triple),
            "ar" | "aromatic" => Ok(Self::Aromatic),
            "?" | "unknown" => Ok(Self::Unknown),
            _ => Err(ParseBondOrderError),
        }
    }
}

impl fmt::Display for BondOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Single => "Single",
                Self::Double => "Double",
                Self::Triple => "Triple",
                Self::Aromatic => "Aromatic",
                Self::Unknown => "Unknown",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bond {
    pub atom1_id: AtomId,
    pub atom2_id: AtomId,
    pub order: BondOrder,
}

impl Bond {
    pub fn new(atom1_id: AtomId, atom2_id: AtomId, order: BondOrder) -> Self {
        Self {
            atom1_id,
            atom2_id,
            order,
        }
    }

    pub fn contains(&self, atom_id: AtomId) -> bool {
        self.atom1_id == atom_id || self.atom2_id == atom_id
    }

    /// Returns the partner of `atom_id` in this bond, if `atom_id` is part of it.
    pub fn other(&self, atom_id: AtomId) -> Option<AtomId> {
        if self.atom1_id == atom_id {
            Some(self.atom2_id)
        } else if self.atom2_id == atom_id {
            Some(self.atom1_id)
        } else {
            None
        }
    }
}
