//! # Core Models Module
//!
//! Data structures for the molecules handled by qFit-ligand: the receptor and
//! ligand structures read from PDB files and the indexed ligand view used by the
//! conformer builder.
//!
//! ## Key Components
//!
//! - [`atom`] - Atom records with coordinates, labels, occupancy and B-factor
//! - [`element`] - Chemical elements with scattering weights and radii
//! - [`structure`] - Atom collection with bonds, selections and bond inference
//! - [`ligand`] - A single ligand molecule in flat index space
//! - [`topology`] - Bond orders and bond records
//! - [`ids`] - Unique identifier types for atoms
//!
//! ## Usage
//!
//! ```ignore
//! use qfit::core::models::{ligand::Ligand, structure::Structure};
//!
//! let structure = PdbFile::read_from_path("ligand.pdb")?;
//! let ligand = Ligand::from_structure(&structure)?;
//! println!("{} atoms, {} bonds", ligand.len(), ligand.bonds().len());
//! ```

pub mod atom;
pub mod element;
pub mod ids;
pub mod ligand;
pub mod structure;
pub mod topology;
