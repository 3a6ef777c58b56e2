//! # Core Module
//!
//! Stateless building blocks for multiconformer ligand modelling: molecular
//! data models, the crystallographic density map, the ligand fragment tree,
//! geometry helpers and file I/O.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - Atoms, elements, structures and the indexed ligand
//! - **Electron Density** ([`density`]) - Unit cell, gridded maps and the atomic density model
//! - **Ligand Topology** ([`topology`]) - Rigid fragments and rotatable bonds
//! - **File I/O** ([`io`]) - PDB coordinates and CCP4/MRC density maps
//! - **Geometry** ([`utils`]) - Rotations about bonds, dihedrals and RMSD
//!
//! Nothing in this layer holds global state; the [`crate::engine`] layer
//! combines these pieces into the build and selection algorithms.

pub mod density;
pub mod io;
pub mod models;
pub mod topology;
pub mod utils;
