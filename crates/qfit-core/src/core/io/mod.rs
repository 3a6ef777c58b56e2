//! Provides input/output functionality for coordinate and density map files.
//!
//! Coordinate formats implement the [`traits::StructureFile`] trait; density
//! maps are handled by [`ccp4::Ccp4File`].

pub mod ccp4;
pub mod pdb;
pub mod traits;
