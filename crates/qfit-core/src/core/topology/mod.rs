//! # Topology Module
//!
//! Turns a ligand's bond graph into the tree the conformer builder walks: a
//! root fragment plus rigid fragments hanging off rotatable bonds.
//!
//! ## Overview
//!
//! - **Rotatable bonds** - single (or unspecified) acyclic bonds between two
//!   heavy atoms that each carry another heavy neighbour
//! - **Fragments** - connected components left after cutting rotatable bonds
//! - **Processing order** - breadth-first from the root fragment, so every
//!   bond is sampled after the bond above it
//!
//! ## Usage
//!
//! ```ignore
//! use qfit::core::topology::build_tree;
//!
//! let topology = build_tree(&ligand, None)?;
//! for bond in topology.bonds() {
//!     println!("{} -> {} moves {} atoms", bond.parent_atom, bond.child_atom, bond.moving_atoms.len());
//! }
//! ```

pub mod tree;

pub use tree::{Fragment, LigandTopology, RotatableBond, TopologyError, build_tree};
