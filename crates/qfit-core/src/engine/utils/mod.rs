//! Helper functions for the engine module.
//!
//! Currently the dihedral sampling grids used by the conformer builder.

pub mod sampling;
