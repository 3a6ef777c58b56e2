//! Electron-density maps on a crystallographic grid and the Gaussian atomic
//! density model used to compare conformers against them.
//!
//! - [`map`] - Unit cell, grid, interpolation and mask regions
//! - [`model`] - Per-atom isotropic Gaussian densities rendered on mask points

pub mod map;
pub mod model;

pub use map::{DensityError, DensityMap, MapStatistics, Region, UnitCell};
pub use model::{AtomicDensityModel, MaskGrid};
