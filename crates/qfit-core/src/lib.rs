//! # qFit Ligand Core Library
//!
//! Multiconformer modelling of small-molecule ligands against crystallographic
//! electron density: a hierarchical dihedral-sampling builder produces a pool
//! of candidate conformers, and a sparse least-squares selector picks the
//! weighted subset that best explains the map.
//!
//! ## Architectural Philosophy
//!
//! The library keeps a strict three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Structure`, `Ligand`),
//!   the density map and atomic density model, the ligand fragment tree, geometry
//!   helpers, and PDB/CCP4 file I/O.
//!
//! - **[`engine`]: The Logic Core.** The conformer builder with its incremental
//!   density scoring, shared score cache and clash filter, and the selection
//!   optimizer with its pluggable quadratic solver.
//!
//! - **[`workflows`]: The Public API.** Complete procedures (`build`, `select`,
//!   `multiconformer`) that validate configuration, wire the engine together and
//!   report progress.

pub mod core;
pub mod engine;
pub mod workflows;
