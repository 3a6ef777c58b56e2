//! # Engine Module
//!
//! The stateful algorithms behind multiconformer ligand modelling: the
//! hierarchical conformer builder and the sparse occupancy selector.
//!
//! ## Overview
//!
//! Building walks the ligand's fragment tree from the root. Each level samples
//! the dihedrals of the next rotatable bonds on every surviving candidate,
//! rejects clashing children, scores the rest against the density map, refines
//! them by local search and keeps the best. Selection then fits a weighted,
//! sparse combination of the pool's model densities to the observed map.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Validated build, selection and solver settings
//! - **Candidate State** ([`state`]) - Conformers, the active atom set and per-level counters
//! - **Density Scoring** ([`scoring`]) - Incremental per-fragment fit with a shared [`cache`]
//! - **Clash Filter** ([`clash`]) - Receptor and intra-ligand steric checks
//! - **Builder** ([`builder`]) - Level loop over the [`tasks`] (expansion, local search, pruning)
//! - **Selection** ([`selection`]) - Design matrix, relaxation and branch-and-bound
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - Engine and solver error types
//!
//! ## Concurrency
//!
//! With the `parallel` feature, candidate expansion, local search and model
//! rendering fan out over rayon. Results are collected in input order and
//! pruned with a stable sort, so pools do not depend on the thread count.

pub mod builder;
pub mod cache;
pub mod clash;
pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod scoring;
pub mod selection;
pub mod state;
pub(crate) mod tasks;
pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod fixtures;
