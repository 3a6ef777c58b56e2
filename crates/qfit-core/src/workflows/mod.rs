//! # Workflows Module
//!
//! High-level entry points that tie the [`crate::core`] and [`crate::engine`]
//! layers into complete procedures.
//!
//! ## Overview
//!
//! - **Build Workflow** ([`build`]) - Ligand topology, density scoring setup and the
//!   hierarchical conformer build
//! - **Select Workflow** ([`select`]) - One sparse occupancy selection over a built pool
//! - **Multiconformer Workflow** ([`multiconformer`]) - Build, initial approximate fit
//!   and the exact cardinality sweep in one call
//!
//! Each workflow validates its configuration before doing any work and reports
//! progress through a [`crate::engine::progress::ProgressReporter`].

pub mod build;
pub mod multiconformer;
pub mod select;
