//! Computational steps of one build level.
//!
//! A level expands every parent candidate over the dihedral grid of its bonds
//! ([`expansion`]), optionally refines the survivors ([`local_search`]) and
//! keeps the best of them ([`pruning`]).

pub mod expansion;
pub mod local_search;
pub mod pruning;
