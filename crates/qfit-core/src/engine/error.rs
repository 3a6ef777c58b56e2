use thiserror::Error;

use super::config::ConfigError;
use crate::core::models::ligand::LigandError;
use crate::core::topology::TopologyError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    #[error("No occupancy assignment satisfies the constraints")]
    Infeasible,

    #[error("Search limit reached after {nodes} nodes")]
    Timeout { nodes: usize },

    #[error("Numerical failure: {0}")]
    Numerical(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {source}")]
    Configuration {
        #[from]
        source: ConfigError,
    },

    #[error("Ligand topology error: {source}")]
    Topology {
        #[from]
        source: TopologyError,
    },

    #[error("Ligand error: {source}")]
    Ligand {
        #[from]
        source: LigandError,
    },

    #[error("Every candidate clashed at level {level} (first bond {bond})")]
    BuildExhaustion { level: usize, bond: usize },

    #[error("No map grid points lie within the mask around the conformers")]
    EmptyMask,

    #[error("Selection failed: {source}")]
    Solver {
        #[from]
        source: SolverError,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
