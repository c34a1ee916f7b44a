//! Error types for a connectivity analysis run.
//!
//! Both kinds abort the run for the (watershed, species) pair they occur in.
//! Cycles found while walking the network are not errors: walks truncate and
//! report them instead.

use crate::ids::{BarrierId, SegmentId, SpeciesCode};
use thiserror::Error;

/// Problems with the data handed to the core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputDataError {
    #[error("passability {value} for species '{species}' on barrier {barrier} is outside [0, 1]")]
    PassabilityOutOfRange {
        barrier: BarrierId,
        species: SpeciesCode,
        value: f64,
    },

    #[error("total habitat length for species '{species}' is {total}; connectivity is undefined")]
    NonPositiveHabitat { species: SpeciesCode, total: f64 },

    #[error("{entity} '{id}' is missing required attribute '{attribute}'")]
    MissingAttribute {
        entity: &'static str,
        id: String,
        attribute: &'static str,
    },

    #[error("segment {segment} has invalid length {length}")]
    InvalidLength { segment: SegmentId, length: f64 },

    #[error("duplicate segment id {0}")]
    DuplicateSegment(SegmentId),

    #[error("duplicate barrier id {0}")]
    DuplicateBarrier(BarrierId),

    #[error("{referenced_by} references unknown segment {segment}")]
    UnknownSegment {
        referenced_by: String,
        segment: SegmentId,
    },

    #[error("{referenced_by} references unknown barrier {barrier}")]
    UnknownBarrier {
        referenced_by: String,
        barrier: BarrierId,
    },
}

/// Fatal outcome of a per-species analysis.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("invalid input data: {0}")]
    InputData(#[from] InputDataError),

    #[error("barrier grouping did not converge within {bound} iterations (ran {iterations})")]
    Convergence { iterations: usize, bound: usize },
}

impl AnalysisError {
    /// Short machine-friendly label for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InputData(_) => "input_data",
            AnalysisError::Convergence { .. } => "convergence",
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
