//! Stream segments.
//!
//! A segment is one reach of channel between two confluences (or between a
//! confluence and a barrier). Segments arrive from the data layer with their
//! habitat flags and downstream barrier lists already derived; we only read
//! them.

use crate::error::InputDataError;
use crate::ids::{BarrierId, MainstemId, SegmentId, SpeciesCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single reach of the stream network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSegment {
    /// Unique segment id.
    pub id: SegmentId,

    /// Length in kilometres.
    pub length: f64,

    /// Species for which this segment is habitat.
    #[serde(default)]
    pub habitat: BTreeSet<SpeciesCode>,

    /// Every barrier between this segment and the outlet.
    #[serde(default)]
    pub downstream_barriers: Vec<BarrierId>,

    /// Mainstem this segment belongs to, if any.
    #[serde(default)]
    pub mainstem_id: Option<MainstemId>,

    /// Segments this one drains into. Empty at the outlet.
    #[serde(default)]
    pub downstream: Vec<SegmentId>,
}

impl StreamSegment {
    /// Creates a segment with no habitat, barriers or links.
    pub fn new(id: impl Into<SegmentId>, length: f64) -> Self {
        Self {
            id: id.into(),
            length,
            habitat: BTreeSet::new(),
            downstream_barriers: Vec::new(),
            mainstem_id: None,
            downstream: Vec::new(),
        }
    }

    /// Marks the segment as habitat for a species.
    pub fn with_habitat(mut self, species: impl Into<SpeciesCode>) -> Self {
        self.habitat.insert(species.into());
        self
    }

    /// Adds a segment this one drains into. Call twice for a braid.
    pub fn flowing_into(mut self, downstream: impl Into<SegmentId>) -> Self {
        self.downstream.push(downstream.into());
        self
    }

    /// Sets the barriers between this segment and the outlet.
    pub fn with_downstream_barriers<I, B>(mut self, barriers: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<BarrierId>,
    {
        self.downstream_barriers = barriers.into_iter().map(Into::into).collect();
        self
    }

    /// Assigns the segment to a mainstem.
    pub fn on_mainstem(mut self, mainstem: impl Into<MainstemId>) -> Self {
        self.mainstem_id = Some(mainstem.into());
        self
    }

    /// Whether this segment is habitat for the species.
    pub fn is_habitat(&self, species: &SpeciesCode) -> bool {
        self.habitat.contains(species)
    }

    /// Habitat length this segment contributes for the species.
    pub fn habitat_length(&self, species: &SpeciesCode) -> f64 {
        if self.is_habitat(species) {
            self.length
        } else {
            0.0
        }
    }

    /// Checks the attributes the computations rely on.
    pub fn validate(&self) -> Result<(), InputDataError> {
        if self.id.as_str().is_empty() {
            return Err(InputDataError::MissingAttribute {
                entity: "segment",
                id: String::new(),
                attribute: "id",
            });
        }
        if !self.length.is_finite() || self.length < 0.0 {
            return Err(InputDataError::InvalidLength {
                segment: self.id.clone(),
                length: self.length,
            });
        }
        Ok(())
    }
}
