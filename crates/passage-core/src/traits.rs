//! Seams to the external data layer.
//!
//! The core never opens a database or a file itself. A [`WatershedSource`]
//! hands it materialized segments and barriers; a [`ResultSink`] receives
//! what it computed.

use crate::barrier::Barrier;
use crate::ids::{BarrierId, GroupId, SpeciesCode};
use crate::output::{GroupAssignment, RankRecord};
use crate::segment::StreamSegment;
use std::collections::BTreeMap;
use std::convert::Infallible;

/// Supplies network and barrier data for a watershed.
pub trait WatershedSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// All segments of the watershed.
    fn load_segments(&self, watershed: &str) -> Result<Vec<StreamSegment>, Self::Error>;

    /// All barriers of the watershed with passability for `species`.
    fn load_barriers(
        &self,
        watershed: &str,
        species: &SpeciesCode,
    ) -> Result<Vec<Barrier>, Self::Error>;

    /// Total habitat length for a species. Defaults to summing segments.
    fn total_habitat_length(
        &self,
        watershed: &str,
        species: &SpeciesCode,
    ) -> Result<f64, Self::Error> {
        Ok(self
            .load_segments(watershed)?
            .iter()
            .map(|segment| segment.habitat_length(species))
            .sum())
    }
}

/// Receives computed values for persistence.
pub trait ResultSink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn write_dci(
        &mut self,
        barrier: &BarrierId,
        species: &SpeciesCode,
        value: f64,
    ) -> Result<(), Self::Error>;

    /// Groups depend on species-weighted gains, so they are keyed per species.
    fn write_group(
        &mut self,
        barrier: &BarrierId,
        species: &SpeciesCode,
        group: &GroupAssignment,
    ) -> Result<(), Self::Error>;

    fn write_ranks(
        &mut self,
        barrier: &BarrierId,
        species: &SpeciesCode,
        ranks: &RankRecord,
    ) -> Result<(), Self::Error>;
}

type Key = (SpeciesCode, BarrierId);

/// Sink that keeps everything in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub dci: BTreeMap<Key, f64>,
    pub groups: BTreeMap<Key, GroupAssignment>,
    pub ranks: BTreeMap<Key, RankRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_of(&self, species: &SpeciesCode, barrier: &BarrierId) -> Option<GroupId> {
        self.groups
            .get(&(species.clone(), barrier.clone()))
            .map(|assignment| assignment.group)
    }
}

impl ResultSink for MemorySink {
    type Error = Infallible;

    fn write_dci(
        &mut self,
        barrier: &BarrierId,
        species: &SpeciesCode,
        value: f64,
    ) -> Result<(), Self::Error> {
        self.dci.insert((species.clone(), barrier.clone()), value);
        Ok(())
    }

    fn write_group(
        &mut self,
        barrier: &BarrierId,
        species: &SpeciesCode,
        group: &GroupAssignment,
    ) -> Result<(), Self::Error> {
        self.groups
            .insert((species.clone(), barrier.clone()), group.clone());
        Ok(())
    }

    fn write_ranks(
        &mut self,
        barrier: &BarrierId,
        species: &SpeciesCode,
        ranks: &RankRecord,
    ) -> Result<(), Self::Error> {
        self.ranks.insert((species.clone(), barrier.clone()), *ranks);
        Ok(())
    }
}
