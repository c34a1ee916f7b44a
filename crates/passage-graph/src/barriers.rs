//! The set of barriers placed on a network.

use crate::graph::{NetworkModel, SegmentIndex};
use passage_core::{Barrier, BarrierId, InputDataError, MainstemId, SpeciesCode};
use std::collections::HashMap;
use tracing::debug;

/// Position of a barrier inside a [`BarrierSet`].
pub type BarrierIndex = usize;

/// A barrier with its references resolved against the network.
#[derive(Debug, Clone)]
pub struct BarrierEntry {
    pub barrier: Barrier,
    /// Segment immediately upstream, if the barrier is placed on the network.
    pub segment: Option<SegmentIndex>,
    /// Barriers between this one and the outlet.
    pub downstream: Vec<BarrierIndex>,
}

impl BarrierEntry {
    pub fn id(&self) -> &BarrierId {
        &self.barrier.id
    }
}

/// Passability of every barrier for one species, indexed like the set.
#[derive(Debug, Clone, PartialEq)]
pub struct PassabilityTable {
    pub species: SpeciesCode,
    pub values: Vec<f64>,
    /// Barriers with no recorded value, held at the impassable default.
    pub defaulted: Vec<BarrierIndex>,
}

impl PassabilityTable {
    /// `index` must come from the [`BarrierSet`] that built the table.
    pub(crate) fn get(&self, index: BarrierIndex) -> f64 {
        self.values[index]
    }

    /// Passability of a barrier, if it is in the table.
    pub fn value(&self, index: BarrierIndex) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// Copy with one barrier treated as fully passable.
    pub fn waiving(&self, index: BarrierIndex) -> Self {
        let mut table = self.clone();
        if let Some(value) = table.values.get_mut(index) {
            *value = 1.0;
        }
        table
    }
}

/// Barriers of a watershed, read-only once built.
#[derive(Debug, Default)]
pub struct BarrierSet {
    entries: Vec<BarrierEntry>,
    id_index: HashMap<BarrierId, BarrierIndex>,
}

impl BarrierSet {
    /// Validates barriers and resolves their segment and downstream barrier
    /// references.
    pub fn new(barriers: Vec<Barrier>, network: &NetworkModel) -> Result<Self, InputDataError> {
        let mut id_index = HashMap::with_capacity(barriers.len());
        for (index, barrier) in barriers.iter().enumerate() {
            barrier.validate()?;
            if id_index.insert(barrier.id.clone(), index).is_some() {
                return Err(InputDataError::DuplicateBarrier(barrier.id.clone()));
            }
        }

        let mut entries = Vec::with_capacity(barriers.len());
        for barrier in barriers {
            let segment = match &barrier.stream_id_up {
                Some(id) => Some(network.index_of(id).ok_or_else(|| {
                    InputDataError::UnknownSegment {
                        referenced_by: format!("barrier {}", barrier.id),
                        segment: id.clone(),
                    }
                })?),
                None => None,
            };
            let downstream = resolve(
                &id_index,
                &barrier.downstream_barriers,
                || format!("barrier {}", barrier.id),
            )?;
            entries.push(BarrierEntry {
                barrier,
                segment,
                downstream,
            });
        }

        Ok(Self { entries, id_index })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: BarrierIndex) -> Option<&BarrierEntry> {
        self.entries.get(index)
    }

    pub fn index_of(&self, id: &BarrierId) -> Option<BarrierIndex> {
        self.id_index.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BarrierIndex, &BarrierEntry)> {
        self.entries.iter().enumerate()
    }

    /// Mainstem of the segment the barrier sits below.
    pub fn mainstem_of<'a>(
        &self,
        index: BarrierIndex,
        network: &'a NetworkModel,
    ) -> Option<&'a MainstemId> {
        let segment = self.entries.get(index)?.segment?;
        network.mainstem_of(segment)
    }

    /// Resolves ids (e.g. a segment's downstream barrier list) to indexes.
    pub fn resolve_ids(
        &self,
        ids: &[BarrierId],
        referenced_by: impl Fn() -> String,
    ) -> Result<Vec<BarrierIndex>, InputDataError> {
        resolve(&self.id_index, ids, referenced_by)
    }

    /// Species with passability recorded on any barrier.
    pub fn species(&self) -> Vec<SpeciesCode> {
        let mut species: Vec<SpeciesCode> = self
            .entries
            .iter()
            .flat_map(|entry| entry.barrier.species().cloned())
            .collect();
        species.sort();
        species.dedup();
        species
    }

    /// Passability of every barrier for `species`.
    ///
    /// Missing values default to impassable and are listed in
    /// [`PassabilityTable::defaulted`].
    pub fn passabilities(&self, species: &SpeciesCode) -> Result<PassabilityTable, InputDataError> {
        let mut values = Vec::with_capacity(self.entries.len());
        let mut defaulted = Vec::new();

        for (index, entry) in self.iter() {
            let passability = entry.barrier.passability_for(species)?;
            if passability.is_defaulted() {
                debug!(
                    "No passability for species '{}' on barrier {}; treating as impassable",
                    species,
                    entry.id()
                );
                defaulted.push(index);
            }
            values.push(passability.value());
        }

        Ok(PassabilityTable {
            species: species.clone(),
            values,
            defaulted,
        })
    }
}

fn resolve(
    id_index: &HashMap<BarrierId, BarrierIndex>,
    ids: &[BarrierId],
    referenced_by: impl Fn() -> String,
) -> Result<Vec<BarrierIndex>, InputDataError> {
    ids.iter()
        .map(|id| {
            id_index
                .get(id)
                .copied()
                .ok_or_else(|| InputDataError::UnknownBarrier {
                    referenced_by: referenced_by(),
                    barrier: id.clone(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use passage_core::StreamSegment;

    fn network() -> NetworkModel {
        NetworkModel::from_segments(vec![
            StreamSegment::new("s1", 1.0).on_mainstem("m1"),
            StreamSegment::new("s2", 1.0).flowing_into("s1").on_mainstem("m1"),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolves_segments_and_downstream_barriers() {
        let network = network();
        let set = BarrierSet::new(
            vec![
                Barrier::new("b1").below("s1"),
                Barrier::new("b2").below("s2").with_downstream_barriers(["b1"]),
            ],
            &network,
        )
        .unwrap();

        let b2 = set.index_of(&"b2".into()).unwrap();
        let entry = set.get(b2).unwrap();
        assert_eq!(entry.downstream, vec![set.index_of(&"b1".into()).unwrap()]);
        assert_eq!(entry.segment, network.index_of(&"s2".into()));
        assert_eq!(set.mainstem_of(b2, &network).map(|m| m.as_str()), Some("m1"));
    }

    #[test]
    fn test_unknown_references_rejected() {
        let network = network();

        let unknown_segment = BarrierSet::new(vec![Barrier::new("b1").below("nowhere")], &network);
        assert!(matches!(
            unknown_segment,
            Err(InputDataError::UnknownSegment { .. })
        ));

        let unknown_barrier = BarrierSet::new(
            vec![Barrier::new("b1").with_downstream_barriers(["ghost"])],
            &network,
        );
        assert!(matches!(
            unknown_barrier,
            Err(InputDataError::UnknownBarrier { .. })
        ));
    }

    #[test]
    fn test_duplicate_barrier_rejected() {
        let network = network();
        let result = BarrierSet::new(vec![Barrier::new("b1"), Barrier::new("b1")], &network);

        assert_eq!(result.unwrap_err(), InputDataError::DuplicateBarrier("b1".into()));
    }

    #[test]
    fn test_passability_table_defaults_missing_to_zero() {
        let network = network();
        let set = BarrierSet::new(
            vec![
                Barrier::new("b1").with_passability("as", 0.3),
                Barrier::new("b2").with_passability("ae", 1.0),
            ],
            &network,
        )
        .unwrap();

        let table = set.passabilities(&"as".into()).unwrap();
        assert_eq!(table.values, vec![0.3, 0.0]);
        assert_eq!(table.defaulted, vec![1]);
        assert_eq!(table.waiving(1).get(1), 1.0);
        assert_eq!(set.species(), vec![SpeciesCode::from("ae"), SpeciesCode::from("as")]);
    }

    #[test]
    fn test_out_of_range_passability_fails_fast() {
        let network = network();
        let result = BarrierSet::new(vec![Barrier::new("b1").with_passability("as", -0.1)], &network);

        assert!(matches!(
            result,
            Err(InputDataError::PassabilityOutOfRange { .. })
        ));
    }
}
