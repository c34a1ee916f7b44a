//! Habitat upstream of each barrier.
//!
//! Two walks per barrier, both starting at the segment just above it: one to
//! the headwaters (total habitat) and one that stops at the next barrier up
//! (functional habitat, what removing this barrier alone opens up).

use crate::barriers::{BarrierIndex, BarrierSet, PassabilityTable};
use crate::graph::{NetworkModel, SegmentIndex};
use crate::traversal::Truncation;
use passage_core::SpeciesCode;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Upstream aggregates for one barrier and species.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UpstreamHabitat {
    /// Habitat length above the barrier, to the headwaters.
    pub total: f64,
    /// Habitat length above the barrier, up to the next barriers.
    pub functional: f64,
    /// `total × (1 − passability)`.
    pub weighted_total: f64,
    /// `functional × (1 − passability)`.
    pub weighted_functional: f64,
    pub upstream_barriers: usize,
    pub downstream_barriers: usize,
}

/// Upstream aggregates for every barrier of a set.
#[derive(Debug, Clone, PartialEq)]
pub struct HabitatSummary {
    pub species: SpeciesCode,
    pub per_barrier: Vec<UpstreamHabitat>,
    pub truncations: Vec<Truncation>,
}

impl HabitatSummary {
    pub fn get(&self, index: BarrierIndex) -> Option<&UpstreamHabitat> {
        self.per_barrier.get(index)
    }
}

/// Computes [`UpstreamHabitat`] for every barrier.
pub fn summarize_upstream(
    network: &NetworkModel,
    barriers: &BarrierSet,
    table: &PassabilityTable,
) -> HabitatSummary {
    let species = &table.species;

    let mut sites: HashMap<SegmentIndex, Vec<BarrierIndex>> = HashMap::new();
    for (index, entry) in barriers.iter() {
        if let Some(segment) = entry.segment {
            sites.entry(segment).or_default().push(index);
        }
    }

    let mut truncations: Vec<Truncation> = Vec::new();
    let mut per_barrier = Vec::with_capacity(barriers.len());

    for (index, entry) in barriers.iter() {
        let mut habitat = UpstreamHabitat {
            downstream_barriers: entry.downstream.len(),
            ..UpstreamHabitat::default()
        };

        if let Some(origin) = entry.segment {
            let (reached, walk_truncations) = network.walk_upstream(origin).collect_reached();
            truncations.extend(walk_truncations);
            let reached_set: HashSet<SegmentIndex> = reached.iter().copied().collect();

            habitat.total = habitat_length(network, &reached, species);
            habitat.upstream_barriers = barriers
                .iter()
                .filter(|(other, other_entry)| {
                    *other != index
                        && other_entry
                            .segment
                            .is_some_and(|s| s != origin && reached_set.contains(&s))
                })
                .count();

            let next_sites = sites.keys().copied().filter(|&site| site != origin);
            let (functional, walk_truncations) = network
                .walk_upstream(origin)
                .stop_at_any(next_sites)
                .collect_reached();
            truncations.extend(walk_truncations);
            habitat.functional = habitat_length(network, &functional, species);

            let blocked = 1.0 - table.get(index);
            habitat.weighted_total = habitat.total * blocked;
            habitat.weighted_functional = habitat.functional * blocked;
        }

        per_barrier.push(habitat);
    }

    truncations.sort_by(|a, b| {
        a.origin
            .cmp(&b.origin)
            .then_with(|| a.revisited.cmp(&b.revisited))
    });
    truncations.dedup();

    HabitatSummary {
        species: species.clone(),
        per_barrier,
        truncations,
    }
}

fn habitat_length(network: &NetworkModel, segments: &[SegmentIndex], species: &SpeciesCode) -> f64 {
    segments
        .iter()
        .filter_map(|&index| network.get(index))
        .map(|segment| segment.habitat_length(species))
        .sum()
}
