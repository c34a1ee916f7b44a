//! Core network data structure.
//!
//! The NetworkModel wraps petgraph and adds indexes for id and mainstem
//! lookups. Edges point in the direction of flow: from a segment to the
//! segment it drains into.

use passage_core::{MainstemId, SegmentId, SpeciesCode, StreamSegment};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index of a segment in the network graph.
pub type SegmentIndex = NodeIndex;

/// A watershed's stream network.
#[derive(Debug, Default)]
pub struct NetworkModel {
    pub(crate) graph: DiGraph<StreamSegment, ()>,

    /// Maps segment ids to graph node indexes.
    id_index: HashMap<SegmentId, SegmentIndex>,

    /// Maps mainstem ids to their segments.
    mainstem_index: HashMap<MainstemId, Vec<SegmentIndex>>,
}

impl NetworkModel {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a segment. Links are added separately with [`add_flow`].
    ///
    /// [`add_flow`]: NetworkModel::add_flow
    pub(crate) fn add_segment(&mut self, segment: StreamSegment) -> SegmentIndex {
        let id = segment.id.clone();
        let mainstem = segment.mainstem_id.clone();

        let index = self.graph.add_node(segment);

        self.id_index.insert(id, index);
        if let Some(mainstem) = mainstem {
            self.mainstem_index.entry(mainstem).or_default().push(index);
        }

        index
    }

    /// Records that `from` drains into `to`.
    pub(crate) fn add_flow(&mut self, from: SegmentIndex, to: SegmentIndex) {
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Gets a segment by its graph index.
    pub fn get(&self, index: SegmentIndex) -> Option<&StreamSegment> {
        self.graph.node_weight(index)
    }

    /// Gets a segment by id.
    pub fn get_by_id(&self, id: &SegmentId) -> Option<&StreamSegment> {
        let index = self.id_index.get(id)?;
        self.graph.node_weight(*index)
    }

    /// Gets the graph index for a segment id.
    pub fn index_of(&self, id: &SegmentId) -> Option<SegmentIndex> {
        self.id_index.get(id).copied()
    }

    /// Segments `index` drains into.
    pub fn downstream_of(&self, index: SegmentIndex) -> impl Iterator<Item = SegmentIndex> + '_ {
        self.graph.neighbors_directed(index, Direction::Outgoing)
    }

    /// Segments draining into `index`.
    pub fn upstream_of(&self, index: SegmentIndex) -> impl Iterator<Item = SegmentIndex> + '_ {
        self.graph.neighbors_directed(index, Direction::Incoming)
    }

    /// Segments with no downstream link.
    pub fn outlets(&self) -> impl Iterator<Item = SegmentIndex> + '_ {
        self.graph.node_indices().filter(move |&index| {
            self.graph
                .neighbors_directed(index, Direction::Outgoing)
                .next()
                .is_none()
        })
    }

    /// Segments on a mainstem.
    pub fn mainstem(&self, id: &MainstemId) -> &[SegmentIndex] {
        self.mainstem_index
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Mainstem of the segment at `index`.
    pub fn mainstem_of(&self, index: SegmentIndex) -> Option<&MainstemId> {
        self.get(index)?.mainstem_id.as_ref()
    }

    /// Sum of segment lengths flagged as habitat for the species.
    pub fn total_habitat_length(&self, species: &SpeciesCode) -> f64 {
        self.segments()
            .map(|segment| segment.habitat_length(species))
            .sum()
    }

    /// Returns the number of segments.
    pub fn segment_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of flow links.
    pub fn flow_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterates over all segments.
    pub fn segments(&self) -> impl Iterator<Item = &StreamSegment> {
        self.graph.node_weights()
    }

    /// Iterates over all segment indexes.
    pub fn segment_indexes(&self) -> impl Iterator<Item = SegmentIndex> + '_ {
        self.graph.node_indices()
    }
}

/// Network statistics for status output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub segment_count: usize,
    pub flow_count: usize,
    pub mainstems: usize,
    pub outlets: usize,
    pub total_length: f64,
}

impl NetworkModel {
    /// Returns network statistics.
    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            segment_count: self.segment_count(),
            flow_count: self.flow_count(),
            mainstems: self.mainstem_index.len(),
            outlets: self.outlets().count(),
            total_length: self.segments().map(|segment| segment.length).sum(),
        }
    }
}
