//! Network builder for constructing the stream network from loaded segments.
//!
//! The builder resolves each segment's downstream ids into flow edges.

use crate::graph::{NetworkModel, SegmentIndex};
use passage_core::{InputDataError, SegmentId, StreamSegment};
use std::collections::HashSet;

/// Builds a NetworkModel from segments.
///
/// The builder handles the two-pass process:
/// 1. Add all segments to the graph
/// 2. Resolve downstream ids into flow edges
#[derive(Default)]
pub struct NetworkBuilder {
    network: NetworkModel,
    seen: HashSet<SegmentId>,
}

impl NetworkBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds segments to the network.
    ///
    /// Segments are validated on the way in; a duplicate id is an error.
    pub fn add_segments(
        &mut self,
        segments: impl IntoIterator<Item = StreamSegment>,
    ) -> Result<(), InputDataError> {
        for segment in segments {
            segment.validate()?;
            if !self.seen.insert(segment.id.clone()) {
                return Err(InputDataError::DuplicateSegment(segment.id));
            }
            self.network.add_segment(segment);
        }
        Ok(())
    }

    /// Resolves downstream ids into flow edges.
    ///
    /// Runs after all segments are added so that order in the input does not
    /// matter.
    fn resolve_flows(&mut self) -> Result<(), InputDataError> {
        let mut flows_to_add: Vec<(SegmentIndex, SegmentIndex)> = Vec::new();

        for from in self.network.segment_indexes() {
            let Some(segment) = self.network.get(from) else {
                continue;
            };
            for downstream in &segment.downstream {
                let to = self.network.index_of(downstream).ok_or_else(|| {
                    InputDataError::UnknownSegment {
                        referenced_by: format!("segment {}", segment.id),
                        segment: downstream.clone(),
                    }
                })?;
                if from != to {
                    flows_to_add.push((from, to));
                }
            }
        }

        for (from, to) in flows_to_add {
            self.network.add_flow(from, to);
        }
        Ok(())
    }

    /// Finishes building and returns the network.
    pub fn build(mut self) -> Result<NetworkModel, InputDataError> {
        self.resolve_flows()?;
        Ok(self.network)
    }
}

impl NetworkModel {
    /// Builds a network from a full list of segments.
    pub fn from_segments(
        segments: impl IntoIterator<Item = StreamSegment>,
    ) -> Result<Self, InputDataError> {
        let mut builder = NetworkBuilder::new();
        builder.add_segments(segments)?;
        builder.build()
    }
}
