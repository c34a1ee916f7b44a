//! Upstream and downstream walks over the stream network.
//!
//! Walks are breadth-first over the adjacency already held by the
//! [`NetworkModel`]; nothing recurses. A visited set keeps every segment to
//! one visit. Reaching a visited segment again is normal where a braided
//! channel splits and rejoins; it is a cycle only when the segment being
//! expanded can itself be reached from the revisited one. Only then is a
//! [`Truncation`] recorded.

use crate::graph::{NetworkModel, SegmentIndex};
use passage_core::SegmentId;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use tracing::warn;

/// Direction of a walk relative to flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    /// Against flow, towards the headwaters (incoming edges).
    Upstream,
    /// With flow, towards the outlet (outgoing edges).
    Downstream,
}

impl From<FlowDirection> for Direction {
    fn from(direction: FlowDirection) -> Self {
        match direction {
            FlowDirection::Upstream => Direction::Incoming,
            FlowDirection::Downstream => Direction::Outgoing,
        }
    }
}

impl fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowDirection::Upstream => write!(f, "upstream"),
            FlowDirection::Downstream => write!(f, "downstream"),
        }
    }
}

/// A walk that reached an already visited segment and stopped there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncation {
    /// Segment the walk started from.
    pub origin: SegmentId,
    /// Segment reached a second time.
    pub revisited: SegmentId,
    pub direction: FlowDirection,
}

impl fmt::Display for Truncation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} walk from {} revisited {}",
            self.direction, self.origin, self.revisited
        )
    }
}

/// A description of a walk. Iterate it (any number of times) to get the
/// segments it reaches, origin first.
#[derive(Debug, Clone)]
pub struct Walk<'n> {
    network: &'n NetworkModel,
    origin: SegmentIndex,
    direction: FlowDirection,
    stops: HashSet<SegmentIndex>,
}

impl<'n> Walk<'n> {
    fn new(network: &'n NetworkModel, origin: SegmentIndex, direction: FlowDirection) -> Self {
        Self {
            network,
            origin,
            direction,
            stops: HashSet::new(),
        }
    }

    /// Do not enter `segment` (nor anything beyond it).
    pub fn stop_at(mut self, segment: SegmentIndex) -> Self {
        self.stops.insert(segment);
        self
    }

    /// Do not enter any of `segments`.
    pub fn stop_at_any(mut self, segments: impl IntoIterator<Item = SegmentIndex>) -> Self {
        self.stops.extend(segments);
        self
    }

    pub fn direction(&self) -> FlowDirection {
        self.direction
    }

    /// Starts a fresh pass over the walk.
    pub fn iter(&self) -> WalkIter<'_> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        if self.network.get(self.origin).is_some() {
            visited.insert(self.origin);
            queue.push_back(self.origin);
        }
        WalkIter {
            network: self.network,
            origin: self.origin,
            direction: self.direction,
            stops: &self.stops,
            visited,
            queue,
            truncations: Vec::new(),
        }
    }

    /// Runs the walk to completion.
    pub fn collect_reached(&self) -> (Vec<SegmentIndex>, Vec<Truncation>) {
        let mut iter = self.iter();
        let reached: Vec<SegmentIndex> = iter.by_ref().collect();
        (reached, iter.into_truncations())
    }
}

impl<'w, 'n> IntoIterator for &'w Walk<'n> {
    type Item = SegmentIndex;
    type IntoIter = WalkIter<'w>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One pass over a [`Walk`].
pub struct WalkIter<'w> {
    network: &'w NetworkModel,
    origin: SegmentIndex,
    direction: FlowDirection,
    stops: &'w HashSet<SegmentIndex>,
    visited: HashSet<SegmentIndex>,
    queue: VecDeque<SegmentIndex>,
    truncations: Vec<Truncation>,
}

impl WalkIter<'_> {
    /// Truncations recorded so far.
    pub fn truncations(&self) -> &[Truncation] {
        &self.truncations
    }

    pub fn into_truncations(self) -> Vec<Truncation> {
        self.truncations
    }

    /// Whether following the walk's direction from `from` leads back to
    /// `to`, without entering stop segments.
    fn leads_to(&self, from: SegmentIndex, to: SegmentIndex) -> bool {
        let direction: Direction = self.direction.into();
        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            for next in self.network.graph.neighbors_directed(current, direction) {
                if !self.stops.contains(&next) && seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    fn record_truncation(&mut self, revisited: SegmentIndex) {
        let id = |index| {
            self.network
                .get(index)
                .map(|segment| segment.id.clone())
                .unwrap_or_else(|| SegmentId::new(format!("#{}", index.index())))
        };
        let truncation = Truncation {
            origin: id(self.origin),
            revisited: id(revisited),
            direction: self.direction,
        };
        if !self.truncations.contains(&truncation) {
            warn!("Cycle in stream network: {}", truncation);
            self.truncations.push(truncation);
        }
    }
}

impl Iterator for WalkIter<'_> {
    type Item = SegmentIndex;

    fn next(&mut self) -> Option<SegmentIndex> {
        let current = self.queue.pop_front()?;
        let network = self.network;

        for neighbor in network
            .graph
            .neighbors_directed(current, self.direction.into())
        {
            if self.stops.contains(&neighbor) {
                continue;
            }
            if self.visited.insert(neighbor) {
                self.queue.push_back(neighbor);
            } else if self.leads_to(neighbor, current) {
                self.record_truncation(neighbor);
            }
        }

        Some(current)
    }
}

impl NetworkModel {
    /// All segments upstream of `origin`, including it.
    pub fn walk_upstream(&self, origin: SegmentIndex) -> Walk<'_> {
        Walk::new(self, origin, FlowDirection::Upstream)
    }

    /// All segments between `origin` and the outlet, including it.
    pub fn walk_downstream(&self, origin: SegmentIndex) -> Walk<'_> {
        Walk::new(self, origin, FlowDirection::Downstream)
    }
}
