//! Mainstem-aware barrier grouping.
//!
//! Barriers start in one pending group per mainstem. Each pass orders every
//! pending group by upstream barrier count (most first), takes the running
//! average of weighted functional gain along that order, and promotes the
//! prefix ending at the highest average into a new finalized group. The rest
//! stay pending for the next pass. Every pass promotes at least one barrier
//! per pending group, so the loop ends within `candidates` passes.
//!
//! Barriers sharing an upstream count are one block in the ordering: the
//! running average only changes at block ends, so a block is never split.
//!
//! Group ids come from a counter, then are renumbered once the loop ends so
//! that they sort by mainstem and then by the pass that produced them.

use crate::barriers::BarrierIndex;
use passage_core::{AnalysisError, BarrierId, GroupId, MainstemId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Pass number of the first refinement pass.
pub const FIRST_GENERATION: u32 = 2;

/// What the grouper needs to know about one barrier.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupCandidate {
    pub barrier: BarrierIndex,
    /// Used to order barriers with equal upstream counts.
    pub id: BarrierId,
    pub mainstem: Option<MainstemId>,
    pub upstream_barriers: usize,
    /// Functional upstream habitat weighted by the barrier's own blockage.
    pub weighted_gain: f64,
}

/// A finalized group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarrierGroup {
    pub id: GroupId,
    /// `None` for a singleton of a barrier off every mainstem.
    pub mainstem: Option<MainstemId>,
    /// Pass that promoted the group; 0 for singletons.
    pub generation: u32,
    pub members: Vec<BarrierIndex>,
}

/// Partition of the candidates into groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping {
    /// Ordered by id; `groups[n]` has id `n + 1`.
    pub groups: Vec<BarrierGroup>,
    membership: HashMap<BarrierIndex, GroupId>,
    /// Refinement passes run.
    pub passes: usize,
}

impl Grouping {
    pub fn group_of(&self, barrier: BarrierIndex) -> Option<GroupId> {
        self.membership.get(&barrier).copied()
    }

    pub fn get(&self, id: GroupId) -> Option<&BarrierGroup> {
        let slot = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.groups.get(slot)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DraftState {
    Pending,
    Final,
}

/// A group under construction. `lineage` orders groups by mainstem.
#[derive(Debug)]
struct DraftGroup {
    lineage: usize,
    generation: u32,
    mainstem: Option<MainstemId>,
    members: Vec<usize>,
    state: DraftState,
}

/// Hands out draft group ids in creation order.
#[derive(Debug, Default)]
struct GroupArena {
    drafts: Vec<DraftGroup>,
}

impl GroupArena {
    fn create(&mut self, draft: DraftGroup) -> usize {
        self.drafts.push(draft);
        self.drafts.len() - 1
    }

    fn pending(&self) -> Vec<usize> {
        self.drafts
            .iter()
            .enumerate()
            .filter(|(_, draft)| draft.state == DraftState::Pending && !draft.members.is_empty())
            .map(|(id, _)| id)
            .collect()
    }
}

/// Partitions barriers along each mainstem.
#[derive(Debug, Clone, Default)]
pub struct MainstemGrouper {
    iteration_bound: Option<usize>,
}

impl MainstemGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of passes below the natural bound.
    pub fn with_iteration_bound(mut self, bound: usize) -> Self {
        self.iteration_bound = Some(bound);
        self
    }

    /// Groups the candidates.
    ///
    /// Fails with [`AnalysisError::Convergence`] if pending barriers remain
    /// after the bound (by default the candidate count) is reached.
    pub fn group(&self, candidates: &[GroupCandidate]) -> Result<Grouping, AnalysisError> {
        let bound = self.iteration_bound.unwrap_or(candidates.len());
        let mut arena = GroupArena::default();

        let mut by_mainstem: BTreeMap<&MainstemId, Vec<usize>> = BTreeMap::new();
        let mut isolated: Vec<usize> = Vec::new();
        for (slot, candidate) in candidates.iter().enumerate() {
            match &candidate.mainstem {
                Some(mainstem) => by_mainstem.entry(mainstem).or_default().push(slot),
                None => isolated.push(slot),
            }
        }

        let mainstem_count = by_mainstem.len();
        for (lineage, (mainstem, members)) in by_mainstem.into_iter().enumerate() {
            arena.create(DraftGroup {
                lineage,
                generation: 0,
                mainstem: Some(mainstem.clone()),
                members,
                state: DraftState::Pending,
            });
        }

        isolated.sort_by(|&a, &b| candidates[a].id.cmp(&candidates[b].id));
        for (offset, slot) in isolated.into_iter().enumerate() {
            arena.create(DraftGroup {
                lineage: mainstem_count + offset,
                generation: 0,
                mainstem: None,
                members: vec![slot],
                state: DraftState::Final,
            });
        }

        let mut passes = 0;
        let mut generation = FIRST_GENERATION;
        loop {
            let pending = arena.pending();
            if pending.is_empty() {
                break;
            }
            if passes >= bound {
                return Err(AnalysisError::Convergence {
                    iterations: passes + 1,
                    bound,
                });
            }
            passes += 1;

            for draft_id in pending {
                let promoted = split_group(candidates, &mut arena.drafts[draft_id].members);
                let draft = &arena.drafts[draft_id];
                let (lineage, mainstem) = (draft.lineage, draft.mainstem.clone());
                debug!(
                    "Pass {}: promoted {} barriers on mainstem {:?}, {} pending",
                    passes,
                    promoted.len(),
                    mainstem.as_ref().map(MainstemId::as_str),
                    draft.members.len()
                );
                arena.create(DraftGroup {
                    lineage,
                    generation,
                    mainstem,
                    members: promoted,
                    state: DraftState::Final,
                });
            }
            generation += 1;
        }

        Ok(finalize(candidates, arena, passes))
    }
}

/// Removes and returns the prefix of `members` with the highest running
/// average gain, leaving the rest in `members`.
fn split_group(candidates: &[GroupCandidate], members: &mut Vec<usize>) -> Vec<usize> {
    members.sort_by(|&a, &b| {
        let (a, b) = (&candidates[a], &candidates[b]);
        b.upstream_barriers
            .cmp(&a.upstream_barriers)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut split = members.len();
    let mut best = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut pos = 0;
    while pos < members.len() {
        let count = candidates[members[pos]].upstream_barriers;
        while pos < members.len() && candidates[members[pos]].upstream_barriers == count {
            sum += candidates[members[pos]].weighted_gain;
            pos += 1;
        }
        let average = sum / pos as f64;
        // Ties go to the longer prefix.
        if average >= best {
            best = average;
            split = pos;
        }
    }

    let rest = members.split_off(split);
    std::mem::replace(members, rest)
}

fn finalize(candidates: &[GroupCandidate], arena: GroupArena, passes: usize) -> Grouping {
    let mut finals: Vec<DraftGroup> = arena
        .drafts
        .into_iter()
        .filter(|draft| draft.state == DraftState::Final && !draft.members.is_empty())
        .collect();
    finals.sort_by_key(|draft| (draft.lineage, draft.generation));

    let mut membership = HashMap::with_capacity(candidates.len());
    let groups = finals
        .into_iter()
        .zip(1u32..)
        .map(|(draft, number)| {
            let id = GroupId(number);
            let members: Vec<BarrierIndex> = draft
                .members
                .iter()
                .map(|&slot| candidates[slot].barrier)
                .collect();
            for &barrier in &members {
                membership.insert(barrier, id);
            }
            BarrierGroup {
                id,
                mainstem: draft.mainstem,
                generation: draft.generation,
                members,
            }
        })
        .collect();

    Grouping {
        groups,
        membership,
        passes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(
        barrier: BarrierIndex,
        mainstem: Option<&str>,
        upstream_barriers: usize,
        weighted_gain: f64,
    ) -> GroupCandidate {
        GroupCandidate {
            barrier,
            id: BarrierId::new(format!("b{barrier}")),
            mainstem: mainstem.map(MainstemId::from),
            upstream_barriers,
            weighted_gain,
        }
    }

    #[test]
    fn test_peels_best_prefix_then_remainder() {
        // Ordered a, b, c: running averages 1.0, 3.0, 2.17. Best prefix is {a, b}.
        let candidates = vec![
            candidate(0, Some("m1"), 2, 1.0),
            candidate(1, Some("m1"), 1, 5.0),
            candidate(2, Some("m1"), 0, 0.5),
        ];
        let grouping = MainstemGrouper::new().group(&candidates).unwrap();

        assert_eq!(grouping.len(), 2);
        assert_eq!(grouping.passes, 2);
        assert_eq!(grouping.group_of(0), Some(GroupId(1)));
        assert_eq!(grouping.group_of(1), Some(GroupId(1)));
        assert_eq!(grouping.group_of(2), Some(GroupId(2)));
        assert_eq!(grouping.get(GroupId(1)).unwrap().generation, 2);
        assert_eq!(grouping.get(GroupId(2)).unwrap().generation, 3);
    }

    #[test]
    fn test_equal_upstream_counts_stay_together() {
        // Without blocks the best prefix would be {0} alone (5.0).
        let candidates = vec![
            candidate(0, Some("m1"), 1, 5.0),
            candidate(1, Some("m1"), 1, 1.0),
            candidate(2, Some("m1"), 0, 0.0),
        ];
        let grouping = MainstemGrouper::new().group(&candidates).unwrap();

        assert_eq!(grouping.group_of(0), grouping.group_of(1));
        assert_ne!(grouping.group_of(0), grouping.group_of(2));
    }

    #[test]
    fn test_every_candidate_in_exactly_one_group() {
        let candidates = vec![
            candidate(0, Some("m2"), 3, 2.0),
            candidate(1, Some("m1"), 2, 0.1),
            candidate(2, Some("m2"), 1, 9.0),
            candidate(3, None, 0, 4.0),
            candidate(4, Some("m1"), 0, 7.0),
            candidate(5, Some("m2"), 0, 0.0),
        ];
        let grouping = MainstemGrouper::new().group(&candidates).unwrap();

        let mut seen: Vec<BarrierIndex> = grouping
            .groups
            .iter()
            .flat_map(|group| group.members.iter().copied())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        assert!(grouping.passes <= candidates.len());
        for group in &grouping.groups {
            if group.mainstem.is_some() {
                assert!(group.generation >= FIRST_GENERATION);
            }
        }
    }

    #[test]
    fn test_groups_never_mix_mainstems() {
        let candidates = vec![
            candidate(0, Some("m1"), 0, 1.0),
            candidate(1, Some("m2"), 0, 1.0),
        ];
        let grouping = MainstemGrouper::new().group(&candidates).unwrap();

        assert_ne!(grouping.group_of(0), grouping.group_of(1));
        // mainstems are numbered in id order
        assert_eq!(grouping.group_of(0), Some(GroupId(1)));
        assert_eq!(grouping.group_of(1), Some(GroupId(2)));
    }

    #[test]
    fn test_isolated_barrier_is_singleton() {
        let candidates = vec![
            candidate(0, None, 0, 3.0),
            candidate(1, Some("m1"), 0, 1.0),
            candidate(2, None, 0, 3.0),
        ];
        let grouping = MainstemGrouper::new().group(&candidates).unwrap();

        let group = grouping.get(grouping.group_of(0).unwrap()).unwrap();
        assert_eq!(group.members, vec![0]);
        assert_eq!(group.generation, 0);
        assert!(group.mainstem.is_none());
        assert_ne!(grouping.group_of(0), grouping.group_of(2));
        // mainstem groups come first
        assert_eq!(grouping.group_of(1), Some(GroupId(1)));
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let candidates = vec![
            candidate(0, Some("m1"), 1, 2.0),
            candidate(1, Some("m1"), 1, 2.0),
            candidate(2, Some("m1"), 0, 2.0),
            candidate(3, Some("m2"), 0, 0.0),
        ];
        let first = MainstemGrouper::new().group(&candidates).unwrap();
        let second = MainstemGrouper::new().group(&candidates).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_iteration_bound_reports_convergence_error() {
        let candidates = vec![
            candidate(0, Some("m1"), 2, 1.0),
            candidate(1, Some("m1"), 1, 5.0),
            candidate(2, Some("m1"), 0, 0.5),
        ];
        let result = MainstemGrouper::new()
            .with_iteration_bound(1)
            .group(&candidates);

        assert_eq!(
            result.unwrap_err(),
            AnalysisError::Convergence {
                iterations: 2,
                bound: 1
            }
        );
    }

    #[test]
    fn test_empty_input() {
        let grouping = MainstemGrouper::new().group(&[]).unwrap();
        assert!(grouping.is_empty());
        assert_eq!(grouping.passes, 0);
    }
}
