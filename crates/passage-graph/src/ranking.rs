//! Composite prioritization of barrier groups.
//!
//! Two base ranks are computed over all barriers and then collapsed to one
//! value per group:
//!
//! - **immediate** (Rank 1): barriers are sorted into two bands, weighted
//!   average gain per barrier at or above the band threshold first, and
//!   within each band by fewest downstream barriers then highest weighted
//!   average gain. The second band continues numbering after the first. A
//!   group takes its best (lowest) position.
//! - **potential** (Rank 2): barriers sorted by weighted total upstream
//!   habitat; a group takes its best position, and positions are then
//!   densified.
//!
//! The composite rank is the dense rank of `immediate + potential`; the
//! best-of rank is the dense rank of `min(immediate, potential)` and decides
//! the tier. Both break ties by ascending group id.

use crate::barriers::BarrierIndex;
use crate::grouping::Grouping;
use crate::habitat::HabitatSummary;
use passage_core::config::{DEFAULT_GAIN_BAND_THRESHOLD, DEFAULT_TIER_WIDTH};
use passage_core::{AnalysisConfig, GroupId, RankRecord, Tier};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Aggregates over the members of one group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub total_gain: f64,
    pub weighted_total_gain: f64,
    pub barrier_count: usize,
    pub avg_gain: f64,
    pub weighted_avg_gain: f64,
}

/// Sums functional gains per group.
pub fn group_stats(grouping: &Grouping, habitat: &HabitatSummary) -> BTreeMap<GroupId, GroupStats> {
    grouping
        .groups
        .iter()
        .filter(|group| !group.members.is_empty())
        .map(|group| {
            let (total, weighted) = group
                .members
                .iter()
                .filter_map(|&b| habitat.get(b))
                .fold((0.0, 0.0), |(t, w), upstream| {
                    (t + upstream.functional, w + upstream.weighted_functional)
                });
            let count = group.members.len();
            let stats = GroupStats {
                total_gain: total,
                weighted_total_gain: weighted,
                barrier_count: count,
                avg_gain: total / count as f64,
                weighted_avg_gain: weighted / count as f64,
            };
            (group.id, stats)
        })
        .collect()
}

/// What the ranking needs to know about one barrier.
#[derive(Debug, Clone, PartialEq)]
pub struct RankCandidate {
    pub barrier: BarrierIndex,
    pub group: GroupId,
    pub downstream_barriers: usize,
    /// The group's weighted average gain per barrier.
    pub weighted_avg_gain: f64,
    /// The barrier's own weighted total upstream habitat.
    pub weighted_total_upstream: f64,
}

/// Produces ranks and tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingEngine {
    gain_band_threshold: f64,
    tier_width: u32,
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self {
            gain_band_threshold: DEFAULT_GAIN_BAND_THRESHOLD,
            tier_width: DEFAULT_TIER_WIDTH,
        }
    }
}

impl RankingEngine {
    pub fn new(gain_band_threshold: f64, tier_width: u32) -> Self {
        Self {
            gain_band_threshold,
            tier_width: tier_width.max(1),
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.gain_band_threshold, config.tier_width)
    }

    /// Ranks every candidate. The result is parallel to `candidates`.
    pub fn rank(&self, candidates: &[RankCandidate]) -> Vec<RankRecord> {
        let immediate = self.immediate_ranks(candidates);
        let potential = potential_ranks(candidates);

        let mut groups: Vec<GroupId> = candidates.iter().map(|c| c.group).collect();
        groups.sort_unstable();
        groups.dedup();

        let composite = dense_rank(&groups, |g| immediate[g] + potential[g]);
        let best_of = dense_rank(&groups, |g| immediate[g].min(potential[g]));

        candidates
            .iter()
            .map(|candidate| {
                let group = &candidate.group;
                RankRecord {
                    immediate: immediate[group],
                    potential: potential[group],
                    composite: composite[group],
                    best_of: best_of[group],
                    tier: Tier::from_rank(best_of[group], self.tier_width),
                }
            })
            .collect()
    }

    /// Rank 1 per group.
    fn immediate_ranks(&self, candidates: &[RankCandidate]) -> HashMap<GroupId, u32> {
        let band = |c: &RankCandidate| u8::from(c.weighted_avg_gain < self.gain_band_threshold);

        let mut order: Vec<&RankCandidate> = candidates.iter().collect();
        order.sort_by(|a, b| {
            band(a)
                .cmp(&band(b))
                .then_with(|| a.downstream_barriers.cmp(&b.downstream_barriers))
                .then_with(|| b.weighted_avg_gain.total_cmp(&a.weighted_avg_gain))
                .then_with(|| tie_break(a, b))
        });

        best_position_per_group(&order)
    }
}

/// Rank 2 per group, densified.
fn potential_ranks(candidates: &[RankCandidate]) -> HashMap<GroupId, u32> {
    let mut order: Vec<&RankCandidate> = candidates.iter().collect();
    order.sort_by(|a, b| {
        b.weighted_total_upstream
            .total_cmp(&a.weighted_total_upstream)
            .then_with(|| tie_break(a, b))
    });

    let relative = best_position_per_group(&order);
    let groups: Vec<GroupId> = relative.keys().copied().collect();
    dense_rank(&groups, |g| relative[g])
}

fn tie_break(a: &RankCandidate, b: &RankCandidate) -> Ordering {
    a.group.cmp(&b.group).then_with(|| a.barrier.cmp(&b.barrier))
}

/// Lowest 1-based position of any member, per group.
fn best_position_per_group(order: &[&RankCandidate]) -> HashMap<GroupId, u32> {
    let mut best = HashMap::new();
    for (position, candidate) in (1u32..).zip(order) {
        best.entry(candidate.group).or_insert(position);
    }
    best
}

/// Dense rank of groups by `(score, group id)`.
fn dense_rank(groups: &[GroupId], score: impl Fn(&GroupId) -> u32) -> HashMap<GroupId, u32> {
    let mut keyed: Vec<(u32, GroupId)> = groups.iter().map(|g| (score(g), *g)).collect();
    keyed.sort_unstable();
    keyed.dedup();
    keyed
        .into_iter()
        .zip(1u32..)
        .map(|((_, group), rank)| (group, rank))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use test_case::test_case;

    fn candidate(
        barrier: BarrierIndex,
        group: u32,
        downstream_barriers: usize,
        weighted_avg_gain: f64,
        weighted_total_upstream: f64,
    ) -> RankCandidate {
        RankCandidate {
            barrier,
            group: GroupId(group),
            downstream_barriers,
            weighted_avg_gain,
            weighted_total_upstream,
        }
    }

    fn distinct(records: &[RankRecord], field: impl Fn(&RankRecord) -> u32) -> usize {
        records.iter().map(field).collect::<HashSet<_>>().len()
    }

    #[test]
    fn test_group_representative_ranks() {
        let candidates = vec![
            candidate(0, 1, 0, 2.0, 10.0),
            candidate(1, 1, 1, 2.0, 8.0),
            candidate(2, 1, 2, 2.0, 6.0),
            candidate(3, 2, 0, 1.0, 12.0),
            candidate(4, 2, 1, 1.0, 1.0),
        ];
        let records = RankingEngine::default().rank(&candidates);

        assert_eq!(distinct(&records, |r| r.immediate), 2);
        assert_eq!(distinct(&records, |r| r.potential), 2);
        assert_eq!(distinct(&records, |r| r.composite), 2);
        // all members of a group share every field
        assert_eq!(records[0], records[1]);
        assert_eq!(records[1], records[2]);
        assert_eq!(records[3], records[4]);
    }

    #[test]
    fn test_immediate_rank_positions() {
        // Sorted: b0 (g1, 0 down, 2.0), b3 (g2, 0 down, 1.0), b1, b4, b2
        let candidates = vec![
            candidate(0, 1, 0, 2.0, 10.0),
            candidate(1, 1, 1, 2.0, 8.0),
            candidate(2, 1, 2, 2.0, 6.0),
            candidate(3, 2, 0, 1.0, 12.0),
            candidate(4, 2, 1, 1.0, 1.0),
        ];
        let records = RankingEngine::default().rank(&candidates);

        assert_eq!(records[0].immediate, 1);
        assert_eq!(records[3].immediate, 2);
        // potential: b3 (12.0) first, so group 2 leads
        assert_eq!(records[3].potential, 1);
        assert_eq!(records[0].potential, 2);
        // sums tie at 3; group id breaks it
        assert_eq!(records[0].composite, 1);
        assert_eq!(records[3].composite, 2);
    }

    #[test]
    fn test_low_gain_band_ranks_after_high_gain_band() {
        // Group 1 has many downstream barriers but clears the threshold.
        let candidates = vec![
            candidate(0, 1, 9, 0.6, 1.0),
            candidate(1, 2, 0, 0.4, 1.0),
            candidate(2, 3, 0, 0.45, 1.0),
        ];
        let records = RankingEngine::default().rank(&candidates);

        assert_eq!(records[0].immediate, 1);
        assert_eq!(records[2].immediate, 2);
        assert_eq!(records[1].immediate, 3);
    }

    #[test]
    fn test_empty_first_band_starts_at_one() {
        let candidates = vec![candidate(0, 1, 0, 0.1, 1.0), candidate(1, 2, 1, 0.2, 2.0)];
        let records = RankingEngine::default().rank(&candidates);

        assert_eq!(records[0].immediate, 1);
        assert_eq!(records[1].immediate, 2);
    }

    #[test]
    fn test_potential_rank_is_dense() {
        // group 1 holds positions 1 and 2, group 2 position 3 → dense 1, 2
        let candidates = vec![
            candidate(0, 1, 0, 1.0, 30.0),
            candidate(1, 1, 0, 1.0, 20.0),
            candidate(2, 2, 0, 1.0, 10.0),
        ];
        let records = RankingEngine::default().rank(&candidates);

        assert_eq!(records[0].potential, 1);
        assert_eq!(records[2].potential, 2);
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let candidates: Vec<RankCandidate> = (0..40)
            .map(|i| candidate(i, (i / 3) as u32 + 1, i % 4, 0.5, 1.0))
            .collect();
        let engine = RankingEngine::default();

        assert_eq!(engine.rank(&candidates), engine.rank(&candidates));
    }

    #[test_case(1, Tier::A ; "first group")]
    #[test_case(10, Tier::A ; "last of tier a")]
    #[test_case(11, Tier::B ; "first of tier b")]
    #[test_case(25, Tier::C ; "middle of tier c")]
    #[test_case(31, Tier::D ; "first of tier d")]
    fn test_tier_by_best_of_rank(group_position: usize, expected: Tier) {
        // 35 singleton groups with strictly decreasing gains, so the best-of
        // rank of group n is n.
        let candidates: Vec<RankCandidate> = (0..35)
            .map(|i| candidate(i, i as u32 + 1, i, 100.0 - i as f64, 100.0 - i as f64))
            .collect();
        let records = RankingEngine::default().rank(&candidates);

        let record = &records[group_position - 1];
        assert_eq!(record.best_of as usize, group_position);
        assert_eq!(record.tier, expected);
    }

    #[test]
    fn test_best_of_rewards_either_strength() {
        // Group 1 is best on immediate gain only, group 2 on potential only,
        // group 3 is second on both.
        let candidates = vec![
            candidate(0, 1, 0, 5.0, 1.0),
            candidate(1, 2, 3, 0.1, 50.0),
            candidate(2, 3, 1, 2.0, 20.0),
        ];
        let records = RankingEngine::default().rank(&candidates);

        // immediate: g1=1, g3=2, g2=3; potential: g2=1, g3=2, g1=3.
        // Every sum is 4, so composite falls back to group id.
        assert_eq!(records[0].composite, 1);
        assert_eq!(records[1].composite, 2);
        assert_eq!(records[2].composite, 3);
        assert_eq!(records[0].best_of, 1);
        assert_eq!(records[1].best_of, 2);
        assert_eq!(records[2].best_of, 3);
    }
}
