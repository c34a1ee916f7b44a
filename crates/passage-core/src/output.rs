//! Computed outputs handed back to the data layer.

use crate::ids::GroupId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse priority classification derived from a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    A,
    B,
    C,
    D,
}

impl Tier {
    /// Buckets a 1-based rank: the first `width` ranks are A, the next
    /// `width` B, the next `width` C, everything after D.
    pub fn from_rank(rank: u32, width: u32) -> Self {
        let width = width.max(1);
        match rank.saturating_sub(1) / width {
            0 => Tier::A,
            1 => Tier::B,
            2 => Tier::C,
            _ => Tier::D,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::A => "A",
            Tier::B => "B",
            Tier::C => "C",
            Tier::D => "D",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rank fields for one barrier. Every barrier in a group shares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRecord {
    /// Tiered immediate-gain rank (Rank 1).
    pub immediate: u32,
    /// Dense potential-gain rank (Rank 2).
    pub potential: u32,
    /// Dense rank of `immediate + potential`.
    pub composite: u32,
    /// Dense rank of `min(immediate, potential)`.
    pub best_of: u32,
    /// Tier bucket of `best_of`.
    pub tier: Tier,
}

/// Group membership written back for a barrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAssignment {
    pub group: GroupId,
    /// Other groups containing barriers downstream of this one.
    pub downstream_groups: Vec<GroupId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(Tier::from_rank(1, 10), Tier::A);
        assert_eq!(Tier::from_rank(10, 10), Tier::A);
        assert_eq!(Tier::from_rank(11, 10), Tier::B);
        assert_eq!(Tier::from_rank(20, 10), Tier::B);
        assert_eq!(Tier::from_rank(21, 10), Tier::C);
        assert_eq!(Tier::from_rank(30, 10), Tier::C);
        assert_eq!(Tier::from_rank(31, 10), Tier::D);
        assert_eq!(Tier::from_rank(500, 10), Tier::D);
    }

    #[test]
    fn test_tier_custom_width() {
        assert_eq!(Tier::from_rank(3, 3), Tier::A);
        assert_eq!(Tier::from_rank(4, 3), Tier::B);
        assert_eq!(Tier::from_rank(10, 3), Tier::D);
    }
}
