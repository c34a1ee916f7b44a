//! Barriers and per-species passability.

use crate::error::InputDataError;
use crate::ids::{BarrierId, SegmentId, SpeciesCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Passability used when a barrier has no value recorded for a species.
///
/// An unassessed structure is treated as a complete barrier.
pub const MISSING_PASSABILITY: f64 = 0.0;

/// What kind of structure a barrier is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierKind {
    Dam,
    StreamCrossing,
    Waterfall,
    #[default]
    Other,
}

impl BarrierKind {
    /// Natural barriers are not remediation candidates.
    pub fn is_natural(self) -> bool {
        matches!(self, BarrierKind::Waterfall)
    }
}

impl fmt::Display for BarrierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dam => "dam",
            Self::StreamCrossing => "stream_crossing",
            Self::Waterfall => "waterfall",
            Self::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// A barrier's passability for one species.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Passability {
    /// A value was recorded.
    Recorded(f64),
    /// Nothing recorded; falls back to [`MISSING_PASSABILITY`].
    Defaulted,
}

impl Passability {
    /// The fraction used in products.
    pub fn value(self) -> f64 {
        match self {
            Passability::Recorded(value) => value,
            Passability::Defaulted => MISSING_PASSABILITY,
        }
    }

    pub fn is_defaulted(self) -> bool {
        matches!(self, Passability::Defaulted)
    }
}

/// An obstruction sitting at the downstream end of a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Barrier {
    /// Unique barrier id.
    pub id: BarrierId,

    #[serde(default)]
    pub kind: BarrierKind,

    /// Passability per species; `null` means not assessed.
    #[serde(default)]
    pub passability: BTreeMap<SpeciesCode, Option<f64>>,

    /// Segment immediately upstream of the barrier.
    #[serde(default)]
    pub stream_id_up: Option<SegmentId>,

    /// Barriers between this one and the outlet.
    #[serde(default)]
    pub downstream_barriers: Vec<BarrierId>,
}

impl Barrier {
    /// Creates a barrier with no passability recorded.
    pub fn new(id: impl Into<BarrierId>) -> Self {
        Self {
            id: id.into(),
            kind: BarrierKind::default(),
            passability: BTreeMap::new(),
            stream_id_up: None,
            downstream_barriers: Vec::new(),
        }
    }

    /// Records passability for a species.
    pub fn with_passability(mut self, species: impl Into<SpeciesCode>, value: f64) -> Self {
        self.passability.insert(species.into(), Some(value));
        self
    }

    pub fn with_kind(mut self, kind: BarrierKind) -> Self {
        self.kind = kind;
        self
    }

    /// Places the barrier at the downstream end of a segment.
    pub fn below(mut self, segment: impl Into<SegmentId>) -> Self {
        self.stream_id_up = Some(segment.into());
        self
    }

    pub fn with_downstream_barriers<I, B>(mut self, barriers: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<BarrierId>,
    {
        self.downstream_barriers = barriers.into_iter().map(Into::into).collect();
        self
    }

    /// Looks up passability for a species.
    ///
    /// Missing values come back as [`Passability::Defaulted`]; recorded values
    /// outside `[0, 1]` are an input error.
    pub fn passability_for(&self, species: &SpeciesCode) -> Result<Passability, InputDataError> {
        match self.passability.get(species).copied().flatten() {
            None => Ok(Passability::Defaulted),
            Some(value) if (0.0..=1.0).contains(&value) => Ok(Passability::Recorded(value)),
            Some(value) => Err(InputDataError::PassabilityOutOfRange {
                barrier: self.id.clone(),
                species: species.clone(),
                value,
            }),
        }
    }

    /// Species with any passability entry.
    pub fn species(&self) -> impl Iterator<Item = &SpeciesCode> {
        self.passability.keys()
    }

    pub fn validate(&self) -> Result<(), InputDataError> {
        if self.id.as_str().is_empty() {
            return Err(InputDataError::MissingAttribute {
                entity: "barrier",
                id: String::new(),
                attribute: "id",
            });
        }
        for species in self.passability.keys() {
            self.passability_for(species)?;
        }
        Ok(())
    }
}
