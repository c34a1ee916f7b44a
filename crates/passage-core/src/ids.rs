//! Identifier types.
//!
//! Every entity handed to us by the data layer is keyed by an opaque string
//! (usually a UUID). Wrapping them keeps a segment id from being passed where
//! a barrier id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an id from anything string-like.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Unique id of a stream segment.
    SegmentId
);

string_id!(
    /// Unique id of a barrier.
    BarrierId
);

string_id!(
    /// Id shared by all segments of one mainstem channel.
    MainstemId
);

string_id!(
    /// Short code of an analyzed fish species (e.g. `as` for Atlantic salmon).
    SpeciesCode
);

/// Id of a finalized barrier group.
///
/// Ids are dense, start at 1 and are ordered the way groups are reported:
/// by mainstem first, then by the iteration that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
