//! Passage Core - Stream network and barrier data model
//!
//! This crate defines what the connectivity engine consumes and produces:
//! stream segments with precomputed habitat flags, barriers with per-species
//! passability, the error taxonomy of an analysis run, its configuration,
//! and the traits the external data layer implements.
//!
//! # Example
//!
//! ```
//! use passage_core::{Barrier, StreamSegment};
//!
//! let segment = StreamSegment::new("s2", 10.0)
//!     .with_habitat("as")
//!     .flowing_into("s1")
//!     .with_downstream_barriers(["b1"]);
//! let barrier = Barrier::new("b1").with_passability("as", 0.5).below("s2");
//!
//! assert!(segment.is_habitat(&"as".into()));
//! assert_eq!(barrier.passability_for(&"as".into()).unwrap().value(), 0.5);
//! ```

pub mod barrier;
pub mod config;
pub mod error;
pub mod ids;
pub mod output;
pub mod segment;
pub mod traits;

pub use barrier::{Barrier, BarrierKind, Passability, MISSING_PASSABILITY};
pub use config::{AnalysisConfig, ConfigError, RankingFilter};
pub use error::{AnalysisError, InputDataError, Result};
pub use ids::{BarrierId, GroupId, MainstemId, SegmentId, SpeciesCode};
pub use output::{GroupAssignment, RankRecord, Tier};
pub use segment::StreamSegment;
pub use traits::{MemorySink, ResultSink, WatershedSource};
