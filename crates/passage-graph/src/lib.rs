//! Passage Graph - Barrier connectivity on stream networks
//!
//! This crate builds a directed stream network from segments, measures how
//! much habitat each barrier disconnects, and turns that into grouped,
//! ranked remediation priorities.
//!
//! # Architecture
//!
//! The network uses petgraph internally, with edges running from each
//! segment to the segment it drains into. On top of it:
//! - [`ConnectivityCalculator`] computes the Dendritic Connectivity Index
//!   (DCI) and each barrier's marginal contribution
//! - [`summarize_upstream`] aggregates habitat above every barrier
//! - [`MainstemGrouper`] partitions barriers along mainstems
//! - [`RankingEngine`] produces immediate, potential, composite and
//!   best-of ranks plus a tier
//!
//! [`analyze_species`] and [`analyze_watershed`] run the whole chain.
//!
//! # Example
//!
//! ```
//! use passage_core::{AnalysisConfig, Barrier, StreamSegment};
//! use passage_graph::{analyze_species, BarrierSet, NetworkModel};
//!
//! let network = NetworkModel::from_segments(vec![
//!     StreamSegment::new("s1", 10.0).with_habitat("as"),
//!     StreamSegment::new("s2", 30.0)
//!         .with_habitat("as")
//!         .flowing_into("s1")
//!         .with_downstream_barriers(["b1"]),
//! ])
//! .unwrap();
//! let barriers = BarrierSet::new(
//!     vec![Barrier::new("b1").with_passability("as", 0.0).below("s2")],
//!     &network,
//! )
//! .unwrap();
//!
//! let (outcome, report) =
//!     analyze_species(&network, &barriers, &"as".into(), None, &AnalysisConfig::default())
//!         .unwrap();
//!
//! assert!(report.succeeded());
//! assert_eq!(outcome.baseline, 25.0);
//! assert_eq!(outcome.assessments[0].dci, 75.0);
//! ```

mod barriers;
mod builder;
mod dci;
mod graph;
mod grouping;
mod habitat;
mod pipeline;
mod ranking;
mod source;
mod store;
mod traversal;

pub use barriers::{BarrierEntry, BarrierIndex, BarrierSet, PassabilityTable};
pub use builder::NetworkBuilder;
pub use dci::{round_to, ConnectivityCalculator, DciOptions, DciResult, NegativeDci};
pub use graph::{NetworkModel, NetworkStats, SegmentIndex};
pub use grouping::{BarrierGroup, GroupCandidate, Grouping, MainstemGrouper, FIRST_GENERATION};
pub use habitat::{summarize_upstream, HabitatSummary, UpstreamHabitat};
pub use pipeline::{
    analyze_species, analyze_watershed, load_network, run_species, species_to_run,
    BarrierAssessment, LoadError, RankedBarrier, RunStatus, SpeciesOutcome, SpeciesReport,
    WatershedAnalysis,
};
pub use ranking::{group_stats, GroupStats, RankCandidate, RankingEngine};
pub use source::{JsonWatershed, SourceError, WatershedFile};
pub use store::{ResultStore, StoreError, StoredBarrier, WatershedResults};
pub use traversal::{FlowDirection, Truncation, Walk, WalkIter};
