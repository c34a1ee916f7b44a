//! Per-species analysis run.
//!
//! Network and barriers are loaded once; each species then runs through
//! connectivity, upstream habitat, grouping and ranking on its own. A failure
//! for one species does not touch the others.

use crate::barriers::{BarrierIndex, BarrierSet};
use crate::dci::{ConnectivityCalculator, DciOptions, NegativeDci};
use crate::graph::{NetworkModel, NetworkStats};
use crate::grouping::{GroupCandidate, MainstemGrouper};
use crate::habitat::{summarize_upstream, HabitatSummary, UpstreamHabitat};
use crate::ranking::{group_stats, GroupStats, RankCandidate, RankingEngine};
use crate::traversal::Truncation;
use chrono::{DateTime, Utc};
use passage_core::{
    AnalysisConfig, AnalysisError, BarrierId, BarrierKind, GroupAssignment, GroupId, RankRecord,
    ResultSink, SpeciesCode, WatershedSource,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Grouping and ranking output for a barrier that was a ranking candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedBarrier {
    pub group: GroupAssignment,
    pub group_stats: GroupStats,
    pub ranks: RankRecord,
}

/// Everything computed for one barrier and species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarrierAssessment {
    pub barrier: BarrierId,
    pub kind: BarrierKind,
    pub passability: f64,
    pub dci: f64,
    pub upstream: UpstreamHabitat,
    /// `None` when the barrier was filtered out of ranking.
    pub ranking: Option<RankedBarrier>,
}

/// Result of a successful species run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesOutcome {
    pub species: SpeciesCode,
    pub baseline: f64,
    pub max_connectivity: f64,
    pub assessments: Vec<BarrierAssessment>,
}

impl SpeciesOutcome {
    /// Hands every computed value to a sink.
    pub fn write_to<S: ResultSink>(&self, sink: &mut S) -> Result<(), S::Error> {
        for assessment in &self.assessments {
            sink.write_dci(&assessment.barrier, &self.species, assessment.dci)?;
            if let Some(ranked) = &assessment.ranking {
                sink.write_group(&assessment.barrier, &self.species, &ranked.group)?;
                sink.write_ranks(&assessment.barrier, &self.species, &ranked.ranks)?;
            }
        }
        Ok(())
    }

    pub fn ranked(&self) -> impl Iterator<Item = (&BarrierAssessment, &RankedBarrier)> {
        self.assessments
            .iter()
            .filter_map(|assessment| Some((assessment, assessment.ranking.as_ref()?)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed { kind: String, message: String },
}

/// What happened for one species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesReport {
    pub species: SpeciesCode,
    pub status: RunStatus,
    pub truncations: Vec<Truncation>,
    pub defaulted_passability: Vec<BarrierId>,
    pub negative_dci: Vec<NegativeDci>,
    pub barriers: usize,
    pub ranked: usize,
    pub groups: usize,
    pub grouping_passes: usize,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl SpeciesReport {
    pub fn failed(species: SpeciesCode, kind: &str, message: String, duration_ms: u64) -> Self {
        Self {
            species,
            status: RunStatus::Failed {
                kind: kind.to_string(),
                message,
            },
            truncations: Vec::new(),
            defaulted_passability: Vec::new(),
            negative_dci: Vec::new(),
            barriers: 0,
            ranked: 0,
            groups: 0,
            grouping_passes: 0,
            duration_ms,
            completed_at: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// Runs the full analysis for one species.
///
/// `total_habitat` overrides the total computed from the network.
pub fn analyze_species(
    network: &NetworkModel,
    barriers: &BarrierSet,
    species: &SpeciesCode,
    total_habitat: Option<f64>,
    config: &AnalysisConfig,
) -> Result<(SpeciesOutcome, SpeciesReport), AnalysisError> {
    let start = Instant::now();
    info!(
        "Analyzing species '{}': {} segments, {} barriers",
        species,
        network.segment_count(),
        barriers.len()
    );

    let table = barriers.passabilities(species)?;
    let calculator = match total_habitat {
        Some(total) => {
            ConnectivityCalculator::with_total_habitat(network, barriers, species, total)?
        }
        None => ConnectivityCalculator::new(network, barriers, species)?,
    };
    let options = DciOptions {
        precision: config.dci_precision,
        negative_tolerance: config.negative_dci_tolerance,
    };
    let dci = calculator.compute(barriers, &table, options);

    let habitat = summarize_upstream(network, barriers, &table);

    let candidates: Vec<BarrierIndex> = barriers
        .iter()
        .filter(|(index, entry)| {
            let filter = &config.ranking;
            !(filter.exclude_passable && table.get(*index) >= 1.0)
                && !(filter.require_upstream_habitat
                    && habitat.get(*index).map_or(true, |upstream| upstream.total <= 0.0))
                && !(filter.exclude_natural && entry.barrier.kind.is_natural())
        })
        .map(|(index, _)| index)
        .collect();

    let group_candidates: Vec<GroupCandidate> = candidates
        .iter()
        .filter_map(|&index| {
            let entry = barriers.get(index)?;
            let upstream = habitat.get(index)?;
            Some(GroupCandidate {
                barrier: index,
                id: entry.id().clone(),
                mainstem: barriers.mainstem_of(index, network).cloned(),
                upstream_barriers: upstream.upstream_barriers,
                weighted_gain: upstream.weighted_functional,
            })
        })
        .collect();
    let grouping = MainstemGrouper::new().group(&group_candidates)?;
    let stats = group_stats(&grouping, &habitat);

    let rank_candidates: Vec<RankCandidate> = candidates
        .iter()
        .filter_map(|&index| {
            let group = grouping.group_of(index)?;
            let upstream = habitat.get(index)?;
            Some(RankCandidate {
                barrier: index,
                group,
                downstream_barriers: upstream.downstream_barriers,
                weighted_avg_gain: stats.get(&group)?.weighted_avg_gain,
                weighted_total_upstream: upstream.weighted_total,
            })
        })
        .collect();
    let records = RankingEngine::from_config(config).rank(&rank_candidates);

    let mut ranked: Vec<Option<RankedBarrier>> = vec![None; barriers.len()];
    for (candidate, ranks) in rank_candidates.iter().zip(records) {
        let Some(group_stats) = stats.get(&candidate.group).copied() else {
            continue;
        };
        ranked[candidate.barrier] = Some(RankedBarrier {
            group: GroupAssignment {
                group: candidate.group,
                downstream_groups: downstream_groups(barriers, candidate.barrier, |b| {
                    grouping.group_of(b)
                }),
            },
            group_stats,
            ranks,
        });
    }

    let assessments: Vec<BarrierAssessment> = barriers
        .iter()
        .zip(ranked)
        .map(|((index, entry), ranking)| BarrierAssessment {
            barrier: entry.id().clone(),
            kind: entry.barrier.kind,
            passability: table.get(index),
            dci: dci.get(index).unwrap_or_default(),
            upstream: habitat.get(index).copied().unwrap_or_default(),
            ranking,
        })
        .collect();

    let report = success_report(
        species,
        &habitat,
        barriers,
        &table.defaulted,
        dci.anomalies.clone(),
        rank_candidates.len(),
        grouping.len(),
        grouping.passes,
        start,
    );
    info!(
        "Species '{}': baseline {:.4}, {} ranked in {} groups ({}ms)",
        species, dci.baseline, report.ranked, report.groups, report.duration_ms
    );

    Ok((
        SpeciesOutcome {
            species: species.clone(),
            baseline: dci.baseline,
            max_connectivity: calculator.max_connectivity(),
            assessments,
        },
        report,
    ))
}

/// Groups of `barrier`'s downstream barriers other than its own, sorted.
fn downstream_groups(
    barriers: &BarrierSet,
    barrier: BarrierIndex,
    group_of: impl Fn(BarrierIndex) -> Option<GroupId>,
) -> Vec<GroupId> {
    let own = group_of(barrier);
    let groups: BTreeSet<_> = barriers
        .get(barrier)
        .map(|entry| entry.downstream.as_slice())
        .unwrap_or_default()
        .iter()
        .filter_map(|&b| group_of(b))
        .filter(|&g| Some(g) != own)
        .collect();
    groups.into_iter().collect()
}

#[allow(clippy::too_many_arguments)]
fn success_report(
    species: &SpeciesCode,
    habitat: &HabitatSummary,
    barriers: &BarrierSet,
    defaulted: &[BarrierIndex],
    negative_dci: Vec<NegativeDci>,
    ranked: usize,
    groups: usize,
    grouping_passes: usize,
    start: Instant,
) -> SpeciesReport {
    SpeciesReport {
        species: species.clone(),
        status: RunStatus::Succeeded,
        truncations: habitat.truncations.clone(),
        defaulted_passability: defaulted
            .iter()
            .filter_map(|&b| barriers.get(b).map(|entry| entry.id().clone()))
            .collect(),
        negative_dci,
        barriers: barriers.len(),
        ranked,
        groups,
        grouping_passes,
        duration_ms: millis(start.elapsed()),
        completed_at: Utc::now(),
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Errors loading from a source, before any species runs.
#[derive(Debug, thiserror::Error)]
pub enum LoadError<E: std::error::Error + 'static> {
    #[error("failed to load watershed: {0}")]
    Source(#[source] E),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// Loads segments and builds the network.
pub fn load_network<S: WatershedSource>(
    source: &S,
    watershed: &str,
) -> Result<NetworkModel, LoadError<S::Error>> {
    let segments = source.load_segments(watershed).map_err(LoadError::Source)?;
    let network = NetworkModel::from_segments(segments).map_err(AnalysisError::from)?;
    Ok(network)
}

/// Species to run: the configured list, or every species with habitat.
pub fn species_to_run(network: &NetworkModel, config: &AnalysisConfig) -> Vec<SpeciesCode> {
    if !config.species.is_empty() {
        return config.species.clone();
    }
    let species: BTreeSet<SpeciesCode> = network
        .segments()
        .flat_map(|segment| segment.habitat.iter().cloned())
        .collect();
    species.into_iter().collect()
}

/// Loads barriers for one species from the source and runs it.
///
/// Never fails: any error becomes a failed [`SpeciesReport`].
pub fn run_species<S: WatershedSource>(
    source: &S,
    watershed: &str,
    network: &NetworkModel,
    species: &SpeciesCode,
    config: &AnalysisConfig,
) -> (SpeciesReport, Option<SpeciesOutcome>) {
    let start = Instant::now();
    let fail = |kind: &str, message: String| {
        warn!("Species '{}' failed ({}): {}", species, kind, message);
        SpeciesReport::failed(
            species.clone(),
            kind,
            message,
            millis(start.elapsed()),
        )
    };

    let loaded = source.load_barriers(watershed, species).and_then(|barriers| {
        let total = source.total_habitat_length(watershed, species)?;
        Ok((barriers, total))
    });
    let (barriers, total) = match loaded {
        Ok(loaded) => loaded,
        Err(err) => return (fail("source", err.to_string()), None),
    };

    let result = BarrierSet::new(barriers, network)
        .map_err(AnalysisError::from)
        .and_then(|set| analyze_species(network, &set, species, Some(total), config));

    match result {
        Ok((outcome, report)) => (report, Some(outcome)),
        Err(err) => (fail(err.kind(), err.to_string()), None),
    }
}

/// All species of one watershed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatershedAnalysis {
    pub watershed: String,
    pub network: NetworkStats,
    pub reports: Vec<SpeciesReport>,
    pub outcomes: Vec<SpeciesOutcome>,
}

/// Runs every configured species of a watershed in turn.
pub fn analyze_watershed<S: WatershedSource>(
    source: &S,
    watershed: &str,
    config: &AnalysisConfig,
) -> Result<WatershedAnalysis, LoadError<S::Error>> {
    let network = load_network(source, watershed)?;
    let mut reports = Vec::new();
    let mut outcomes = Vec::new();

    for species in species_to_run(&network, config) {
        let (report, outcome) = run_species(source, watershed, &network, &species, config);
        reports.push(report);
        outcomes.extend(outcome);
    }

    Ok(WatershedAnalysis {
        watershed: watershed.to_string(),
        network: network.stats(),
        reports,
        outcomes,
    })
}
