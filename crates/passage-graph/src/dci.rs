//! Dendritic connectivity index.
//!
//! The baseline for a species is the habitat-length-weighted share of habitat
//! reachable from the outlet, where each segment is discounted by the product
//! of the passabilities of every barrier below it:
//!
//! ```text
//! baseline = Σ_s (s.length / total_habitat) × Π_{b below s} passability(b) × 100
//! ```
//!
//! A barrier's DCI is how much that sum rises when the barrier alone is
//! treated as fully passable. Only segments with the barrier below them change,
//! so the calculator keeps an inverted index from barrier to habitat segments
//! and sums the per-segment differences instead of recomputing the whole
//! network for each barrier.

use crate::barriers::{BarrierIndex, BarrierSet, PassabilityTable};
use crate::graph::NetworkModel;
use passage_core::{BarrierId, InputDataError, SpeciesCode};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Rounding and tolerance applied to DCI values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DciOptions {
    /// Decimal places.
    pub precision: u32,
    /// Negative values down to `-tolerance` clamp to zero.
    pub negative_tolerance: f64,
}

impl Default for DciOptions {
    fn default() -> Self {
        Self {
            precision: passage_core::config::DEFAULT_DCI_PRECISION,
            negative_tolerance: passage_core::config::DEFAULT_NEGATIVE_DCI_TOLERANCE,
        }
    }
}

/// A DCI below the negative tolerance. Kept as computed and reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegativeDci {
    pub barrier: BarrierId,
    pub value: f64,
}

/// DCI for every barrier of a set, indexed like the set.
#[derive(Debug, Clone, PartialEq)]
pub struct DciResult {
    pub species: SpeciesCode,
    pub baseline: f64,
    pub values: Vec<f64>,
    pub anomalies: Vec<NegativeDci>,
}

impl DciResult {
    pub fn get(&self, index: BarrierIndex) -> Option<f64> {
        self.values.get(index).copied()
    }
}

/// One habitat segment's share of the index.
#[derive(Debug, Clone)]
struct HabitatReach {
    /// `length / total_habitat × 100`.
    weight: f64,
    downstream: Vec<BarrierIndex>,
}

impl HabitatReach {
    fn passability(&self, table: &PassabilityTable) -> f64 {
        self.downstream.iter().map(|&b| table.get(b)).product()
    }

    fn passability_without(&self, table: &PassabilityTable, waived: BarrierIndex) -> f64 {
        self.downstream
            .iter()
            .filter(|&&b| b != waived)
            .map(|&b| table.get(b))
            .product()
    }
}

/// Computes baseline connectivity and per-barrier DCI for one species.
#[derive(Debug)]
pub struct ConnectivityCalculator {
    species: SpeciesCode,
    total_habitat: f64,
    reaches: Vec<HabitatReach>,
    /// Barrier index → reaches with that barrier below them.
    by_barrier: Vec<Vec<usize>>,
}

impl ConnectivityCalculator {
    /// Prepares a calculator, taking the habitat total from the network.
    pub fn new(
        network: &NetworkModel,
        barriers: &BarrierSet,
        species: &SpeciesCode,
    ) -> Result<Self, InputDataError> {
        let total = network.total_habitat_length(species);
        Self::with_total_habitat(network, barriers, species, total)
    }

    /// Prepares a calculator with an externally supplied habitat total.
    ///
    /// Fails if the total is not positive, or if a habitat segment lists a
    /// barrier that is not in the set.
    pub fn with_total_habitat(
        network: &NetworkModel,
        barriers: &BarrierSet,
        species: &SpeciesCode,
        total_habitat: f64,
    ) -> Result<Self, InputDataError> {
        if !(total_habitat.is_finite() && total_habitat > 0.0) {
            return Err(InputDataError::NonPositiveHabitat {
                species: species.clone(),
                total: total_habitat,
            });
        }

        let mut reaches = Vec::new();
        let mut by_barrier = vec![Vec::new(); barriers.len()];

        for index in network.segment_indexes() {
            let Some(segment) = network.get(index) else {
                continue;
            };
            let downstream = barriers.resolve_ids(&segment.downstream_barriers, || {
                format!("segment {}", segment.id)
            })?;
            if !segment.is_habitat(species) {
                continue;
            }

            let reach = reaches.len();
            let mut listed = downstream.clone();
            listed.sort_unstable();
            listed.dedup();
            for barrier in listed {
                by_barrier[barrier].push(reach);
            }
            reaches.push(HabitatReach {
                weight: segment.length / total_habitat * 100.0,
                downstream,
            });
        }

        debug!(
            "Prepared connectivity for '{}': {} habitat segments, {:.3} km habitat",
            species,
            reaches.len(),
            total_habitat
        );

        Ok(Self {
            species: species.clone(),
            total_habitat,
            reaches,
            by_barrier,
        })
    }

    pub fn species(&self) -> &SpeciesCode {
        &self.species
    }

    pub fn total_habitat(&self) -> f64 {
        self.total_habitat
    }

    /// Network-wide connectivity under the given passabilities.
    pub fn connectivity(&self, table: &PassabilityTable) -> f64 {
        self.reaches
            .iter()
            .map(|reach| reach.weight * reach.passability(table))
            .sum()
    }

    /// Connectivity with every barrier passable.
    pub fn max_connectivity(&self) -> f64 {
        self.reaches.iter().map(|reach| reach.weight).sum()
    }

    /// Unrounded rise in connectivity from waiving `barrier`.
    pub fn marginal(&self, table: &PassabilityTable, barrier: BarrierIndex) -> f64 {
        self.by_barrier
            .get(barrier)
            .map(|reaches| {
                reaches
                    .iter()
                    .map(|&r| {
                        let reach = &self.reaches[r];
                        reach.weight
                            * (reach.passability_without(table, barrier) - reach.passability(table))
                    })
                    .sum()
            })
            .unwrap_or(0.0)
    }

    /// Baseline and DCI for every barrier.
    ///
    /// Barriers are independent, so their marginals are computed in parallel;
    /// each value is a sequential sum, so results do not depend on scheduling.
    pub fn compute(
        &self,
        barriers: &BarrierSet,
        table: &PassabilityTable,
        options: DciOptions,
    ) -> DciResult {
        let baseline = self.connectivity(table);
        let raw: Vec<f64> = (0..barriers.len())
            .into_par_iter()
            .map(|barrier| self.marginal(table, barrier))
            .collect();

        let mut anomalies = Vec::new();
        let values = raw
            .into_iter()
            .enumerate()
            .map(|(index, value)| match Marginal::classify(value, options) {
                Marginal::Value(reported) => reported,
                Marginal::Noise => 0.0,
                Marginal::Negative(reported) => {
                    let id = barriers
                        .get(index)
                        .map(|entry| entry.id().clone())
                        .unwrap_or_else(|| BarrierId::new(index.to_string()));
                    warn!(
                        "Negative DCI {} for barrier {} (species '{}')",
                        value, id, self.species
                    );
                    anomalies.push(NegativeDci {
                        barrier: id,
                        value,
                    });
                    reported
                }
            })
            .collect();

        DciResult {
            species: self.species.clone(),
            baseline,
            values,
            anomalies,
        }
    }
}

/// A raw marginal sorted by how it is reported.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Marginal {
    /// Non-negative, rounded.
    Value(f64),
    /// Negative but within tolerance; reported as 0.
    Noise,
    /// Below `-negative_tolerance`; kept (rounded) and flagged.
    Negative(f64),
}

impl Marginal {
    fn classify(raw: f64, options: DciOptions) -> Self {
        if raw >= 0.0 {
            Marginal::Value(round_to(raw, options.precision))
        } else if raw >= -options.negative_tolerance {
            Marginal::Noise
        } else {
            Marginal::Negative(round_to(raw, options.precision))
        }
    }
}

/// Rounds half away from zero to `decimals` places; never returns `-0.0`.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passage_core::{Barrier, StreamSegment};

    fn species() -> SpeciesCode {
        "as".into()
    }

    // s1 (outlet, 10 km) ← z (1.0) ← s2 (10 km) ← x (0.5) ← s3 (20 km) ← y (0.0)
    // z sits at the outlet below s1, x below s2, y below s3.
    fn series() -> (NetworkModel, BarrierSet) {
        let network = NetworkModel::from_segments(vec![
            StreamSegment::new("s1", 10.0)
                .with_habitat("as")
                .with_downstream_barriers(["z"]),
            StreamSegment::new("s2", 10.0)
                .with_habitat("as")
                .flowing_into("s1")
                .with_downstream_barriers(["x", "z"]),
            StreamSegment::new("s3", 20.0)
                .with_habitat("as")
                .flowing_into("s2")
                .with_downstream_barriers(["y", "x", "z"]),
        ])
        .unwrap();
        let barriers = BarrierSet::new(
            vec![
                Barrier::new("z").with_passability("as", 1.0).below("s1"),
                Barrier::new("x")
                    .with_passability("as", 0.5)
                    .below("s2")
                    .with_downstream_barriers(["z"]),
                Barrier::new("y")
                    .with_passability("as", 0.0)
                    .below("s3")
                    .with_downstream_barriers(["x", "z"]),
            ],
            &network,
        )
        .unwrap();
        (network, barriers)
    }

    fn dci_of(result: &DciResult, barriers: &BarrierSet, id: &str) -> f64 {
        result.get(barriers.index_of(&id.into()).unwrap()).unwrap()
    }

    #[test]
    fn test_series_baseline_and_dci() {
        let (network, barriers) = series();
        let calculator = ConnectivityCalculator::new(&network, &barriers, &species()).unwrap();
        let table = barriers.passabilities(&species()).unwrap();

        let result = calculator.compute(&barriers, &table, DciOptions::default());

        assert!((result.baseline - 37.5).abs() < 1e-9);
        assert_eq!(dci_of(&result, &barriers, "x"), 12.5);
        assert_eq!(dci_of(&result, &barriers, "y"), 25.0);
        assert_eq!(dci_of(&result, &barriers, "z"), 0.0);
        assert!(result.anomalies.is_empty());
    }

    #[test]
    fn test_impassable_barrier_has_largest_dci() {
        let (network, barriers) = series();
        let calculator = ConnectivityCalculator::new(&network, &barriers, &species()).unwrap();
        let table = barriers.passabilities(&species()).unwrap();
        let result = calculator.compute(&barriers, &table, DciOptions::default());

        let largest = result
            .values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| index)
            .unwrap();
        assert_eq!(barriers.get(largest).unwrap().id().as_str(), "y");
    }

    #[test]
    fn test_dci_never_negative() {
        let (network, barriers) = series();
        let calculator = ConnectivityCalculator::new(&network, &barriers, &species()).unwrap();
        let table = barriers.passabilities(&species()).unwrap();
        let result = calculator.compute(&barriers, &table, DciOptions::default());

        assert!(result.values.iter().all(|&value| value >= 0.0));
    }

    #[test]
    fn test_all_passable_reaches_maximum() {
        let (network, barriers) = series();
        let calculator = ConnectivityCalculator::new(&network, &barriers, &species()).unwrap();
        let mut table = barriers.passabilities(&species()).unwrap();
        table.values.iter_mut().for_each(|value| *value = 1.0);

        let expected: f64 = network
            .segments()
            .map(|segment| segment.habitat_length(&species()) / 40.0 * 100.0)
            .sum();
        assert!((calculator.connectivity(&table) - expected).abs() < 1e-9);
        assert!((calculator.max_connectivity() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_incremental_matches_full_recompute() {
        let (network, barriers) = series();
        let calculator = ConnectivityCalculator::new(&network, &barriers, &species()).unwrap();
        let table = barriers.passabilities(&species()).unwrap();
        let baseline = calculator.connectivity(&table);

        for (index, _) in barriers.iter() {
            let without = calculator.connectivity(&table.waiving(index));
            assert!((calculator.marginal(&table, index) - (without - baseline)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_compute_is_idempotent() {
        let (network, barriers) = series();
        let calculator = ConnectivityCalculator::new(&network, &barriers, &species()).unwrap();
        let table = barriers.passabilities(&species()).unwrap();

        let first = calculator.compute(&barriers, &table, DciOptions::default());
        let second = calculator.compute(&barriers, &table, DciOptions::default());
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_habitat_fails_fast() {
        let (network, barriers) = series();

        let result = ConnectivityCalculator::new(&network, &barriers, &"ae".into());
        assert!(matches!(
            result,
            Err(InputDataError::NonPositiveHabitat { .. })
        ));
    }

    #[test]
    fn test_unknown_barrier_on_segment_rejected() {
        let network = NetworkModel::from_segments(vec![StreamSegment::new("s1", 1.0)
            .with_habitat("as")
            .with_downstream_barriers(["ghost"])])
        .unwrap();
        let barriers = BarrierSet::new(Vec::new(), &network).unwrap();

        assert!(matches!(
            ConnectivityCalculator::new(&network, &barriers, &species()),
            Err(InputDataError::UnknownBarrier { .. })
        ));
    }

    // Three 10 km reaches: z (1.0) at the outlet, x (0.5) and y (0.0) above it.
    fn three_reaches() -> (NetworkModel, BarrierSet) {
        let network = NetworkModel::from_segments(vec![
            StreamSegment::new("s1", 10.0)
                .with_habitat("as")
                .with_downstream_barriers(["z"]),
            StreamSegment::new("s2", 10.0)
                .with_habitat("as")
                .flowing_into("s1")
                .with_downstream_barriers(["x", "z"]),
            StreamSegment::new("s3", 10.0)
                .with_habitat("as")
                .flowing_into("s2")
                .with_downstream_barriers(["y", "x", "z"]),
        ])
        .unwrap();
        let barriers = BarrierSet::new(
            vec![
                Barrier::new("z").with_passability("as", 1.0).below("s1"),
                Barrier::new("x")
                    .with_passability("as", 0.5)
                    .below("s2")
                    .with_downstream_barriers(["z"]),
                Barrier::new("y")
                    .with_passability("as", 0.0)
                    .below("s3")
                    .with_downstream_barriers(["x", "z"]),
            ],
            &network,
        )
        .unwrap();
        (network, barriers)
    }

    #[test]
    fn test_three_equal_reaches() {
        let (network, barriers) = three_reaches();
        let calculator = ConnectivityCalculator::new(&network, &barriers, &species()).unwrap();
        let table = barriers.passabilities(&species()).unwrap();

        let result = calculator.compute(&barriers, &table, DciOptions::default());

        assert!((calculator.total_habitat() - 30.0).abs() < 1e-9);
        assert!((result.baseline - 50.0).abs() < 1e-9);
        let blocking = dci_of(&result, &barriers, "y");
        assert_eq!(blocking, 16.6667);
        assert_eq!(dci_of(&result, &barriers, "x"), 16.6667);
        assert_eq!(dci_of(&result, &barriers, "z"), 0.0);
        assert!(result.values.iter().all(|&value| value <= blocking));
    }

    #[test]
    fn test_get_out_of_range_is_none() {
        let (network, barriers) = series();
        let calculator = ConnectivityCalculator::new(&network, &barriers, &species()).unwrap();
        let table = barriers.passabilities(&species()).unwrap();
        let result = calculator.compute(&barriers, &table, DciOptions::default());

        assert_eq!(result.get(barriers.len()), None);
        assert_eq!(table.value(barriers.len()), None);
    }

    #[test]
    fn test_marginal_classification() {
        let options = DciOptions {
            precision: 4,
            negative_tolerance: 1e-9,
        };

        assert_eq!(
            Marginal::classify(16.666_666, options),
            Marginal::Value(16.6667)
        );
        assert_eq!(Marginal::classify(0.0, options), Marginal::Value(0.0));
        assert_eq!(Marginal::classify(-1e-12, options), Marginal::Noise);
        assert_eq!(Marginal::classify(-1e-9, options), Marginal::Noise);
        assert_eq!(
            Marginal::classify(-2.5, options),
            Marginal::Negative(-2.5)
        );
    }

    #[test]
    fn test_negative_dci_is_kept_and_reported() {
        let (network, barriers) = series();
        let calculator = ConnectivityCalculator::new(&network, &barriers, &species()).unwrap();
        let mut table = barriers.passabilities(&species()).unwrap();
        // Out of range on purpose: waiving x now lowers connectivity.
        let x = barriers.index_of(&"x".into()).unwrap();
        table.values[x] = 2.0;

        let result = calculator.compute(&barriers, &table, DciOptions::default());

        assert_eq!(dci_of(&result, &barriers, "x"), -25.0);
        assert_eq!(result.anomalies.len(), 1);
        assert_eq!(result.anomalies[0].barrier.as_str(), "x");
        assert!((result.anomalies[0].value + 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(16.666_666, 4), 16.6667);
        assert_eq!(round_to(-0.000_01, 4), 0.0);
        assert!(round_to(-0.000_01, 4).is_sign_positive());
    }
}
