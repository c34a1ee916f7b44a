//! Persistent analysis results on sled.
//!
//! One tree per kind of value. Result keys are `watershed \0 species \0
//! barrier` and report keys `watershed \0 species`, so a watershed's values
//! sit together and one run never touches another watershed.

use crate::pipeline::SpeciesReport;
use passage_core::{BarrierId, GroupAssignment, RankRecord, ResultSink, SpeciesCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sled(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("Corrupt key in tree '{0}'")]
    CorruptKey(&'static str),
}

/// Everything stored for one barrier and species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBarrier {
    pub barrier: BarrierId,
    pub dci: Option<f64>,
    pub group: Option<GroupAssignment>,
    pub ranks: Option<RankRecord>,
}

pub struct ResultStore {
    db: Db,
    dci: Tree,
    groups: Tree,
    ranks: Tree,
    reports: Tree,
}

const SEP: u8 = 0;

fn key(parts: &[&str]) -> Vec<u8> {
    let mut key = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(SEP);
        }
        key.extend_from_slice(part.as_bytes());
    }
    key
}

/// Key prefix matching every key that starts with `parts`.
fn prefix(parts: &[&str]) -> Vec<u8> {
    let mut prefix = key(parts);
    prefix.push(SEP);
    prefix
}

fn split_key<const N: usize>(tree: &'static str, key: &[u8]) -> Result<[String; N], StoreError> {
    let parts: Vec<String> = key
        .split(|&b| b == SEP)
        .map(|part| std::str::from_utf8(part).map(str::to_string))
        .collect::<Result<_, _>>()
        .map_err(|_| StoreError::CorruptKey(tree))?;
    parts.try_into().map_err(|_| StoreError::CorruptKey(tree))
}

fn slot(merged: &mut BTreeMap<String, StoredBarrier>, barrier: String) -> &mut StoredBarrier {
    merged
        .entry(barrier)
        .or_insert_with_key(|barrier| StoredBarrier {
            barrier: BarrierId::new(barrier.as_str()),
            dci: None,
            group: None,
            ranks: None,
        })
}

impl ResultStore {
    /// Opens or creates a result store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            dci: db.open_tree("dci")?,
            groups: db.open_tree("groups")?,
            ranks: db.open_tree("ranks")?,
            reports: db.open_tree("reports")?,
            db,
        })
    }

    fn put<T: Serialize>(tree: &Tree, key: Vec<u8>, value: &T) -> Result<(), StoreError> {
        let bytes = bincode::serialize(value)?;
        tree.insert(key, bytes)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned, const N: usize>(
        tree: &Tree,
        name: &'static str,
        prefix: &[u8],
    ) -> Result<Vec<([String; N], T)>, StoreError> {
        tree.scan_prefix(prefix)
            .map(|item| -> Result<([String; N], T), StoreError> {
                let (key, bytes) = item?;
                Ok((split_key(name, &key)?, bincode::deserialize(&bytes)?))
            })
            .collect()
    }

    /// A sink writing results for one watershed.
    pub fn watershed(&self, watershed: &str) -> WatershedResults<'_> {
        WatershedResults {
            store: self,
            watershed: watershed.to_string(),
        }
    }

    /// Records the outcome of a species run.
    pub fn save_report(&self, watershed: &str, report: &SpeciesReport) -> Result<(), StoreError> {
        Self::put(
            &self.reports,
            key(&[watershed, report.species.as_str()]),
            report,
        )
    }

    /// Every stored report, keyed by watershed.
    pub fn reports(&self) -> Result<Vec<(String, SpeciesReport)>, StoreError> {
        Ok(Self::scan::<SpeciesReport, 2>(&self.reports, "reports", &[])?
            .into_iter()
            .map(|([watershed, _], report)| (watershed, report))
            .collect())
    }

    /// Watersheds with any stored DCI value.
    pub fn watersheds(&self) -> Result<Vec<String>, StoreError> {
        let mut watersheds: Vec<String> = Self::scan::<f64, 3>(&self.dci, "dci", &[])?
            .into_iter()
            .map(|([watershed, _, _], _)| watershed)
            .collect();
        watersheds.dedup();
        Ok(watersheds)
    }

    /// Species with any stored DCI value in a watershed.
    pub fn species(&self, watershed: &str) -> Result<Vec<SpeciesCode>, StoreError> {
        let mut species: Vec<SpeciesCode> =
            Self::scan::<f64, 3>(&self.dci, "dci", &prefix(&[watershed]))?
                .into_iter()
                .map(|([_, species, _], _)| SpeciesCode::new(species))
                .collect();
        species.dedup();
        Ok(species)
    }

    /// All stored values for one watershed and species, ordered by barrier id.
    pub fn barriers(
        &self,
        watershed: &str,
        species: &SpeciesCode,
    ) -> Result<Vec<StoredBarrier>, StoreError> {
        let prefix = prefix(&[watershed, species.as_str()]);
        let mut merged: BTreeMap<String, StoredBarrier> = BTreeMap::new();

        for ([_, _, barrier], value) in Self::scan::<f64, 3>(&self.dci, "dci", &prefix)? {
            slot(&mut merged, barrier).dci = Some(value);
        }
        for ([_, _, barrier], value) in
            Self::scan::<GroupAssignment, 3>(&self.groups, "groups", &prefix)?
        {
            slot(&mut merged, barrier).group = Some(value);
        }
        for ([_, _, barrier], value) in Self::scan::<RankRecord, 3>(&self.ranks, "ranks", &prefix)? {
            slot(&mut merged, barrier).ranks = Some(value);
        }

        Ok(merged.into_values().collect())
    }

    /// Drops every value stored for a species in one watershed.
    pub fn clear_species(&self, watershed: &str, species: &SpeciesCode) -> Result<(), StoreError> {
        let prefix = prefix(&[watershed, species.as_str()]);
        for tree in [&self.dci, &self.groups, &self.ranks] {
            for item in tree.scan_prefix(&prefix).keys() {
                tree.remove(item?)?;
            }
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Clears every stored result.
    pub fn clear(&self) -> Result<(), StoreError> {
        for tree in [&self.dci, &self.groups, &self.ranks, &self.reports] {
            tree.clear()?;
        }
        self.db.flush()?;
        Ok(())
    }
}

/// [`ResultSink`] over one watershed of a [`ResultStore`].
pub struct WatershedResults<'s> {
    store: &'s ResultStore,
    watershed: String,
}

impl WatershedResults<'_> {
    fn key(&self, species: &SpeciesCode, barrier: &BarrierId) -> Vec<u8> {
        key(&[self.watershed.as_str(), species.as_str(), barrier.as_str()])
    }
}

impl ResultSink for WatershedResults<'_> {
    type Error = StoreError;

    fn write_dci(
        &mut self,
        barrier: &BarrierId,
        species: &SpeciesCode,
        value: f64,
    ) -> Result<(), StoreError> {
        ResultStore::put(&self.store.dci, self.key(species, barrier), &value)
    }

    fn write_group(
        &mut self,
        barrier: &BarrierId,
        species: &SpeciesCode,
        group: &GroupAssignment,
    ) -> Result<(), StoreError> {
        ResultStore::put(&self.store.groups, self.key(species, barrier), group)
    }

    fn write_ranks(
        &mut self,
        barrier: &BarrierId,
        species: &SpeciesCode,
        ranks: &RankRecord,
    ) -> Result<(), StoreError> {
        ResultStore::put(&self.store.ranks, self.key(species, barrier), ranks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passage_core::{GroupId, Tier};
    use tempfile::tempdir;

    fn ranks() -> RankRecord {
        RankRecord {
            immediate: 1,
            potential: 2,
            composite: 1,
            best_of: 1,
            tier: Tier::A,
        }
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempdir().unwrap();
        let store = ResultStore::open(dir.path()).unwrap();
        let species: SpeciesCode = "as".into();
        let group = GroupAssignment {
            group: GroupId(1),
            downstream_groups: vec![GroupId(2)],
        };

        let mut sink = store.watershed("w1");
        sink.write_dci(&"b1".into(), &species, 12.5).unwrap();
        sink.write_dci(&"b2".into(), &species, 0.0).unwrap();
        sink.write_group(&"b1".into(), &species, &group).unwrap();
        sink.write_ranks(&"b1".into(), &species, &ranks()).unwrap();
        store.flush().unwrap();

        let stored = store.barriers("w1", &species).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].barrier.as_str(), "b1");
        assert_eq!(stored[0].dci, Some(12.5));
        assert_eq!(stored[0].group, Some(group));
        assert_eq!(stored[0].ranks, Some(ranks()));
        assert_eq!(stored[1].ranks, None);
    }

    #[test]
    fn test_species_are_kept_apart() {
        let dir = tempdir().unwrap();
        let store = ResultStore::open(dir.path()).unwrap();

        let mut sink = store.watershed("w1");
        sink.write_dci(&"b1".into(), &"as".into(), 1.0).unwrap();
        sink.write_dci(&"b1".into(), &"bt".into(), 2.0).unwrap();
        store.clear_species("w1", &"as".into()).unwrap();

        assert_eq!(store.species("w1").unwrap(), vec![SpeciesCode::from("bt")]);
        assert!(store.barriers("w1", &"as".into()).unwrap().is_empty());
        assert_eq!(store.barriers("w1", &"bt".into()).unwrap()[0].dci, Some(2.0));
    }

    #[test]
    fn test_second_watershed_keeps_first_results() {
        let dir = tempdir().unwrap();
        let store = ResultStore::open(dir.path()).unwrap();
        let species: SpeciesCode = "as".into();

        for (watershed, barrier) in [("w1", "w1-b1"), ("w2", "w2-b1")] {
            let report = SpeciesReport::failed(species.clone(), "source", "none".into(), 0);
            store.save_report(watershed, &report).unwrap();
            store.clear_species(watershed, &species).unwrap();
            store
                .watershed(watershed)
                .write_dci(&barrier.into(), &species, 1.0)
                .unwrap();
        }

        assert_eq!(store.reports().unwrap().len(), 2);
        assert_eq!(store.watersheds().unwrap(), vec!["w1", "w2"]);
        let w1 = store.barriers("w1", &species).unwrap();
        assert_eq!(w1.len(), 1);
        assert_eq!(w1[0].barrier.as_str(), "w1-b1");
        assert_eq!(store.barriers("w2", &species).unwrap()[0].barrier.as_str(), "w2-b1");
    }

    #[test]
    fn test_reports_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = ResultStore::open(dir.path()).unwrap();
            let report = SpeciesReport::failed("as".into(), "convergence", "stuck".into(), 3);
            store.save_report("w1", &report).unwrap();
            store.flush().unwrap();
        }

        let store = ResultStore::open(dir.path()).unwrap();
        let reports = store.reports().unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "w1");
        assert!(!reports[0].1.succeeded());
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let store = ResultStore::open(dir.path()).unwrap();
        store
            .watershed("w1")
            .write_dci(&"b1".into(), &"as".into(), 1.0)
            .unwrap();

        store.clear().unwrap();

        assert!(store.watersheds().unwrap().is_empty());
    }
}
