//! Watershed data read from a JSON document.
//!
//! ```json
//! { "watershed_id": "w1", "segments": [...], "barriers": [...] }
//! ```

use passage_core::{Barrier, SpeciesCode, StreamSegment, WatershedSource};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read watershed file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse watershed file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown watershed '{requested}' (file holds '{available}')")]
    UnknownWatershed { requested: String, available: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatershedFile {
    pub watershed_id: String,
    #[serde(default)]
    pub segments: Vec<StreamSegment>,
    #[serde(default)]
    pub barriers: Vec<Barrier>,
}

/// A single watershed held in memory. Cheap to clone.
#[derive(Debug, Clone)]
pub struct JsonWatershed {
    data: Arc<WatershedFile>,
}

impl JsonWatershed {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, SourceError> {
        let data: WatershedFile = serde_json::from_str(content)?;
        Ok(Self::from(data))
    }

    pub fn watershed_id(&self) -> &str {
        &self.data.watershed_id
    }

    fn check(&self, watershed: &str) -> Result<&WatershedFile, SourceError> {
        if watershed != self.data.watershed_id {
            return Err(SourceError::UnknownWatershed {
                requested: watershed.to_string(),
                available: self.data.watershed_id.clone(),
            });
        }
        Ok(&self.data)
    }
}

impl From<WatershedFile> for JsonWatershed {
    fn from(data: WatershedFile) -> Self {
        Self {
            data: Arc::new(data),
        }
    }
}

impl WatershedSource for JsonWatershed {
    type Error = SourceError;

    fn load_segments(&self, watershed: &str) -> Result<Vec<StreamSegment>, SourceError> {
        Ok(self.check(watershed)?.segments.clone())
    }

    /// Barriers carry only the requested species' passability, so a bad
    /// value for one species never fails another.
    fn load_barriers(
        &self,
        watershed: &str,
        species: &SpeciesCode,
    ) -> Result<Vec<Barrier>, SourceError> {
        let barriers = self
            .check(watershed)?
            .barriers
            .iter()
            .map(|barrier| {
                let mut barrier = barrier.clone();
                barrier.passability.retain(|code, _| code == species);
                barrier
            })
            .collect();
        Ok(barriers)
    }

    fn total_habitat_length(
        &self,
        watershed: &str,
        species: &SpeciesCode,
    ) -> Result<f64, SourceError> {
        Ok(self
            .check(watershed)?
            .segments
            .iter()
            .map(|segment| segment.habitat_length(species))
            .sum())
    }
}
