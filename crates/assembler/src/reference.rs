//! Static reference tables: ISO codes, continents, demographics. Loaded
//! once per assembly, never mutated.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AssemblerError;

/// One static row per location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceRow {
    pub location: String,
    pub iso_code: String,
    pub continent: String,
    /// Macro variables keyed by name (population, median_age, ...).
    #[serde(default)]
    pub demographics: IndexMap<String, f64>,
}

impl ReferenceRow {
    pub fn population(&self) -> Option<f64> {
        self.demographics.get("population").copied().filter(|p| *p > 0.0)
    }
}

/// The location universe the assembled dataset is anchored on.
#[derive(Debug, Clone)]
pub struct ReferenceTable {
    rows: IndexMap<String, ReferenceRow>,
}

impl ReferenceTable {
    /// Build from rows, rejecting duplicate locations.
    pub fn from_rows(rows: Vec<ReferenceRow>) -> Result<Self, AssemblerError> {
        let mut table = IndexMap::with_capacity(rows.len());
        for row in rows {
            if table.contains_key(&row.location) {
                return Err(AssemblerError::DuplicateReference(row.location));
            }
            table.insert(row.location.clone(), row);
        }
        Ok(Self { rows: table })
    }

    /// Load the JSON reference file.
    pub fn load(path: &Path) -> Result<Self, AssemblerError> {
        if !path.exists() {
            return Err(AssemblerError::MissingReference(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let rows: Vec<ReferenceRow> = serde_json::from_slice(&bytes)?;
        info!(path = %path.display(), locations = rows.len(), "reference table loaded");
        Self::from_rows(rows)
    }

    pub fn get(&self, location: &str) -> Option<&ReferenceRow> {
        self.rows.get(location)
    }

    pub fn contains(&self, location: &str) -> bool {
        self.rows.contains_key(location)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
