//! Cross-domain assembly: join every domain's canonical series with the
//! reference table into one wide table keyed by (location, date).
//!
//! Runs single-threaded, strictly after ingestion: the synchronization
//! barrier between concurrent per-location jobs and the sequential join.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use epiwatch_core::adapter::normalize_location;
use epiwatch_core::{MetricValue, Series};
use epiwatch_series::store::write_atomic;

use crate::error::AssemblerError;
use crate::reference::ReferenceTable;

/// A derived per-capita field computed strictly after the join:
/// `source / population * scale`, rounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedField {
    pub source: String,
    pub output: String,
    /// 100 for per-hundred, 1e6 for per-million, ...
    pub scale: f64,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_decimals() -> u32 {
    2
}

/// Assembly configuration, from the pipeline config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Locations excluded from the published dataset (one-off reporting
    /// entities that have no reference row).
    #[serde(default)]
    pub excluded_locations: Vec<String>,

    #[serde(default)]
    pub derived: Vec<DerivedField>,
}

/// All canonical series of one domain.
#[derive(Debug, Clone)]
pub struct DomainTable {
    pub domain: String,
    pub series: Vec<Series>,
}

/// One row of the final dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledRow {
    pub location: String,
    pub iso_code: String,
    pub continent: String,
    pub date: NaiveDate,
    pub metrics: IndexMap<String, MetricValue>,
}

/// The assembled multi-domain dataset, sorted by (location, date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledDataset {
    pub rows: Vec<AssembledRow>,
}

impl AssembledDataset {
    /// The most recent row per location.
    pub fn latest(&self) -> Vec<AssembledRow> {
        let mut latest: IndexMap<&str, &AssembledRow> = IndexMap::new();
        for row in &self.rows {
            // Rows are sorted ascending by date within a location.
            latest.insert(row.location.as_str(), row);
        }
        latest.into_values().cloned().collect()
    }

    /// Write the full history and the latest snapshot, atomically. Only
    /// reached when assembly finished with zero integrity errors.
    pub fn save(&self, output_dir: &Path) -> Result<(), AssemblerError> {
        std::fs::create_dir_all(output_dir)?;
        write_atomic(
            &output_dir.join("assembled.json"),
            &serde_json::to_vec_pretty(&self.rows)?,
        )?;
        write_atomic(
            &output_dir.join("latest.json"),
            &serde_json::to_vec_pretty(&self.latest())?,
        )?;
        info!(rows = self.rows.len(), dir = %output_dir.display(), "dataset published");
        Ok(())
    }
}

/// Joins repaired per-domain series with the reference table.
pub struct Assembler {
    reference: ReferenceTable,
    config: AssemblerConfig,
}

impl Assembler {
    pub fn new(reference: ReferenceTable, config: AssemblerConfig) -> Self {
        Self { reference, config }
    }

    /// Assemble the dataset as of today (rows dated today or later are
    /// still mutating upstream and are dropped).
    pub fn assemble(&self, domains: Vec<DomainTable>) -> Result<AssembledDataset, AssemblerError> {
        self.assemble_as_of(domains, Utc::now().date_naive())
    }

    pub fn assemble_as_of(
        &self,
        domains: Vec<DomainTable>,
        today: NaiveDate,
    ) -> Result<AssembledDataset, AssemblerError> {
        let excluded: HashSet<String> = self
            .config
            .excluded_locations
            .iter()
            .map(|l| normalize_location(l))
            .collect();

        let domains: Vec<DomainTable> = domains
            .into_iter()
            .map(|mut table| {
                table
                    .series
                    .retain(|s| !excluded.contains(&normalize_location(&s.location)));
                table
            })
            .collect();

        self.check_referential_integrity(&domains)?;

        let mut joined: BTreeMap<(String, NaiveDate), IndexMap<String, MetricValue>> =
            BTreeMap::new();
        for table in &domains {
            let mut seen: HashSet<(String, NaiveDate)> = HashSet::new();
            for series in &table.series {
                for row in series.rows() {
                    if row.date >= today {
                        continue;
                    }
                    let key = (row.location.clone(), row.date);
                    if !seen.insert(key.clone()) {
                        return Err(AssemblerError::CardinalityViolation {
                            domain: table.domain.clone(),
                            location: row.location.clone(),
                            date: row.date,
                        });
                    }
                    let cell = joined.entry(key).or_default();
                    for (name, value) in &row.metrics {
                        // Cross-domain name collisions stay lossless by
                        // prefixing the later domain.
                        if cell.contains_key(name) {
                            cell.insert(format!("{}_{}", table.domain, name), *value);
                        } else {
                            cell.insert(name.clone(), *value);
                        }
                    }
                }
            }
        }

        let mut rows = Vec::with_capacity(joined.len());
        let mut keys: HashSet<(String, NaiveDate)> = HashSet::with_capacity(joined.len());
        for ((location, date), mut metrics) in joined {
            if !keys.insert((location.clone(), date)) {
                return Err(AssemblerError::DuplicateKey { location, date });
            }
            // Unwrap is safe: integrity was checked against every series
            // location above.
            let reference = self.reference.get(&location).unwrap();
            self.derive_fields(&mut metrics, reference.population());
            rows.push(AssembledRow {
                location,
                iso_code: reference.iso_code.clone(),
                continent: reference.continent.clone(),
                date,
                metrics,
            });
        }

        info!(rows = rows.len(), domains = domains.len(), "assembly complete");
        Ok(AssembledDataset { rows })
    }

    /// Every location in every domain series must exist in the reference
    /// universe, never silently dropped.
    fn check_referential_integrity(&self, domains: &[DomainTable]) -> Result<(), AssemblerError> {
        for table in domains {
            let mut unmapped: Vec<String> = table
                .series
                .iter()
                .filter(|s| !self.reference.contains(&s.location))
                .map(|s| s.location.clone())
                .collect();
            if !unmapped.is_empty() {
                unmapped.sort();
                unmapped.dedup();
                return Err(AssemblerError::UnmappedLocation {
                    domain: table.domain.clone(),
                    locations: unmapped,
                });
            }
        }
        Ok(())
    }

    /// Pure post-join derivations; repair/merge logic never needs
    /// cross-domain knowledge.
    fn derive_fields(&self, metrics: &mut IndexMap<String, MetricValue>, population: Option<f64>) {
        let Some(population) = population else { return };
        for field in &self.config.derived {
            if let Some(value) = metrics.get(&field.source) {
                let scaled = value.as_f64() / population * field.scale;
                let factor = 10f64.powi(field.decimals as i32);
                let rounded = (scaled * factor).round() / factor;
                metrics.insert(field.output.clone(), MetricValue::Rate(rounded));
            }
        }
    }
}
