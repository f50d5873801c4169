//! Durable per-location series files.
//!
//! One JSON file per (domain, location) under `<root>/<domain>/`. Each
//! write is a whole-file replace staged through a sibling temp file and
//! renamed into place, so an interrupted run leaves either the old or the
//! new file on disk, never a torn one. Jobs are partitioned one per
//! location, so no two jobs ever touch the same file within a run.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use epiwatch_core::adapter::normalize_location;
use epiwatch_core::Series;

use crate::error::SeriesError;

/// Store for canonical series files.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    root: PathBuf,
}

impl SeriesStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, domain: &str, location: &str) -> PathBuf {
        self.root
            .join(domain)
            .join(format!("{}.json", normalize_location(location)))
    }

    /// Load the canonical series for one location, `None` on first run.
    pub fn load(&self, domain: &str, location: &str) -> Result<Option<Series>, SeriesError> {
        let path = self.path(domain, location);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let series: Series = serde_json::from_slice(&bytes)?;
        Ok(Some(series))
    }

    /// Replace the canonical series file for one location.
    pub fn save(&self, domain: &str, series: &Series) -> Result<(), SeriesError> {
        let path = self.path(domain, &series.location);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&path, &serde_json::to_vec_pretty(series)?)?;
        debug!(path = %path.display(), rows = series.len(), "series saved");
        Ok(())
    }

    /// Domains that currently have at least one series file.
    pub fn list_domains(&self) -> Result<Vec<String>, SeriesError> {
        let mut domains = Vec::new();
        if !self.root.exists() {
            return Ok(domains);
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                domains.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        domains.sort();
        Ok(domains)
    }

    /// All series persisted for a domain, sorted by location.
    pub fn load_domain(&self, domain: &str) -> Result<Vec<Series>, SeriesError> {
        let dir = self.root.join(domain);
        let mut series = Vec::new();
        if !dir.exists() {
            return Ok(series);
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let bytes = fs::read(&path)?;
                series.push(serde_json::from_slice::<Series>(&bytes)?);
            }
        }
        series.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(series)
    }
}

/// Whole-file replace: stage into a sibling temp file, then rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
