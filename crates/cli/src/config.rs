//! Pipeline configuration: which domains exist, which sources feed them,
//! and how the assembler publishes. Loaded once from a YAML file and
//! passed down; process-level settings come from the environment via
//! [`epiwatch_core::Config`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use epiwatch_assembler::AssemblerConfig;
use epiwatch_core::{DomainSpec, SourceSpec};

/// How a source's rows are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// Generic JSON table endpoint.
    #[default]
    Http,
    /// Pre-normalized rows dropped on disk by an out-of-process scraper.
    File,
}

/// One configured source: the [`SourceSpec`] the core consumes plus
/// wiring for the bundled adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    #[serde(flatten)]
    pub spec: SourceSpec,

    #[serde(default)]
    pub adapter: AdapterKind,

    /// Drop-file location for `adapter: file` sources.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// The whole pipeline shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Domain name -> processing rules shared by its sources.
    #[serde(default)]
    pub domains: IndexMap<String, DomainSpec>,

    #[serde(default)]
    pub sources: Vec<SourceEntry>,

    /// Default skip list, extended by `--skip`.
    #[serde(default)]
    pub skip_locations: Vec<String>,

    #[serde(default)]
    pub assembler: AssemblerConfig,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse pipeline config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Every source must point at a configured domain.
    fn validate(&self) -> Result<()> {
        for source in &self.sources {
            if !self.domains.contains_key(&source.spec.domain) {
                anyhow::bail!(
                    "source {} references unknown domain {}",
                    source.spec.location,
                    source.spec.domain
                );
            }
        }
        Ok(())
    }

    pub fn domain_spec(&self, domain: &str) -> DomainSpec {
        self.domains.get(domain).cloned().unwrap_or_default()
    }

    /// Configured domain names, in file order.
    pub fn domain_names(&self) -> Vec<&str> {
        self.domains.keys().map(|k| k.as_str()).collect()
    }
}
