mod cli;
mod config;
mod selector;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indexmap::IndexMap;
use tracing::warn;

use epiwatch_assembler::{Assembler, DomainTable, ReferenceTable};
use epiwatch_core::{Adapter, Config};
use epiwatch_ingest::{DropFileAdapter, HttpTableAdapter, JobOutcome, Orchestrator, RunReport};
use epiwatch_series::SeriesStore;

use crate::cli::{CliArgs, Command};
use crate::config::{AdapterKind, PipelineConfig, SourceEntry};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    epiwatch_core::config::load_dotenv();
    let args = CliArgs::parse();
    let config = Config::from_env();
    config.log_summary();

    let pipeline = PipelineConfig::load(&args.config)?;

    match args.command {
        Command::Get { locations, skip, n_jobs, optimize } => {
            run_get(&config, &pipeline, &locations, skip, n_jobs, optimize).await
        }
        Command::Generate => run_generate(&config, &pipeline),
        Command::Report { domain } => run_report(&config, domain),
    }
}

/// One orchestrator pass per domain. Per-job failures are recorded in the
/// run report and do not fail the process.
async fn run_get(
    config: &Config,
    pipeline: &PipelineConfig,
    locations: &[String],
    skip: Vec<String>,
    n_jobs: Option<usize>,
    optimize: bool,
) -> Result<()> {
    let selected = selector::resolve(&pipeline.sources, locations)?;

    let mut by_domain: IndexMap<&str, Vec<&SourceEntry>> = IndexMap::new();
    for entry in selected {
        by_domain.entry(entry.spec.domain.as_str()).or_default().push(entry);
    }

    let mut skip_all = pipeline.skip_locations.clone();
    skip_all.extend(skip);

    for (domain, entries) in by_domain {
        let adapters: Vec<Arc<dyn Adapter>> = entries
            .iter()
            .map(|entry| build_adapter(entry, config))
            .collect::<Result<_>>()?;

        let mut orchestrator = Orchestrator::new(config, domain, pipeline.domain_spec(domain))
            .with_skip_list(&skip_all)
            .with_optimize(optimize);
        if let Some(n_jobs) = n_jobs {
            orchestrator = orchestrator.with_n_jobs(n_jobs);
        }

        let report = orchestrator.run(adapters).await?;
        for job_id in report.failed_job_ids() {
            warn!(job = %job_id, "final failure, see run report");
        }
        println!(
            "{domain}: {} ok, {} failed, {} skipped",
            report.successes(),
            report.failures(),
            report.skipped()
        );
    }
    Ok(())
}

fn build_adapter(entry: &SourceEntry, config: &Config) -> Result<Arc<dyn Adapter>> {
    match entry.adapter {
        AdapterKind::Http => Ok(Arc::new(HttpTableAdapter::new(
            entry.spec.clone(),
            config.fetch_timeout(),
            &config.user_agent,
        )?)),
        AdapterKind::File => {
            let path = entry.path.clone().with_context(|| {
                format!("source {} uses the file adapter but has no path", entry.spec.location)
            })?;
            Ok(Arc::new(DropFileAdapter::new(entry.spec.clone(), path)))
        }
    }
}

/// Assemble and publish the dataset. Any integrity error aborts with a
/// non-zero exit and nothing is written.
fn run_generate(config: &Config, pipeline: &PipelineConfig) -> Result<()> {
    let store = SeriesStore::new(config.series_dir());
    let mut domains = Vec::new();
    for domain in store.list_domains()? {
        let series = store.load_domain(&domain)?;
        domains.push(DomainTable { domain, series });
    }

    let reference = ReferenceTable::load(&config.reference_path())?;
    let assembler = Assembler::new(reference, pipeline.assembler.clone());
    let dataset = assembler.assemble(domains)?;
    dataset.save(&config.output_dir())?;

    println!(
        "published {} rows ({} locations latest) to {}",
        dataset.rows.len(),
        dataset.latest().len(),
        config.output_dir().display()
    );
    Ok(())
}

fn run_report(config: &Config, domain: Option<String>) -> Result<()> {
    let dir = config.reports_dir();
    let paths: Vec<std::path::PathBuf> = match domain {
        Some(domain) => vec![dir.join(format!("{domain}.json"))],
        None => {
            let mut paths = Vec::new();
            if dir.exists() {
                for entry in std::fs::read_dir(&dir)? {
                    let path = entry?.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        paths.push(path);
                    }
                }
            }
            paths.sort();
            paths
        }
    };

    if paths.is_empty() {
        println!("no run reports under {}", dir.display());
        return Ok(());
    }

    for path in paths {
        let Some(report) = RunReport::load(&path)? else {
            println!("no report at {}", path.display());
            continue;
        };
        println!(
            "{}: {} jobs: {} ok, {} failed, {} skipped ({})",
            report.domain,
            report.jobs.len(),
            report.successes(),
            report.failures(),
            report.skipped(),
            report.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );
        for job in &report.jobs {
            let duration = job
                .duration_seconds
                .map(|s| format!("{s:.2}s"))
                .unwrap_or_else(|| "-".into());
            let error = job
                .error_text
                .as_deref()
                .map(|e| format!("  [{e}]"))
                .unwrap_or_default();
            println!("  {:<44} {:>8}  {}{}", job.job_id, duration, outcome_label(job.outcome), error);
        }
    }
    Ok(())
}

fn outcome_label(outcome: JobOutcome) -> &'static str {
    match outcome {
        JobOutcome::Success => "success",
        JobOutcome::Failure => "FAILURE",
        JobOutcome::Skipped => "skipped",
    }
}
