//! The job orchestrator: a bounded worker pool running independent
//! per-location jobs with fault isolation and a single retry pass.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use epiwatch_core::adapter::normalize_location;
use epiwatch_core::{Adapter, Config, DomainSpec, RollingSpec, Series, SourceSpec};
use epiwatch_series::{merge, repair_monotonic, rolling_ratio, rolling_sum, Pipeline, SeriesStore};

use crate::error::JobError;
use crate::job::{Job, JobOutcome, JobReport};
use crate::report::{order_by_previous_durations, RunReport};

/// Runs one ingestion pass over a domain: N independent per-location jobs
/// (Adapter → Repair → Merge) under a bounded worker pool, then a single
/// sequential retry pass over the failures.
pub struct Orchestrator {
    domain: String,
    domain_spec: DomainSpec,
    store: SeriesStore,
    n_jobs: usize,
    fetch_timeout: Duration,
    skip_locations: Vec<String>,
    optimize: bool,
    report_path: std::path::PathBuf,
}

impl Orchestrator {
    pub fn new(config: &Config, domain: impl Into<String>, domain_spec: DomainSpec) -> Self {
        let domain = domain.into();
        Self {
            report_path: config.reports_dir().join(format!("{domain}.json")),
            store: SeriesStore::new(config.series_dir()),
            n_jobs: config.n_jobs,
            fetch_timeout: config.fetch_timeout(),
            skip_locations: Vec::new(),
            optimize: false,
            domain,
            domain_spec,
        }
    }

    /// Locations to resolve directly `Pending → Skipped`, never invoking
    /// their adapter.
    pub fn with_skip_list(mut self, locations: &[String]) -> Self {
        self.skip_locations = locations.iter().map(|l| normalize_location(l)).collect();
        self
    }

    /// Enable longest-job-first ordering from the previous run's report.
    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs.max(1);
        self
    }

    /// Run all jobs and persist the run report. Per-job failures are
    /// recorded, not propagated: partial data is preferable to no data.
    pub async fn run(&self, adapters: Vec<Arc<dyn Adapter>>) -> Result<RunReport, JobError> {
        let started_at = Utc::now();
        let t0 = Instant::now();

        let mut work: Vec<Arc<dyn Adapter>> = adapters;
        if self.optimize {
            let previous = RunReport::load(&self.report_path)?;
            work = order_by_previous_durations(
                work,
                |adapter| adapter.spec().job_id(),
                previous.as_ref(),
            );
        }

        info!(
            domain = %self.domain,
            jobs = work.len(),
            n_jobs = self.n_jobs,
            "starting ingestion run"
        );

        let mut reports = self.first_pass(work.clone()).await;
        let first_pass_secs = t0.elapsed().as_secs_f64();

        self.retry_pass(&work, &mut reports).await;

        // Slowest jobs first, the shape operators read.
        reports.sort_by(|a, b| {
            b.duration_seconds
                .unwrap_or(0.0)
                .partial_cmp(&a.duration_seconds.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let report = RunReport {
            domain: self.domain.clone(),
            started_at,
            finished_at: Utc::now(),
            jobs: reports,
        };
        report.save(&self.report_path)?;

        info!(
            domain = %self.domain,
            success = report.successes(),
            failed = report.failures(),
            skipped = report.skipped(),
            first_pass_secs,
            total_secs = t0.elapsed().as_secs_f64(),
            "ingestion run finished"
        );
        Ok(report)
    }

    /// Bounded pool: workers pull from a shared queue, push reports into
    /// an mpsc collector. `n_jobs = 1` degenerates to strictly sequential
    /// execution.
    async fn first_pass(&self, work: Vec<Arc<dyn Adapter>>) -> Vec<JobReport> {
        let queue: Arc<Mutex<VecDeque<Arc<dyn Adapter>>>> =
            Arc::new(Mutex::new(work.into_iter().collect()));
        let (tx, mut rx) = mpsc::unbounded_channel::<JobReport>();

        let mut workers = Vec::with_capacity(self.n_jobs);
        for _ in 0..self.n_jobs {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let ctx = self.job_context();
            workers.push(tokio::spawn(async move {
                loop {
                    let next = queue.lock().unwrap().pop_front();
                    let Some(adapter) = next else { break };
                    let report = ctx.execute(adapter).await;
                    if tx.send(report).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut reports = Vec::new();
        while let Some(report) = rx.recv().await {
            reports.push(report);
        }
        for worker in workers {
            let _ = worker.await;
        }
        reports
    }

    /// Re-run every failure exactly once, sequentially. A retry success
    /// keeps the first-attempt error text for audit; a second failure is
    /// final but non-fatal.
    async fn retry_pass(&self, work: &[Arc<dyn Adapter>], reports: &mut [JobReport]) {
        let by_id: HashMap<String, &Arc<dyn Adapter>> =
            work.iter().map(|a| (a.spec().job_id(), a)).collect();
        let failed: Vec<usize> = reports
            .iter()
            .enumerate()
            .filter(|(_, r)| r.outcome == JobOutcome::Failure)
            .map(|(i, _)| i)
            .collect();
        if failed.is_empty() {
            return;
        }

        info!(domain = %self.domain, retries = failed.len(), "retrying failed jobs");
        let ctx = self.job_context();
        for index in failed {
            let job_id = reports[index].job_id.clone();
            let Some(adapter) = by_id.get(job_id.as_str()) else {
                continue;
            };
            let retried = ctx.execute(Arc::clone(adapter)).await;
            match retried.outcome {
                JobOutcome::Success => {
                    let first_error = reports[index].error_text.take();
                    reports[index] = JobReport {
                        error_text: first_error,
                        ..retried
                    };
                }
                _ => reports[index] = retried,
            }
        }
    }

    fn job_context(&self) -> JobContext {
        JobContext {
            domain: self.domain.clone(),
            domain_spec: self.domain_spec.clone(),
            store: self.store.clone(),
            fetch_timeout: self.fetch_timeout,
            skip_locations: self.skip_locations.clone(),
        }
    }
}

// ── Per-job execution ────────────────────────────────────────────────

/// Everything one job needs; cloned into each worker. Jobs share no
/// mutable business state, so there is nothing to lock.
#[derive(Clone)]
struct JobContext {
    domain: String,
    domain_spec: DomainSpec,
    store: SeriesStore,
    fetch_timeout: Duration,
    skip_locations: Vec<String>,
}

impl JobContext {
    /// Run one job to a terminal state. Every error, and every panic,
    /// is contained here and becomes a `Failure` report.
    async fn execute(&self, adapter: Arc<dyn Adapter>) -> JobReport {
        let spec = adapter.spec().clone();
        let mut job = Job::new(spec.job_id(), spec.location.clone(), self.domain.clone());

        if self.skip_locations.contains(&normalize_location(&job.location)) {
            job.finish(JobOutcome::Skipped);
            warn!(job = %job.id, "skipped");
            return JobReport::skipped(job.id);
        }

        job.start();
        info!(job = %job.id, "started");
        let t0 = Instant::now();

        let ctx = self.clone();
        let handle = tokio::spawn(async move { ctx.run_pipeline(adapter).await });
        let result = match handle.await {
            Ok(result) => result,
            Err(join_error) => Err(JobError::Panic(join_error.to_string())),
        };
        let elapsed = t0.elapsed().as_secs_f64();

        match result {
            Ok(rows) => {
                job.finish(JobOutcome::Success);
                info!(job = %job.id, rows, secs = elapsed, "success");
                JobReport::success(job.id, elapsed)
            }
            Err(e) => {
                job.finish(JobOutcome::Failure);
                error!(job = %job.id, error = %e, "failed");
                JobReport::failure(job.id, elapsed, e.to_string())
            }
        }
    }

    /// Adapter → rename → repair → rolling → merge → store.
    async fn run_pipeline(&self, adapter: Arc<dyn Adapter>) -> Result<usize, JobError> {
        let spec = adapter.spec().clone();

        let fetched = tokio::time::timeout(self.fetch_timeout, adapter.fetch())
            .await
            .map_err(|_| epiwatch_core::FetchError::Timeout(self.fetch_timeout))??;

        let rows = apply_renames(fetched, &spec);
        let incoming = Series::from_rows(spec.location.clone(), rows)
            .map_err(epiwatch_series::SeriesError::from)?;

        let incoming = build_pipeline(&self.domain_spec).apply(incoming)?;

        let persisted = self.store.load(&self.domain, &spec.location)?;
        let merged = merge(persisted.as_ref(), incoming, spec.cadence)?;
        self.store.save(&self.domain, &merged)?;
        Ok(merged.len())
    }
}

/// Apply the source's raw-column -> canonical-metric map.
fn apply_renames(
    rows: Vec<epiwatch_core::Observation>,
    spec: &SourceSpec,
) -> Vec<epiwatch_core::Observation> {
    if spec.rename_columns.is_empty() {
        return rows;
    }
    rows.into_iter()
        .map(|mut row| {
            row.metrics = row
                .metrics
                .into_iter()
                .map(|(name, value)| {
                    let name = spec.rename_columns.get(&name).cloned().unwrap_or(name);
                    (name, value)
                })
                .collect();
            row
        })
        .collect()
}

/// The domain's ordered transform chain: repair, then each rolling
/// derivation.
fn build_pipeline(domain_spec: &DomainSpec) -> Pipeline {
    let mut pipeline = Pipeline::new();

    let cumulative = domain_spec.cumulative_metrics.clone();
    let max_removed = domain_spec.max_removed_rows;
    if !cumulative.is_empty() {
        pipeline = pipeline.step("repair_monotonic", move |series| {
            repair_monotonic(series, &cumulative, max_removed)
        });
    }

    for rolling in &domain_spec.rolling {
        pipeline = match rolling.clone() {
            RollingSpec::Sum { metric, output, window } => {
                let name = format!("rolling_sum:{output}");
                pipeline.step(name, move |series| rolling_sum(series, &metric, &output, window))
            }
            RollingSpec::Ratio { numerator, denominator, output, window, decimals } => {
                let name = format!("rolling_ratio:{output}");
                pipeline.step(name, move |series| {
                    rolling_ratio(series, &numerator, &denominator, &output, window, decimals)
                })
            }
        };
    }
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use indexmap::IndexMap;

    use epiwatch_core::{Cadence, FetchError, Observation};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn source_spec(location: &str) -> SourceSpec {
        SourceSpec {
            location: location.into(),
            domain: "vaccinations".into(),
            url: None,
            cadence: Cadence::Daily,
            batch: true,
            rename_columns: IndexMap::new(),
        }
    }

    /// Scripted adapter: a queue of per-attempt results plus an invocation
    /// counter.
    struct ScriptedAdapter {
        spec: SourceSpec,
        fail_first: u32,
        panics: bool,
        calls: AtomicU32,
    }

    impl ScriptedAdapter {
        fn ok(location: &str) -> Self {
            Self {
                spec: source_spec(location),
                fail_first: 0,
                panics: false,
                calls: AtomicU32::new(0),
            }
        }

        fn failing(location: &str) -> Self {
            Self { fail_first: u32::MAX, ..Self::ok(location) }
        }

        fn flaky(location: &str) -> Self {
            Self { fail_first: 1, ..Self::ok(location) }
        }

        fn panicking(location: &str) -> Self {
            Self { panics: true, ..Self::ok(location) }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Adapter for ScriptedAdapter {
        fn spec(&self) -> &SourceSpec {
            &self.spec
        }

        async fn fetch(&self) -> Result<Vec<Observation>, FetchError> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panics {
                panic!("adapter exploded");
            }
            if attempt < self.fail_first {
                return Err(FetchError::Http("503 service unavailable".into()));
            }
            Ok(vec![
                Observation::new(&self.spec.location, d(1), "https://example.org")
                    .with_metric("total_vaccinations", 100_i64),
                Observation::new(&self.spec.location, d(2), "https://example.org")
                    .with_metric("total_vaccinations", 150_i64),
            ])
        }
    }

    fn test_orchestrator(dir: &std::path::Path) -> Orchestrator {
        let config = Config {
            data_dir: dir.to_path_buf(),
            n_jobs: 4,
            fetch_timeout_secs: 5,
            user_agent: "test".into(),
        };
        let spec = DomainSpec {
            cumulative_metrics: vec!["total_vaccinations".into()],
            max_removed_rows: 10,
            rolling: vec![],
        };
        Orchestrator::new(&config, "vaccinations", spec)
    }

    #[tokio::test]
    async fn failures_are_isolated_from_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapters: Vec<Arc<dyn Adapter>> = Vec::new();
        for i in 0..10 {
            let location = format!("Country{i}");
            if i == 3 || i == 7 {
                adapters.push(Arc::new(ScriptedAdapter::failing(&location)));
            } else {
                adapters.push(Arc::new(ScriptedAdapter::ok(&location)));
            }
        }

        let report = test_orchestrator(dir.path()).run(adapters).await.unwrap();
        assert_eq!(report.successes(), 8);
        assert_eq!(report.failures(), 2);
        let mut failed = report.failed_job_ids();
        failed.sort();
        assert_eq!(failed, vec!["vaccinations/country3", "vaccinations/country7"]);
    }

    #[tokio::test]
    async fn retry_success_retains_first_attempt_error() {
        let dir = tempfile::tempdir().unwrap();
        let flaky = Arc::new(ScriptedAdapter::flaky("Utopia"));
        let report = test_orchestrator(dir.path())
            .run(vec![flaky.clone() as Arc<dyn Adapter>])
            .await
            .unwrap();

        assert_eq!(report.successes(), 1);
        assert_eq!(report.failures(), 0);
        let job = &report.jobs[0];
        assert_eq!(job.outcome, JobOutcome::Success);
        let audit = job.error_text.as_deref().unwrap();
        assert!(audit.contains("503"), "first-attempt error kept: {audit}");
        assert_eq!(flaky.calls(), 2);
    }

    #[tokio::test]
    async fn persistent_failure_is_retried_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let failing = Arc::new(ScriptedAdapter::failing("Utopia"));
        let report = test_orchestrator(dir.path())
            .run(vec![failing.clone() as Arc<dyn Adapter>])
            .await
            .unwrap();

        assert_eq!(report.failures(), 1);
        assert_eq!(failing.calls(), 2);
    }

    #[tokio::test]
    async fn skip_list_never_invokes_the_adapter() {
        let dir = tempfile::tempdir().unwrap();
        let skipped = Arc::new(ScriptedAdapter::ok("Utopia"));
        let report = test_orchestrator(dir.path())
            .with_skip_list(&["Utopia".to_string()])
            .run(vec![skipped.clone() as Arc<dyn Adapter>])
            .await
            .unwrap();

        assert_eq!(report.skipped(), 1);
        assert_eq!(skipped.calls(), 0);
        assert_eq!(report.jobs[0].duration_seconds, None);
    }

    #[tokio::test]
    async fn panics_are_contained_as_failures() {
        let dir = tempfile::tempdir().unwrap();
        let adapters: Vec<Arc<dyn Adapter>> = vec![
            Arc::new(ScriptedAdapter::panicking("Utopia")),
            Arc::new(ScriptedAdapter::ok("Ruritania")),
        ];
        let report = test_orchestrator(dir.path()).run(adapters).await.unwrap();
        assert_eq!(report.successes(), 1);
        assert_eq!(report.failures(), 1);
    }

    #[tokio::test]
    async fn sequential_pool_completes_all_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let adapters: Vec<Arc<dyn Adapter>> = (0..5)
            .map(|i| Arc::new(ScriptedAdapter::ok(&format!("Country{i}"))) as Arc<dyn Adapter>)
            .collect();
        let report = test_orchestrator(dir.path())
            .with_n_jobs(1)
            .run(adapters)
            .await
            .unwrap();
        assert_eq!(report.successes(), 5);
    }

    #[tokio::test]
    async fn success_writes_canonical_series() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = test_orchestrator(dir.path());
        orchestrator
            .run(vec![Arc::new(ScriptedAdapter::ok("Utopia")) as Arc<dyn Adapter>])
            .await
            .unwrap();

        let store = SeriesStore::new(dir.path().join("series"));
        let series = store.load("vaccinations", "Utopia").unwrap().unwrap();
        assert_eq!(series.len(), 2);
    }

    #[tokio::test]
    async fn run_report_is_persisted_for_next_run() {
        let dir = tempfile::tempdir().unwrap();
        test_orchestrator(dir.path())
            .run(vec![Arc::new(ScriptedAdapter::ok("Utopia")) as Arc<dyn Adapter>])
            .await
            .unwrap();

        let path = dir.path().join("reports/vaccinations.json");
        let loaded = RunReport::load(&path).unwrap().unwrap();
        assert_eq!(loaded.jobs.len(), 1);
        assert_eq!(loaded.domain, "vaccinations");
    }

    #[test]
    fn renames_map_raw_columns() {
        let mut spec = source_spec("Utopia");
        spec.rename_columns.insert("Cumulative total".into(), "total_tests".into());
        let rows = vec![Observation::new("Utopia", d(1), "https://example.org")
            .with_metric("Cumulative total", 10_i64)
            .with_metric("positives", 2_i64)];
        let renamed = apply_renames(rows, &spec);
        assert!(renamed[0].metric("total_tests").is_some());
        assert!(renamed[0].metric("Cumulative total").is_none());
        assert!(renamed[0].metric("positives").is_some());
    }
}
