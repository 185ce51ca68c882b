//! Pipeline executor: the checkpointed weekly extraction loop
//!
//! State machine:
//!
//! ```text
//! Idle -> Resuming -> ProcessingUnit(year, index) ... -> Consolidating -> Done
//! ```
//!
//! `Resuming` reads the checkpoint exactly once. Units are processed in
//! strictly increasing global order, and the checkpoint is written only
//! after a unit's artifact has been committed, so a crash at any point
//! leaves either a completed unit with a stale checkpoint (the unit is
//! redone and its artifact overwritten) or an untouched unit.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use super::config::PipelineConfig;
use super::error::{PipelineError, PipelineResult};
use crate::consolidate::{ConsolidationOutcome, Consolidator};
use crate::enrich::{Enricher, Jurisdiction};
use crate::fetch::{RemoteFetcher, RidershipSource, WeatherSource};
use crate::periods::{WeeklyUnit, plan_units};
use crate::schema::apply_schema;
use crate::store::{ProgressState, ProgressStore, WeeklyUnitStore};

/// Executor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Resuming,
    ProcessingUnit { year: i32, index: usize },
    Consolidating,
    Done,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Resuming => write!(f, "resuming"),
            Self::ProcessingUnit { year, index } => write!(f, "processing {year} week {index}"),
            Self::Consolidating => write!(f, "consolidating"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// What happened to one unit during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Covered by the checkpoint; nothing was fetched
    AlreadyCompleted,
    /// Dry run: the unit would be processed
    Planned,
    /// Records were fetched and the artifact written
    Completed { records: usize, artifact: PathBuf },
    /// No records for the period; an empty artifact was written
    Empty { artifact: PathBuf },
    /// The unit failed and was skipped for this run
    Failed { reason: String, recoverable: bool },
}

impl UnitOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AlreadyCompleted => "already completed",
            Self::Planned => "planned",
            Self::Completed { .. } => "completed",
            Self::Empty { .. } => "empty",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Outcome of one unit with timing
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub unit: WeeklyUnit,
    pub outcome: UnitOutcome,
    pub duration_ms: u64,
}

/// Pipeline executor that runs every weekly unit and consolidates once
pub struct PipelineExecutor {
    config: PipelineConfig,
    run_id: String,
    fingerprint: String,
    routes: Vec<String>,
    jurisdiction: Jurisdiction,
    state: PipelineState,
    fetcher: RemoteFetcher,
    weather: Option<Box<dyn WeatherSource>>,
    progress: ProgressStore,
    artifacts: WeeklyUnitStore,
    /// Highest global index known to be committed, from the checkpoint or this run
    last_committed: Option<usize>,
}

impl PipelineExecutor {
    /// Create an executor backed by the HTTP ridership and weather APIs
    #[cfg(feature = "http-source")]
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        use crate::fetch::{HttpRidershipSource, OpenMeteoSource};

        config.validate().map_err(PipelineError::ConfigError)?;

        let ridership =
            HttpRidershipSource::new(&config.ridership.url, config.ridership.timeout())?
                .with_app_token(config.ridership.app_token.clone());
        let weather: Option<Box<dyn WeatherSource>> = if config.weather.enabled {
            Some(Box::new(OpenMeteoSource::new(
                &config.weather.url,
                config.weather.timeout(),
            )?))
        } else {
            None
        };

        Self::with_sources(config, Box::new(ridership), weather)
    }

    /// Create an executor with explicit data sources
    pub fn with_sources(
        config: PipelineConfig,
        ridership: Box<dyn RidershipSource>,
        weather: Option<Box<dyn WeatherSource>>,
    ) -> PipelineResult<Self> {
        config.validate().map_err(PipelineError::ConfigError)?;
        let jurisdiction = config.jurisdiction().map_err(PipelineError::ConfigError)?;

        let fetcher = RemoteFetcher::new(ridership)
            .with_page_size(config.ridership.page_size)
            .with_route_pause(config.ridership.route_pause());
        let staging = config.staging_path();

        Ok(Self {
            run_id: Uuid::new_v4().to_string(),
            fingerprint: config.plan_fingerprint(),
            routes: config.effective_routes(),
            jurisdiction,
            state: PipelineState::Idle,
            fetcher,
            weather: if config.weather.enabled { weather } else { None },
            progress: ProgressStore::in_dir(&staging),
            artifacts: WeeklyUnitStore::new(staging),
            last_committed: None,
            config,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline
    pub fn run(&mut self) -> PipelineResult<PipelineReport> {
        if self.state == PipelineState::Done {
            return Err(PipelineError::AlreadyFinished(self.run_id.clone()));
        }

        let _span = info_span!(
            "pipeline_run",
            run_id = %self.run_id,
            dry_run = self.config.dry_run
        )
        .entered();

        let start = Instant::now();
        let units = plan_units(&self.config.years);

        info!(
            run_id = %self.run_id,
            years = ?self.config.effective_years(),
            routes = ?self.routes,
            units = units.len(),
            dry_run = self.config.dry_run,
            "Starting pipeline"
        );

        self.transition(PipelineState::Resuming);
        let resume_from = self.resume()?;
        self.last_committed = resume_from;

        let mut reports = Vec::with_capacity(units.len());
        for unit in units {
            if resume_from.is_some_and(|last| unit.global_index <= last) {
                debug!(unit = %unit.label(), "Unit already completed, skipping");
                reports.push(UnitReport {
                    unit,
                    outcome: UnitOutcome::AlreadyCompleted,
                    duration_ms: 0,
                });
                continue;
            }

            if self.config.dry_run {
                reports.push(UnitReport {
                    unit,
                    outcome: UnitOutcome::Planned,
                    duration_ms: 0,
                });
                continue;
            }

            self.transition(PipelineState::ProcessingUnit {
                year: unit.year,
                index: unit.index,
            });
            reports.push(self.run_unit(unit));
        }

        let consolidation = if self.config.dry_run {
            None
        } else {
            self.transition(PipelineState::Consolidating);
            Some(self.consolidate()?)
        };

        self.transition(PipelineState::Done);

        let report = PipelineReport {
            run_id: self.run_id.clone(),
            dry_run: self.config.dry_run,
            units: reports,
            consolidation,
            last_completed_index: self.last_committed,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            run_id = %self.run_id,
            duration_ms = report.duration_ms,
            completed = report.count("completed"),
            empty = report.count("empty"),
            skipped = report.count("already completed"),
            failed = report.count("failed"),
            "Pipeline finished"
        );

        Ok(report)
    }

    /// Read the checkpoint once and decide where to start
    fn resume(&self) -> PipelineResult<Option<usize>> {
        if !self.config.resume {
            if !self.config.dry_run {
                self.progress.clear()?;
                let removed = self.artifacts.remove_artifacts()?;
                info!(removed, "Removed artifacts of previous runs");
            }
            info!("Starting without checkpoint");
            return Ok(None);
        }

        let Some(state) = self.progress.load()? else {
            info!("No checkpoint found, starting from the first unit");
            return Ok(None);
        };

        if let Some(ref fingerprint) = state.plan_fingerprint
            && *fingerprint != self.fingerprint
        {
            return Err(PipelineError::ResumeError(format!(
                "Checkpoint {} was written for different years or routes",
                self.progress.path().display()
            )));
        }

        info!(
            last_completed_index = state.last_completed_index,
            "Resuming from checkpoint"
        );
        Ok(Some(state.last_completed_index))
    }

    /// Process one unit, converting any failure into a unit outcome
    fn run_unit(&mut self, unit: WeeklyUnit) -> UnitReport {
        let _span = info_span!(
            "pipeline_unit",
            year = unit.year,
            index = unit.index,
            global_index = unit.global_index
        )
        .entered();

        let start = Instant::now();
        let outcome = match self.process_unit(&unit) {
            Ok(outcome) => {
                info!(
                    unit = %unit.label(),
                    outcome = outcome.name(),
                    start = %unit.start,
                    end = %unit.end,
                    "Unit processed"
                );
                outcome
            }
            Err(e) => {
                let recoverable = e.is_recoverable();
                if recoverable {
                    warn!(unit = %unit.label(), error = %e, "Unit failed, skipping");
                } else {
                    error!(unit = %unit.label(), error = %e, "Unit failed, skipping");
                }
                UnitOutcome::Failed {
                    reason: e.to_string(),
                    recoverable,
                }
            }
        };

        UnitReport {
            unit,
            outcome,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Fetch, enrich, type and store one unit, then advance the checkpoint
    fn process_unit(&mut self, unit: &WeeklyUnit) -> PipelineResult<UnitOutcome> {
        let records = self
            .fetcher
            .fetch_routes(&self.routes, unit.start, unit.end)?;

        let mut enricher = Enricher::new(self.jurisdiction, self.config.weather.location());
        if let Some(ref weather) = self.weather {
            enricher = enricher.with_weather(weather.as_ref());
        }
        let batch = enricher.enrich(records);
        let typed = apply_schema(&batch)?;

        let artifact = self.artifacts.write(unit.year, unit.index, &typed)?;
        self.progress
            .save(&ProgressState::new(unit.global_index).with_fingerprint(&self.fingerprint))?;
        self.last_committed = Some(unit.global_index);

        Ok(if batch.is_empty() {
            UnitOutcome::Empty {
                artifact: artifact.path,
            }
        } else {
            UnitOutcome::Completed {
                records: batch.len(),
                artifact: artifact.path,
            }
        })
    }

    fn consolidate(&self) -> PipelineResult<ConsolidationOutcome> {
        let destination = self.config.final_dataset_path();
        let outcome = Consolidator::new(&self.artifacts).consolidate(&destination)?;

        if self.config.clean_staging && matches!(outcome, ConsolidationOutcome::Written { .. }) {
            info!(staging = %self.artifacts.dir().display(), "Removing staging directory");
            self.artifacts.remove_all()?;
        }
        Ok(outcome)
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = %self.state, to = %next, "State transition");
        self.state = next;
    }
}

/// Report from a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Run ID
    pub run_id: String,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Per-unit outcomes in processing order
    pub units: Vec<UnitReport>,
    /// Consolidation result (absent for dry runs)
    pub consolidation: Option<ConsolidationOutcome>,
    /// Checkpoint value at the end of the run
    pub last_completed_index: Option<usize>,
    /// Total duration in milliseconds
    pub duration_ms: u64,
}

impl PipelineReport {
    /// Number of units with the named outcome
    pub fn count(&self, outcome: &str) -> usize {
        self.units
            .iter()
            .filter(|u| u.outcome.name() == outcome)
            .count()
    }

    /// Units that failed during this run
    pub fn failed_units(&self) -> impl Iterator<Item = &UnitReport> {
        self.units
            .iter()
            .filter(|u| matches!(u.outcome, UnitOutcome::Failed { .. }))
    }

    /// Total records fetched during this run
    pub fn records_fetched(&self) -> usize {
        self.units
            .iter()
            .map(|u| match u.outcome {
                UnitOutcome::Completed { records, .. } => records,
                _ => 0,
            })
            .sum()
    }

    /// Check if every unit succeeded
    pub fn is_success(&self) -> bool {
        self.failed_units().next().is_none()
    }

    /// Get formatted duration
    pub fn duration_formatted(&self) -> String {
        let secs = self.duration_ms / 1000;
        let mins = secs / 60;
        let remaining_secs = secs % 60;

        if mins > 0 {
            format!("{}m {}s", mins, remaining_secs)
        } else {
            format!("{}s", secs)
        }
    }

    /// Print summary to stderr
    pub fn print_summary(&self) {
        eprintln!();
        let status = if self.dry_run {
            "dry run"
        } else if self.is_success() {
            "completed"
        } else {
            "completed with failures"
        };
        eprintln!("Pipeline {} - {}", self.run_id, status);
        eprintln!("Duration: {}", self.duration_formatted());
        eprintln!(
            "Units: {} completed, {} empty, {} already completed, {} planned, {} failed",
            self.count("completed"),
            self.count("empty"),
            self.count("already completed"),
            self.count("planned"),
            self.count("failed")
        );
        eprintln!("Records fetched: {}", self.records_fetched());

        for failed in self.failed_units() {
            if let UnitOutcome::Failed { ref reason, .. } = failed.outcome {
                eprintln!("  - {}: {}", failed.unit, reason);
            }
        }

        match &self.consolidation {
            Some(ConsolidationOutcome::Written {
                rows, partitions, ..
            }) => eprintln!(
                "Final dataset: {} rows in {} partitions",
                rows,
                partitions.len()
            ),
            Some(ConsolidationOutcome::NothingToConsolidate) => {
                eprintln!("Final dataset: nothing to consolidate")
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, FetchResult, HourlyWeather, Location, PageRequest};
    use crate::record::RidershipRecord;
    use chrono::NaiveDate;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// One record per route and period; times out for the listed start dates
    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        failing_starts: Mutex<Vec<NaiveDate>>,
    }

    impl RidershipSource for CountingSource {
        fn fetch_page(&self, request: &PageRequest<'_>) -> FetchResult<Vec<RidershipRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_starts.lock().unwrap().contains(&request.start) {
                return Err(FetchError::Timeout {
                    url: "test".to_string(),
                });
            }
            if request.offset > 0 {
                return Ok(Vec::new());
            }
            Ok(vec![RidershipRecord {
                transit_timestamp: request.start.and_hms_opt(9, 0, 0).unwrap(),
                route: request.route.to_string(),
                ridership: 42,
                transfers: 3,
            }])
        }
    }

    struct NoWeather;

    impl WeatherSource for NoWeather {
        fn hourly(&self, _: Location, _: NaiveDate, _: NaiveDate) -> FetchResult<HourlyWeather> {
            Ok(HourlyWeather::default())
        }
    }

    fn config(temp: &TempDir) -> PipelineConfig {
        PipelineConfig::new()
            .with_years(vec![2024])
            .with_routes(["M15"])
            .with_base_path(temp.path())
            .with_route_pause(std::time::Duration::ZERO)
    }

    fn executor(config: PipelineConfig, source: &Arc<CountingSource>) -> PipelineExecutor {
        PipelineExecutor::with_sources(
            config,
            Box::new(source.clone()),
            Some(Box::new(NoWeather)),
        )
        .unwrap()
    }

    #[test]
    fn test_executor_creation() {
        let temp = TempDir::new().unwrap();
        let source = Arc::new(CountingSource::default());
        let executor = executor(config(&temp), &source);
        assert_eq!(executor.state(), PipelineState::Idle);
        assert!(!executor.run_id().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let source = Arc::new(CountingSource::default());
        let result = PipelineExecutor::with_sources(
            PipelineConfig::new(),
            Box::new(source),
            None,
        );
        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn test_full_run_reaches_done() {
        let temp = TempDir::new().unwrap();
        let source = Arc::new(CountingSource::default());
        let mut executor = executor(config(&temp), &source);

        let report = executor.run().unwrap();
        let units = plan_units(&[2024]).len();

        assert_eq!(executor.state(), PipelineState::Done);
        assert!(report.is_success());
        assert_eq!(report.count("completed"), units);
        assert_eq!(report.last_completed_index, Some(units - 1));
        assert!(matches!(
            report.consolidation,
            Some(ConsolidationOutcome::Written { rows, .. }) if rows == units
        ));

        // Done is terminal
        assert!(matches!(
            executor.run(),
            Err(PipelineError::AlreadyFinished(_))
        ));
    }

    #[test]
    fn test_resume_skips_completed_units_without_fetching() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let store = ProgressStore::in_dir(&config.staging_path());
        store
            .save(&ProgressState::new(9).with_fingerprint(config.plan_fingerprint()))
            .unwrap();

        let source = Arc::new(CountingSource::default());
        let report = executor(config, &source).run().unwrap();
        let units = plan_units(&[2024]).len();

        assert_eq!(report.count("already completed"), 10);
        assert_eq!(report.count("completed"), units - 10);
        // Two requests per processed unit: one page with data, one empty
        assert_eq!(source.calls.load(Ordering::SeqCst), (units - 10) * 2);
    }

    #[test]
    fn test_fingerprint_mismatch_refuses_resume() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        ProgressStore::in_dir(&config.staging_path())
            .save(&ProgressState::new(3).with_fingerprint("another plan"))
            .unwrap();

        let source = Arc::new(CountingSource::default());
        let result = executor(config, &source).run();
        assert!(matches!(result, Err(PipelineError::ResumeError(_))));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fresh_run_ignores_checkpoint() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp).with_resume(false);
        ProgressStore::in_dir(&config.staging_path())
            .save(&ProgressState::new(50).with_fingerprint("another plan"))
            .unwrap();

        let source = Arc::new(CountingSource::default());
        let report = executor(config, &source).run().unwrap();
        assert_eq!(report.count("already completed"), 0);
        assert!(report.is_success());
    }

    #[test]
    fn test_dry_run_fetches_and_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp).with_dry_run(true);
        let staging = config.staging_path();

        let source = Arc::new(CountingSource::default());
        let report = executor(config, &source).run().unwrap();

        assert_eq!(report.count("planned"), plan_units(&[2024]).len());
        assert!(report.consolidation.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert!(!staging.exists());
    }

    #[test]
    fn test_failed_unit_does_not_write_its_own_progress() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let units = plan_units(&[2024]);
        let last = *units.last().unwrap();

        let source = Arc::new(CountingSource::default());
        source.failing_starts.lock().unwrap().push(last.start);
        let report = executor(config.clone(), &source).run().unwrap();

        assert!(!report.is_success());
        assert_eq!(report.count("failed"), 1);
        assert_eq!(report.last_completed_index, Some(last.global_index - 1));
        assert!(matches!(
            report.failed_units().next().unwrap().outcome,
            UnitOutcome::Failed {
                recoverable: true,
                ..
            }
        ));
        let artifacts = WeeklyUnitStore::new(config.staging_path()).list_all().unwrap();
        assert_eq!(artifacts.len(), units.len() - 1);
    }

    #[test]
    fn test_fresh_run_consolidates_only_its_own_years() {
        let temp = TempDir::new().unwrap();
        let source = Arc::new(CountingSource::default());
        executor(config(&temp).with_years(vec![2022]), &source)
            .run()
            .unwrap();

        let fresh = config(&temp).with_resume(false);
        let report = executor(fresh.clone(), &source).run().unwrap();

        assert!(report.is_success());
        let partitions = crate::consolidate::list_partitions(&fresh.final_dataset_path()).unwrap();
        let years: Vec<u16> = partitions.iter().map(|p| p.year).collect();
        assert_eq!(years, vec![2024]);
        assert_eq!(
            report.consolidation.map(|c| c.rows()),
            Some(plan_units(&[2024]).len())
        );
    }

    #[test]
    fn test_last_completed_index_tracks_this_run() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp).with_clean_staging(true);
        let units = plan_units(&[2024]);

        let source = Arc::new(CountingSource::default());
        let report = executor(config.clone(), &source).run().unwrap();

        assert!(!config.staging_path().exists());
        assert_eq!(report.last_completed_index, Some(units.len() - 1));
    }

    #[test]
    fn test_repeated_routes_fetched_once_per_unit() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp).with_routes(["M15", "B46", "M15"]);
        let units = plan_units(&[2024]);

        let source = Arc::new(CountingSource::default());
        let report = executor(config, &source).run().unwrap();

        // Two effective routes, each with a data page and a closing empty page
        assert_eq!(source.calls.load(Ordering::SeqCst), units.len() * 4);
        assert_eq!(report.records_fetched(), units.len() * 2);
    }
}
