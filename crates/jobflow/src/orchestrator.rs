//! Orchestrator facade: submission, human review decisions, status polling
//! and history queries over the three workflows.
//!
//! Runs are dispatched to a [`WorkerPool`]. A collector thread drains the
//! pool's report channel, marks the run finished in the [`RunRegistry`] and
//! publishes the report so callers can block on [`JobOrchestrator::wait_for_run`].
//! A failed run that left its record mid-flight is settled as `failed`.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::broadcast::RunProgressBroadcaster;
use crate::collaborators::Collaborators;
use crate::config::schema::{Config, RepositoryBackend, RepositoryConfig, RetentionConfig};
use crate::config::{load_profile, validate_config};
use crate::error::{ConfigError, JobflowError, OrchestratorError, WorkerError};
use crate::graph::RunSnapshot;
use crate::model::posting::non_blank;
use crate::model::{
    ApplicationType, Document, JobMode, JobPosting, JobRecord, JobSource, JobStatus, RawInput,
};
use crate::repository::{InMemoryJobRepository, JobRepository, JobUpdate, SqliteJobRepository};
use crate::runs::{kind_for_record, RunEntry, RunRegistry};
use crate::sanitize::{redact_path, redact_url};
use crate::worker::{RunInput, RunReport, RunRequest, WorkerPool};
use crate::workflows::{
    ApplicationState, PreparationState, RetryState, WorkflowContext, WorkflowKind, Workflows,
};

/// A new job to prepare.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub source: JobSource,
    pub mode: JobMode,
    pub raw_input: RawInput,
}

impl Submission {
    pub fn new(source: JobSource, mode: JobMode, raw_input: RawInput) -> Self {
        Self {
            source,
            mode,
            raw_input,
        }
    }

    fn validate(&self) -> Result<(), OrchestratorError> {
        let raw = &self.raw_input;
        match self.source {
            JobSource::Url | JobSource::Linkedin if non_blank(&raw.url).is_none() => {
                Err(OrchestratorError::InvalidSubmission(format!(
                    "URL is required for source '{}'",
                    self.source
                )))
            }
            JobSource::Manual if !raw.has_posting_fields() => {
                Err(OrchestratorError::InvalidSubmission(
                    "title and company are required for source 'manual'".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// The URL used for duplicate detection.
    fn posting_url(&self) -> Option<&str> {
        non_blank(&self.raw_input.application_url).or_else(|| non_blank(&self.raw_input.url))
    }
}

/// A human review decision for a `pending` job.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Approved {
        application_type: Option<ApplicationType>,
    },
    Declined,
    Retry {
        feedback: String,
    },
}

impl Decision {
    /// Parses a loosely typed decision as received from an outer layer.
    pub fn parse(
        decision: &str,
        feedback: Option<&str>,
        application_type: Option<&str>,
    ) -> Result<Self, OrchestratorError> {
        match decision.trim() {
            "approved" => {
                let application_type = application_type
                    .map(str::parse::<ApplicationType>)
                    .transpose()
                    .map_err(|e| OrchestratorError::InvalidDecision(e.to_string()))?;
                Ok(Decision::Approved { application_type })
            }
            "declined" => Ok(Decision::Declined),
            "retry" => Ok(Decision::Retry {
                feedback: feedback.unwrap_or_default().to_string(),
            }),
            other => Err(OrchestratorError::InvalidDecision(other.to_string())),
        }
    }

    fn validate(&self) -> Result<(), OrchestratorError> {
        match self {
            Decision::Retry { feedback } if feedback.trim().is_empty() => Err(
                OrchestratorError::InvalidDecision("feedback is required for retry".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub job_id: String,
    pub run_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionReceipt {
    pub job_id: String,
    /// Status of the record once the decision was applied.
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowKind>,
    pub message: String,
}

/// Current view of a job, from its live run or from the repository.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowKind>,
    /// A run for this job is still executing.
    pub running: bool,
    /// The run entry was rebuilt from the repository after a restart.
    pub recovered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<JobSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<JobMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_posting: Option<JobPosting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_document: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_file_path: Option<String>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobStatusView {
    fn from_record(record: JobRecord, entry: Option<&RunEntry>) -> Self {
        Self {
            job_id: record.job_id,
            status: record.status,
            current_step: record.status.as_str().to_string(),
            run_id: entry.map(|e| e.run_id.clone()),
            workflow: entry.map(|e| e.kind),
            running: false,
            recovered: entry.is_some_and(|e| e.recovered),
            source: Some(record.source),
            mode: Some(record.mode),
            job_posting: record.job_posting,
            generated_document: record.generated_document,
            rendered_file_path: record.rendered_file_path,
            retry_count: record.retry_count,
            error_message: record.error_message,
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
        }
    }

    fn from_run(entry: &RunEntry, finished: bool, updated_at: DateTime<Utc>) -> Self {
        Self {
            job_id: entry.job_id.clone(),
            status: JobStatus::Queued,
            current_step: JobStatus::Queued.as_str().to_string(),
            run_id: Some(entry.run_id.clone()),
            workflow: Some(entry.kind),
            running: !finished,
            recovered: false,
            source: None,
            mode: None,
            job_posting: None,
            generated_document: None,
            rendered_file_path: None,
            retry_count: 0,
            error_message: None,
            created_at: Some(entry.started_at),
            updated_at: Some(updated_at),
        }
    }

    fn from_preparation(entry: &RunEntry, snapshot: RunSnapshot<PreparationState>) -> Self {
        let state = snapshot.state;
        Self {
            status: state.status,
            current_step: state.current_step.clone(),
            source: Some(state.source),
            mode: Some(state.mode),
            error_message: state.error_message(),
            job_posting: state.job_posting,
            generated_document: state.generated_document,
            rendered_file_path: state.rendered_file_path,
            ..Self::from_run(entry, snapshot.finished, snapshot.updated_at)
        }
    }

    fn from_retry(entry: &RunEntry, snapshot: RunSnapshot<RetryState>) -> Self {
        let state = snapshot.state;
        Self {
            status: state.status,
            current_step: state.current_step.clone(),
            mode: state.mode,
            retry_count: state.retry_count,
            error_message: state.error_message(),
            job_posting: state.job_posting,
            generated_document: state.generated_document,
            rendered_file_path: state.rendered_file_path,
            ..Self::from_run(entry, snapshot.finished, snapshot.updated_at)
        }
    }

    fn from_application(entry: &RunEntry, snapshot: RunSnapshot<ApplicationState>) -> Self {
        let state = snapshot.state;
        Self {
            status: state.status,
            current_step: state.current_step.clone(),
            error_message: state.error_message(),
            job_posting: state.job_posting,
            generated_document: state.generated_document,
            rendered_file_path: state.rendered_file_path,
            ..Self::from_run(entry, snapshot.finished, snapshot.updated_at)
        }
    }
}

/// One row of the review queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    pub job_id: String,
    pub job_posting: Option<JobPosting>,
    pub generated_document: Option<Document>,
    pub rendered_file_path: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl From<JobRecord> for PendingApproval {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            job_posting: record.job_posting,
            generated_document: record.generated_document,
            rendered_file_path: record.rendered_file_path,
            retry_count: record.retry_count,
            created_at: record.created_at,
        }
    }
}

/// One row of the application history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub job_id: String,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub status: JobStatus,
    pub application_type: Option<ApplicationType>,
    pub applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<JobRecord> for HistoryItem {
    fn from(record: JobRecord) -> Self {
        let (job_title, company) = match record.job_posting {
            Some(posting) => (Some(posting.title), Some(posting.company)),
            None => (None, None),
        };
        Self {
            job_id: record.job_id,
            job_title,
            company,
            status: record.status,
            application_type: record.application_type,
            applied_at: record.applied_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// How many runs the orchestrator still holds in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetainedRuns {
    pub registry_entries: usize,
    pub snapshots: usize,
    pub reports: usize,
}

/// Reports in publication order, capped at `capacity`.
struct ReportLog {
    by_run: HashMap<String, RunReport>,
    order: VecDeque<String>,
    capacity: usize,
}

impl ReportLog {
    fn insert(&mut self, report: RunReport) {
        let run_id = report.run_id.clone();
        if self.by_run.insert(run_id.clone(), report).is_none() {
            self.order.push_back(run_id);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.by_run.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, run_id: &str) -> bool {
        if self.by_run.remove(run_id).is_none() {
            return false;
        }
        self.order.retain(|id| id != run_id);
        true
    }
}

/// Finished-run reports, with a condition variable for waiters.
struct ReportBoard {
    reports: Mutex<ReportLog>,
    ready: Condvar,
}

impl ReportBoard {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            reports: Mutex::new(ReportLog {
                by_run: HashMap::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReportLog> {
        match self.reports.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Report board lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn publish(&self, report: RunReport) {
        self.lock().insert(report);
        self.ready.notify_all();
    }

    fn get(&self, run_id: &str) -> Option<RunReport> {
        self.lock().by_run.get(run_id).cloned()
    }

    fn remove(&self, run_id: &str) -> bool {
        self.lock().remove(run_id)
    }

    fn len(&self) -> usize {
        self.lock().by_run.len()
    }

    fn wait(&self, run_id: &str, timeout: Duration) -> Option<RunReport> {
        let guard = self.lock();
        let (guard, _) = match self
            .ready
            .wait_timeout_while(guard, timeout, |log| !log.by_run.contains_key(run_id))
        {
            Ok(result) => result,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.by_run.get(run_id).cloned()
    }
}

/// Marks the record of a failed run `failed` unless the run already left it
/// at rest. Covers aborted graphs and runs whose save step never ran.
fn settle_failed_run(repository: &dyn JobRepository, report: &RunReport) {
    let record = match repository.get(&report.job_id) {
        Ok(Some(record)) => record,
        Ok(None) => return,
        Err(e) => {
            error!("Failed to load job {} after run {}: {}", report.job_id, report.run_id, e);
            return;
        }
    };
    if record.status.is_terminal() {
        return;
    }

    let message = report
        .error
        .clone()
        .unwrap_or_else(|| format!("{} run ended without saving", report.kind));
    let update = JobUpdate::new()
        .status(JobStatus::Failed)
        .error_message(Some(message));
    match repository.update(&report.job_id, &update) {
        Ok(_) => warn!(
            "Job {} was left {} by {} run {}; marked failed",
            report.job_id, record.status, report.kind, report.run_id
        ),
        Err(e) => error!("Failed to mark job {} failed: {}", report.job_id, e),
    }
}

/// Opens the repository backend named in the configuration.
pub fn open_repository(config: &RepositoryConfig) -> Result<Arc<dyn JobRepository>, JobflowError> {
    match config.backend {
        RepositoryBackend::Memory => Ok(Arc::new(InMemoryJobRepository::new())),
        RepositoryBackend::Sqlite => {
            let path = config.resolved_path().ok_or_else(|| {
                ConfigError::validation("could not determine a database path")
            })?;
            Ok(Arc::new(SqliteJobRepository::open(&path)?))
        }
    }
}

fn load_configured_profile(path: &Path) -> Result<Option<Document>, ConfigError> {
    if !path.exists() {
        warn!(
            "No profile found at {}; composition will fail until one is provided",
            redact_path(path)
        );
        return Ok(None);
    }
    load_profile(path).map(Some)
}

pub struct OrchestratorBuilder {
    config: Config,
    repository: Option<Arc<dyn JobRepository>>,
    collaborators: Option<Collaborators>,
    profile: Option<Document>,
    progress: Option<RunProgressBroadcaster>,
}

impl OrchestratorBuilder {
    /// Uses this repository instead of opening the configured one.
    pub fn repository(mut self, repository: Arc<dyn JobRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    /// Uses this profile instead of reading `profile_path`.
    pub fn profile(mut self, profile: Document) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn progress(mut self, progress: RunProgressBroadcaster) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn build(self) -> Result<JobOrchestrator, JobflowError> {
        let config = self.config;
        validate_config(&config)?;

        let repository = match self.repository {
            Some(repository) => repository,
            None => open_repository(&config.repository)?,
        };
        repository.initialize()?;

        let registry = Arc::new(RunRegistry::new());
        registry.rebuild(repository.as_ref())?;

        let profile = match self.profile {
            Some(profile) => Some(profile),
            None => load_configured_profile(Path::new(&config.profile_path))?,
        };

        let collaborators = self
            .collaborators
            .unwrap_or_else(|| Collaborators::defaults(&config.filter));
        let context = WorkflowContext {
            repository: Arc::clone(&repository),
            collaborators,
            output_directory: PathBuf::from(&config.output_directory),
            template_name: config.template_name.clone(),
            default_application_type: config.application.default_type,
        };
        let workflows = Arc::new(Workflows::build(context, config.graph.max_steps)?);

        let pool =
            WorkerPool::with_progress(Arc::clone(&workflows), config.worker_count, self.progress.clone())?;

        let board = Arc::new(ReportBoard::with_capacity(config.retention.max_reports));
        let run_history = chrono::Duration::minutes(i64::from(config.retention.run_history_minutes));
        let collector = {
            let reports = pool.reports();
            let registry = Arc::clone(&registry);
            let board = Arc::clone(&board);
            let repository = Arc::clone(&repository);
            let workflows = Arc::clone(&workflows);
            thread::Builder::new()
                .name("jobflow-collector".to_string())
                .spawn(move || {
                    for report in reports.iter() {
                        registry.mark_finished(&report.job_id, &report.run_id);
                        if report.is_failed() {
                            warn!(
                                "{} run {} for job {} ended in {}: {}",
                                report.kind,
                                report.run_id,
                                report.job_id,
                                report.status,
                                report.error.as_deref().unwrap_or("no error recorded")
                            );
                            settle_failed_run(repository.as_ref(), &report);
                        } else {
                            info!(
                                "{} run {} for job {} ended in {}",
                                report.kind, report.run_id, report.job_id, report.status
                            );
                        }
                        board.publish(report);

                        let pruned = workflows.prune_finished(run_history);
                        if pruned > 0 {
                            debug!("Pruned {} finished run snapshots", pruned);
                        }
                    }
                    debug!("Report collector stopped");
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?
        };

        info!(
            "Job orchestrator ready: {} workers, {} known jobs",
            pool.worker_count(),
            registry.len()
        );

        Ok(JobOrchestrator {
            repository,
            workflows,
            registry,
            pool,
            board,
            collector,
            profile,
            retention: config.retention,
            progress: self.progress,
        })
    }
}

pub struct JobOrchestrator {
    repository: Arc<dyn JobRepository>,
    workflows: Arc<Workflows>,
    registry: Arc<RunRegistry>,
    pool: WorkerPool,
    board: Arc<ReportBoard>,
    collector: JoinHandle<()>,
    profile: Option<Document>,
    retention: RetentionConfig,
    progress: Option<RunProgressBroadcaster>,
}

impl JobOrchestrator {
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            repository: None,
            collaborators: None,
            profile: None,
            progress: None,
        }
    }

    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.repository
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn progress(&self) -> Option<&RunProgressBroadcaster> {
        self.progress.as_ref()
    }

    /// Validates a submission and starts its preparation run.
    pub fn submit(&self, submission: Submission) -> Result<SubmitReceipt, OrchestratorError> {
        submission.validate()?;

        if let Some(url) = submission.posting_url() {
            if let Some(existing) = self.repository.find_by_application_url(url)? {
                if existing.status != JobStatus::Failed {
                    return Err(OrchestratorError::DuplicatePosting {
                        url: url.to_string(),
                        job_id: existing.job_id,
                    });
                }
                debug!(
                    "Resubmitting {} after failed job {}",
                    redact_url(url),
                    existing.job_id
                );
            }
        }

        let job_id = Uuid::new_v4().to_string();
        let state = PreparationState::new(
            &job_id,
            submission.source,
            submission.mode,
            submission.raw_input,
            self.profile.clone(),
        );
        let entry = self.registry.register(&job_id, WorkflowKind::Preparation);
        if let Err(e) = self.queue(&entry, RunInput::Preparation(state)) {
            self.registry.remove(&job_id);
            return Err(e);
        }

        info!(
            "Job {} submitted: source={}, mode={}",
            job_id, submission.source, submission.mode
        );
        Ok(SubmitReceipt {
            job_id,
            run_id: entry.run_id,
            status: JobStatus::Queued,
        })
    }

    /// Applies a human review decision to a `pending` job.
    ///
    /// The job is reserved in the registry before anything is written, so
    /// concurrent decisions on one job cannot both pass the checks.
    pub fn decide(
        &self,
        job_id: &str,
        decision: Decision,
    ) -> Result<DecisionReceipt, OrchestratorError> {
        decision.validate()?;

        let record = self
            .repository
            .get(job_id)?
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;

        let kind = match &decision {
            Decision::Approved { .. } => WorkflowKind::Application,
            Decision::Retry { .. } => WorkflowKind::Retry,
            Decision::Declined => self
                .registry
                .get(job_id)
                .map_or_else(|| kind_for_record(&record), |entry| entry.kind),
        };
        let registration = self
            .registry
            .try_register(job_id, kind)
            .map_err(|active| OrchestratorError::RunInProgress {
                job_id: job_id.to_string(),
                run_id: active.run_id,
            })?;

        let result = self.apply_decision(&registration.entry, decision);
        // Only a queued run keeps its reservation.
        if !matches!(&result, Ok(receipt) if receipt.run_id.is_some()) {
            self.registry.cancel(registration);
        }
        result
    }

    fn apply_decision(
        &self,
        entry: &RunEntry,
        decision: Decision,
    ) -> Result<DecisionReceipt, OrchestratorError> {
        let job_id = entry.job_id.as_str();

        // Re-read under the reservation: an earlier decision may have landed.
        let record = self
            .repository
            .get(job_id)?
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
        if record.status != JobStatus::Pending {
            return Err(OrchestratorError::NotPending {
                job_id: job_id.to_string(),
                status: record.status,
            });
        }

        match decision {
            Decision::Approved { application_type } => {
                let mut update = JobUpdate::new().status(JobStatus::Approved);
                if application_type.is_some() {
                    update = update.application_type(application_type);
                }
                self.repository.update(job_id, &update)?;

                let state = ApplicationState::new(job_id, application_type);
                if let Err(e) = self.queue(entry, RunInput::Application(state)) {
                    self.restore_pending(job_id);
                    return Err(e);
                }
                info!("Job {} approved for application", job_id);
                Ok(DecisionReceipt {
                    job_id: job_id.to_string(),
                    status: JobStatus::Approved,
                    run_id: Some(entry.run_id.clone()),
                    workflow: Some(WorkflowKind::Application),
                    message: "Job approved. Application started.".to_string(),
                })
            }
            Decision::Declined => {
                self.repository
                    .update(job_id, &JobUpdate::new().status(JobStatus::Declined))?;
                info!("Job {} declined by user", job_id);
                Ok(DecisionReceipt {
                    job_id: job_id.to_string(),
                    status: JobStatus::Declined,
                    run_id: None,
                    workflow: None,
                    message: "Job declined. No further action will be taken.".to_string(),
                })
            }
            Decision::Retry { feedback } => {
                let state =
                    RetryState::new(job_id, feedback, self.profile.clone(), record.retry_count);
                self.queue(entry, RunInput::Retry(state))?;
                info!("Job {} queued for retry #{}", job_id, record.retry_count + 1);
                Ok(DecisionReceipt {
                    job_id: job_id.to_string(),
                    status: JobStatus::Pending,
                    run_id: Some(entry.run_id.clone()),
                    workflow: Some(WorkflowKind::Retry),
                    message: "Document regeneration started with your feedback.".to_string(),
                })
            }
        }
    }

    /// Puts an approved job back up for review after its run failed to queue.
    fn restore_pending(&self, job_id: &str) {
        let update = JobUpdate::new().status(JobStatus::Pending);
        if let Err(e) = self.repository.update(job_id, &update) {
            error!("Failed to return job {} to pending: {}", job_id, e);
        }
    }

    /// The job as its live run sees it, else as stored.
    pub fn status(&self, job_id: &str) -> Result<JobStatusView, OrchestratorError> {
        let entry = self.registry.get(job_id);

        if let Some(entry) = entry.as_ref().filter(|e| e.is_active()) {
            if let Some(view) = self.snapshot_view(entry) {
                return Ok(view);
            }
        }

        if let Some(record) = self.repository.get(job_id)? {
            return Ok(JobStatusView::from_record(record, entry.as_ref()));
        }

        // Runs that ended without a record: filter skips, failed saves.
        entry
            .as_ref()
            .and_then(|e| self.snapshot_view(e))
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))
    }

    fn snapshot_view(&self, entry: &RunEntry) -> Option<JobStatusView> {
        if entry.recovered {
            return None;
        }
        let run_id = entry.run_id.as_str();
        match entry.kind {
            WorkflowKind::Preparation => self
                .workflows
                .preparation
                .get_state(run_id)
                .map(|s| JobStatusView::from_preparation(entry, s)),
            WorkflowKind::Retry => self
                .workflows
                .retry
                .get_state(run_id)
                .map(|s| JobStatusView::from_retry(entry, s)),
            WorkflowKind::Application => self
                .workflows
                .application
                .get_state(run_id)
                .map(|s| JobStatusView::from_application(entry, s)),
        }
    }

    /// Jobs awaiting review, newest first.
    pub fn pending(&self) -> Result<Vec<PendingApproval>, OrchestratorError> {
        Ok(self
            .repository
            .get_pending()?
            .into_iter()
            .map(PendingApproval::from)
            .collect())
    }

    /// Recently touched jobs, optionally restricted to `statuses`.
    pub fn history(
        &self,
        limit: usize,
        statuses: Option<&[JobStatus]>,
    ) -> Result<Vec<HistoryItem>, OrchestratorError> {
        Ok(self
            .repository
            .get_history(limit, statuses)?
            .into_iter()
            .map(HistoryItem::from)
            .collect())
    }

    /// Deletes old records. Unset arguments fall back to the retention config.
    ///
    /// Finished runs whose record is gone are forgotten as well: their
    /// registry entry, snapshot and report.
    pub fn cleanup(
        &self,
        older_than_days: Option<u32>,
        statuses: Option<&[JobStatus]>,
    ) -> Result<usize, OrchestratorError> {
        let days = older_than_days.unwrap_or(self.retention.older_than_days);
        let statuses = statuses.unwrap_or(&self.retention.statuses);
        let deleted = self.repository.cleanup(days, statuses)?;
        info!("Cleanup removed {} jobs older than {} days", deleted, days);

        let orphans = self.registry.sweep_orphans(self.repository.as_ref())?;
        for entry in &orphans {
            self.workflows.forget_run(entry.kind, &entry.run_id);
            self.board.remove(&entry.run_id);
        }
        if !orphans.is_empty() {
            debug!("Cleanup forgot {} finished runs", orphans.len());
        }
        Ok(deleted)
    }

    pub fn retained(&self) -> RetainedRuns {
        RetainedRuns {
            registry_entries: self.registry.len(),
            snapshots: self.workflows.snapshot_count(),
            reports: self.board.len(),
        }
    }

    /// Report for a finished run, if it has finished.
    pub fn run_report(&self, run_id: &str) -> Option<RunReport> {
        self.board.get(run_id)
    }

    /// Blocks until the run finishes or `timeout` elapses.
    pub fn wait_for_run(&self, run_id: &str, timeout: Duration) -> Option<RunReport> {
        self.board.wait(run_id, timeout)
    }

    /// Drains queued runs, stops the workers and closes the repository.
    pub fn shutdown(self) -> Result<(), JobflowError> {
        let JobOrchestrator {
            repository,
            pool,
            collector,
            ..
        } = self;

        pool.wait();
        if collector.join().is_err() {
            error!("Report collector panicked");
        }
        repository.close()?;
        info!("Job orchestrator stopped");
        Ok(())
    }

    /// Hands a registered run to the pool. The caller undoes the
    /// registration on error.
    fn queue(&self, entry: &RunEntry, input: RunInput) -> Result<(), OrchestratorError> {
        let request = RunRequest::new(entry.run_id.clone(), &entry.job_id, input);
        self.pool.submit(request).map_err(|e| {
            error!("Failed to queue run {} for job {}: {}", entry.run_id, entry.job_id, e);
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::test_support;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(10);

    fn orchestrator(dir: &TempDir) -> (JobOrchestrator, Arc<InMemoryJobRepository>) {
        orchestrator_with(dir, |_| {})
    }

    fn orchestrator_with(
        dir: &TempDir,
        adjust: impl FnOnce(&mut Config),
    ) -> (JobOrchestrator, Arc<InMemoryJobRepository>) {
        let repository = Arc::new(InMemoryJobRepository::new());
        let mut config = Config::default();
        config.repository.backend = RepositoryBackend::Memory;
        config.output_directory = dir.path().join("out").display().to_string();
        config.worker_count = 2;
        adjust(&mut config);
        let orchestrator = JobOrchestrator::builder(config)
            .repository(repository.clone())
            .profile(test_support::profile())
            .build()
            .unwrap();
        (orchestrator, repository)
    }

    fn manual(mode: JobMode) -> Submission {
        Submission::new(
            JobSource::Manual,
            mode,
            RawInput::manual("Engineer", "Acme", "Build Rust services"),
        )
    }

    #[test]
    fn test_decision_parse() {
        assert_eq!(
            Decision::parse("approved", None, Some("linkedin")).unwrap(),
            Decision::Approved {
                application_type: Some(ApplicationType::Linkedin)
            }
        );
        assert_eq!(Decision::parse("declined", None, None).unwrap(), Decision::Declined);
        assert!(matches!(
            Decision::parse("maybe", None, None),
            Err(OrchestratorError::InvalidDecision(_))
        ));
        assert!(Decision::parse("approved", None, Some("fax")).is_err());
    }

    #[test]
    fn test_submission_validation() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, _repo) = orchestrator(&dir);

        let err = orchestrator
            .submit(Submission::new(JobSource::Url, JobMode::Mvp, RawInput::default()))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidSubmission(_)));

        let err = orchestrator
            .submit(Submission::new(
                JobSource::Manual,
                JobMode::Mvp,
                RawInput::manual("Engineer", " ", "text"),
            ))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidSubmission(_)));

        orchestrator.shutdown().unwrap();
    }

    #[test]
    fn test_submit_and_wait() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, repo) = orchestrator(&dir);

        let receipt = orchestrator.submit(manual(JobMode::Mvp)).unwrap();
        assert_eq!(receipt.status, JobStatus::Queued);

        let report = orchestrator.wait_for_run(&receipt.run_id, WAIT).unwrap();
        assert_eq!(report.status, JobStatus::Completed);
        assert!(!orchestrator.registry().is_active(&receipt.job_id));

        let view = orchestrator.status(&receipt.job_id).unwrap();
        assert_eq!(view.status, JobStatus::Completed);
        assert!(!view.running);
        assert_eq!(repo.get(&receipt.job_id).unwrap().unwrap().status, JobStatus::Completed);

        orchestrator.shutdown().unwrap();
    }

    #[test]
    fn test_decide_requires_pending() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, _repo) = orchestrator(&dir);

        let receipt = orchestrator.submit(manual(JobMode::Mvp)).unwrap();
        orchestrator.wait_for_run(&receipt.run_id, WAIT).unwrap();

        let err = orchestrator
            .decide(&receipt.job_id, Decision::Declined)
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::NotPending {
                status: JobStatus::Completed,
                ..
            }
        ));

        let err = orchestrator.decide("ghost", Decision::Declined).unwrap_err();
        assert!(matches!(err, OrchestratorError::JobNotFound(_)));

        let err = orchestrator
            .decide(&receipt.job_id, Decision::Retry { feedback: "  ".into() })
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidDecision(_)));

        orchestrator.shutdown().unwrap();
    }

    fn report(run_id: &str) -> RunReport {
        RunReport {
            run_id: run_id.to_string(),
            job_id: format!("job-{}", run_id),
            kind: WorkflowKind::Preparation,
            status: JobStatus::Completed,
            current_step: "completed".to_string(),
            error: None,
            aborted: false,
        }
    }

    #[test]
    fn test_report_board_evicts_oldest() {
        let board = ReportBoard::with_capacity(2);
        for run_id in ["r1", "r2", "r3"] {
            board.publish(report(run_id));
        }
        assert_eq!(board.len(), 2);
        assert!(board.get("r1").is_none());
        assert!(board.get("r3").is_some());

        assert!(board.remove("r2"));
        assert!(!board.remove("r2"));
        board.publish(report("r4"));
        board.publish(report("r5"));
        assert_eq!(board.len(), 2);
        assert!(board.get("r3").is_none());
    }

    #[test]
    fn test_concurrent_retries_are_serialised() {
        use std::sync::Barrier;

        let dir = TempDir::new().unwrap();
        let (orchestrator, repo) = orchestrator(&dir);
        let orchestrator = Arc::new(orchestrator);

        for _ in 0..5 {
            let receipt = orchestrator.submit(manual(JobMode::Full)).unwrap();
            orchestrator.wait_for_run(&receipt.run_id, WAIT).unwrap();
            let job_id = receipt.job_id;
            assert_eq!(repo.get(&job_id).unwrap().unwrap().status, JobStatus::Pending);

            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let orchestrator = Arc::clone(&orchestrator);
                    let barrier = Arc::clone(&barrier);
                    let job_id = job_id.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        orchestrator.decide(
                            &job_id,
                            Decision::Retry {
                                feedback: "more detail".into(),
                            },
                        )
                    })
                })
                .collect();

            let mut accepted = 0;
            for handle in handles {
                match handle.join().unwrap() {
                    Ok(receipt) => {
                        accepted += 1;
                        let run_id = receipt.run_id.unwrap();
                        orchestrator.wait_for_run(&run_id, WAIT).unwrap();
                    }
                    Err(OrchestratorError::RunInProgress { .. }) => {}
                    Err(e) => panic!("unexpected decision error: {}", e),
                }
            }
            assert!(accepted >= 1);
            // Every accepted retry is counted; none overwrote another.
            let record = repo.get(&job_id).unwrap().unwrap();
            assert_eq!(record.retry_count, accepted);
        }

        match Arc::try_unwrap(orchestrator) {
            Ok(orchestrator) => orchestrator.shutdown().unwrap(),
            Err(_) => panic!("orchestrator still shared"),
        }
    }

    #[test]
    fn test_aborted_application_settles_failed() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, repo) = orchestrator_with(&dir, |config| config.graph.max_steps = 2);

        let mut record = JobRecord::new("job-1", JobSource::Url, JobMode::Full);
        record.status = JobStatus::Pending;
        record.application_url = Some("https://jobs.example.com/apply/7".into());
        record.rendered_file_path = Some("/tmp/out.json".into());
        repo.create(&record).unwrap();

        let receipt = orchestrator
            .decide(
                "job-1",
                Decision::Approved {
                    application_type: Some(ApplicationType::Manual),
                },
            )
            .unwrap();
        let report = orchestrator
            .wait_for_run(&receipt.run_id.unwrap(), WAIT)
            .unwrap();
        assert!(report.aborted);

        let stored = repo.get("job-1").unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.status.is_terminal());
        assert!(stored.error_message.unwrap().contains("exceeded 2 steps"));

        let err = orchestrator.decide("job-1", Decision::Declined).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::NotPending {
                status: JobStatus::Failed,
                ..
            }
        ));
        assert!(!orchestrator.registry().is_active("job-1"));

        orchestrator.shutdown().unwrap();
    }

    #[test]
    fn test_unqueued_approval_returns_to_pending() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, repo) = orchestrator(&dir);

        let receipt = orchestrator.submit(manual(JobMode::Full)).unwrap();
        orchestrator.wait_for_run(&receipt.run_id, WAIT).unwrap();
        orchestrator.pool.shutdown();

        let err = orchestrator
            .decide(
                &receipt.job_id,
                Decision::Approved {
                    application_type: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Worker(_)), "{:?}", err);

        let stored = repo.get(&receipt.job_id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        let entry = orchestrator.registry().get(&receipt.job_id).unwrap();
        assert_eq!(entry.run_id, receipt.run_id);
        assert!(!entry.is_active());

        orchestrator.shutdown().unwrap();
    }

    #[test]
    fn test_declined_leaves_no_active_run() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, _repo) = orchestrator(&dir);

        let receipt = orchestrator.submit(manual(JobMode::Full)).unwrap();
        orchestrator.wait_for_run(&receipt.run_id, WAIT).unwrap();

        orchestrator.decide(&receipt.job_id, Decision::Declined).unwrap();
        let entry = orchestrator.registry().get(&receipt.job_id).unwrap();
        assert_eq!(entry.run_id, receipt.run_id);
        assert!(!entry.is_active());

        orchestrator.shutdown().unwrap();
    }

    #[test]
    fn test_cleanup_forgets_deleted_runs() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, repo) = orchestrator(&dir);

        let mut job_ids = Vec::new();
        for _ in 0..3 {
            let receipt = orchestrator.submit(manual(JobMode::Mvp)).unwrap();
            orchestrator.wait_for_run(&receipt.run_id, WAIT).unwrap();
            job_ids.push(receipt.job_id);
        }
        assert_eq!(
            orchestrator.retained(),
            RetainedRuns {
                registry_entries: 3,
                snapshots: 3,
                reports: 3,
            }
        );

        for job_id in &job_ids[..2] {
            assert!(repo.delete(job_id).unwrap());
        }
        assert_eq!(orchestrator.cleanup(None, None).unwrap(), 0);
        assert_eq!(
            orchestrator.retained(),
            RetainedRuns {
                registry_entries: 1,
                snapshots: 1,
                reports: 1,
            }
        );
        assert!(orchestrator.registry().get(&job_ids[2]).is_some());

        orchestrator.shutdown().unwrap();
    }

    #[test]
    fn test_status_unknown_job() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, _repo) = orchestrator(&dir);
        assert!(matches!(
            orchestrator.status("nope"),
            Err(OrchestratorError::JobNotFound(_))
        ));
        orchestrator.shutdown().unwrap();
    }
}
