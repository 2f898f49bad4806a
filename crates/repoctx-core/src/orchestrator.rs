//! Job orchestration.
//!
//! [`JobOrchestrator`] owns the job registry and runs one pipeline per
//! submission on its own task:
//!
//! 1. parse the repository reference and open a source client
//! 2. list the tree and select fetch candidates
//! 3. fetch candidates (and open issues) under the shared [`FetchGate`]
//! 4. split on the blocking pool, score and allocate the budget
//! 5. summarize the units marked `SUMMARIZE`
//! 6. assemble and store the result, with the tech stack, contribution
//!    rules and ranked issues derived from what was already fetched
//!
//! Any error that prevents a usable result fails the job; per-file failures
//! only show up in the result's `failed_paths`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn, Instrument};

use repoctx_state::{JobId, JobRecord, JobStatus, JobStore};

use crate::assembly::{AnalysisResult, Assembly};
use crate::budget::{BudgetAllocator, Decision};
use crate::chunking::{estimate_tokens, ChunkSplitter, ContentUnit, CHARS_PER_TOKEN};
use crate::config::PipelineConfig;
use crate::error::{JobError, JobResult, PipelineError};
use crate::fetcher::{FetchGate, RateLimitedFetcher};
use crate::generator::TextGenerator;
use crate::insights::{detect_contribution_rules, detect_tech_stack};
use crate::metrics::METRICS;
use crate::obs;
use crate::scoring::PriorityScorer;
use crate::selection::select_candidates;
use crate::source::{FetchTarget, RepoRef, SourceProvider};
use crate::summarizer::Summarizer;

/// What to analyze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisInput {
    /// `owner/repo` or a repository URL.
    pub repo: String,
    /// Branch, tag or commit. The default branch when absent.
    pub git_ref: Option<String>,
}

impl AnalysisInput {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            git_ref: None,
        }
    }

    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    /// SHA-256 hex of the normalized repository and ref.
    ///
    /// Equivalent spellings (`owner/repo` and its URL) share a fingerprint, so
    /// callers can key a result cache on it. The orchestrator never dedupes.
    pub fn fingerprint(&self) -> String {
        let git_ref = self.git_ref.as_deref();
        let key = match RepoRef::parse(&self.repo, git_ref) {
            Ok(repo) => format!("{}@{}", repo.slug(), repo.git_ref),
            Err(_) => format!(
                "{}@{}",
                self.repo.trim(),
                git_ref.unwrap_or(RepoRef::DEFAULT_REF)
            ),
        };
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Caller-facing view of a job's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set only when `status` is `failed`.
    pub error: Option<String>,
}

impl From<&JobRecord> for JobStatusView {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.to_string(),
            status: record.status,
            created_at: record.created_at,
            completed_at: record.completed_at,
            error: record.error.clone(),
        }
    }
}

/// Accepts analysis jobs and drives them to a terminal state.
#[derive(Clone)]
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    provider: Arc<dyn SourceProvider>,
    generator: Arc<dyn TextGenerator>,
    config: Arc<PipelineConfig>,
    gate: Arc<FetchGate>,
}

impl JobOrchestrator {
    /// Orchestrator using the process-wide fetch gate.
    pub fn new(
        store: Arc<dyn JobStore>,
        provider: Arc<dyn SourceProvider>,
        generator: Arc<dyn TextGenerator>,
        config: PipelineConfig,
    ) -> Self {
        let gate = FetchGate::global(config.fetch.max_concurrency);
        Self::with_gate(store, provider, generator, config, gate)
    }

    /// Orchestrator with an explicit gate (tests, or several isolated pools).
    pub fn with_gate(
        store: Arc<dyn JobStore>,
        provider: Arc<dyn SourceProvider>,
        generator: Arc<dyn TextGenerator>,
        config: PipelineConfig,
        gate: Arc<FetchGate>,
    ) -> Self {
        Self {
            store,
            provider,
            generator,
            config: Arc::new(config),
            gate,
        }
    }

    /// Register a pending job and start its pipeline. Returns immediately.
    pub async fn submit(&self, input: AnalysisInput) -> JobResult<JobId> {
        let job_id = JobId::new();
        self.store.put(JobRecord::pending(job_id.clone())).await?;
        obs::emit_job_submitted(job_id.as_str(), &input.repo);

        let span = obs::job_span(job_id.as_str());
        let this = self.clone();
        let id = job_id.clone();
        tokio::spawn(async move { this.drive(id, input).await }.instrument(span));

        Ok(job_id)
    }

    pub async fn get_status(&self, job_id: &JobId) -> JobResult<JobStatusView> {
        let record = self.record(job_id).await?;
        Ok(JobStatusView::from(&record))
    }

    /// The result of a completed job. `NotReady` for any other status.
    pub async fn get_result(&self, job_id: &JobId) -> JobResult<AnalysisResult> {
        let record = self.record(job_id).await?;
        match (record.status, record.result) {
            (JobStatus::Completed, Some(value)) => {
                serde_json::from_value(value).map_err(|e| JobError::CorruptResult {
                    job_id: job_id.to_string(),
                    reason: e.to_string(),
                })
            }
            (JobStatus::Completed, None) => Err(JobError::CorruptResult {
                job_id: job_id.to_string(),
                reason: "completed job has no stored result".into(),
            }),
            (status, _) => Err(JobError::NotReady {
                job_id: job_id.to_string(),
                status,
            }),
        }
    }

    /// Poll until the job is terminal.
    pub async fn wait(&self, job_id: &JobId, poll_interval: Duration) -> JobResult<JobStatusView> {
        loop {
            let view = self.get_status(job_id).await?;
            if view.status.is_terminal() {
                return Ok(view);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Remove terminal jobs that finished more than `job_ttl_secs` ago.
    pub async fn evict_expired(&self) -> JobResult<usize> {
        let ttl_secs = i64::try_from(self.config.job_ttl_secs).unwrap_or(i64::MAX);
        let ttl = chrono::Duration::try_seconds(ttl_secs).unwrap_or(chrono::Duration::MAX);
        let expired = self.store.list_expired(Utc::now(), ttl).await?;
        for job_id in &expired {
            self.store.remove(job_id).await?;
        }
        if !expired.is_empty() {
            obs::emit_jobs_evicted(expired.len());
        }
        Ok(expired.len())
    }

    async fn record(&self, job_id: &JobId) -> JobResult<JobRecord> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Run one job to a terminal state. Never panics the caller: a panic in
    /// the pipeline task is recorded as a worker failure.
    async fn drive(self, job_id: JobId, input: AnalysisInput) {
        let started = Instant::now();
        let pending = match self.store.get(&job_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(job_id = %job_id, "job vanished before it started");
                return;
            }
            Err(err) => {
                error!(job_id = %job_id, error = %err, "could not load job");
                return;
            }
        };
        let record = pending.clone().mark_processing();
        if let Err(err) = self.store.put(record.clone()).await {
            error!(job_id = %job_id, error = %err, "could not mark job processing");
            let reason = format!("could not start job: {err}");
            obs::emit_job_failed(job_id.as_str(), started.elapsed().as_millis() as u64, &reason);
            METRICS.inc_jobs_failed();
            // Pending may fail directly.
            if let Err(err) = self.store.put(pending.mark_failed(reason)).await {
                error!(job_id = %job_id, error = %err, "could not store terminal job state");
            }
            return;
        }

        let pipeline = self.clone();
        let id = job_id.clone();
        let outcome = tokio::spawn(
            async move { pipeline.run_pipeline(&id, &input).await }.in_current_span(),
        )
        .await
        .unwrap_or_else(|join_err| Err(PipelineError::Worker(join_err.to_string())))
        .and_then(|result| {
            let value = serde_json::to_value(&result)?;
            Ok((value, result))
        });

        let duration_ms = started.elapsed().as_millis() as u64;
        let record = match outcome {
            Ok((value, result)) => {
                obs::emit_job_completed(
                    job_id.as_str(),
                    duration_ms,
                    result.stats.verbatim,
                    result.stats.summarized,
                    result.stats.dropped,
                );
                METRICS.inc_jobs_completed();
                record.mark_completed(value)
            }
            Err(err) => {
                obs::emit_job_failed(job_id.as_str(), duration_ms, &err);
                METRICS.inc_jobs_failed();
                record.mark_failed(err.to_string())
            }
        };

        if let Err(err) = self.store.put(record).await {
            error!(job_id = %job_id, error = %err, "could not store terminal job state");
        }
        METRICS.flush();
    }

    async fn run_pipeline(
        &self,
        job_id: &JobId,
        input: &AnalysisInput,
    ) -> Result<AnalysisResult, PipelineError> {
        let id = job_id.as_str();
        let config = &*self.config;

        let repo = RepoRef::parse(&input.repo, input.git_ref.as_deref()).map_err(|reason| {
            PipelineError::InvalidRepo {
                input: input.repo.clone(),
                reason,
            }
        })?;
        let source = self.provider.open(&repo).map_err(PipelineError::Source)?;
        let fetcher = RateLimitedFetcher::new(source, self.gate.clone(), config.fetch.clone());

        obs::emit_stage_started(id, "list_tree");
        let tree = fetcher
            .list_tree()
            .await
            .map_err(|e| PipelineError::Tree(e.source))?;
        let candidates = select_candidates(&tree, &config.selection);
        if candidates.is_empty() {
            return Err(PipelineError::NoCandidates);
        }
        let targets: Vec<FetchTarget> = candidates.into_iter().map(FetchTarget::file).collect();

        obs::emit_stage_started(id, "fetch");
        let (fetched, issues) = tokio::join!(
            fetcher.fetch_many(&targets, config.fetch.max_concurrency),
            fetcher.list_issues(),
        );
        let issues = issues.unwrap_or_else(|err| {
            warn!(error = %err, "issue listing failed, continuing without issues");
            Vec::new()
        });
        let mut files = Vec::with_capacity(fetched.len());
        let mut failed_paths = Vec::new();
        for result in fetched {
            match result {
                Ok(file) => files.push(file),
                Err(err) => failed_paths.push(err.path),
            }
        }
        let files_fetched = files.len();
        let tech_stack = detect_tech_stack(&tree, &files);
        let contribution_rules = detect_contribution_rules(&tree, &files, &issues);

        obs::emit_stage_started(id, "split");
        let splitter = ChunkSplitter::new(config.chunk.clone());
        let units = tokio::task::spawn_blocking(move || {
            files
                .iter()
                .flat_map(|file| splitter.split(file))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))?;
        if units.is_empty() {
            return Err(PipelineError::NoContent {
                attempted: files_fetched,
            });
        }

        obs::emit_stage_started(id, "allocate");
        let scored = PriorityScorer::new(config.scoring.clone()).score_all(units);
        let budget = config.budget.effective_budget();
        let decisions = BudgetAllocator::new(config.budget.summary_estimate)
            .allocate(&scored, budget, |u| estimate_tokens(&u.unit.content));

        obs::emit_stage_started(id, "summarize");
        let pending: Vec<&ContentUnit> = scored
            .iter()
            .zip(&decisions)
            .filter(|(_, d)| d.decision == Decision::Summarize)
            .map(|(s, _)| &s.unit)
            .collect();
        let summarizer = Summarizer::new(
            self.generator.clone(),
            config.summarizer.clone(),
            config.budget.summary_estimate * CHARS_PER_TOKEN,
        );
        let summaries = summarizer.summarize_all(&pending).await;

        obs::emit_stage_started(id, "assemble");
        Ok(Assembly {
            repo: &repo,
            units: &scored,
            decisions: &decisions,
            summaries,
            issues,
            tech_stack,
            contribution_rules,
            failed_paths,
            files_considered: targets.len(),
            files_fetched,
            budget,
            rate_limit_remaining: self.gate.remaining(),
        }
        .build())
    }
}
