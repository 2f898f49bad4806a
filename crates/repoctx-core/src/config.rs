//! Pipeline configuration.
//!
//! Every knob has a default; [`PipelineConfig::from_env`] overlays `REPOCTX_*`
//! environment variables on top of them.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ConfigError;

/// Fetch-stage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Ceiling on simultaneous in-flight requests, shared by every job.
    pub max_concurrency: usize,
    /// Attempts per target for transient failures (timeouts, 5xx, transport).
    pub fetch_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// How many times an unstarted request is deferred while the rate limit is exhausted.
    pub max_rate_limit_defers: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            fetch_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            max_rate_limit_defers: 6,
        }
    }
}

/// Splitter settings. Sizes are in characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Smallest code unit emitted unless the file holds a single declaration.
    pub min_unit_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4_000,
            chunk_overlap: 400,
            min_unit_chars: 200,
        }
    }
}

/// Scoring constants.
///
/// The tier values must keep `doc_root > docs_tree > config >= entry_point >
/// source > other > test > generated`, with enough headroom between tiers that
/// the entry-point and location bonuses never lift a unit into the next tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub doc_root: f64,
    pub docs_tree: f64,
    pub config: f64,
    pub entry_point: f64,
    pub source: f64,
    pub other: f64,
    pub test: f64,
    pub generated: f64,
    pub entry_point_bonus: f64,
    pub location_bonus: f64,
    pub heading_l1_bonus: f64,
    pub heading_l2_bonus: f64,
    /// Units shorter than this (chars) get `small_unit_bonus`.
    pub small_unit_chars: usize,
    pub small_unit_bonus: f64,
    /// Units longer than this (chars) get `large_unit_penalty` subtracted.
    pub large_unit_chars: usize,
    pub large_unit_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            doc_root: 200.0,
            docs_tree: 150.0,
            config: 140.0,
            entry_point: 100.0,
            source: 60.0,
            other: 40.0,
            test: 20.0,
            generated: 0.0,
            entry_point_bonus: 20.0,
            location_bonus: 10.0,
            heading_l1_bonus: 15.0,
            heading_l2_bonus: 10.0,
            small_unit_chars: 2_000,
            small_unit_bonus: 10.0,
            large_unit_chars: 8_000,
            large_unit_penalty: 20.0,
        }
    }
}

impl ScoringConfig {
    /// Check the tier ordering contract.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tiers = [
            ("doc_root", self.doc_root),
            ("docs_tree", self.docs_tree),
            ("config", self.config),
            ("entry_point", self.entry_point),
            ("source", self.source),
            ("other", self.other),
            ("test", self.test),
            ("generated", self.generated),
        ];
        for pair in tiers.windows(2) {
            let (hi_name, hi) = pair[0];
            let (lo_name, lo) = pair[1];
            if hi < lo {
                return Err(ConfigError::Invalid(format!(
                    "scoring tier {hi_name} ({hi}) must not be below {lo_name} ({lo})"
                )));
            }
        }
        Ok(())
    }
}

/// Budget settings. Sizes are approximate tokens (see [`crate::chunking::estimate_tokens`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub total_budget: i64,
    pub reserved_for_response: i64,
    pub reserved_for_instructions: i64,
    /// Size charged for a unit marked SUMMARIZE.
    pub summary_estimate: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            total_budget: 990_000,
            reserved_for_response: 65_536,
            reserved_for_instructions: 8_192,
            summary_estimate: 150,
        }
    }
}

impl BudgetConfig {
    /// Budget left for repository content once the reserves are taken out.
    pub fn effective_budget(&self) -> i64 {
        self.total_budget - self.reserved_for_response - self.reserved_for_instructions
    }
}

/// Summarizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizerConfig {
    pub attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Summaries generated at the same time within one job.
    pub concurrency: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_base_ms: 1_000,
            backoff_max_ms: 8_000,
            concurrency: 4,
        }
    }
}

/// Which tree entries become fetch candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    pub max_files: usize,
    /// Files the tree reports as larger than this are never fetched.
    pub max_file_bytes: u64,
    /// Directory names skipped at any depth.
    pub skip_dirs: Vec<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_files: 400,
            max_file_bytes: 1_000_000,
            skip_dirs: [
                ".git",
                "node_modules",
                "vendor",
                "target",
                "dist",
                "build",
                "__pycache__",
                ".venv",
                "venv",
                ".next",
                "coverage",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// How long a finished job stays retrievable, unless overridden.
pub const DEFAULT_JOB_TTL_SECS: u64 = 3_600;

/// Top-level configuration handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub chunk: ChunkConfig,
    pub scoring: ScoringConfig,
    pub budget: BudgetConfig,
    pub summarizer: SummarizerConfig,
    pub selection: SelectionConfig,
    /// Terminal jobs older than this (seconds since completion) are evictable.
    pub job_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            chunk: ChunkConfig::default(),
            scoring: ScoringConfig::default(),
            budget: BudgetConfig::default(),
            summarizer: SummarizerConfig::default(),
            selection: SelectionConfig::default(),
            job_ttl_secs: DEFAULT_JOB_TTL_SECS,
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `REPOCTX_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_parse("REPOCTX_MAX_CONCURRENCY")? {
            config.fetch.max_concurrency = v;
        }
        if let Some(v) = env_parse("REPOCTX_CHUNK_SIZE")? {
            config.chunk.chunk_size = v;
        }
        if let Some(v) = env_parse("REPOCTX_CHUNK_OVERLAP")? {
            config.chunk.chunk_overlap = v;
        }
        if let Some(v) = env_parse("REPOCTX_TOTAL_BUDGET")? {
            config.budget.total_budget = v;
        }
        if let Some(v) = env_parse("REPOCTX_RESERVED_FOR_RESPONSE")? {
            config.budget.reserved_for_response = v;
        }
        if let Some(v) = env_parse("REPOCTX_RESERVED_FOR_INSTRUCTIONS")? {
            config.budget.reserved_for_instructions = v;
        }
        if let Some(v) = env_parse("REPOCTX_MAX_FILES")? {
            config.selection.max_files = v;
        }
        if let Some(v) = env_parse("REPOCTX_JOB_TTL_SECS")? {
            config.job_ttl_secs = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be >= 1".into()));
        }
        if self.fetch.fetch_attempts == 0 || self.summarizer.attempts == 0 {
            return Err(ConfigError::Invalid("attempt counts must be >= 1".into()));
        }
        if self.summarizer.concurrency == 0 {
            return Err(ConfigError::Invalid("summarizer concurrency must be >= 1".into()));
        }
        if self.chunk.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be >= 1".into()));
        }
        if self.chunk.chunk_overlap >= self.chunk.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk.chunk_overlap, self.chunk.chunk_size
            )));
        }
        if self.budget.summary_estimate == 0 {
            return Err(ConfigError::Invalid("summary_estimate must be >= 1".into()));
        }
        if self.budget.reserved_for_response < 0 || self.budget.reserved_for_instructions < 0 {
            return Err(ConfigError::Invalid("budget reserves must be non-negative".into()));
        }
        if self.budget.effective_budget() <= 0 {
            return Err(ConfigError::Invalid(format!(
                "reserves ({} + {}) leave no room in total_budget ({})",
                self.budget.reserved_for_response,
                self.budget.reserved_for_instructions,
                self.budget.total_budget
            )));
        }
        self.scoring.validate()
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}
