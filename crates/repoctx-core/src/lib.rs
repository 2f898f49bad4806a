//! repoctx core library
//!
//! Turns a repository into a budgeted context document for LLM consumers:
//! fetch under a shared rate limit, split into content units, score, pack the
//! best units into a fixed budget and summarize what does not fit verbatim.
//! [`JobOrchestrator`] runs that pipeline as asynchronous jobs.

pub mod assembly;
pub mod budget;
pub mod chunking;
pub mod classify;
pub mod config;
pub mod error;
pub mod fakes;
pub mod fetcher;
pub mod generator;
pub mod insights;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod retry;
pub mod scoring;
pub mod selection;
pub mod source;
pub mod summarizer;
pub mod telemetry;

pub use assembly::{AnalysisResult, AnalysisStats, IncludedSection, OmittedUnit};
pub use budget::{BudgetAllocator, BudgetDecision, Decision};
pub use chunking::{estimate_tokens, ChunkSplitter, ContentUnit, SplitError, UnitKind};
pub use classify::{ChunkCategory, PathClass};
pub use config::{
    BudgetConfig, ChunkConfig, FetchConfig, PipelineConfig, ScoringConfig, SelectionConfig,
    SummarizerConfig,
};
pub use error::{ConfigError, JobError, JobResult, PipelineError};
pub use fetcher::{FetchError, FetchGate, RateLimitedFetcher, RawFile};
pub use generator::{GeminiConfig, GeminiGenerator, GenerateError, TextGenerator};
pub use insights::{ContributionRules, Difficulty, RankedIssue, TechStack};
pub use orchestrator::{AnalysisInput, JobOrchestrator, JobStatusView};
pub use scoring::{PriorityScorer, ScoredUnit};
pub use source::{
    FetchTarget, GitHubConfig, GitHubProvider, Issue, RepoRef, SourceClient, SourceError,
    SourceProvider, TreeEntry,
};
pub use summarizer::{SummarizeError, Summarizer, SummaryKind, SummaryResult};
pub use telemetry::init_tracing;

pub use repoctx_state::{JobId, JobStatus, JobStore, MemoryJobStore};

/// Crate version, as reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
