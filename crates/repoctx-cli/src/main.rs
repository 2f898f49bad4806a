//! repoctx - repository context for LLM consumers
//!
//! ## Commands
//!
//! - `analyze`: fetch a GitHub repository and print its budgeted context
//! - `fingerprint`: print the cache key of an analysis input
//! - `config`: print the effective pipeline configuration

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

use repoctx_core::{
    AnalysisInput, GeminiGenerator, GitHubProvider, JobOrchestrator, JobStatus, PipelineConfig,
};
use repoctx_state::MemoryJobStore;

#[derive(Parser)]
#[command(name = "repoctx")]
#[command(version = repoctx_core::VERSION)]
#[command(about = "Budgeted repository context for LLM consumers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// The assembled markdown context
    Markdown,
    /// The full analysis result as JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a repository and print its context
    Analyze {
        /// `owner/repo` or a https://github.com URL
        repo: String,

        /// Branch, tag or commit (default branch if omitted)
        #[arg(short = 'r', long = "ref")]
        git_ref: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "markdown")]
        format: OutputFormat,

        /// Write the output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Status poll interval in milliseconds
        #[arg(long, default_value_t = 250)]
        poll_ms: u64,
    },

    /// Print the fingerprint of an analysis input
    Fingerprint {
        repo: String,

        #[arg(short = 'r', long = "ref")]
        git_ref: Option<String>,
    },

    /// Print the effective configuration (defaults plus REPOCTX_* overrides)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    repoctx_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Analyze {
            repo,
            git_ref,
            format,
            output,
            poll_ms,
        } => {
            cmd_analyze(
                &repo,
                git_ref,
                format,
                output.as_deref(),
                Duration::from_millis(poll_ms.max(1)),
            )
            .await
        }
        Commands::Fingerprint { repo, git_ref } => {
            let mut input = AnalysisInput::new(repo);
            input.git_ref = git_ref;
            println!("{}", input.fingerprint());
            Ok(())
        }
        Commands::Config => {
            let config = load_config()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Defaults plus `REPOCTX_*` overrides, already validated by `from_env`.
fn load_config() -> Result<PipelineConfig> {
    PipelineConfig::from_env().context("Invalid REPOCTX_* configuration")
}

async fn cmd_analyze(
    repo: &str,
    git_ref: Option<String>,
    format: OutputFormat,
    output: Option<&Path>,
    poll: Duration,
) -> Result<()> {
    let config = load_config()?;
    let provider = GitHubProvider::from_env().context("Failed to build GitHub client")?;
    let generator = GeminiGenerator::from_env().context("Failed to build Gemini client")?;
    let orchestrator = JobOrchestrator::new(
        Arc::new(MemoryJobStore::new()),
        Arc::new(provider),
        Arc::new(generator),
        config,
    );

    let mut input = AnalysisInput::new(repo);
    input.git_ref = git_ref;
    let job_id = orchestrator.submit(input).await?;
    info!(job_id = %job_id, repo, "analysis submitted");

    let status = orchestrator.wait(&job_id, poll).await?;
    if status.status == JobStatus::Failed {
        bail!(
            "Analysis of {} failed: {}",
            repo,
            status.error.unwrap_or_else(|| "unknown error".into())
        );
    }

    let result = orchestrator.get_result(&job_id).await?;
    info!(
        verbatim = result.stats.verbatim,
        summarized = result.stats.summarized,
        dropped = result.stats.dropped,
        failed_files = result.stats.files_failed,
        "analysis complete"
    );

    let rendered = match format {
        OutputFormat::Markdown => result.context,
        OutputFormat::Json => serde_json::to_string_pretty(&result)?,
    };

    if let Some(path) = output {
        std::fs::write(path, &rendered).context(format!("Failed to write to {:?}", path))?;
        println!("Wrote context to {:?}", path);
    } else {
        println!("{}", rendered);
    }

    Ok(())
}
