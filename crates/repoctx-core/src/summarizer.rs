//! Summaries for units that did not fit verbatim.
//!
//! Summarizing is a two-step pipeline: [`Summarizer::attempt`] asks the
//! generator (with retries) and returns a `Result`; on `Err`,
//! [`truncate_fallback`] produces a bounded local placeholder. Both outcomes
//! fit within `max_summary_chars`, so the allocator's estimate stays valid.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chunking::ContentUnit;
use crate::config::SummarizerConfig;
use crate::generator::{GenerateError, TextGenerator};
use crate::metrics::METRICS;
use crate::retry::backoff_delay;

/// Appended to every truncated placeholder.
pub const TRUNCATION_MARKER: &str = "\n[content truncated]";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SummarizeError {
    #[error("summary generation failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: GenerateError },

    #[error("summary generation unavailable: {0}")]
    Unavailable(GenerateError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    Generated,
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub unit_id: String,
    pub path: String,
    pub heading: Option<String>,
    pub content: String,
    pub kind: SummaryKind,
    /// Characters in `content`.
    pub size: usize,
    pub original_size: usize,
}

fn clamp_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

/// Local fallback: a prefix of the unit plus [`TRUNCATION_MARKER`], never
/// longer than `max_chars` characters in total.
pub fn truncate_fallback(unit: &ContentUnit, max_chars: usize) -> SummaryResult {
    let marker_chars = TRUNCATION_MARKER.chars().count();
    let content = if max_chars <= marker_chars {
        clamp_chars(TRUNCATION_MARKER.trim_start(), max_chars).to_string()
    } else {
        let prefix = clamp_chars(&unit.content, max_chars - marker_chars);
        format!("{prefix}{TRUNCATION_MARKER}")
    };
    SummaryResult {
        unit_id: unit.unit_id.clone(),
        path: unit.path.clone(),
        heading: unit.label().map(str::to_string),
        size: content.chars().count(),
        content,
        kind: SummaryKind::Truncated,
        original_size: unit.size,
    }
}

/// Compresses units through a [`TextGenerator`].
pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    config: SummarizerConfig,
    max_summary_chars: usize,
}

impl Summarizer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        config: SummarizerConfig,
        max_summary_chars: usize,
    ) -> Self {
        Self {
            generator,
            config,
            max_summary_chars,
        }
    }

    fn prompt(&self, unit: &ContentUnit) -> String {
        let subject = match unit.label() {
            Some(label) => format!("`{}` ({})", unit.path, label),
            None => format!("`{}`", unit.path),
        };
        let header = format!(
            "Summarize the following {} content from {} for a developer new to the \
             repository. State its purpose and the key behaviour in plain prose, at most \
             {} characters.\n\n",
            unit.category.label().to_lowercase(),
            subject,
            self.max_summary_chars
        );
        let room = self
            .generator
            .max_input_chars()
            .saturating_sub(header.chars().count());
        format!("{header}{}", clamp_chars(&unit.content, room))
    }

    /// Ask the generator, retrying retryable failures with backoff.
    pub async fn attempt(&self, unit: &ContentUnit) -> Result<String, SummarizeError> {
        let prompt = self.prompt(unit);
        let attempts = self.config.attempts.max(1);
        let mut last = GenerateError::EmptyResponse;

        for attempt in 0..attempts {
            match self.generator.generate(&prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    return Ok(clamp_chars(text.trim(), self.max_summary_chars).to_string());
                }
                Ok(_) => last = GenerateError::EmptyResponse,
                Err(err) if !err.is_retryable() => return Err(SummarizeError::Unavailable(err)),
                Err(err) => last = err,
            }

            if attempt + 1 < attempts {
                let delay = backoff_delay(
                    attempt,
                    self.config.backoff_base_ms,
                    self.config.backoff_max_ms,
                );
                debug!(
                    unit_id = %unit.unit_id,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %last,
                    "retrying summary"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(SummarizeError::Exhausted { attempts, last })
    }

    /// Summarize one unit. Never fails: generator errors degrade to truncation.
    pub async fn summarize(&self, unit: &ContentUnit) -> SummaryResult {
        METRICS.inc_units_summarized();
        match self.attempt(unit).await {
            Ok(content) => SummaryResult {
                unit_id: unit.unit_id.clone(),
                path: unit.path.clone(),
                heading: unit.label().map(str::to_string),
                size: content.chars().count(),
                content,
                kind: SummaryKind::Generated,
                original_size: unit.size,
            },
            Err(err) => {
                warn!(unit_id = %unit.unit_id, error = %err, "summary failed, truncating");
                METRICS.inc_summaries_truncated();
                truncate_fallback(unit, self.max_summary_chars)
            }
        }
    }

    /// Summarize many units, `concurrency` at a time, preserving input order.
    pub async fn summarize_all(&self, units: &[&ContentUnit]) -> Vec<SummaryResult> {
        let pending: Vec<_> = units.iter().map(|unit| self.summarize(unit)).collect();
        stream::iter(pending)
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }
}
