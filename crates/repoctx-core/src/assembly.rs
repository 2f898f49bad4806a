//! Final assembly of a job's result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::budget::{AllocationTotals, BudgetDecision, Decision};
use crate::insights::{rank_issues, ContributionRules, RankedIssue, TechStack};
use crate::scoring::ScoredUnit;
use crate::source::{Issue, RepoRef};
use crate::summarizer::SummaryResult;

/// A unit included verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludedSection {
    pub unit_id: String,
    pub path: String,
    pub heading: Option<String>,
    pub kind: String,
    pub score: f64,
    pub content: String,
}

/// A dropped unit, described in one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmittedUnit {
    pub unit_id: String,
    pub path: String,
    pub score: f64,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub files_considered: usize,
    pub files_fetched: usize,
    pub files_failed: usize,
    pub units_total: usize,
    pub verbatim: usize,
    pub summarized: usize,
    pub summaries_truncated: usize,
    pub dropped: usize,
    /// Effective allocator budget, in approximate tokens.
    pub budget: i64,
    /// Budget charged by the allocator (summary estimates included).
    pub used: usize,
}

/// Result of one completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub repo: String,
    pub git_ref: String,
    /// Everything below rendered as one markdown document.
    pub context: String,
    pub included: Vec<IncludedSection>,
    pub summaries: Vec<SummaryResult>,
    pub omitted: Vec<OmittedUnit>,
    /// Open issues, most approachable first.
    pub issues: Vec<RankedIssue>,
    pub tech_stack: TechStack,
    pub contribution_rules: ContributionRules,
    pub failed_paths: Vec<String>,
    pub stats: AnalysisStats,
    pub rate_limit_remaining: Option<u64>,
    pub generated_at: DateTime<Utc>,
}

/// Inputs gathered by the pipeline stages.
pub struct Assembly<'a> {
    pub repo: &'a RepoRef,
    pub units: &'a [ScoredUnit],
    /// Aligned with `units`.
    pub decisions: &'a [BudgetDecision],
    pub summaries: Vec<SummaryResult>,
    pub issues: Vec<Issue>,
    pub tech_stack: TechStack,
    pub contribution_rules: ContributionRules,
    pub failed_paths: Vec<String>,
    pub files_considered: usize,
    pub files_fetched: usize,
    pub budget: i64,
    pub rate_limit_remaining: Option<u64>,
}

impl Assembly<'_> {
    /// Build the result. Sections appear in allocation rank order.
    pub fn build(self) -> AnalysisResult {
        let mut ranked: Vec<(&ScoredUnit, &BudgetDecision)> =
            self.units.iter().zip(self.decisions.iter()).collect();
        ranked.sort_by_key(|(_, d)| d.rank);

        let mut by_id: HashMap<String, SummaryResult> = self
            .summaries
            .into_iter()
            .map(|s| (s.unit_id.clone(), s))
            .collect();

        let mut included = Vec::new();
        let mut summaries = Vec::new();
        let mut omitted = Vec::new();
        for (scored, decision) in ranked {
            let unit = &scored.unit;
            match decision.decision {
                Decision::Verbatim => included.push(IncludedSection {
                    unit_id: unit.unit_id.clone(),
                    path: unit.path.clone(),
                    heading: unit.label().map(str::to_string),
                    kind: unit.kind.name().to_string(),
                    score: scored.score,
                    content: unit.content.clone(),
                }),
                Decision::Summarize => {
                    if let Some(summary) = by_id.remove(&unit.unit_id) {
                        summaries.push(summary);
                    }
                }
                Decision::Drop => omitted.push(OmittedUnit {
                    unit_id: unit.unit_id.clone(),
                    path: unit.path.clone(),
                    score: scored.score,
                    summary: unit.quick_summary(),
                }),
            }
        }

        let totals = AllocationTotals::from_decisions(self.decisions);
        let stats = AnalysisStats {
            files_considered: self.files_considered,
            files_fetched: self.files_fetched,
            files_failed: self.failed_paths.len(),
            units_total: self.units.len(),
            verbatim: totals.verbatim,
            summarized: totals.summarized,
            summaries_truncated: summaries
                .iter()
                .filter(|s| s.kind == crate::summarizer::SummaryKind::Truncated)
                .count(),
            dropped: totals.dropped,
            budget: self.budget,
            used: totals.used,
        };

        let issues = rank_issues(self.issues);
        let context = render(
            self.repo,
            &Insights {
                issues: &issues,
                tech_stack: &self.tech_stack,
                rules: &self.contribution_rules,
            },
            &included,
            &summaries,
            &omitted,
        );

        AnalysisResult {
            repo: self.repo.slug(),
            git_ref: self.repo.git_ref.clone(),
            context,
            included,
            summaries,
            omitted,
            issues,
            tech_stack: self.tech_stack,
            contribution_rules: self.contribution_rules,
            failed_paths: self.failed_paths,
            stats,
            rate_limit_remaining: self.rate_limit_remaining,
            generated_at: Utc::now(),
        }
    }
}

fn title(path: &str, heading: Option<&str>) -> String {
    match heading {
        Some(h) => format!("{path} ({h})"),
        None => path.to_string(),
    }
}

struct Insights<'a> {
    issues: &'a [RankedIssue],
    tech_stack: &'a TechStack,
    rules: &'a ContributionRules,
}

fn render_insights(out: &mut String, insights: &Insights<'_>) {
    let stack = insights.tech_stack;
    if !stack.is_empty() {
        out.push_str("## Tech stack\n\n");
        if !stack.languages.is_empty() {
            let _ = writeln!(out, "- Languages: {}", stack.languages.join(", "));
        }
        if !stack.frameworks.is_empty() {
            let _ = writeln!(out, "- Frameworks: {}", stack.frameworks.join(", "));
        }
        out.push('\n');
    }

    let rules = insights.rules;
    out.push_str("## Contribution rules\n\n");
    for tool in &rules.lint_tools {
        let _ = writeln!(out, "- {} ({})", tool.name, tool.config_file);
    }
    if !rules.ci_workflows.is_empty() {
        let _ = writeln!(out, "- CI workflows: {}", rules.ci_workflows.join(", "));
    }
    if !rules.bots.is_empty() {
        let _ = writeln!(out, "- Active bots: {}", rules.bots.join(", "));
    }
    for (i, step) in rules.checklist.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, step);
    }
    out.push('\n');

    if !insights.issues.is_empty() {
        out.push_str("## Open issues\n\n");
        for ranked in insights.issues {
            let issue = &ranked.issue;
            let _ = write!(out, "- #{} {}", issue.number, issue.title);
            if !issue.labels.is_empty() {
                let _ = write!(out, " [{}]", issue.labels.join(", "));
            }
            let _ = writeln!(out, " ({})", ranked.difficulty);
        }
        out.push('\n');
    }
}

fn render(
    repo: &RepoRef,
    insights: &Insights<'_>,
    included: &[IncludedSection],
    summaries: &[SummaryResult],
    omitted: &[OmittedUnit],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Repository context: {repo}\n");
    render_insights(&mut out, insights);

    if !included.is_empty() {
        out.push_str("## Included content\n\n");
        for section in included {
            let _ = writeln!(out, "### {}\n", title(&section.path, section.heading.as_deref()));
            out.push_str(section.content.trim_end());
            out.push_str("\n\n");
        }
    }

    if !summaries.is_empty() {
        out.push_str("## Summarized content\n\n");
        for summary in summaries {
            let _ = writeln!(out, "### {}\n", title(&summary.path, summary.heading.as_deref()));
            out.push_str(summary.content.trim_end());
            out.push_str("\n\n");
        }
    }

    if !omitted.is_empty() {
        out.push_str("## Omitted content\n\n");
        for unit in omitted {
            let _ = writeln!(out, "- {}", unit.summary);
        }
    }

    out.truncate(out.trim_end().len());
    out.push('\n');
    out
}
