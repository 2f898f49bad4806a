//! Repository insights rendered next to the budgeted content.
//!
//! Everything here is a pure function of the tree listing, the fetched files
//! and the open issues, so it costs no extra requests:
//!
//! - [`rank_issues`]: open issues ordered by how approachable they look
//! - [`detect_tech_stack`]: languages by extension, frameworks from manifests
//! - [`detect_contribution_rules`]: lint configs, CI workflows, bots and a checklist

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::classify::{extension, file_name};
use crate::fetcher::RawFile;
use crate::source::{EntryKind, Issue, TreeEntry};

const BEGINNER_LABELS: &[&str] = &[
    "good first issue",
    "good-first-issue",
    "help wanted",
    "beginner",
    "documentation",
    "easy",
];

const RISKY_LABELS: &[&str] = &["bug", "critical", "security", "complex", "advanced"];

/// Issues with more comments than this read as contested.
const BUSY_DISCUSSION: u64 = 10;

/// Descriptions longer than this count as detailed.
const DETAILED_BODY_CHARS: usize = 100;

/// How hard an issue looks to a first-time contributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    BeginnerFriendly,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::BeginnerFriendly => "beginner-friendly",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open issue with its approachability score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedIssue {
    #[serde(flatten)]
    pub issue: Issue,
    pub score: i32,
    pub difficulty: Difficulty,
    pub reasons: Vec<String>,
}

fn score_issue(issue: Issue) -> RankedIssue {
    let labels: Vec<String> = issue.labels.iter().map(|l| l.to_lowercase()).collect();
    let has_any = |set: &[&str]| labels.iter().any(|l| set.contains(&l.as_str()));

    let mut score = 0;
    let mut difficulty = Difficulty::Medium;
    let mut reasons = Vec::new();

    if has_any(BEGINNER_LABELS) {
        score += 5;
        difficulty = Difficulty::BeginnerFriendly;
        reasons.push("marked for beginners".to_string());
    }
    // A risky label outweighs a beginner label.
    if has_any(RISKY_LABELS) {
        score -= 3;
        difficulty = Difficulty::Hard;
        reasons.push("marked as complex or critical".to_string());
    }

    if issue.comments == 0 {
        score += 1;
        reasons.push("no comments yet".to_string());
    } else if issue.comments > BUSY_DISCUSSION {
        score -= 2;
        difficulty = Difficulty::Hard;
        reasons.push("long discussion".to_string());
    }

    if issue.body_chars > DETAILED_BODY_CHARS {
        score += 1;
        reasons.push("detailed description".to_string());
    }

    RankedIssue {
        issue,
        score,
        difficulty,
        reasons,
    }
}

/// Score every issue and order them best first. Ties keep listing order.
pub fn rank_issues(issues: Vec<Issue>) -> Vec<RankedIssue> {
    let mut ranked: Vec<RankedIssue> = issues.into_iter().map(score_issue).collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

/// Languages and frameworks a repository is built with, each sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechStack {
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
}

impl TechStack {
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty() && self.frameworks.is_empty()
    }
}

const LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("py", "Python"),
    ("js", "JavaScript"),
    ("jsx", "JavaScript"),
    ("mjs", "JavaScript"),
    ("ts", "TypeScript"),
    ("tsx", "TypeScript"),
    ("go", "Go"),
    ("rs", "Rust"),
    ("java", "Java"),
    ("kt", "Kotlin"),
    ("c", "C"),
    ("cpp", "C++"),
    ("cc", "C++"),
    ("cs", "C#"),
    ("rb", "Ruby"),
    ("php", "PHP"),
    ("swift", "Swift"),
];

/// `(manifest file name, needle, framework)`. Needles match lowercased content.
const FRAMEWORK_MARKERS: &[(&str, &str, &str)] = &[
    ("package.json", "\"react\"", "React"),
    ("package.json", "\"next\"", "Next.js"),
    ("package.json", "\"vue\"", "Vue"),
    ("package.json", "\"express\"", "Express"),
    ("package.json", "\"tailwindcss\"", "Tailwind CSS"),
    ("pyproject.toml", "fastapi", "FastAPI"),
    ("pyproject.toml", "django", "Django"),
    ("pyproject.toml", "flask", "Flask"),
    ("pyproject.toml", "pandas", "Pandas"),
    ("pyproject.toml", "torch", "PyTorch"),
    ("pyproject.toml", "tensorflow", "TensorFlow"),
    ("requirements.txt", "fastapi", "FastAPI"),
    ("requirements.txt", "django", "Django"),
    ("requirements.txt", "flask", "Flask"),
    ("requirements.txt", "pandas", "Pandas"),
    ("requirements.txt", "torch", "PyTorch"),
    ("requirements.txt", "tensorflow", "TensorFlow"),
    ("cargo.toml", "tokio", "Tokio"),
    ("cargo.toml", "axum", "Axum"),
    ("cargo.toml", "actix-web", "Actix Web"),
    ("go.mod", "github.com/gin-gonic/gin", "Gin"),
];

fn text_of(file: &RawFile) -> Option<String> {
    let bytes = file.content.as_deref()?;
    Some(String::from_utf8_lossy(bytes).to_lowercase())
}

/// Languages from every file extension in the tree; frameworks from the
/// manifests that were fetched.
pub fn detect_tech_stack(tree: &[TreeEntry], files: &[RawFile]) -> TechStack {
    let languages: BTreeSet<&str> = tree
        .iter()
        .filter(|e| e.kind == EntryKind::File)
        .filter_map(|e| extension(&e.path))
        .filter_map(|ext| {
            LANGUAGE_EXTENSIONS
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, language)| *language)
        })
        .collect();

    let mut frameworks = BTreeSet::new();
    for file in files {
        let name = file_name(&file.path).to_ascii_lowercase();
        let markers: Vec<_> = FRAMEWORK_MARKERS
            .iter()
            .filter(|(manifest, _, _)| *manifest == name)
            .collect();
        if markers.is_empty() {
            continue;
        }
        let Some(text) = text_of(file) else {
            continue;
        };
        for (_, needle, framework) in markers {
            if text.contains(needle) {
                frameworks.insert(*framework);
            }
        }
    }

    TechStack {
        languages: languages.into_iter().map(str::to_string).collect(),
        frameworks: frameworks.into_iter().map(str::to_string).collect(),
    }
}

/// A lint or format tool and the file that configures it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintTool {
    pub name: String,
    pub config_file: String,
}

/// What a contributor is expected to satisfy before a pull request lands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRules {
    pub lint_tools: Vec<LintTool>,
    /// Paths of CI workflow definitions.
    pub ci_workflows: Vec<String>,
    /// Bot accounts seen opening issues.
    pub bots: Vec<String>,
    pub checklist: Vec<String>,
}

struct LintRule {
    name: &'static str,
    files: &'static [&'static str],
    /// `[tool.<table>]` in a fetched `pyproject.toml` also counts.
    pyproject_table: Option<&'static str>,
}

const LINT_RULES: &[LintRule] = &[
    LintRule {
        name: "ESLint",
        files: &[
            ".eslintrc",
            ".eslintrc.js",
            ".eslintrc.cjs",
            ".eslintrc.json",
            ".eslintrc.yaml",
            ".eslintrc.yml",
            "eslint.config.js",
            "eslint.config.mjs",
        ],
        pyproject_table: None,
    },
    LintRule {
        name: "Prettier",
        files: &[
            ".prettierrc",
            ".prettierrc.js",
            ".prettierrc.json",
            ".prettierrc.yaml",
            ".prettierrc.yml",
        ],
        pyproject_table: None,
    },
    LintRule {
        name: "Ruff",
        files: &["ruff.toml", ".ruff.toml"],
        pyproject_table: Some("ruff"),
    },
    LintRule {
        name: "Black",
        files: &[],
        pyproject_table: Some("black"),
    },
    LintRule {
        name: "Mypy",
        files: &["mypy.ini", ".mypy.ini"],
        pyproject_table: Some("mypy"),
    },
    LintRule {
        name: "Pytest",
        files: &["pytest.ini"],
        pyproject_table: Some("pytest"),
    },
    LintRule {
        name: "Rustfmt",
        files: &["rustfmt.toml", ".rustfmt.toml"],
        pyproject_table: None,
    },
    LintRule {
        name: "Clippy",
        files: &["clippy.toml", ".clippy.toml"],
        pyproject_table: None,
    },
];

const KNOWN_BOTS: &[&str] = &["snyk-bot", "semantic-release-bot"];

fn is_bot(login: &str) -> bool {
    login.ends_with("[bot]") || KNOWN_BOTS.contains(&login)
}

fn is_ci_workflow(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    let yaml = lower.ends_with(".yml") || lower.ends_with(".yaml");
    (lower.starts_with(".github/workflows/") && yaml)
        || lower == ".gitlab-ci.yml"
        || lower == ".circleci/config.yml"
}

/// Lint tooling and CI come from the tree, `pyproject.toml` tables from the
/// fetched copy, bots from issue authors.
pub fn detect_contribution_rules(
    tree: &[TreeEntry],
    files: &[RawFile],
    issues: &[Issue],
) -> ContributionRules {
    let paths: Vec<&str> = tree
        .iter()
        .filter(|e| e.kind == EntryKind::File)
        .map(|e| e.path.as_str())
        .collect();
    let pyproject = files
        .iter()
        .find(|f| f.path.eq_ignore_ascii_case("pyproject.toml"))
        .and_then(text_of);

    let mut lint_tools = Vec::new();
    for rule in LINT_RULES {
        let by_file = paths
            .iter()
            .map(|p| file_name(p))
            .find(|name| rule.files.contains(name));
        let by_table = rule.pyproject_table.filter(|table| {
            pyproject
                .as_deref()
                .is_some_and(|text| text.contains(&format!("[tool.{table}")))
        });
        let config_file = match (by_file, by_table) {
            (Some(name), _) => name,
            (None, Some(_)) => "pyproject.toml",
            (None, None) => continue,
        };
        lint_tools.push(LintTool {
            name: rule.name.to_string(),
            config_file: config_file.to_string(),
        });
    }

    let mut ci_workflows: Vec<String> = paths
        .iter()
        .filter(|p| is_ci_workflow(p))
        .map(|p| p.to_string())
        .collect();
    ci_workflows.sort();

    let bots: BTreeSet<&str> = issues
        .iter()
        .filter_map(|i| i.author.as_deref())
        .filter(|login| is_bot(login))
        .collect();

    let contributing = paths
        .iter()
        .find(|p| file_name(p).to_ascii_uppercase().starts_with("CONTRIBUTING"));
    let mut checklist = vec![
        match contributing {
            Some(path) => format!("Read {path}."),
            None => "Read the contribution notes in the README.".to_string(),
        },
        "Fork the repository and create a new branch.".to_string(),
    ];
    for tool in &lint_tools {
        checklist.push(format!("Ensure code passes {} checks.", tool.name));
    }
    if !ci_workflows.is_empty() {
        checklist.push("Ensure all CI checks pass before merging.".to_string());
    }

    ContributionRules {
        lint_tools,
        ci_workflows,
        bots: bots.into_iter().map(str::to_string).collect(),
        checklist,
    }
}
