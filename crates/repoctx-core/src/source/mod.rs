//! Upstream repository source.
//!
//! The pipeline talks to the repository host through two narrow traits:
//!
//! - [`SourceProvider`] opens a [`SourceClient`] for one repository
//! - [`SourceClient`] answers single GET-style requests for a [`FetchTarget`]
//!
//! Tree and issue listings come back as JSON bodies in the normalized
//! [`TreeEntry`] / [`Issue`] shapes so that every client implementation
//! agrees on one format.

pub mod github;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use github::{GitHubConfig, GitHubProvider, GitHubSource};

/// What kind of resource a target addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    File,
    Tree,
    IssueList,
}

/// One remote resource to retrieve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchTarget {
    /// Repository-relative path for files; empty for tree and issue listings.
    pub path: String,
    pub kind: TargetKind,
}

impl FetchTarget {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: TargetKind::File,
        }
    }

    pub fn tree() -> Self {
        Self {
            path: String::new(),
            kind: TargetKind::Tree,
        }
    }

    pub fn issues() -> Self {
        Self {
            path: String::new(),
            kind: TargetKind::IssueList,
        }
    }

    /// Label used in logs and error messages.
    pub fn label(&self) -> &str {
        match self.kind {
            TargetKind::File => &self.path,
            TargetKind::Tree => "<tree>",
            TargetKind::IssueList => "<issues>",
        }
    }
}

/// Rate-limit state reported by the source on a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSignal {
    pub remaining: u64,
    pub reset_at: Option<DateTime<Utc>>,
}

/// A successful source response.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceResponse {
    /// `None` when the resource exists but its content is withheld (too large).
    pub body: Option<Vec<u8>>,
    /// Size in bytes as reported by the source.
    pub size: u64,
    pub rate_limit: Option<RateLimitSignal>,
}

/// Per-request failures from the source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("not found")]
    NotFound,

    #[error("rate limited (resets at {reset_at:?})")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("request timed out")]
    Timeout,

    #[error("upstream returned status {status}")]
    Upstream { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl SourceError {
    /// Worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Timeout | SourceError::Transport(_) => true,
            SourceError::Upstream { status } => *status >= 500,
            _ => false,
        }
    }
}

/// A client bound to one repository at one ref.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn get(&self, target: &FetchTarget) -> Result<SourceResponse, SourceError>;
}

/// Opens clients for repositories. Implementations share their connection pool
/// across every client they open.
pub trait SourceProvider: Send + Sync {
    fn open(&self, repo: &RepoRef) -> Result<Arc<dyn SourceClient>, SourceError>;
}

/// One entry of a normalized tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub kind: EntryKind,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Dir,
}

/// One open issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub comments: u64,
    /// Length of the description in characters.
    #[serde(default)]
    pub body_chars: usize,
    /// Login of the account that opened the issue.
    #[serde(default)]
    pub author: Option<String>,
}

/// `owner/name@ref` of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub git_ref: String,
}

impl RepoRef {
    pub const DEFAULT_REF: &'static str = "HEAD";

    /// Parse `owner/repo` or a `https://github.com/owner/repo[.git][/tree/<ref>]` URL.
    ///
    /// `git_ref` overrides any ref embedded in the URL; without either the
    /// default branch (`HEAD`) is used.
    pub fn parse(input: &str, git_ref: Option<&str>) -> Result<Self, String> {
        let trimmed = input.trim().trim_end_matches('/');
        let path = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .map(|rest| rest.strip_prefix("www.").unwrap_or(rest))
            .map(|rest| {
                rest.strip_prefix("github.com/")
                    .ok_or_else(|| "only github.com URLs are supported".to_string())
            })
            .transpose()?
            .unwrap_or(trimmed);

        let mut parts = path.split('/');
        let owner = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default().trim_end_matches(".git");
        if owner.is_empty() || name.is_empty() {
            return Err("expected owner/repo".to_string());
        }
        let valid = |s: &str| {
            s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(owner) || !valid(name) {
            return Err("owner and repo may only contain [A-Za-z0-9-_.]".to_string());
        }

        let url_ref = match (parts.next(), parts.next()) {
            (Some("tree"), Some(r)) if !r.is_empty() => Some(r),
            _ => None,
        };
        let git_ref = git_ref
            .filter(|r| !r.trim().is_empty())
            .or(url_ref)
            .unwrap_or(Self::DEFAULT_REF);

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            git_ref: git_ref.to_string(),
        })
    }

    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.git_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slug() {
        let repo = RepoRef::parse("rust-lang/cargo", None).unwrap();
        assert_eq!(repo.owner, "rust-lang");
        assert_eq!(repo.name, "cargo");
        assert_eq!(repo.git_ref, "HEAD");
    }

    #[test]
    fn test_parse_url_variants() {
        let repo = RepoRef::parse("https://github.com/tokio-rs/tokio.git", None).unwrap();
        assert_eq!(repo.slug(), "tokio-rs/tokio");

        let repo = RepoRef::parse("https://www.github.com/a/b/tree/dev/", None).unwrap();
        assert_eq!(repo.git_ref, "dev");

        let repo = RepoRef::parse("https://github.com/a/b/tree/dev", Some("v1.0")).unwrap();
        assert_eq!(repo.git_ref, "v1.0");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(RepoRef::parse("", None).is_err());
        assert!(RepoRef::parse("justone", None).is_err());
        assert!(RepoRef::parse("https://gitlab.com/a/b", None).is_err());
        assert!(RepoRef::parse("a b/c", None).is_err());
    }

    #[test]
    fn test_transient_classification() {
        assert!(SourceError::Timeout.is_transient());
        assert!(SourceError::Upstream { status: 502 }.is_transient());
        assert!(!SourceError::Upstream { status: 401 }.is_transient());
        assert!(!SourceError::NotFound.is_transient());
        assert!(!SourceError::RateLimited { reset_at: None }.is_transient());
    }

    #[test]
    fn test_tree_entry_json_shape() {
        let entry: TreeEntry =
            serde_json::from_str(r#"{"path":"src/lib.rs","kind":"file","size":12}"#).unwrap();
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.size, Some(12));
    }
}
