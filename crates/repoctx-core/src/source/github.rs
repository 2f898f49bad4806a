//! GitHub REST v3 source client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    EntryKind, FetchTarget, Issue, RateLimitSignal, RepoRef, SourceClient, SourceError,
    SourceProvider, SourceResponse, TargetKind, TreeEntry,
};

const API_VERSION: &str = "2022-11-28";
const JSON_ACCEPT: &str = "application/vnd.github+json";
const RAW_ACCEPT: &str = "application/vnd.github.raw+json";

/// GitHub client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub api_base: String,
    /// Bearer token (optional for public repositories).
    pub token: Option<String>,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Files larger than this are reported with absent content.
    pub max_file_bytes: u64,
    /// Open issues listed per repository.
    pub issue_limit: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token: None,
            user_agent: concat!("repoctx/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_file_bytes: 1_000_000,
            issue_limit: 20,
        }
    }
}

impl GitHubConfig {
    /// Defaults with `GITHUB_TOKEN` and `GITHUB_API_URL` applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.token = std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        if let Ok(base) = std::env::var("GITHUB_API_URL") {
            config.api_base = base;
        }
        config
    }
}

/// Opens [`GitHubSource`]s that share one HTTP connection pool.
pub struct GitHubProvider {
    config: Arc<GitHubConfig>,
    http_client: reqwest::Client,
}

impl GitHubProvider {
    pub fn new(config: GitHubConfig) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(API_VERSION),
        );
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| SourceError::Transport(format!("invalid token header: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| SourceError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config: Arc::new(config),
            http_client,
        })
    }

    pub fn from_env() -> Result<Self, SourceError> {
        Self::new(GitHubConfig::from_env())
    }
}

impl SourceProvider for GitHubProvider {
    fn open(&self, repo: &RepoRef) -> Result<Arc<dyn SourceClient>, SourceError> {
        let repo_url = Url::parse(&format!(
            "{}/repos/{}/{}/",
            self.config.api_base.trim_end_matches('/'),
            repo.owner,
            repo.name
        ))
        .map_err(|e| SourceError::Transport(format!("invalid API base: {e}")))?;

        Ok(Arc::new(GitHubSource {
            repo_url,
            git_ref: repo.git_ref.clone(),
            config: Arc::clone(&self.config),
            http_client: self.http_client.clone(),
        }))
    }
}

/// A GitHub repository at one ref.
pub struct GitHubSource {
    repo_url: Url,
    git_ref: String,
    config: Arc<GitHubConfig>,
    http_client: reqwest::Client,
}

impl GitHubSource {
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.repo_url.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::Transport("API base cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(segments.iter().flat_map(|s| s.split('/')));
        Ok(url)
    }

    async fn send(
        &self,
        url: Url,
        accept: &'static str,
    ) -> Result<(reqwest::Response, Option<RateLimitSignal>), SourceError> {
        debug!(url = %url, "GET");
        let response = self
            .http_client
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(map_transport_error)?;

        let rate_limit = parse_rate_limit(response.headers());
        if let Some(signal) = rate_limit {
            if signal.remaining < 5 {
                warn!(remaining = signal.remaining, reset_at = ?signal.reset_at, "GitHub rate limit low");
            }
        }
        check_status(response.status(), rate_limit)?;
        Ok((response, rate_limit))
    }

    async fn get_file(&self, path: &str) -> Result<SourceResponse, SourceError> {
        let mut url = self.endpoint(&["contents", path])?;
        url.query_pairs_mut().append_pair("ref", &self.git_ref);
        let (response, rate_limit) = self.send(url, RAW_ACCEPT).await?;

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(size) = declared.filter(|s| *s > self.config.max_file_bytes) {
            warn!(path, size, "file too large, content withheld");
            return Ok(SourceResponse {
                body: None,
                size,
                rate_limit,
            });
        }

        let bytes = response.bytes().await.map_err(map_transport_error)?;
        let size = bytes.len() as u64;
        let body = (size <= self.config.max_file_bytes).then(|| bytes.to_vec());
        Ok(SourceResponse {
            body,
            size,
            rate_limit,
        })
    }

    async fn get_json(&self, url: Url) -> Result<(Value, Option<RateLimitSignal>), SourceError> {
        let (response, rate_limit) = self.send(url, JSON_ACCEPT).await?;
        let value = response
            .json::<Value>()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        Ok((value, rate_limit))
    }

    async fn get_tree(&self) -> Result<SourceResponse, SourceError> {
        let mut url = self.endpoint(&["git", "trees", &self.git_ref])?;
        url.query_pairs_mut().append_pair("recursive", "1");
        let (value, rate_limit) = self.get_json(url).await?;
        if value.get("truncated").and_then(Value::as_bool) == Some(true) {
            warn!(repo = %self.repo_url, "tree listing truncated by GitHub");
        }
        encode(&normalize_tree(&value), rate_limit)
    }

    async fn get_issues(&self) -> Result<SourceResponse, SourceError> {
        let mut url = self.endpoint(&["issues"])?;
        url.query_pairs_mut()
            .append_pair("state", "open")
            .append_pair("sort", "updated")
            .append_pair("per_page", &self.config.issue_limit.to_string());
        let (value, rate_limit) = self.get_json(url).await?;
        encode(&normalize_issues(&value), rate_limit)
    }
}

#[async_trait]
impl SourceClient for GitHubSource {
    async fn get(&self, target: &FetchTarget) -> Result<SourceResponse, SourceError> {
        match target.kind {
            TargetKind::File => self.get_file(&target.path).await,
            TargetKind::Tree => self.get_tree().await,
            TargetKind::IssueList => self.get_issues().await,
        }
    }
}

fn encode<T: Serialize>(
    value: &T,
    rate_limit: Option<RateLimitSignal>,
) -> Result<SourceResponse, SourceError> {
    let body = serde_json::to_vec(value).map_err(|e| SourceError::Decode(e.to_string()))?;
    Ok(SourceResponse {
        size: body.len() as u64,
        body: Some(body),
        rate_limit,
    })
}

fn map_transport_error(err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Transport(err.to_string())
    }
}

/// `X-RateLimit-Remaining` / `X-RateLimit-Reset` (epoch seconds).
fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitSignal> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };
    let remaining = header("x-ratelimit-remaining")?;
    let reset_at = header("x-ratelimit-reset").and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
    Some(RateLimitSignal {
        remaining: remaining.max(0) as u64,
        reset_at,
    })
}

fn check_status(status: StatusCode, rate_limit: Option<RateLimitSignal>) -> Result<(), SourceError> {
    if status.is_success() {
        return Ok(());
    }
    let exhausted = rate_limit.map(|r| r.remaining == 0);
    match status {
        StatusCode::NOT_FOUND => Err(SourceError::NotFound),
        StatusCode::TOO_MANY_REQUESTS => Err(SourceError::RateLimited {
            reset_at: rate_limit.and_then(|r| r.reset_at),
        }),
        StatusCode::FORBIDDEN if exhausted == Some(true) => Err(SourceError::RateLimited {
            reset_at: rate_limit.and_then(|r| r.reset_at),
        }),
        s => Err(SourceError::Upstream { status: s.as_u16() }),
    }
}

/// Git trees API -> `[TreeEntry]`. Submodules and symlinks are not files.
fn normalize_tree(value: &Value) -> Vec<TreeEntry> {
    value
        .get("tree")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let path = entry.get("path")?.as_str()?.to_string();
                    let kind = match entry.get("type")?.as_str()? {
                        "blob" => EntryKind::File,
                        "tree" => EntryKind::Dir,
                        _ => return None,
                    };
                    let size = entry.get("size").and_then(Value::as_u64);
                    Some(TreeEntry { path, kind, size })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Issues API -> `[Issue]`, dropping pull requests (which the API mixes in).
fn normalize_issues(value: &Value) -> Vec<Issue> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("pull_request").is_none())
                .filter_map(|item| {
                    Some(Issue {
                        number: item.get("number")?.as_u64()?,
                        title: item.get("title")?.as_str()?.to_string(),
                        labels: item
                            .get("labels")
                            .and_then(Value::as_array)
                            .map(|labels| {
                                labels
                                    .iter()
                                    .filter_map(|l| l.get("name").and_then(Value::as_str))
                                    .map(str::to_string)
                                    .collect()
                            })
                            .unwrap_or_default(),
                        url: item
                            .get("html_url")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        comments: item.get("comments").and_then(Value::as_u64).unwrap_or(0),
                        body_chars: item
                            .get("body")
                            .and_then(Value::as_str)
                            .map(|b| b.chars().count())
                            .unwrap_or(0),
                        author: item
                            .get("user")
                            .and_then(|u| u.get("login"))
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
