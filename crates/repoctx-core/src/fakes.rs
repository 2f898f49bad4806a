//! In-memory collaborators for tests and offline runs.
//!
//! - [`MemorySource`] / [`MemoryProvider`]: a scripted repository source
//! - [`ScriptedGenerator`]: a text generator with fixed behaviour

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::generator::{GenerateError, TextGenerator};
use crate::source::{
    EntryKind, FetchTarget, Issue, RateLimitSignal, RepoRef, SourceClient, SourceError,
    SourceProvider, SourceResponse, TargetKind, TreeEntry,
};

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum StoredFile {
    Content(Vec<u8>),
    /// Exists in the tree but the body is withheld (too large or binary).
    Withheld(u64),
}

/// Repository held in memory. Scripted failures are consumed in order before
/// the stored content is served.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: BTreeMap<String, StoredFile>,
    issues: Vec<Issue>,
    failures: Mutex<HashMap<String, VecDeque<SourceError>>>,
    rate_limit: Mutex<Option<RateLimitSignal>>,
    latency: Duration,
    calls: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files
            .insert(path.to_string(), StoredFile::Content(content.into()));
        self
    }

    pub fn with_withheld_file(mut self, path: &str, size: u64) -> Self {
        self.files
            .insert(path.to_string(), StoredFile::Withheld(size));
        self
    }

    pub fn with_issue(self, number: u64, title: &str) -> Self {
        self.with_labeled_issue(number, title, &[])
    }

    pub fn with_labeled_issue(mut self, number: u64, title: &str, labels: &[&str]) -> Self {
        self.issues.push(Issue {
            number,
            title: title.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            url: format!("https://example.invalid/issues/{number}"),
            comments: 0,
            body_chars: 0,
            author: None,
        });
        self
    }

    /// Fail the next requests for `label` (a file path, `<tree>` or `<issues>`).
    pub fn with_failures(self, label: &str, errors: Vec<SourceError>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(label.to_string(), errors.into());
        self
    }

    /// Rate-limit signal attached to every successful response.
    pub fn with_rate_limit(self, signal: RateLimitSignal) -> Self {
        *self.rate_limit.lock().unwrap() = Some(signal);
        self
    }

    /// Simulated per-request latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self, label: &str) -> u32 {
        self.calls.lock().unwrap().get(label).copied().unwrap_or(0)
    }

    /// Most requests observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn tree(&self) -> Vec<TreeEntry> {
        self.files
            .iter()
            .map(|(path, file)| TreeEntry {
                path: path.clone(),
                kind: EntryKind::File,
                size: Some(match file {
                    StoredFile::Content(bytes) => bytes.len() as u64,
                    StoredFile::Withheld(size) => *size,
                }),
            })
            .collect()
    }

    fn serve(&self, target: &FetchTarget) -> Result<SourceResponse, SourceError> {
        let rate_limit = *self.rate_limit.lock().unwrap();
        let json = |value: Vec<u8>| SourceResponse {
            size: value.len() as u64,
            body: Some(value),
            rate_limit,
        };
        let encode = |e: serde_json::Error| SourceError::Decode(e.to_string());
        match target.kind {
            TargetKind::Tree => Ok(json(serde_json::to_vec(&self.tree()).map_err(encode)?)),
            TargetKind::IssueList => Ok(json(serde_json::to_vec(&self.issues).map_err(encode)?)),
            TargetKind::File => match self.files.get(&target.path) {
                Some(StoredFile::Content(bytes)) => Ok(SourceResponse {
                    body: Some(bytes.clone()),
                    size: bytes.len() as u64,
                    rate_limit,
                }),
                Some(StoredFile::Withheld(size)) => Ok(SourceResponse {
                    body: None,
                    size: *size,
                    rate_limit,
                }),
                None => Err(SourceError::NotFound),
            },
        }
    }
}

#[async_trait]
impl SourceClient for MemorySource {
    async fn get(&self, target: &FetchTarget) -> Result<SourceResponse, SourceError> {
        let label = target.label().to_string();
        *self.calls.lock().unwrap().entry(label.clone()).or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&label)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(err) => Err(err),
            None => self.serve(target),
        }
    }
}

/// Hands out the same [`MemorySource`] for every repository.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    source: Arc<MemorySource>,
}

impl MemoryProvider {
    pub fn new(source: MemorySource) -> Self {
        Self {
            source: Arc::new(source),
        }
    }
}

impl SourceProvider for MemoryProvider {
    fn open(&self, _repo: &RepoRef) -> Result<Arc<dyn SourceClient>, SourceError> {
        Ok(self.source.clone())
    }
}

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Script {
    Always(String),
    AlwaysFail(GenerateError),
    FailTimes(u32, String),
}

/// Text generator with a fixed script.
#[derive(Debug)]
pub struct ScriptedGenerator {
    script: Script,
    max_input_chars: usize,
    calls: AtomicU32,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedGenerator {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            max_input_chars: 100_000,
            calls: AtomicU32::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Always answers `text`.
    pub fn always(text: impl Into<String>) -> Self {
        Self::with_script(Script::Always(text.into()))
    }

    /// Always fails with a retryable HTTP error.
    pub fn always_fail() -> Self {
        Self::failing_with(GenerateError::Http("scripted failure".into()))
    }

    pub fn failing_with(err: GenerateError) -> Self {
        Self::with_script(Script::AlwaysFail(err))
    }

    /// Fails `n` times, then answers `text`.
    pub fn fail_times(n: u32, text: impl Into<String>) -> Self {
        Self::with_script(Script::FailTimes(n, text.into()))
    }

    pub fn with_max_input_chars(mut self, max: usize) -> Self {
        self.max_input_chars = max;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        match &self.script {
            Script::Always(text) => Ok(text.clone()),
            Script::AlwaysFail(err) => Err(err.clone()),
            Script::FailTimes(n, _) if call <= *n => {
                Err(GenerateError::Http(format!("scripted failure {call}")))
            }
            Script::FailTimes(_, text) => Ok(text.clone()),
        }
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }
}
