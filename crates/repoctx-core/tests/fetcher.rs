use std::sync::Arc;
use std::time::Duration;

use repoctx_core::config::FetchConfig;
use repoctx_core::fakes::MemorySource;
use repoctx_core::source::{FetchTarget, RateLimitSignal, SourceError};
use repoctx_core::{FetchGate, RateLimitedFetcher};

fn fetcher(source: Arc<MemorySource>, gate_size: usize) -> RateLimitedFetcher {
    RateLimitedFetcher::new(source, FetchGate::new(gate_size), FetchConfig::default())
}

fn targets(paths: &[&str]) -> Vec<FetchTarget> {
    paths.iter().map(|p| FetchTarget::file(*p)).collect()
}

#[tokio::test]
async fn test_partial_failures_keep_positions() {
    let source = Arc::new(
        MemorySource::new()
            .with_file("a.md", "a")
            .with_file("c.md", "c")
            .with_file("e.md", "e"),
    );
    let fetcher = fetcher(source.clone(), 10);

    let results = fetcher
        .fetch_many(&targets(&["a.md", "b.md", "c.md", "d.md", "e.md"]), 10)
        .await;

    assert_eq!(results.len(), 5);
    let errors: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.is_not_found()));

    let paths: Vec<_> = results
        .iter()
        .map(|r| match r {
            Ok(file) => file.path.clone(),
            Err(err) => err.path.clone(),
        })
        .collect();
    assert_eq!(paths, vec!["a.md", "b.md", "c.md", "d.md", "e.md"]);
    assert_eq!(
        results[2].as_ref().unwrap().content.as_deref(),
        Some(&b"c"[..])
    );

    // Not-found is never retried.
    assert_eq!(source.calls("b.md"), 1);
    assert_eq!(source.calls("d.md"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_bounded_by_requested_concurrency() {
    let mut source = MemorySource::new().with_latency(Duration::from_millis(20));
    let paths: Vec<String> = (0..20).map(|i| format!("src/f{i}.rs")).collect();
    for path in &paths {
        source = source.with_file(path, "fn f() {}");
    }
    let source = Arc::new(source);
    let fetcher = fetcher(source.clone(), 10);

    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let results = fetcher.fetch_many(&targets(&refs), 3).await;

    assert!(results.iter().all(Result::is_ok));
    assert!(source.peak_in_flight() <= 3);
    assert!(source.peak_in_flight() > 1);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_bounded_by_shared_gate() {
    let mut source = MemorySource::new().with_latency(Duration::from_millis(20));
    for i in 0..12 {
        source = source.with_file(&format!("f{i}.md"), "x");
    }
    let source = Arc::new(source);
    let gate = FetchGate::new(2);
    let first = RateLimitedFetcher::new(source.clone(), gate.clone(), FetchConfig::default());
    let second = RateLimitedFetcher::new(source.clone(), gate.clone(), FetchConfig::default());

    let left = targets(&["f0.md", "f1.md", "f2.md", "f3.md", "f4.md", "f5.md"]);
    let right = targets(&["f6.md", "f7.md", "f8.md", "f9.md", "f10.md", "f11.md"]);
    let (a, b) = tokio::join!(first.fetch_many(&left, 10), second.fetch_many(&right, 10));

    assert_eq!(a.len() + b.len(), 12);
    assert!(source.peak_in_flight() <= 2);
    assert_eq!(gate.available_permits(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let source = Arc::new(
        MemorySource::new()
            .with_file("src/lib.rs", "pub fn a() {}")
            .with_failures(
                "src/lib.rs",
                vec![SourceError::Timeout, SourceError::Upstream { status: 503 }],
            ),
    );
    let fetcher = fetcher(source.clone(), 10);

    let results = fetcher.fetch_many(&targets(&["src/lib.rs"]), 1).await;
    assert!(results[0].is_ok());
    assert_eq!(source.calls("src/lib.rs"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_capped() {
    let source = Arc::new(MemorySource::new().with_file("a.md", "a").with_failures(
        "a.md",
        vec![
            SourceError::Transport("reset".into()),
            SourceError::Transport("reset".into()),
            SourceError::Transport("reset".into()),
        ],
    ));
    let fetcher = fetcher(source.clone(), 10);

    let results = fetcher.fetch_many(&targets(&["a.md"]), 1).await;
    let err = results[0].as_ref().unwrap_err();
    assert_eq!(err.attempts, 3);
    assert_eq!(err.source, SourceError::Transport("reset".into()));
    assert_eq!(source.calls("a.md"), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let source = Arc::new(
        MemorySource::new()
            .with_file("a.md", "a")
            .with_failures("a.md", vec![SourceError::Upstream { status: 400 }]),
    );
    let fetcher = fetcher(source.clone(), 10);

    let results = fetcher.fetch_many(&targets(&["a.md"]), 1).await;
    assert!(results[0].is_err());
    assert_eq!(source.calls("a.md"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_request_is_deferred_then_retried() {
    let source = Arc::new(
        MemorySource::new()
            .with_file("a.md", "a")
            .with_failures("a.md", vec![SourceError::RateLimited { reset_at: None }]),
    );
    let fetcher = fetcher(source.clone(), 10);

    let started = tokio::time::Instant::now();
    let results = fetcher.fetch_many(&targets(&["a.md"]), 1).await;

    assert!(results[0].is_ok());
    assert_eq!(source.calls("a.md"), 2);
    // The retry waited out at least one backoff step while the quota was exhausted.
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert!(!fetcher.gate().is_exhausted());
}

#[tokio::test]
async fn test_rate_limit_signal_is_recorded() {
    let source = Arc::new(
        MemorySource::new()
            .with_file("a.md", "a")
            .with_rate_limit(RateLimitSignal {
                remaining: 4_321,
                reset_at: None,
            }),
    );
    let fetcher = fetcher(source, 10);

    let results = fetcher.fetch_many(&targets(&["a.md"]), 1).await;
    assert!(results[0].is_ok());
    assert_eq!(fetcher.gate().remaining(), Some(4_321));
}

#[tokio::test]
async fn test_withheld_body_is_absent_content() {
    let source = Arc::new(MemorySource::new().with_withheld_file("data.sql", 5_000_000));
    let fetcher = fetcher(source, 10);

    let results = fetcher.fetch_many(&targets(&["data.sql"]), 1).await;
    let file = results[0].as_ref().unwrap();
    assert!(file.content.is_none());
    assert_eq!(file.size, 5_000_000);
}

#[tokio::test]
async fn test_tree_and_issue_listings_decode() {
    let source = Arc::new(
        MemorySource::new()
            .with_file("README.md", "# hi")
            .with_file("src/main.rs", "fn main() {}")
            .with_issue(12, "Docs are stale"),
    );
    let fetcher = fetcher(source, 10);

    let tree = fetcher.list_tree().await.unwrap();
    let paths: Vec<_> = tree.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["README.md", "src/main.rs"]);

    let issues = fetcher.list_issues().await.unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].number, 12);
}

#[tokio::test]
async fn test_empty_target_list() {
    let fetcher = fetcher(Arc::new(MemorySource::new()), 10);
    assert!(fetcher.fetch_many(&[], 4).await.is_empty());
}
