//! Choosing which tree entries to fetch.

use tracing::debug;

use crate::classify::{self, PathClass};
use crate::config::SelectionConfig;
use crate::source::{EntryKind, TreeEntry};

/// Paths worth fetching, best first.
///
/// Directories, entries under a skipped directory, known binary formats and
/// files the tree reports as larger than `max_file_bytes` are left out. The
/// rest is ordered by path class, then depth, then path, and capped at
/// `max_files`. The order is the discovery order used for score ties.
pub fn select_candidates(entries: &[TreeEntry], config: &SelectionConfig) -> Vec<String> {
    let mut candidates: Vec<(PathClass, usize, &str)> = entries
        .iter()
        .filter(|e| e.kind == EntryKind::File)
        .filter(|e| {
            !e.path
                .split('/')
                .rev()
                .skip(1)
                .any(|dir| config.skip_dirs.iter().any(|s| s == dir))
        })
        .filter(|e| !classify::is_binary_path(&e.path))
        .filter(|e| e.size.map_or(true, |s| s <= config.max_file_bytes))
        .map(|e| {
            (
                classify::classify_path(&e.path),
                e.path.matches('/').count(),
                e.path.as_str(),
            )
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.0.rank()
            .cmp(&b.0.rank())
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(b.2))
    });

    let total = candidates.len();
    candidates.truncate(config.max_files);
    debug!(total, kept = candidates.len(), "selected fetch candidates");
    candidates
        .into_iter()
        .map(|(_, _, path)| path.to_string())
        .collect()
}
