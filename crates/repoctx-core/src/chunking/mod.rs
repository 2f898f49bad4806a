//! File splitting.
//!
//! [`ChunkSplitter`] turns one [`RawFile`] into an ordered list of
//! [`ContentUnit`]s using one of three modes picked from the path:
//!
//! - markdown: one unit per level 1-3 heading section, fences kept whole
//! - code: one unit per top-level declaration (small ones merged forward)
//! - sliding window: fixed-size windows with overlap, the fallback for all else
//!
//! `byte_range` is the span of the file a unit *owns*. Owned spans of one file
//! never overlap and appear in file order. A sliding window's `content` may
//! additionally start with `overlap` bytes repeated from the previous window.

mod code;
mod markdown;
mod window;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classify::{self, ChunkCategory};
use crate::config::ChunkConfig;
use crate::fetcher::RawFile;

/// Characters per approximate token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Approximate token count: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Per-kind metadata of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitKind {
    MarkdownSection {
        /// 1-3, or 0 for text before the first heading.
        level: u8,
    },
    CodeBlock {
        /// Name of the first declaration in the block, when one could be read.
        symbol: Option<String>,
        /// 1-based line the block starts on.
        start_line: usize,
    },
    SlidingWindow {
        window_index: usize,
        /// Leading bytes of `content` repeated from the previous window.
        overlap: usize,
    },
}

impl UnitKind {
    pub fn name(&self) -> &'static str {
        match self {
            UnitKind::MarkdownSection { .. } => "markdown_section",
            UnitKind::CodeBlock { .. } => "code_block",
            UnitKind::SlidingWindow { .. } => "sliding_window",
        }
    }

    pub fn heading_level(&self) -> Option<u8> {
        match self {
            UnitKind::MarkdownSection { level } => Some(*level),
            _ => None,
        }
    }
}

/// Half-open byte span `[start, end)` within the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

/// The atomic selectable slice of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUnit {
    /// `"{path}#{ordinal}"`, stable for a given file content.
    pub unit_id: String,
    pub path: String,
    pub content: String,
    pub kind: UnitKind,
    pub byte_range: ByteRange,
    pub heading: Option<String>,
    /// Length of `content` in characters. Always > 0.
    pub size: usize,
    pub category: ChunkCategory,
}

impl ContentUnit {
    /// Heading for markdown, symbol for code, otherwise `None`.
    pub fn label(&self) -> Option<&str> {
        match &self.kind {
            UnitKind::CodeBlock {
                symbol: Some(symbol),
                ..
            } => Some(symbol),
            _ => self.heading.as_deref(),
        }
    }

    /// One-line description used for omitted units.
    pub fn quick_summary(&self) -> String {
        match self.label() {
            Some(label) => format!(
                "{} section: {} ({} chars)",
                self.category.label(),
                label,
                self.size
            ),
            None => format!(
                "{} from {} ({} chars)",
                self.category.label(),
                self.path,
                self.size
            ),
        }
    }
}

/// Why a file could not be split. Absorbed by [`ChunkSplitter::split`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    #[error("{path} looks binary")]
    Binary { path: String },

    #[error("{path} is not valid UTF-8 (at byte {valid_up_to})")]
    NotUtf8 { path: String, valid_up_to: usize },
}

/// Splitting strategy picked from a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    Markdown,
    Code,
    Window,
}

impl SplitMode {
    pub fn for_path(path: &str) -> Self {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".md") || lower.ends_with(".markdown") || lower.ends_with(".mdx") {
            SplitMode::Markdown
        } else if classify::is_code(path) {
            SplitMode::Code
        } else {
            SplitMode::Window
        }
    }
}

/// A span produced by one of the mode splitters.
#[derive(Debug, Clone, PartialEq)]
struct Piece {
    /// Where `content` starts; `<= start` (earlier only for window overlap).
    content_start: usize,
    start: usize,
    end: usize,
    kind: UnitKind,
    heading: Option<String>,
}

/// Deterministic file splitter.
#[derive(Debug, Clone, Default)]
pub struct ChunkSplitter {
    config: ChunkConfig,
}

impl ChunkSplitter {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Split a file, absorbing errors: a malformed file yields no units.
    pub fn split(&self, file: &RawFile) -> Vec<ContentUnit> {
        match self.try_split(file) {
            Ok(units) => units,
            Err(err) => {
                warn!(path = %file.path, error = %err, "skipping file that could not be split");
                Vec::new()
            }
        }
    }

    /// Split a file. Absent or empty content yields `Ok(vec![])`.
    pub fn try_split(&self, file: &RawFile) -> Result<Vec<ContentUnit>, SplitError> {
        let Some(bytes) = file.content.as_deref() else {
            return Ok(Vec::new());
        };
        if bytes.contains(&0) {
            return Err(SplitError::Binary {
                path: file.path.clone(),
            });
        }
        let text = std::str::from_utf8(bytes).map_err(|e| SplitError::NotUtf8 {
            path: file.path.clone(),
            valid_up_to: e.valid_up_to(),
        })?;
        Ok(self.split_text(&file.path, text))
    }

    /// Split already-decoded text.
    pub fn split_text(&self, path: &str, text: &str) -> Vec<ContentUnit> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let pieces = match SplitMode::for_path(path) {
            SplitMode::Markdown => markdown::split(text),
            SplitMode::Code => code::split(text, &self.config)
                .unwrap_or_else(|| window::split(text, &self.config)),
            SplitMode::Window => window::split(text, &self.config),
        };

        let category = ChunkCategory::from(classify::classify_path(path));
        pieces
            .into_iter()
            .filter(|p| !text[p.start..p.end].trim().is_empty())
            .enumerate()
            .map(|(ordinal, piece)| {
                let content = text[piece.content_start..piece.end].to_string();
                ContentUnit {
                    unit_id: format!("{path}#{ordinal}"),
                    path: path.to_string(),
                    size: content.chars().count(),
                    content,
                    kind: piece.kind,
                    byte_range: ByteRange {
                        start: piece.start,
                        end: piece.end,
                    },
                    heading: piece.heading,
                    category,
                }
            })
            .collect()
    }
}
