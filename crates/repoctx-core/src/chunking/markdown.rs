use regex::Regex;
use std::sync::LazyLock;

use super::{Piece, UnitKind};

/// ATX heading, level 1-3, optional closing hashes.
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,3})[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$").expect("valid heading regex")
});

/// Opening or closing run of a fenced code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    marker: char,
    len: usize,
}

impl Fence {
    /// A run of at least three backticks or tildes at the start of `line`.
    fn parse(line: &str) -> Option<Self> {
        let marker = line.chars().next().filter(|c| *c == '`' || *c == '~')?;
        let len = line.chars().take_while(|c| *c == marker).count();
        (len >= 3).then_some(Self { marker, len })
    }

    /// Closing runs use the opening character and are at least as long.
    fn closes(self, open: Fence) -> bool {
        self.marker == open.marker && self.len >= open.len
    }
}

/// One piece per heading section. Headings inside fenced blocks are content,
/// so a fence always stays within one section.
pub(super) fn split(text: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut section_start = 0;
    let mut heading: Option<(u8, String)> = None;
    let mut fence: Option<Fence> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let bare = line.trim_end_matches(['\n', '\r']);
        let trimmed = bare.trim_start();

        if let Some(open) = fence {
            if let Some(close) = Fence::parse(trimmed) {
                if close.closes(open) && trimmed[close.len..].trim().is_empty() {
                    fence = None;
                }
            }
            continue;
        }
        if let Some(open) = Fence::parse(trimmed) {
            fence = Some(open);
            continue;
        }

        let Some(caps) = HEADING.captures(bare) else {
            continue;
        };
        if line_start > section_start {
            pieces.push(section(section_start, line_start, heading.take()));
        }
        section_start = line_start;
        heading = Some((caps[1].len() as u8, caps[2].trim().to_string()));
    }

    if text.len() > section_start {
        pieces.push(section(section_start, text.len(), heading));
    }
    pieces
}

fn section(start: usize, end: usize, heading: Option<(u8, String)>) -> Piece {
    let (level, heading) = match heading {
        Some((level, text)) => (level, Some(text)),
        None => (0, None),
    };
    Piece {
        content_start: start,
        start,
        end,
        kind: UnitKind::MarkdownSection { level },
        heading,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_heading_levels_one_to_three() {
        let text = "# Title\nintro\n\n## Section 1\nbody 1\n### Deep\nx\n#### Too deep\ny\n";
        let pieces = split(text);
        let headings: Vec<_> = pieces.iter().map(|p| p.heading.as_deref()).collect();
        assert_eq!(
            headings,
            vec![Some("Title"), Some("Section 1"), Some("Deep")]
        );
        assert_eq!(pieces[2].kind, UnitKind::MarkdownSection { level: 3 });
        assert!(text[pieces[2].start..pieces[2].end].contains("#### Too deep"));
    }

    #[test]
    fn test_preamble_has_no_heading() {
        let pieces = split("badges here\n\n# Title\nbody\n");
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].heading, None);
        assert_eq!(pieces[0].kind, UnitKind::MarkdownSection { level: 0 });
    }

    #[test]
    fn test_fenced_block_is_never_split() {
        let text = "## Usage\n```bash\n# not a heading\nrun\n```\n## Next\nmore\n";
        let pieces = split(text);
        assert_eq!(pieces.len(), 2);
        let usage = &text[pieces[0].start..pieces[0].end];
        assert!(usage.contains("# not a heading"));
        assert!(usage.trim_end().ends_with("```"));
    }

    #[test]
    fn test_tilde_fence_and_trailing_hashes() {
        let text = "## Api ##\n~~~\n## hidden\n~~~\n## C#\n";
        let pieces = split(text);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].heading.as_deref(), Some("Api"));
        assert_eq!(pieces[1].heading.as_deref(), Some("C#"));
    }

    #[test]
    fn test_longer_fence_is_not_closed_by_shorter_run() {
        let text = "## Nested\n````md\n```\n# inside\n```\n````\n## After\nx\n";
        let pieces = split(text);
        assert_eq!(pieces.len(), 2);
        assert!(text[pieces[0].start..pieces[0].end].contains("# inside"));
        assert_eq!(pieces[1].heading.as_deref(), Some("After"));
    }

    #[test]
    fn test_fence_closes_only_on_matching_marker() {
        let text = "# A\n~~~\n```\n# hidden\n~~~~\n# B\n";
        let pieces = split(text);
        let headings: Vec<_> = pieces.iter().map(|p| p.heading.as_deref()).collect();
        assert_eq!(headings, vec![Some("A"), Some("B")]);
    }

    #[test]
    fn test_sections_tile_the_text() {
        let text = "pre\n# A\na\n## B\nb";
        let pieces = split(text);
        assert_eq!(pieces[0].start, 0);
        for pair in pieces.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(pieces.last().unwrap().end, text.len());
    }
}
