use regex::Regex;
use std::sync::LazyLock;

use super::{Piece, UnitKind};
use crate::config::ChunkConfig;

/// A top-level declaration starting in column 0, with common modifiers.
static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:(?:pub(?:\([^)]*\))?|export|default|async|public|private|protected|internal|",
        r"static|abstract|final|sealed|data|open|override|unsafe|extern(?:[ \t]+",
        r#""[^"]*")?|const|inline|partial)[ \t]+)*"#,
        r"(?:fn|def|class|struct|enum|trait|impl|mod|interface|type|func|function\*?|fun|",
        r"object|record|union|macro_rules!)(?:[ \t]+|<|$)([A-Za-z_$][\w$]*)?",
    ))
    .expect("valid declaration regex")
});

/// Lines that belong to the declaration below them.
fn is_attachment(line: &str) -> bool {
    let t = line.trim_start();
    !t.is_empty()
        && (t.starts_with('@')
            || t.starts_with('#')
            || t.starts_with("//")
            || t.starts_with("/*")
            || t.starts_with('*'))
}

struct Boundary {
    offset: usize,
    line: usize,
    symbol: Option<String>,
}

/// One piece per top-level declaration, or `None` when the text has none.
///
/// A declaration pulls in the comments, attributes and decorators directly
/// above it, and text before the first declaration joins the first piece.
/// Pieces shorter than `min_unit_chars` are merged into the following one; a
/// short final piece is merged into the one before it.
pub(super) fn split(text: &str, config: &ChunkConfig) -> Option<Vec<Piece>> {
    let lines: Vec<(usize, &str)> = text
        .split_inclusive('\n')
        .scan(0, |offset, line| {
            let start = *offset;
            *offset += line.len();
            Some((start, line))
        })
        .collect();

    let mut boundaries: Vec<Boundary> = Vec::new();
    for (index, (_, line)) in lines.iter().enumerate() {
        let Some(caps) = DECLARATION.captures(line.trim_end_matches(['\n', '\r'])) else {
            continue;
        };
        let floor = boundaries.last().map(|b| b.line + 1).unwrap_or(0);
        let mut first = index;
        while first > floor && is_attachment(lines[first - 1].1) {
            first -= 1;
        }
        boundaries.push(Boundary {
            offset: lines[first].0,
            line: first,
            symbol: caps.get(1).map(|m| m.as_str().to_string()),
        });
    }
    if boundaries.is_empty() {
        return None;
    }
    boundaries[0].offset = 0;
    boundaries[0].line = 0;

    let spans: Vec<(usize, usize, &Boundary)> = boundaries
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let end = boundaries.get(i + 1).map(|n| n.offset).unwrap_or(text.len());
            (b.offset, end, b)
        })
        .collect();

    let chars = |start: usize, end: usize| text[start..end].chars().count();
    let mut merged: Vec<(usize, usize, &Boundary)> = Vec::new();
    let mut pending: Option<(usize, usize, &Boundary)> = None;
    for (start, end, boundary) in spans {
        let current = match pending.take() {
            Some((p_start, _, p_boundary)) => (p_start, end, p_boundary),
            None => (start, end, boundary),
        };
        if chars(current.0, current.1) < config.min_unit_chars {
            pending = Some(current);
        } else {
            merged.push(current);
        }
    }
    if let Some((_, end, boundary)) = pending {
        match merged.last_mut() {
            Some(last) => last.1 = end,
            None => merged.push((0, end, boundary)),
        }
    }

    Some(
        merged
            .into_iter()
            .map(|(start, end, boundary)| Piece {
                content_start: start,
                start,
                end,
                kind: UnitKind::CodeBlock {
                    symbol: boundary.symbol.clone(),
                    start_line: text[..start].matches('\n').count() + 1,
                },
                heading: None,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_unit_chars: usize) -> ChunkConfig {
        ChunkConfig {
            chunk_size: 4_000,
            chunk_overlap: 400,
            min_unit_chars,
        }
    }

    fn symbols(pieces: &[Piece]) -> Vec<Option<&str>> {
        pieces
            .iter()
            .map(|p| match &p.kind {
                UnitKind::CodeBlock { symbol, .. } => symbol.as_deref(),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_splits_python_top_level_only() {
        let text = "import os\n\ndef a():\n    return 1\n\nclass B:\n    def method(self):\n        pass\n";
        let pieces = split(text, &config(0)).unwrap();
        assert_eq!(symbols(&pieces), vec![Some("a"), Some("B")]);
        assert_eq!(pieces[0].start, 0, "imports join the first declaration");
    }

    #[test]
    fn test_rust_attributes_and_docs_attach_to_item() {
        let text = "use std::fmt;\n\n/// Doc.\n#[derive(Debug)]\npub struct Foo;\n\nimpl Foo {\n    fn x() {}\n}\n\npub(crate) async fn run() {}\n";
        let pieces = split(text, &config(0)).unwrap();
        assert_eq!(symbols(&pieces), vec![Some("Foo"), Some("Foo"), Some("run")]);
        let foo = &text[pieces[0].start..pieces[0].end];
        assert!(foo.contains("/// Doc."));
        assert!(foo.contains("#[derive(Debug)]"));
        let second = &text[pieces[1].start..pieces[1].end];
        assert!(second.starts_with("impl Foo"));
    }

    #[test]
    fn test_decorators_attach_and_start_line_is_reported() {
        let text = "def a():\n    pass\n\n@app.route('/')\ndef index():\n    return 'hi'\n";
        let pieces = split(text, &config(0)).unwrap();
        assert_eq!(pieces.len(), 2);
        assert!(text[pieces[1].start..].starts_with("@app.route"));
        assert_eq!(
            pieces[1].kind,
            UnitKind::CodeBlock {
                symbol: Some("index".into()),
                start_line: 4
            }
        );
    }

    #[test]
    fn test_small_declarations_are_merged() {
        let body = "    x = 1\n".repeat(30);
        let text = format!("def tiny():\n    pass\n\ndef big():\n{body}\ndef last():\n    pass\n");
        let pieces = split(&text, &config(200)).unwrap();
        assert_eq!(pieces.len(), 1, "tiny merges forward, last merges back");
        assert_eq!(symbols(&pieces), vec![Some("tiny")]);
        assert_eq!(pieces[0].end, text.len());
    }

    #[test]
    fn test_single_small_declaration_is_kept() {
        let pieces = split("fn main() {}\n", &config(200)).unwrap();
        assert_eq!(pieces.len(), 1);
    }

    #[test]
    fn test_no_declarations_returns_none() {
        assert!(split("x = 1\ny = 2\n", &config(0)).is_none());
        assert!(split("const a = () => 1;\n", &config(0)).is_none());
        assert!(split("object.assign(x)\ntypeof y\n", &config(0)).is_none());
    }

    #[test]
    fn test_pieces_tile_the_text() {
        let text = "package main\n\nfunc A() {}\n\nfunc B() {}\n\ntype C struct{}\n";
        let pieces = split(text, &config(0)).unwrap();
        assert_eq!(symbols(&pieces), vec![Some("A"), Some("B"), Some("C")]);
        for pair in pieces.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(pieces.last().unwrap().end, text.len());
    }
}
