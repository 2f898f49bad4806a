use proptest::prelude::*;
use repoctx_core::config::ChunkConfig;
use repoctx_core::{ChunkSplitter, ContentUnit, RawFile, UnitKind};

fn raw(path: &str, text: &str) -> RawFile {
    RawFile::new(path, Some(text.as_bytes().to_vec()))
}

fn markdown_doc() -> String {
    let mut doc = String::from("Intro paragraph before any heading.\n\n");
    for i in 0..6 {
        doc.push_str(&format!("# Part {i}\n\nSome prose for part {i}.\n\n"));
        doc.push_str("```sh\n# not a heading\ncargo build\n```\n\n");
        doc.push_str(&format!("## Detail {i}\n\n{}\n\n", "detail text ".repeat(30)));
    }
    doc
}

fn rust_source() -> String {
    let mut src = String::from("use std::fmt;\n\n");
    for i in 0..8 {
        src.push_str(&format!(
            "/// Item {i}.\n#[derive(Debug)]\npub struct Item{i} {{\n{}}}\n\n",
            "    pub field: u32,\n".repeat(12)
        ));
        src.push_str(&format!(
            "impl Item{i} {{\n    pub fn value(&self) -> u32 {{\n{}        self.field\n    }}\n}}\n\n",
            "        let _ = 1 + 1;\n".repeat(10)
        ));
    }
    src
}

fn prose() -> String {
    "The quick brown fox jumps over the lazy dog. ".repeat(400)
}

fn assert_ranges_do_not_overlap(units: &[ContentUnit]) {
    for pair in units.windows(2) {
        assert!(
            pair[0].byte_range.end <= pair[1].byte_range.start,
            "{} ends at {} but {} starts at {}",
            pair[0].unit_id,
            pair[0].byte_range.end,
            pair[1].unit_id,
            pair[1].byte_range.start
        );
    }
}

#[test]
fn test_splitting_is_deterministic() {
    let splitter = ChunkSplitter::new(ChunkConfig {
        chunk_size: 1_000,
        chunk_overlap: 100,
        min_unit_chars: 200,
    });
    for file in [
        raw("README.md", &markdown_doc()),
        raw("src/lib.rs", &rust_source()),
        raw("notes.txt", &prose()),
    ] {
        let first = splitter.split(&file);
        let second = splitter.split(&file);
        assert!(!first.is_empty(), "{} produced no units", file.path);
        assert_eq!(first, second);
    }
}

#[test]
fn test_owned_ranges_never_overlap() {
    let splitter = ChunkSplitter::new(ChunkConfig {
        chunk_size: 800,
        chunk_overlap: 200,
        min_unit_chars: 150,
    });
    for file in [
        raw("docs/guide.md", &markdown_doc()),
        raw("src/lib.rs", &rust_source()),
        raw("LICENSE", &prose()),
    ] {
        let units = splitter.split(&file);
        assert!(units.len() > 1, "{} was not split", file.path);
        assert_ranges_do_not_overlap(&units);
    }
}

#[test]
fn test_markdown_sections_follow_headings() {
    let units = ChunkSplitter::default().split(&raw("README.md", &markdown_doc()));

    assert_eq!(units[0].kind, UnitKind::MarkdownSection { level: 0 });
    assert_eq!(units[0].heading, None);
    assert_eq!(units[1].heading.as_deref(), Some("Part 0"));
    assert_eq!(units[2].heading.as_deref(), Some("Detail 0"));
    assert_eq!(units[2].kind, UnitKind::MarkdownSection { level: 2 });
    // Fenced "# not a heading" stays inside its section.
    assert!(units[1].content.contains("# not a heading"));
    assert_eq!(units.len(), 1 + 6 * 2);
}

#[test]
fn test_code_units_carry_symbols() {
    let units = ChunkSplitter::default().split(&raw("src/lib.rs", &rust_source()));
    assert!(units.len() > 1);
    for unit in &units {
        assert!(matches!(unit.kind, UnitKind::CodeBlock { .. }));
    }
    assert_eq!(units[0].label(), Some("Item0"));
    // Doc comments and attributes stay attached to their declaration.
    let second = units.iter().find(|u| u.label() == Some("Item1")).unwrap();
    assert!(second.content.starts_with("/// Item 1."));
}

#[test]
fn test_windows_respect_size_and_overlap() {
    let config = ChunkConfig {
        chunk_size: 1_000,
        chunk_overlap: 100,
        min_unit_chars: 200,
    };
    let text = prose();
    let units = ChunkSplitter::new(config.clone()).split(&raw("notes.txt", &text));

    assert!(units.len() > 10);
    for (i, unit) in units.iter().enumerate() {
        assert!(unit.size <= config.chunk_size, "window {i} has {} chars", unit.size);
        let UnitKind::SlidingWindow {
            window_index,
            overlap,
        } = unit.kind
        else {
            panic!("expected a sliding window, got {:?}", unit.kind);
        };
        assert_eq!(window_index, i);
        assert_eq!(
            unit.content.len(),
            unit.byte_range.end - unit.byte_range.start + overlap
        );
        if i == 0 {
            assert_eq!(overlap, 0);
        } else {
            assert!(overlap > 0);
            assert!(overlap <= config.chunk_overlap);
        }
    }
    assert_eq!(units.last().unwrap().byte_range.end, text.len());
}

#[test]
fn test_source_without_declarations_falls_back_to_windows() {
    let text = "x = 1\n".repeat(2_000);
    let units = ChunkSplitter::default().split(&raw("scripts/gen.py", &text));
    assert!(units.len() > 1);
    assert!(units
        .iter()
        .all(|u| matches!(u.kind, UnitKind::SlidingWindow { .. })));
    assert_ranges_do_not_overlap(&units);
}

#[test]
fn test_multibyte_text_stays_on_char_boundaries() {
    let text = "Grüße aus Köln, naïve café. ".repeat(300);
    let units = ChunkSplitter::new(ChunkConfig {
        chunk_size: 500,
        chunk_overlap: 50,
        min_unit_chars: 100,
    })
    .split(&raw("notes.txt", &text));

    assert!(units.len() > 1);
    for unit in &units {
        assert!(text.is_char_boundary(unit.byte_range.start));
        assert!(text.is_char_boundary(unit.byte_range.end));
    }
}

/// Text built from fragments that exercise every splitter: headings, fences,
/// declarations with attachments, blank lines, multibyte chars and NUL.
fn structured_text() -> impl Strategy<Value = String> {
    let fixed = prop::sample::select(vec![
        "# Title\n",
        "## Section\n",
        "### Deep\n",
        "```\n",
        "````\n",
        "~~~\n",
        "/// doc\n",
        "#[derive(Debug)]\n",
        "pub fn run() {\n",
        "class Widget:\n",
        "}\n",
        "\n",
        "\0",
        "naïve café ",
    ])
    .prop_map(|s| s.to_string());
    let fragment = prop_oneof![
        3 => fixed,
        1 => "[a-z .]{1,60}",
        1 => "[a-z ]{0,20}\n",
    ];
    prop::collection::vec(fragment, 0..120).prop_map(|parts| parts.concat())
}

fn any_text() -> impl Strategy<Value = String> {
    prop_oneof![structured_text(), any::<String>()]
}

fn any_path() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("README.md"), Just("src/lib.rs"), Just("notes.txt")]
}

fn any_config() -> impl Strategy<Value = ChunkConfig> {
    (1usize..400, 0usize..600, 0usize..300).prop_map(
        |(chunk_size, chunk_overlap, min_unit_chars)| ChunkConfig {
            chunk_size,
            chunk_overlap,
            min_unit_chars,
        },
    )
}

proptest! {
    #[test]
    fn prop_split_text_is_deterministic(
        text in any_text(),
        path in any_path(),
        config in any_config(),
    ) {
        let splitter = ChunkSplitter::new(config);
        prop_assert_eq!(splitter.split_text(path, &text), splitter.split_text(path, &text));
    }

    #[test]
    fn prop_owned_ranges_are_ordered_and_disjoint(
        text in any_text(),
        path in any_path(),
        config in any_config(),
    ) {
        let units = ChunkSplitter::new(config.clone()).split_text(path, &text);

        for (ordinal, unit) in units.iter().enumerate() {
            let range = unit.byte_range;
            prop_assert!(range.start < range.end);
            prop_assert!(range.end <= text.len());
            prop_assert!(text.is_char_boundary(range.start));
            prop_assert!(text.is_char_boundary(range.end));
            prop_assert!(unit.size > 0);
            prop_assert!(unit.content.ends_with(&text[range.start..range.end]));
            prop_assert_eq!(&unit.unit_id, &format!("{path}#{ordinal}"));
            if let UnitKind::SlidingWindow { overlap, .. } = unit.kind {
                prop_assert_eq!(unit.content.len(), range.end - range.start + overlap);
                prop_assert!(unit.size <= config.chunk_size);
            }
        }
        for pair in units.windows(2) {
            prop_assert!(pair[0].byte_range.end <= pair[1].byte_range.start);
        }
    }

    #[test]
    fn prop_raw_files_with_nul_bytes_yield_no_units(
        text in structured_text(),
        path in any_path(),
        config in any_config(),
    ) {
        let mut bytes = text.into_bytes();
        bytes.push(0);
        let file = RawFile::new(path, Some(bytes));
        let splitter = ChunkSplitter::new(config);
        prop_assert!(splitter.split(&file).is_empty());
        prop_assert!(splitter.try_split(&file).is_err());
    }
}
