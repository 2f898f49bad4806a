use super::{Piece, UnitKind};
use crate::config::ChunkConfig;

/// Preferred break characters, tried in order.
const BREAKS: [char; 3] = ['\n', ' ', '.'];

/// Fixed-size windows measured in characters.
///
/// The first window owns up to `chunk_size` characters; each later window owns
/// up to `chunk_size - overlap` and is prefixed with the last `overlap`
/// characters of its predecessor, so every window's content stays within
/// `chunk_size`. A window end moves back to the last preferred break in its
/// second half when one exists.
pub(super) fn split(text: &str, config: &ChunkConfig) -> Vec<Piece> {
    let chunk_size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(chunk_size - 1);

    // Byte offset of every char boundary, including the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let chars = bounds.len() - 1;

    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars {
        let index = pieces.len();
        let (owned, lead) = if index == 0 {
            (chunk_size, 0)
        } else {
            (chunk_size - overlap, overlap.min(start))
        };

        let mut end = (start + owned).min(chars);
        if end < chars {
            let window = &text[bounds[start]..bounds[end]];
            let half = window.len() / 2;
            if let Some(pos) = BREAKS
                .iter()
                .find_map(|c| window.rfind(*c).filter(|p| *p >= half))
            {
                let byte = bounds[start] + pos + 1;
                end = bounds.binary_search(&byte).unwrap_or_else(|i| i);
            }
        }

        let content_start = start - lead;
        pieces.push(Piece {
            content_start: bounds[content_start],
            start: bounds[start],
            end: bounds[end],
            kind: UnitKind::SlidingWindow {
                window_index: index,
                overlap: bounds[start] - bounds[content_start],
            },
            heading: None,
        });
        start = end;
    }
    pieces
}
