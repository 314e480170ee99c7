use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::loader::PageText;
use crate::models::{Chunk, ChunkingOptions};

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Split normalized text into fixed-size windows with the configured
/// overlap. Overlap keeps sentences that straddle a boundary retrievable
/// from both sides.
pub fn split_with_overlap(normalized: &str, options: ChunkingOptions) -> Vec<String> {
    let chars: Vec<char> = normalized.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + options.max_chars).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            pieces.push(trimmed.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += options.max_chars.saturating_sub(options.overlap_chars).max(1);
    }

    pieces
}

/// Turn page texts into embedded chunks, preserving document order.
/// `chunk_offset` is global across the whole document.
pub fn build_chunks(
    pages: &[PageText],
    embedder: &impl Embedder,
    options: ChunkingOptions,
) -> Result<Vec<Chunk>, IngestError> {
    if options.max_chars == 0 {
        return Err(IngestError::InvalidChunkConfig(
            "max_chars must be positive".to_string(),
        ));
    }
    if options.overlap_chars >= options.max_chars {
        return Err(IngestError::InvalidChunkConfig(format!(
            "overlap {} must be smaller than chunk size {}",
            options.overlap_chars, options.max_chars
        )));
    }

    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for page in pages {
        let normalized = normalize_whitespace(&page.text);
        if normalized.is_empty() {
            continue;
        }

        for piece in split_with_overlap(&normalized, options) {
            let embedding = embedder.embed(&piece);
            chunks.push(Chunk {
                text: piece,
                embedding,
                source_page: page.number,
                chunk_offset: cursor,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(chunks)
}
