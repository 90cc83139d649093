//! The chunk(30) stage (spec.md §4.2): recursive-delimiter splitting into
//! ~1000-character, 200-character-overlap chunks, never splitting a table
//! or caption block across chunk boundaries.

use crate::ingestion::parser::ParsedBlock;

pub const TARGET_CHUNK_LEN: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;

const DELIMITERS: [&str; 3] = ["\n\n", ". ", " "];

#[derive(Debug, Clone)]
pub struct Chunk {
    pub chunk_id: String,
    pub chunk_index: i64,
    pub page: i64,
    pub section: Option<String>,
    pub text: String,
    pub is_table: bool,
    pub is_caption: bool,
    pub heading_level: Option<i32>,
}

/// Deterministic per spec.md §4.1's idempotence requirement: hash of
/// document id and chunk index, so re-running the chunk stage reproduces
/// the same ids and upserts rather than duplicating chunks.
pub fn deterministic_chunk_id(document_id: &str, chunk_index: i64) -> String {
    format!("{document_id}-chunk-{chunk_index:05}")
}

pub fn chunk_blocks(document_id: &str, blocks: &[ParsedBlock]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buffer: Vec<&ParsedBlock> = Vec::new();

    let mut flush = |buffer: &mut Vec<&ParsedBlock>, chunks: &mut Vec<Chunk>| {
        if buffer.is_empty() {
            return;
        }
        let page = buffer[0].page;
        let section = buffer[0].section.clone();
        let combined = buffer.iter().map(|b| b.text.as_str()).collect::<Vec<_>>().join("\n\n");
        for piece in split_with_overlap(&combined, TARGET_CHUNK_LEN, CHUNK_OVERLAP) {
            let chunk_index = chunks.len() as i64;
            chunks.push(Chunk {
                chunk_id: deterministic_chunk_id(document_id, chunk_index),
                chunk_index,
                page,
                section: section.clone(),
                text: piece,
                is_table: false,
                is_caption: false,
                heading_level: None,
            });
        }
        buffer.clear();
    };

    for block in blocks {
        if block.is_table || block.is_caption {
            flush(&mut buffer, &mut chunks);
            let chunk_index = chunks.len() as i64;
            chunks.push(Chunk {
                chunk_id: deterministic_chunk_id(document_id, chunk_index),
                chunk_index,
                page: block.page,
                section: block.section.clone(),
                text: block.text.clone(),
                is_table: block.is_table,
                is_caption: block.is_caption,
                heading_level: block.heading_level,
            });
            continue;
        }

        let boundary_crossed = buffer.last().is_some_and(|last| last.page != block.page || last.section != block.section);
        if boundary_crossed {
            flush(&mut buffer, &mut chunks);
        }
        buffer.push(block);
    }
    flush(&mut buffer, &mut chunks);

    chunks
}

fn split_with_overlap(text: &str, target_len: usize, overlap: usize) -> Vec<String> {
    let pieces = split_recursive(text, target_len, 0);
    if pieces.len() <= 1 {
        return pieces;
    }

    let mut overlapped = Vec::with_capacity(pieces.len());
    for (i, piece) in pieces.iter().enumerate() {
        if i == 0 {
            overlapped.push(piece.clone());
            continue;
        }
        let prev_tail = tail_chars(&pieces[i - 1], overlap);
        overlapped.push(format!("{prev_tail} {piece}"));
    }
    overlapped
}

fn split_recursive(text: &str, target_len: usize, tier: usize) -> Vec<String> {
    if text.chars().count() <= target_len {
        return vec![text.to_string()];
    }
    if tier >= DELIMITERS.len() {
        return hard_split(text, target_len);
    }

    let delim = DELIMITERS[tier];
    let parts: Vec<&str> = text.split(delim).collect();
    if parts.len() <= 1 {
        return split_recursive(text, target_len, tier + 1);
    }

    let mut packed = Vec::new();
    let mut current = String::new();
    for part in parts {
        if current.is_empty() {
            current.push_str(part);
            continue;
        }
        let candidate_len = current.chars().count() + delim.chars().count() + part.chars().count();
        if candidate_len > target_len {
            packed.push(std::mem::take(&mut current));
            current.push_str(part);
        } else {
            current.push_str(delim);
            current.push_str(part);
        }
    }
    if !current.is_empty() {
        packed.push(current);
    }

    packed
        .into_iter()
        .flat_map(|piece| {
            if piece.chars().count() > target_len {
                split_recursive(&piece, target_len, tier + 1)
            } else {
                vec![piece]
            }
        })
        .collect()
}

fn hard_split(text: &str, target_len: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(target_len.max(1)).map(|c| c.iter().collect()).collect()
}

fn tail_chars(text: &str, n: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::parser::ParsedBlock;

    fn block(page: i64, section: &str, text: &str, is_table: bool, is_caption: bool) -> ParsedBlock {
        ParsedBlock { page, section: Some(section.to_string()), text: text.to_string(), is_table, is_caption, heading_level: None }
    }

    #[test]
    fn chunk_ids_are_deterministic_across_reruns() {
        let blocks = vec![block(1, "Intro", "Photosynthesis is the process by which plants convert light into energy.", false, false)];
        let first = chunk_blocks("doc-1", &blocks);
        let second = chunk_blocks("doc-1", &blocks);
        assert_eq!(first.iter().map(|c| &c.chunk_id).collect::<Vec<_>>(), second.iter().map(|c| &c.chunk_id).collect::<Vec<_>>());
    }

    #[test]
    fn tables_are_never_split_or_merged() {
        let long_table = "a\tb\tc\t".repeat(400);
        let blocks = vec![block(1, "S", "lead-in text", false, false), block(1, "S", &long_table, true, false)];
        let chunks = chunk_blocks("doc-1", &blocks);
        let table_chunk = chunks.iter().find(|c| c.is_table).unwrap();
        assert_eq!(table_chunk.text, long_table);
    }

    #[test]
    fn long_text_is_split_into_multiple_overlapping_chunks() {
        let paragraph = "Cellular respiration breaks down glucose to release energy. ".repeat(60);
        let blocks = vec![block(1, "S", &paragraph, false, false)];
        let chunks = chunk_blocks("doc-1", &blocks);
        assert!(chunks.len() > 1);
        assert!(chunks[0].text.len() <= TARGET_CHUNK_LEN + CHUNK_OVERLAP + 50);
    }

    #[test]
    fn chunk_index_is_sequential_document_position() {
        let blocks = vec![block(1, "S", "short text one", false, false), block(2, "S2", "short text two", false, false)];
        let chunks = chunk_blocks("doc-1", &blocks);
        let indices: Vec<_> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, (0..chunks.len() as i64).collect::<Vec<_>>());
    }
}
