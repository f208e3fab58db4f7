//! Provider-agnostic chunk policy and [`SourceRecord`] assembly.
//!
//! Grounded on the contract documented for the teacher's (unretrieved)
//! `workspace::chunker::chunk_document`: a free function taking a
//! `ChunkConfig` and returning ordered text chunks. This module
//! generalizes that contract to operate over [`RenderedBlock`]s so both
//! Notion and Drive sources share one chunk policy.

use chrono::Utc;
use unicode_segmentation::UnicodeSegmentation;

use crate::chunk::render::RenderedBlock;
use crate::error::ChunkError;
use crate::model::{SourceRecord, SourceType, StructuredFormat};

/// Chunking knobs: a character budget per chunk and an overlap fraction.
#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub overlap_ratio: f64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2_000,
            overlap_ratio: 0.10,
        }
    }
}

impl ChunkConfig {
    /// `overlap = max(0, min(chunk_size - 1, round(chunk_size * overlap_ratio)))`.
    pub fn overlap(&self) -> usize {
        if self.chunk_size == 0 {
            return 0;
        }
        let raw = (self.chunk_size as f64 * self.overlap_ratio).round();
        let raw = raw.max(0.0) as usize;
        raw.min(self.chunk_size.saturating_sub(1))
    }
}

/// One rendered page/file ready to be chunked into [`SourceRecord`]s.
pub struct PageInput<'a> {
    pub source_type: SourceType,
    pub source_id: &'a str,
    pub title: &'a str,
    pub url: &'a str,
    pub workspace_id: &'a str,
    pub blocks: Vec<RenderedBlock>,
    pub structured_format: StructuredFormat,
    pub structured_text: Option<String>,
    pub file_path: Option<std::path::PathBuf>,
}

struct PackedSegment {
    block_type: String,
    marker: &'static str,
    depth: u8,
    text: String,
}

/// Build the ordered [`SourceRecord`] sequence for one page.
///
/// A page that renders to zero blocks (e.g. only image/file blocks) is
/// reported via [`ChunkError::EmptyPage`] so the caller can mark it
/// `skipped` without aborting the batch.
pub fn build_records(page: PageInput<'_>, config: &ChunkConfig) -> Result<Vec<SourceRecord>, ChunkError> {
    if page.blocks.is_empty() {
        return Err(ChunkError::EmptyPage {
            source_id: page.source_id.to_string(),
        });
    }

    let segments = expand_oversized(&page.blocks, config.chunk_size);
    let chunks = pack_into_chunks(&segments, config.chunk_size);
    let overlapped = apply_overlap(chunks, config.overlap());

    if overlapped.is_empty() {
        return Err(ChunkError::EmptyPage {
            source_id: page.source_id.to_string(),
        });
    }

    let now = Utc::now();
    let records = overlapped
        .into_iter()
        .enumerate()
        .map(|(ord, chunk)| SourceRecord {
            source_type: page.source_type,
            source_id: page.source_id.to_string(),
            chunk_ord: ord as u32,
            text: chunk.text,
            title: page.title.to_string(),
            url: page.url.to_string(),
            workspace_id: page.workspace_id.to_string(),
            block_types: chunk.block_types,
            block_markers: chunk.block_markers,
            block_depths: chunk.block_depths,
            block_starts: chunk.block_starts,
            structured_format: page.structured_format,
            structured_text: page.structured_text.clone(),
            file_path: page.file_path.clone(),
            ingested_at: now,
        })
        .filter(|r| !r.is_blank())
        .collect::<Vec<_>>();

    if records.is_empty() {
        return Err(ChunkError::EmptyPage {
            source_id: page.source_id.to_string(),
        });
    }
    Ok(records)
}

/// Split any block whose own text alone exceeds the chunk budget: first
/// on sentence boundaries, falling back to word boundaries for a single
/// sentence that still doesn't fit.
fn expand_oversized(blocks: &[RenderedBlock], budget: usize) -> Vec<PackedSegment> {
    let mut out = Vec::new();
    for block in blocks {
        if block.text.chars().count() <= budget {
            out.push(PackedSegment {
                block_type: block.block_type.clone(),
                marker: block.marker,
                depth: block.depth,
                text: block.text.clone(),
            });
            continue;
        }
        for part in split_oversized_text(&block.text, budget) {
            out.push(PackedSegment {
                block_type: block.block_type.clone(),
                marker: block.marker,
                depth: block.depth,
                text: part,
            });
        }
    }
    out
}

fn split_oversized_text(text: &str, budget: usize) -> Vec<String> {
    let sentences: Vec<&str> = text.unicode_sentences().collect();
    let sentence_packed = pack_units(&sentences, budget);

    let mut result = Vec::new();
    for piece in sentence_packed {
        if piece.chars().count() <= budget || budget == 0 {
            result.push(piece);
        } else {
            let words: Vec<&str> = piece.split_word_bounds().collect();
            result.extend(pack_units(&words, budget));
        }
    }
    result
}

fn pack_units(units: &[&str], budget: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for unit in units {
        let would_be = current.chars().count() + unit.chars().count();
        if !current.is_empty() && would_be > budget {
            out.push(std::mem::take(&mut current));
        }
        current.push_str(unit);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

struct PlainChunk {
    text: String,
    block_types: Vec<String>,
    block_markers: Vec<String>,
    block_depths: Vec<u8>,
    block_starts: Vec<usize>,
}

/// Greedily pack segments (in original document order) into chunks that
/// fit `chunk_size`, preferring to keep whole segments together — one
/// record per page when everything fits in a single chunk.
fn pack_into_chunks(segments: &[PackedSegment], chunk_size: usize) -> Vec<PlainChunk> {
    let mut chunks = Vec::new();
    let mut cur = PlainChunk {
        text: String::new(),
        block_types: Vec::new(),
        block_markers: Vec::new(),
        block_depths: Vec::new(),
        block_starts: Vec::new(),
    };

    for seg in segments {
        let joiner = if cur.text.is_empty() { "" } else { "\n\n" };
        let segment_rendered = format!("{}{}\n{}", joiner, seg.marker, seg.text);
        let projected_len = cur.text.chars().count() + segment_rendered.chars().count();

        if !cur.text.is_empty() && projected_len > chunk_size {
            chunks.push(std::mem::replace(
                &mut cur,
                PlainChunk {
                    text: String::new(),
                    block_types: Vec::new(),
                    block_markers: Vec::new(),
                    block_depths: Vec::new(),
                    block_starts: Vec::new(),
                },
            ));
        }

        let joiner = if cur.text.is_empty() { "" } else { "\n\n" };
        let start = cur.text.chars().count() + joiner.chars().count();
        cur.text.push_str(joiner);
        cur.text.push_str(seg.marker);
        cur.text.push('\n');
        cur.text.push_str(&seg.text);

        cur.block_types.push(seg.block_type.clone());
        cur.block_markers.push(seg.marker.to_string());
        cur.block_depths.push(seg.depth);
        cur.block_starts.push(start);
    }

    if !cur.text.is_empty() {
        chunks.push(cur);
    }
    chunks
}

/// Prepend the trailing `overlap` characters of the previous chunk's
/// text to each subsequent chunk so
/// `suffix(c[i].text, overlap) == prefix(c[i+1].text, overlap)`.
fn apply_overlap(chunks: Vec<PlainChunk>, overlap: usize) -> Vec<PlainChunk> {
    if overlap == 0 || chunks.len() < 2 {
        return chunks;
    }
    let mut out: Vec<PlainChunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match out.last() {
            None => out.push(chunk),
            Some(prev) => {
                let prev_chars: Vec<char> = prev.text.chars().collect();
                let take = overlap.min(prev_chars.len());
                let prefix: String = prev_chars[prev_chars.len() - take..].iter().collect();
                let shift = prefix.chars().count();

                let mut merged = chunk;
                merged.text = format!("{}{}", prefix, merged.text);
                merged.block_starts = merged.block_starts.iter().map(|s| s + shift).collect();
                out.push(merged);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::render::render_plain_text;

    fn page<'a>(blocks: Vec<RenderedBlock>) -> PageInput<'a> {
        PageInput {
            source_type: SourceType::Notion,
            source_id: "p1",
            title: "Title",
            url: "https://notion.so/p1",
            workspace_id: "w1",
            blocks,
            structured_format: StructuredFormat::None,
            structured_text: None,
            file_path: None,
        }
    }

    #[test]
    fn one_record_per_page_when_it_fits() {
        let blocks = render_plain_text("short paragraph of text");
        let records = build_records(page(blocks), &ChunkConfig::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].chunk_ord, 0);
    }

    #[test]
    fn chunk_ord_is_contiguous_on_overflow() {
        let long_para = "word ".repeat(2000);
        let blocks = render_plain_text(&long_para);
        let cfg = ChunkConfig {
            chunk_size: 200,
            overlap_ratio: 0.10,
        };
        let records = build_records(page(blocks), &cfg).unwrap();
        assert!(records.len() > 1);
        for (i, r) in records.iter().enumerate() {
            assert_eq!(r.chunk_ord, i as u32);
        }
    }

    #[test]
    fn overlap_prefix_matches_previous_suffix() {
        let long_para = "alpha beta gamma delta epsilon zeta eta theta iota kappa ".repeat(50);
        let blocks = render_plain_text(&long_para);
        let cfg = ChunkConfig {
            chunk_size: 300,
            overlap_ratio: 0.10,
        };
        let records = build_records(page(blocks), &cfg).unwrap();
        assert!(records.len() > 1);
        let overlap = cfg.overlap();
        for pair in records.windows(2) {
            let prev_chars: Vec<char> = pair[0].text.chars().collect();
            let next_chars: Vec<char> = pair[1].text.chars().collect();
            let suffix: String = prev_chars[prev_chars.len() - overlap..].iter().collect();
            let prefix: String = next_chars[..overlap].iter().collect();
            assert_eq!(suffix, prefix);
        }
    }

    #[test]
    fn chunk_of_exact_size_yields_one_record() {
        let text = "x".repeat(50);
        let blocks = vec![RenderedBlock::new("paragraph", "[[P]]", 0, text.clone())];
        // marker + newline add a fixed prefix; pick a budget that exactly
        // matches the rendered segment length.
        let rendered_len = "[[P]]\n".len() + text.len();
        let cfg = ChunkConfig {
            chunk_size: rendered_len,
            overlap_ratio: 0.0,
        };
        let records = build_records(page(blocks), &cfg).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn image_only_page_is_reported_as_empty() {
        let err = build_records(page(vec![]), &ChunkConfig::default()).unwrap_err();
        assert!(matches!(err, ChunkError::EmptyPage { .. }));
    }

    #[test]
    fn block_metadata_round_trips_through_json() {
        let blocks = render_plain_text("hello world");
        let records = build_records(page(blocks), &ChunkConfig::default()).unwrap();
        let json = records[0].block_metadata_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["types"].is_array());
        assert!(parsed["markers"].is_array());
    }
}
