//! Provider-specific rendering: turns a Notion block tree or an
//! extracted Drive file text into a flat, depth-annotated sequence of
//! [`RenderedBlock`]s that the chunker then packs into records.

use serde::{Deserialize, Serialize};

/// One structural segment of a rendered source, before chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedBlock {
    pub block_type: String,
    pub marker: &'static str,
    pub depth: u8,
    pub text: String,
}

impl RenderedBlock {
    pub fn new(block_type: impl Into<String>, marker: &'static str, depth: u8, text: String) -> Self {
        Self {
            block_type: block_type.into(),
            marker,
            depth,
            text,
        }
    }
}

fn marker_for(block_type: &str) -> &'static str {
    match block_type {
        "heading_1" => "[[H1]]",
        "heading_2" => "[[H2]]",
        "heading_3" => "[[H3]]",
        "paragraph" => "[[P]]",
        "bulleted_list_item" | "numbered_list_item" | "to_do" => "[[LI]]",
        "table" | "table_row" => "[[TBL]]",
        "code" => "[[CODE]]",
        "quote" => "[[QUOTE]]",
        "child_page" => "[[PAGE]]",
        _ => "[[BLOCK]]",
    }
}

/// A minimal, provider-agnostic tree shape for Notion blocks. The real
/// API payload is recursively richer; callers flatten their SDK type
/// into this shape before calling [`render_notion_blocks`].
#[derive(Debug, Clone)]
pub struct NotionBlockNode {
    pub block_type: String,
    /// Plain-text rendering of this block's own rich text (not children).
    pub text: String,
    pub children: Vec<NotionBlockNode>,
}

/// Block types whose body must never be rendered: media the index can't
/// search, and nested pages that are ingested as their own source.
fn is_skipped_block(block_type: &str) -> bool {
    matches!(block_type, "image" | "file" | "video" | "pdf" | "embed")
}

/// Depth-first render of a Notion page's block tree.
///
/// `child_page` blocks contribute only their title (never their body) so
/// that nested pages, which are pulled as independent sources, are not
/// double-ingested here.
pub fn render_notion_blocks(blocks: &[NotionBlockNode]) -> Vec<RenderedBlock> {
    let mut out = Vec::new();
    render_notion_recursive(blocks, 0, &mut out);
    out
}

fn render_notion_recursive(blocks: &[NotionBlockNode], depth: u8, out: &mut Vec<RenderedBlock>) {
    for block in blocks {
        if is_skipped_block(&block.block_type) {
            continue;
        }
        if !block.text.trim().is_empty() {
            out.push(RenderedBlock::new(
                block.block_type.clone(),
                marker_for(&block.block_type),
                depth,
                block.text.clone(),
            ));
        }
        if block.block_type == "child_page" {
            // Title only: the nested page is ingested as its own source.
            continue;
        }
        render_notion_recursive(&block.children, depth + 1, out);
    }
}

/// Render extracted PDF/plain text into a single paragraph-marked block.
///
/// PDF extraction loses structural information, so the whole document is
/// treated as one rendered paragraph; downstream chunking still splits
/// it on paragraph/sentence boundaries by blank-line/sentence detection.
pub fn render_plain_text(text: &str) -> Vec<RenderedBlock> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| RenderedBlock::new("paragraph", "[[P]]", 0, p.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_image_and_file_blocks() {
        let blocks = vec![
            NotionBlockNode {
                block_type: "paragraph".to_string(),
                text: "hello".to_string(),
                children: vec![],
            },
            NotionBlockNode {
                block_type: "image".to_string(),
                text: "".to_string(),
                children: vec![],
            },
        ];
        let rendered = render_notion_blocks(&blocks);
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].block_type, "paragraph");
    }

    #[test]
    fn image_only_page_yields_zero_blocks() {
        let blocks = vec![NotionBlockNode {
            block_type: "image".to_string(),
            text: "".to_string(),
            children: vec![],
        }];
        assert!(render_notion_blocks(&blocks).is_empty());
    }

    #[test]
    fn child_page_renders_title_only() {
        let blocks = vec![NotionBlockNode {
            block_type: "child_page".to_string(),
            text: "Nested Page Title".to_string(),
            children: vec![NotionBlockNode {
                block_type: "paragraph".to_string(),
                text: "body that belongs to the nested page".to_string(),
                children: vec![],
            }],
        }];
        let rendered = render_notion_blocks(&blocks);
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].text, "Nested Page Title");
    }

    #[test]
    fn depth_tracks_nesting() {
        let blocks = vec![NotionBlockNode {
            block_type: "bulleted_list_item".to_string(),
            text: "top".to_string(),
            children: vec![NotionBlockNode {
                block_type: "bulleted_list_item".to_string(),
                text: "nested".to_string(),
                children: vec![],
            }],
        }];
        let rendered = render_notion_blocks(&blocks);
        assert_eq!(rendered[0].depth, 0);
        assert_eq!(rendered[1].depth, 1);
    }

    #[test]
    fn plain_text_splits_on_blank_lines() {
        let rendered = render_plain_text("para one\n\npara two\n\n\npara three");
        assert_eq!(rendered.len(), 3);
        assert!(rendered.iter().all(|b| b.marker == "[[P]]"));
    }
}
