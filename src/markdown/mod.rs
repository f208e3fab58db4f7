//! Markdown → Notion block conversion for the `create_page` node.
//!
//! A table-aware, list-aware, fence-aware line pass: tables are
//! detected by a `|---|` separator row under a `| a | b |` header row
//! and become native table blocks; headings, lists, and code fences
//! are recognized; everything else becomes a paragraph (spec.md
//! §4.5/§9).

fn rich_text(content: &str) -> serde_json::Value {
    serde_json::json!([{ "type": "text", "text": { "content": content } }])
}

fn paragraph_block(content: &str) -> serde_json::Value {
    serde_json::json!({ "object": "block", "type": "paragraph", "paragraph": { "rich_text": rich_text(content) } })
}

fn heading_block(level: u8, content: &str) -> serde_json::Value {
    let key = match level {
        1 => "heading_1",
        2 => "heading_2",
        _ => "heading_3",
    };
    serde_json::json!({ "object": "block", "type": key, key: { "rich_text": rich_text(content) } })
}

fn code_block(content: &str, language: &str) -> serde_json::Value {
    let language = if language.is_empty() { "plain text" } else { language };
    serde_json::json!({
        "object": "block",
        "type": "code",
        "code": { "rich_text": rich_text(content), "language": language },
    })
}

fn list_item_block(key: &'static str, content: &str) -> serde_json::Value {
    serde_json::json!({ "object": "block", "type": key, key: { "rich_text": rich_text(content) } })
}

fn heading_level(line: &str) -> Option<u8> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 3 || trimmed.as_bytes().get(hashes) != Some(&b' ') {
        return None;
    }
    Some(hashes as u8)
}

fn bullet_item(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* "))
}

fn numbered_item(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    trimmed[digits.len()..].strip_prefix(". ")
}

fn split_table_row(line: &str) -> Vec<String> {
    line.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|c| c.trim().to_string())
        .collect()
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    if !trimmed.contains('-') {
        return false;
    }
    trimmed.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn table_row_block(cells: &[String]) -> serde_json::Value {
    serde_json::json!({
        "object": "block",
        "type": "table_row",
        "table_row": {
            "cells": cells.iter().map(|c| rich_text(c)).collect::<Vec<_>>(),
        }
    })
}

/// Convert a Markdown document into a flat sequence of Notion block
/// objects, ready to pass as `children` to page creation.
pub fn markdown_to_notion_blocks(markdown: &str) -> Vec<serde_json::Value> {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() {
            i += 1;
            continue;
        }

        if let Some(lang) = line.trim_start().strip_prefix("```") {
            let lang = lang.trim().to_string();
            let mut body = Vec::new();
            i += 1;
            while i < lines.len() && !lines[i].trim_start().starts_with("```") {
                body.push(lines[i]);
                i += 1;
            }
            i += 1;
            blocks.push(code_block(&body.join("\n"), &lang));
            continue;
        }

        if let Some(level) = heading_level(line) {
            let content = &line.trim_start()[level as usize + 1..];
            blocks.push(heading_block(level, content));
            i += 1;
            continue;
        }

        if line.contains('|') && i + 1 < lines.len() && is_separator_row(lines[i + 1]) {
            let header = split_table_row(line);
            let width = header.len();
            let mut rows = vec![table_row_block(&header)];
            i += 2;
            while i < lines.len() && lines[i].contains('|') {
                rows.push(table_row_block(&split_table_row(lines[i])));
                i += 1;
            }
            blocks.push(serde_json::json!({
                "object": "block",
                "type": "table",
                "table": {
                    "table_width": width,
                    "has_column_header": true,
                    "has_row_header": false,
                    "children": rows,
                }
            }));
            continue;
        }

        if let Some(content) = bullet_item(line) {
            blocks.push(list_item_block("bulleted_list_item", content));
            i += 1;
            continue;
        }
        if let Some(content) = numbered_item(line) {
            blocks.push(list_item_block("numbered_list_item", content));
            i += 1;
            continue;
        }

        let mut para_lines = vec![line];
        i += 1;
        while i < lines.len()
            && !lines[i].trim().is_empty()
            && heading_level(lines[i]).is_none()
            && bullet_item(lines[i]).is_none()
            && numbered_item(lines[i]).is_none()
            && !lines[i].trim_start().starts_with("```")
            && !(lines[i].contains('|') && i + 1 < lines.len() && is_separator_row(lines[i + 1]))
        {
            para_lines.push(lines[i]);
            i += 1;
        }
        blocks.push(paragraph_block(&para_lines.join(" ")));
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_becomes_heading_block() {
        let blocks = markdown_to_notion_blocks("# Weekly Report");
        assert_eq!(blocks[0]["type"], "heading_1");
    }

    #[test]
    fn table_with_separator_becomes_table_block() {
        let md = "| Metric | Value |\n| --- | --- |\n| Revenue | 18% |";
        let blocks = markdown_to_notion_blocks(md);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["type"], "table");
        assert_eq!(blocks[0]["table"]["table_width"], 2);
        assert_eq!(blocks[0]["table"]["children"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn pipe_without_separator_is_paragraph() {
        let md = "a | b not a table";
        let blocks = markdown_to_notion_blocks(md);
        assert_eq!(blocks[0]["type"], "paragraph");
    }

    #[test]
    fn bullet_list_becomes_list_items() {
        let md = "- first\n- second";
        let blocks = markdown_to_notion_blocks(md);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["type"], "bulleted_list_item");
    }

    #[test]
    fn code_fence_preserves_language() {
        let md = "```rust\nlet x = 1;\n```";
        let blocks = markdown_to_notion_blocks(md);
        assert_eq!(blocks[0]["type"], "code");
        assert_eq!(blocks[0]["code"]["language"], "rust");
    }

    #[test]
    fn paragraph_lines_are_joined() {
        let md = "line one\nline two";
        let blocks = markdown_to_notion_blocks(md);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["type"], "paragraph");
    }
}
