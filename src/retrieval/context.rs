//! Search-time prompt context construction: `[N] Title / URL / body`
//! blocks, truncated to a character budget by dropping the lowest
//! ranked records.

use crate::model::ScoredRecord;

/// Build the prompt context block for a ranked set of hits, dropping
/// the lowest-ranked records until the total fits `char_budget`.
pub fn build_context(hits: &[ScoredRecord], char_budget: usize) -> String {
    let mut blocks: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[{}] {} / {} / {}",
                i + 1,
                hit.record.title,
                hit.record.url,
                hit.record.text
            )
        })
        .collect();

    // Always keep at least the top-ranked block, even over budget — an
    // over-length answer beats no context at all.
    while blocks.len() > 1 {
        let total: usize = blocks.iter().map(|b| b.chars().count()).sum::<usize>()
            + blocks.len().saturating_sub(1) * 2; // "\n\n" joiners
        if total <= char_budget {
            break;
        }
        blocks.pop();
    }

    blocks.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SourceRecord, SourceType, StructuredFormat};

    fn record(text: &str) -> SourceRecord {
        SourceRecord {
            source_type: SourceType::Notion,
            source_id: "p".to_string(),
            chunk_ord: 0,
            text: text.to_string(),
            title: "T".to_string(),
            url: "https://x/p".to_string(),
            workspace_id: "w".to_string(),
            block_types: vec![],
            block_markers: vec![],
            block_depths: vec![],
            block_starts: vec![],
            structured_format: StructuredFormat::None,
            structured_text: None,
            file_path: None,
            ingested_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn drops_lowest_ranked_when_over_budget() {
        let hits = vec![
            ScoredRecord {
                record: record(&"a".repeat(50)),
                fused_score: 0.9,
            },
            ScoredRecord {
                record: record(&"b".repeat(50)),
                fused_score: 0.5,
            },
        ];
        let ctx = build_context(&hits, 80);
        assert!(ctx.contains("[1]"));
        assert!(!ctx.contains("[2]"));
    }

    #[test]
    fn keeps_everything_under_budget() {
        let hits = vec![ScoredRecord {
            record: record("short"),
            fused_score: 0.9,
        }];
        let ctx = build_context(&hits, 12_000);
        assert!(ctx.contains("short"));
    }
}
