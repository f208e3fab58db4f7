//! Demo CLI: ingest a fixture Notion page into a scratch workspace and
//! run one query against it, exercising the facade end-to-end without
//! real provider credentials.

use arcana_core::agent::run as run_agent;
use arcana_core::chunk::NotionBlockNode;
use arcana_core::config::ArcanaConfig;
use arcana_core::llm::{MockEmbedder, ScriptedLlmProvider};
use arcana_core::model::WorkspaceContext;
use arcana_core::providers::FakeNotionApi;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "arcana-cli", about = "Arcana knowledge-assistant core, demo CLI")]
struct Cli {
    /// Question to ask once the fixture page has been ingested.
    #[arg(default_value = "What happened with revenue this quarter?")]
    query: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let storage_root = std::env::temp_dir().join("arcana-cli-demo");
    let _ = std::fs::remove_dir_all(&storage_root);
    let workspace = WorkspaceContext::new(&storage_root, "demo-workspace", "demo");

    let embedder = MockEmbedder::default();
    let mut blocks = std::collections::HashMap::new();
    blocks.insert(
        "page-1".to_string(),
        vec![NotionBlockNode {
            block_type: "paragraph".to_string(),
            text: "Revenue grew 18% quarter over quarter, driven by enterprise renewals.".to_string(),
            children: vec![],
        }],
    );
    let notion_api = FakeNotionApi {
        pages: vec![arcana_core::providers::NotionPageSummary {
            id: "page-1".to_string(),
            url: "https://notion.so/page-1".to_string(),
            title: "Q3 Business Review".to_string(),
            last_edited_time: chrono::Utc::now(),
        }],
        blocks,
        created_pages: Default::default(),
    };

    {
        use arcana_core::chunk::{ChunkConfig, PageInput, build_records, render_notion_blocks};
        use arcana_core::model::{SourceType, StructuredFormat};
        use arcana_core::retrieval::RetrievalIndex;

        let page_blocks = render_notion_blocks(&[NotionBlockNode {
            block_type: "paragraph".to_string(),
            text: "Revenue grew 18% quarter over quarter, driven by enterprise renewals.".to_string(),
            children: vec![],
        }]);
        let page_input = PageInput {
            source_type: SourceType::Notion,
            source_id: "page-1",
            title: "Q3 Business Review",
            url: "https://notion.so/page-1",
            workspace_id: &workspace.workspace_id,
            blocks: page_blocks,
            structured_format: StructuredFormat::None,
            structured_text: None,
            file_path: None,
        };
        let records = build_records(page_input, &ChunkConfig::default())?;
        let mut index = RetrievalIndex::open(&workspace.storage_root)?;
        index
            .replace(&embedder, SourceType::Notion, "page-1", records)
            .await?;
    }

    let planning_llm = ScriptedLlmProvider::new(vec![
        r#"{"mode": "search"}"#.to_string(),
        "Revenue grew 18% quarter over quarter, driven by enterprise renewals [1].".to_string(),
    ]);
    let final_answer_llm = ScriptedLlmProvider::new(vec![]);

    let config = ArcanaConfig {
        workspace_storage_root: storage_root,
        ..ArcanaConfig::default()
    };

    let node_ctx = arcana_core::agent::NodeContext {
        planning_llm: &planning_llm,
        final_answer_llm: &final_answer_llm,
        embedder: &embedder,
        notion_api: &notion_api,
        notion_credential: None,
        notion_parent_page_id: None,
        config: &config,
        cancellation: tokio_util::sync::CancellationToken::new(),
    };

    let state = arcana_core::agent::AgentState::new(cli.query, workspace, "demo-user");
    let result = run_agent(&node_ctx, state).await?;

    println!("{}", result.result.answer);
    Ok(())
}
