//! LLM provider abstraction.
//!
//! Grounded on the teacher's `llm::reasoning` module: a builder-style
//! `CompletionRequest`, a `ChatMessage` enum-of-roles, and an
//! `LlmProvider` trait object injected wherever a node needs to call a
//! model. The orchestrator uses two independently configured providers
//! (planning/generation vs. `final_answer`), matching spec.md §4.5/§6.

mod embed;
mod http_provider;

pub use embed::{Embedder, HttpEmbedder, MockEmbedder};
pub use http_provider::{HttpLlmProvider, ScriptedLlmProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// One turn of a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A chat-completion request, built up with a small fluent API (mirrors
/// `CompletionRequest::new(messages).with_max_tokens(..).with_temperature(..)`
/// from the teacher's reasoning engine).
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// When set, the provider is asked to constrain output to this JSON
    /// schema (used by the `decide` node's structured-output contract).
    pub json_schema: Option<serde_json::Value>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: 1024,
            temperature: 0.7,
            json_schema: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_json_schema(mut self, schema: serde_json::Value) -> Self {
        self.json_schema = Some(schema);
        self
    }
}

/// Response to a [`CompletionRequest`].
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub truncated: bool,
}

/// A chat-completion backend. Two independently configured instances
/// are used by the orchestrator: one for planning/generation, one for
/// `final_answer` (spec.md §4.5, §6).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AgentError>;

    fn model_name(&self) -> &str;
}

/// Extract the first top-level JSON object from text that may contain
/// surrounding prose. Grounded on the teacher's `extract_json` helper
/// in `llm::reasoning`.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start < end { Some(&text[start..=end]) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_finds_embedded_object() {
        let text = "Here you go:\n{\"mode\": \"chat\"}\nThanks.";
        assert_eq!(extract_json(text), Some("{\"mode\": \"chat\"}"));
    }

    #[test]
    fn extract_json_none_without_braces() {
        assert_eq!(extract_json("no json here"), None);
    }
}
