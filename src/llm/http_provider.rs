//! Production `LlmProvider` backed by an HTTP chat-completions endpoint.
//!
//! Structurally this is the HTTP-client-on-a-struct idiom the teacher
//! uses throughout (`McpClient`, `HttpTool`): a `reqwest::Client` built
//! once with a timeout, plus a thin JSON request/response mapping.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::llm::{ChatRole, CompletionRequest, CompletionResponse, LlmProvider};
#[cfg(test)]
use crate::llm::ChatMessage;

pub struct HttpLlmProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<secrecy::SecretString>,
    model: String,
}

impl HttpLlmProvider {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build LLM http client"),
            endpoint: endpoint.into(),
            api_key: api_key.map(secrecy::SecretString::from),
            model: model.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a serde_json::Value>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

fn role_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

#[derive(Deserialize)]
struct ChatResponseBody {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AgentError> {
        let wire_messages: Vec<WireMessage> = request
            .messages
            .iter()
            .map(|m| WireMessage {
                role: role_str(m.role),
                content: &m.content,
            })
            .collect();

        let body = ChatRequestBody {
            model: &self.model,
            messages: wire_messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request.json_schema.as_ref(),
        };

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            use secrecy::ExposeSecret;
            req = req.bearer_auth(key.expose_secret());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AgentError::LlmFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AgentError::LlmFailed(format!(
                "llm endpoint returned {}",
                resp.status()
            )));
        }

        let parsed: ChatResponseBody = resp
            .json()
            .await
            .map_err(|e| AgentError::LlmFailed(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::LlmFailed("empty completion response".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content,
            truncated: choice.finish_reason.as_deref() == Some("length"),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// In-memory fake used by tests and the demo CLI: returns a
/// caller-scripted response per call, matching the teacher's pattern of
/// swapping in a fake `Arc<dyn LlmProvider>` for deterministic tests.
pub struct ScriptedLlmProvider {
    pub responses: std::sync::Mutex<std::collections::VecDeque<String>>,
    pub model: String,
}

impl ScriptedLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into_iter().collect()),
            model: "scripted".to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlmProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, AgentError> {
        let mut queue = self.responses.lock().unwrap();
        let content = queue
            .pop_front()
            .ok_or_else(|| AgentError::LlmFailed("scripted provider exhausted".to_string()))?;
        Ok(CompletionResponse {
            content,
            truncated: false,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_provider_returns_in_order() {
        let provider = ScriptedLlmProvider::new(vec!["first".to_string(), "second".to_string()]);
        let r1 = provider
            .complete(CompletionRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap();
        assert_eq!(r1.content, "first");
        let r2 = provider
            .complete(CompletionRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap();
        assert_eq!(r2.content, "second");
    }
}
