/// Model-bound chat invocation.
///
/// `ChatModel` is the seam between generation logic and the HTTP client: pipeline code
/// holds `Arc<dyn ChatModel>` and never sees request plumbing, so tests can script replies.
use async_trait::async_trait;
use tracing::debug;

use crate::openai::{
    ChatCompletionRequest, Message, OpenAiClient, OpenAiClientError, ToolCall, ToolDefinition,
};
use crate::usage::UsageTracker;

/// The assistant turn of one completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &str;

    /// Run one completion. `tools` of `None` means the model cannot request tool calls.
    async fn invoke(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<AssistantReply, OpenAiClientError>;
}

/// A `ChatModel` backed by an OpenAI-compatible endpoint.
pub struct OpenAiChatModel {
    client: OpenAiClient,
    model: String,
    temperature: Option<f32>,
    usage: UsageTracker,
}

impl OpenAiChatModel {
    pub fn new(
        client: OpenAiClient,
        model: impl Into<String>,
        temperature: Option<f32>,
        usage: UsageTracker,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
            usage,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn invoke(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<AssistantReply, OpenAiClientError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: self.temperature,
            max_tokens: None,
            tools: tools.filter(|t| !t.is_empty()).map(|t| t.to_vec()),
        };

        let response = self.client.chat_completions(&request).await?;
        self.usage.record(&self.model, response.usage.as_ref());

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(OpenAiClientError::NoChoices)?;

        let reply = AssistantReply {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
        };
        debug!(
            model = %self.model,
            chars = reply.content.len(),
            tool_calls = reply.tool_calls.len(),
            "completion received"
        );
        Ok(reply)
    }
}
