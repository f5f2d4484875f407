//! Test doubles for the model, index and embedder seams.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AppError;
use crate::index::{ChunkSearch, ScoredChunk};
use crate::model::{DocumentChunk, SourceType};
use tailor_common::chat::{AssistantReply, ChatModel};
use tailor_common::embedding::TextEmbedder;
use tailor_common::error::CommonError;
use tailor_common::openai::{FunctionCall, Message, OpenAiClientError, ToolCall, ToolDefinition};

pub fn tool_call(name: &str, query: &str) -> ToolCall {
    ToolCall {
        id: Some(format!("call_{name}")),
        function: FunctionCall {
            name: name.to_string(),
            arguments: serde_json::json!({ "query": query }).to_string(),
        },
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tools_enabled: bool,
}

type Responder = Box<dyn Fn(&[Message], bool) -> AssistantReply + Send + Sync>;

/// A `ChatModel` that replays queued replies, then falls back to a responder.
pub struct ScriptedModel {
    queue: Mutex<VecDeque<AssistantReply>>,
    responder: Responder,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<AssistantReply>) -> Self {
        Self::responding(|_, _| AssistantReply::text("scripted reply")).with_queue(replies)
    }

    pub fn responding(
        f: impl Fn(&[Message], bool) -> AssistantReply + Send + Sync + 'static,
    ) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: Box::new(f),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_queue(self, replies: Vec<AssistantReply>) -> Self {
        *self.queue.lock().unwrap() = replies.into();
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn invoke(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<AssistantReply, OpenAiClientError> {
        let tools_enabled = tools.is_some_and(|t| !t.is_empty());
        self.calls.lock().unwrap().push(RecordedCall {
            messages: messages.to_vec(),
            tools_enabled,
        });
        let queued = self.queue.lock().unwrap().pop_front();
        Ok(queued.unwrap_or_else(|| (self.responder)(messages, tools_enabled)))
    }
}

/// A `ChatModel` whose every call fails.
pub struct FailingModel;

#[async_trait]
impl ChatModel for FailingModel {
    fn model_id(&self) -> &str {
        "failing"
    }

    async fn invoke(
        &self,
        _messages: &[Message],
        _tools: Option<&[ToolDefinition]>,
    ) -> Result<AssistantReply, OpenAiClientError> {
        Err(OpenAiClientError::NoChoices)
    }
}

/// Chunk search over fixed texts; results come back in insertion order.
#[derive(Default)]
pub struct InMemorySearch {
    chunks: HashMap<SourceType, Vec<String>>,
}

impl InMemorySearch {
    pub fn with(mut self, source_type: SourceType, texts: &[&str]) -> Self {
        self.chunks
            .entry(source_type)
            .or_default()
            .extend(texts.iter().map(|t| t.to_string()));
        self
    }
}

#[async_trait]
impl ChunkSearch for InMemorySearch {
    async fn search(
        &self,
        _query: &str,
        source_type: SourceType,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        let texts = self.chunks.get(&source_type).cloned().unwrap_or_default();
        Ok(texts
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(i, text)| ScoredChunk {
                chunk: DocumentChunk {
                    id: format!("{source_type}-{i}"),
                    source_type,
                    ordinal: i as i32,
                    text,
                },
                distance: i as f32,
            })
            .collect())
    }
}

/// Bag-of-words embedder: each lowercase word bumps one hashed bucket.
pub struct HashEmbedder {
    dim: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dim: 32 }
    }
}

impl HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for word in text.split_whitespace() {
            let mut h: u64 = 0xcbf2_9ce4_8422_2325;
            for b in word.to_lowercase().bytes() {
                h ^= u64::from(b);
                h = h.wrapping_mul(0x0100_0000_01b3);
            }
            v[(h % self.dim as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl TextEmbedder for HashEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, CommonError> {
        Ok(self.embed(query))
    }

    fn dimensions(&self) -> usize {
        self.dim
    }
}
