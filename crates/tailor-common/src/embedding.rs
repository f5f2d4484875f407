/// Text embeddings.
///
/// `Embedder` runs nomic-embed-text-v1.5 through fastembed. Inference is synchronous and
/// CPU-bound, so every call is moved onto a blocking thread. The model expects task
/// prefixes: `search_document: ` for indexed text and `search_query: ` for queries.
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CommonError;

const DOCUMENT_PREFIX: &str = "search_document: ";
const QUERY_PREFIX: &str = "search_query: ";
const NOMIC_DIMENSIONS: usize = 768;
/// Small batches keep peak ONNX memory flat on long documents.
const DOCUMENT_BATCH_SIZE: usize = 4;

/// Anything that turns text into fixed-width vectors.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError>;
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, CommonError>;
    fn dimensions(&self) -> usize;
}

pub struct Embedder {
    model: Arc<fastembed::TextEmbedding>,
}

impl Embedder {
    /// Load the model, downloading it (~300MB) into the fastembed cache on first use.
    pub async fn new() -> Result<Self, CommonError> {
        let model = tokio::task::spawn_blocking(|| {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed::EmbeddingModel::NomicEmbedTextV15)
                    .with_show_download_progress(true),
            )
        })
        .await
        .map_err(|e| CommonError::Embedding(format!("model loader task failed: {e}")))?
        .map_err(|e| CommonError::Embedding(format!("could not load embedding model: {e}")))?;

        Ok(Self {
            model: Arc::new(model),
        })
    }

    async fn run(
        &self,
        inputs: Vec<String>,
        batch_size: Option<usize>,
    ) -> Result<Vec<Vec<f32>>, CommonError> {
        let expected = inputs.len();
        let model = Arc::clone(&self.model);
        let vectors = tokio::task::spawn_blocking(move || model.embed(inputs, batch_size))
            .await
            .map_err(|e| CommonError::Embedding(format!("embedding task failed: {e}")))?
            .map_err(|e| CommonError::Embedding(e.to_string()))?;

        if vectors.len() != expected {
            return Err(CommonError::Embedding(format!(
                "expected {expected} vectors, model returned {}",
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != NOMIC_DIMENSIONS) {
            return Err(CommonError::Embedding(format!(
                "expected {NOMIC_DIMENSIONS}-dimensional vectors, got {}",
                bad.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl TextEmbedder for Embedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError> {
        let inputs = texts.iter().map(|t| format!("{DOCUMENT_PREFIX}{t}")).collect();
        self.run(inputs, Some(DOCUMENT_BATCH_SIZE)).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, CommonError> {
        let mut vectors = self.run(vec![format!("{QUERY_PREFIX}{query}")], None).await?;
        vectors
            .pop()
            .ok_or_else(|| CommonError::Embedding("no vector for query".to_string()))
    }

    fn dimensions(&self) -> usize {
        NOMIC_DIMENSIONS
    }
}
