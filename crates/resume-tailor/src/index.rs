/// Persistent retrieval index over the CV and the cover-letter guide.
///
/// Both documents are chunked, tagged with their `SourceType`, embedded, and stored in a
/// single LanceDB table. A populated index directory is reused as-is on later runs, so
/// the embedding model only processes the documents once.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::chunker::TextSplitter;
use crate::error::AppError;
use crate::model::{DocumentChunk, SourceType};
use tailor_common::embedding::TextEmbedder;
use tailor_common::error::CommonError;
use tailor_common::vectordb::{sql_literal, VectorDb};

pub const TABLE_NAME: &str = "resume_assistant";

/// A chunk returned by similarity search, nearest first.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub distance: f32,
}

/// Similarity search restricted to one source document.
#[async_trait]
pub trait ChunkSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        source_type: SourceType,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, AppError>;
}

/// Paths of the two reference documents.
#[derive(Debug, Clone)]
pub struct SourceDocuments {
    pub cv: PathBuf,
    pub guide: PathBuf,
}

impl SourceDocuments {
    fn path_for(&self, source_type: SourceType) -> &Path {
        match source_type {
            SourceType::Cv => &self.cv,
            SourceType::CoverLetterGuide => &self.guide,
        }
    }
}

pub struct RetrievalIndex {
    embedder: Arc<dyn TextEmbedder>,
    vectordb: VectorDb,
    chunk_count: usize,
}

impl RetrievalIndex {
    /// Open the index in `index_dir`, building it from `sources` when the directory is
    /// missing or empty.
    pub async fn build_or_load(
        index_dir: &Path,
        sources: &SourceDocuments,
        embedder: Arc<dyn TextEmbedder>,
    ) -> Result<Self, AppError> {
        let populated = dir_is_populated(index_dir)?;
        let vectordb = VectorDb::connect(index_dir).await?;

        if populated {
            if vectordb.table_exists(TABLE_NAME).await? {
                let chunk_count = vectordb.count_rows(TABLE_NAME, None).await?;
                info!(
                    path = %index_dir.display(),
                    chunks = chunk_count,
                    "loaded existing vector index"
                );
                return Ok(Self {
                    embedder,
                    vectordb,
                    chunk_count,
                });
            }
            warn!(
                path = %index_dir.display(),
                "index directory has no {TABLE_NAME} table, rebuilding"
            );
        }

        let chunk_count = build(&vectordb, sources, embedder.as_ref()).await?;
        Ok(Self {
            embedder,
            vectordb,
            chunk_count,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Number of stored chunks carrying `source_type`.
    pub async fn count_for(&self, source_type: SourceType) -> Result<usize, AppError> {
        Ok(self
            .vectordb
            .count_rows(TABLE_NAME, Some(source_filter(source_type)))
            .await?)
    }
}

#[async_trait]
impl ChunkSearch for RetrievalIndex {
    async fn search(
        &self,
        query: &str,
        source_type: SourceType,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed_query(query).await?;
        let batches = self
            .vectordb
            .search_filtered(TABLE_NAME, &query_embedding, &source_filter(source_type), k)
            .await?;

        let mut results = extract_search_results(&batches, source_type);
        // Every result must carry the requested tag.
        results.retain(|r| r.chunk.source_type == source_type);
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(k);
        Ok(results)
    }
}

fn source_filter(source_type: SourceType) -> String {
    format!("source_type = {}", sql_literal(source_type.as_str()))
}

async fn build(
    vectordb: &VectorDb,
    sources: &SourceDocuments,
    embedder: &dyn TextEmbedder,
) -> Result<usize, AppError> {
    // Check both documents up front so a missing guide does not waste a CV embedding pass.
    for source_type in SourceType::ALL {
        let path = sources.path_for(source_type);
        if !path.is_file() {
            return Err(AppError::MissingSourceDocument {
                path: path.display().to_string(),
            });
        }
    }

    let splitter = TextSplitter::default();
    let mut chunks = Vec::new();
    for source_type in SourceType::ALL {
        let path = sources.path_for(source_type);
        let text = load_source_text(path).await?;
        let pieces = splitter.split(&text);
        info!(
            source = %source_type,
            path = %path.display(),
            chars = text.chars().count(),
            chunks = pieces.len(),
            "chunked source document"
        );
        chunks.extend(pieces.into_iter().enumerate().map(|(i, text)| {
            let ordinal = i32::try_from(i).unwrap_or(i32::MAX);
            DocumentChunk {
                id: chunk_id(source_type, ordinal, &text),
                source_type,
                ordinal,
                text,
            }
        }));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    info!("generating embeddings for {} chunks", texts.len());
    let embeddings = if texts.is_empty() {
        Vec::new()
    } else {
        embedder.embed_documents(&texts).await?
    };
    if embeddings.len() != chunks.len() {
        return Err(AppError::Common(CommonError::Embedding(format!(
            "embedding count mismatch: expected {}, got {}",
            chunks.len(),
            embeddings.len()
        ))));
    }

    let batch = build_record_batch(&chunks, &embeddings, embedder.dimensions())?;
    let schema = batch.schema();
    vectordb
        .create_or_replace_table(TABLE_NAME, schema, vec![batch])
        .await?;

    info!(chunks = chunks.len(), "vector index built");
    Ok(chunks.len())
}

/// Read a source document as plain text. PDFs go through `pdf-extract`; anything else is
/// read as UTF-8.
pub async fn load_source_text(path: &Path) -> Result<String, AppError> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    if !is_pdf {
        return Ok(tokio::fs::read_to_string(path).await?);
    }

    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
        .await
        .map_err(|e| AppError::SourceDocument {
            path: path.display().to_string(),
            message: format!("spawn_blocking join error: {e}"),
        })?
        .map_err(|e| AppError::SourceDocument {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

fn chunk_id(source_type: SourceType, ordinal: i32, text: &str) -> String {
    let mut h = Sha256::new();
    h.update(source_type.as_str().as_bytes());
    h.update(b"|");
    h.update(ordinal.to_le_bytes());
    h.update(b"|");
    h.update(text.as_bytes());
    h.finalize()[..8].iter().map(|b| format!("{b:02x}")).collect()
}

fn dir_is_populated(dir: &Path) -> Result<bool, AppError> {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn vector_error(message: String) -> AppError {
    AppError::Common(CommonError::VectorDb(message))
}

/// Build an Arrow RecordBatch from chunks and their embeddings.
fn build_record_batch(
    chunks: &[DocumentChunk],
    embeddings: &[Vec<f32>],
    dim: usize,
) -> Result<RecordBatch, AppError> {
    let embedding_dim =
        i32::try_from(dim).map_err(|_| vector_error(format!("embedding width {dim} too large")))?;
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dim) {
        return Err(vector_error(format!(
            "embedding width mismatch: expected {dim}, got {}",
            bad.len()
        )));
    }

    let id_array: ArrayRef = Arc::new(StringArray::from_iter_values(
        chunks.iter().map(|c| c.id.as_str()),
    ));
    let source_array: ArrayRef = Arc::new(StringArray::from_iter_values(
        chunks.iter().map(|c| c.source_type.as_str()),
    ));
    let ordinal_array: ArrayRef = Arc::new(Int32Array::from_iter_values(
        chunks.iter().map(|c| c.ordinal),
    ));
    let text_array: ArrayRef = Arc::new(StringArray::from_iter_values(
        chunks.iter().map(|c| c.text.as_str()),
    ));

    let item = Arc::new(Field::new("item", DataType::Float32, true));
    let flat_values: Vec<f32> = embeddings.iter().flat_map(|e| e.iter().copied()).collect();
    let embedding_array: ArrayRef = Arc::new(
        FixedSizeListArray::try_new(
            Arc::clone(&item),
            embedding_dim,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| vector_error(format!("failed to build embedding array: {e}")))?,
    );

    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("source_type", DataType::Utf8, false),
        Field::new("ordinal", DataType::Int32, false),
        Field::new("text", DataType::Utf8, false),
        Field::new(
            "embedding",
            DataType::FixedSizeList(item, embedding_dim),
            false,
        ),
    ]));

    RecordBatch::try_new(
        schema,
        vec![
            id_array,
            source_array,
            ordinal_array,
            text_array,
            embedding_array,
        ],
    )
    .map_err(|e| vector_error(format!("failed to build record batch: {e}")))
}

/// Expected columns: id, text (Utf8), ordinal (Int32), _distance (Float32).
fn extract_search_results(batches: &[RecordBatch], source_type: SourceType) -> Vec<ScoredChunk> {
    let mut results = Vec::new();

    for batch in batches {
        let id_col = string_column(batch, "id");
        let text_col = string_column(batch, "text");
        let tag_col = string_column(batch, "source_type");
        let ordinal_col = batch
            .column_by_name("ordinal")
            .and_then(|c| c.as_any().downcast_ref::<Int32Array>());
        let distance_col = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let (Some(id_col), Some(text_col)) = (id_col, text_col) else {
            warn!("search result batch missing expected columns");
            continue;
        };

        for row in 0..batch.num_rows() {
            let tag = tag_col.map(|c| c.value(row));
            let row_type = match tag {
                Some("cv") => SourceType::Cv,
                Some("cover_letter_guide") => SourceType::CoverLetterGuide,
                Some(_) => continue,
                None => source_type,
            };
            results.push(ScoredChunk {
                chunk: DocumentChunk {
                    id: id_col.value(row).to_string(),
                    source_type: row_type,
                    ordinal: ordinal_col.map(|c| c.value(row)).unwrap_or(0),
                    text: text_col.value(row).to_string(),
                },
                distance: distance_col
                    .filter(|c| !c.is_null(row))
                    .map(|c| c.value(row))
                    .unwrap_or(0.0),
            });
        }
    }

    results
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::HashEmbedder;

    fn paragraph(sentence: &str) -> String {
        let mut out = String::new();
        while out.len() < 580 {
            out.push_str(sentence);
            out.push(' ');
        }
        out.trim_end().to_string()
    }

    /// Three CV paragraphs and two guide paragraphs, each too long to share a chunk.
    fn write_sources(dir: &Path) -> SourceDocuments {
        let cv = dir.join("cv.txt");
        let guide = dir.join("guide.txt");
        let cv_text = [
            paragraph("Senior Python Developer building Django services at 10k rps."),
            paragraph("Led a team of 5 engineers migrating workloads to Kubernetes."),
            paragraph("Designed PostgreSQL schemas and tuned slow queries by 90%."),
        ]
        .join("\n\n");
        let guide_text = [
            paragraph("Open with a specific hook about the company and the role."),
            paragraph("Close with a clear call to action and a warm sign-off."),
        ]
        .join("\n\n");
        std::fs::write(&cv, cv_text).unwrap();
        std::fs::write(&guide, guide_text).unwrap();
        SourceDocuments { cv, guide }
    }

    fn snapshot(dir: &Path) -> Vec<(String, u64)> {
        let mut out = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(d) = stack.pop() {
            for entry in std::fs::read_dir(&d).unwrap() {
                let entry = entry.unwrap();
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let rel = path.strip_prefix(dir).unwrap().display().to_string();
                    out.push((rel, entry.metadata().unwrap().len()));
                }
            }
        }
        out.sort();
        out
    }

    #[test]
    fn test_chunk_id_is_stable() {
        let a = chunk_id(SourceType::Cv, 0, "text");
        assert_eq!(a, chunk_id(SourceType::Cv, 0, "text"));
        assert_eq!(a.len(), 16);
        assert_ne!(a, chunk_id(SourceType::CoverLetterGuide, 0, "text"));
        assert_ne!(a, chunk_id(SourceType::Cv, 1, "text"));
    }

    #[tokio::test]
    async fn test_missing_source_document() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sources = write_sources(tmp.path());
        sources.guide = tmp.path().join("absent.pdf");

        let err = RetrievalIndex::build_or_load(
            &tmp.path().join("index"),
            &sources,
            Arc::new(HashEmbedder::default()),
        )
        .await
        .err()
        .expect("build should fail");
        match err {
            AppError::MissingSourceDocument { path } => assert!(path.ends_with("absent.pdf")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_build_then_load_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let sources = write_sources(tmp.path());
        let index_dir = tmp.path().join("index");

        let first =
            RetrievalIndex::build_or_load(&index_dir, &sources, Arc::new(HashEmbedder::default()))
                .await
                .unwrap();
        let count = first.chunk_count();
        assert_eq!(count, 5);
        assert_eq!(first.count_for(SourceType::Cv).await.unwrap(), 3);
        drop(first);
        let before = snapshot(&index_dir);

        let second =
            RetrievalIndex::build_or_load(&index_dir, &sources, Arc::new(HashEmbedder::default()))
                .await
                .unwrap();
        assert_eq!(second.chunk_count(), count);
        assert_eq!(snapshot(&index_dir), before);
    }

    #[tokio::test]
    async fn test_search_filters_by_source_type() {
        let tmp = tempfile::tempdir().unwrap();
        let sources = write_sources(tmp.path());
        let index = RetrievalIndex::build_or_load(
            &tmp.path().join("index"),
            &sources,
            Arc::new(HashEmbedder::default()),
        )
        .await
        .unwrap();

        let guide = index
            .search("call to action", SourceType::CoverLetterGuide, 5)
            .await
            .unwrap();
        assert_eq!(guide.len(), 2);
        assert!(guide
            .iter()
            .all(|r| r.chunk.source_type == SourceType::CoverLetterGuide));
        assert!(guide.windows(2).all(|w| w[0].distance <= w[1].distance));

        let cv = index.search("Kubernetes", SourceType::Cv, 2).await.unwrap();
        assert_eq!(cv.len(), 2);
        assert!(cv.iter().all(|r| r.chunk.source_type == SourceType::Cv));
    }
}
