/// Failures raised below the application layer: vector storage and embedding inference.
/// The binary folds these into its own error type with `#[from]`.
#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("vector store: {0}")]
    VectorDb(String),

    #[error("embedding model: {0}")]
    Embedding(String),
}
