use tailor_common::error::CommonError;
use tailor_common::openai::OpenAiClientError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("model request failed: {0}")]
    Llm(#[from] OpenAiClientError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("no job description was provided")]
    MissingInput,

    #[error("source document not found: {path}")]
    MissingSourceDocument { path: String },

    #[error("failed to read source document {path}: {message}")]
    SourceDocument { path: String, message: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for tool {tool}: {message}")]
    InvalidToolArguments { tool: String, message: String },

    #[error("fetch failed: {0}")]
    FetchFailure(String),

    #[error("secondary fetch failed: {0}")]
    SecondaryFetchFailure(String),

    #[error("pdf generation failed: {0}")]
    PdfGenerationFailure(String),

    #[error("stage {stage} needs {slot}, which has not been written")]
    MissingUpstream {
        stage: &'static str,
        slot: &'static str,
    },

    #[error("slot {slot} was already written")]
    SlotAlreadyWritten { slot: &'static str },

    #[error("stage {stage} produced an empty completion")]
    EmptyCompletion { stage: &'static str },
}
