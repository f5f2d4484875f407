/// The two retrieval tools offered to the generation model.
///
/// Tool calls arrive as a name plus a JSON argument string. Names are resolved through
/// `RetrievalTool::from_name`; anything outside the catalog is an `UnknownTool` error
/// rather than a best-effort match.
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::index::ChunkSearch;
use crate::model::SourceType;
use tailor_common::openai::ToolDefinition;

/// Chunks returned per tool call.
pub const RESULTS_PER_QUERY: usize = 5;

pub const NO_CV_CONTENT: &str = "No relevant CV information found.";
pub const NO_GUIDE_CONTENT: &str = "No relevant cover letter guidance found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalTool {
    RetrieveCv,
    RetrieveGuide,
}

impl RetrievalTool {
    pub const ALL: [RetrievalTool; 2] = [RetrievalTool::RetrieveCv, RetrievalTool::RetrieveGuide];

    pub fn name(self) -> &'static str {
        match self {
            RetrievalTool::RetrieveCv => "retrieve_cv_content",
            RetrievalTool::RetrieveGuide => "retrieve_cover_letter_guide",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, AppError> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| AppError::UnknownTool(name.to_string()))
    }

    fn description(self) -> &'static str {
        match self {
            RetrievalTool::RetrieveCv => {
                "Search the candidate's CV for experience, skills, education and \
                 accomplishments relevant to the query."
            }
            RetrievalTool::RetrieveGuide => {
                "Search the cover letter writing guide for structure, tone and best \
                 practices relevant to the query."
            }
        }
    }

    fn source_type(self) -> SourceType {
        match self {
            RetrievalTool::RetrieveCv => SourceType::Cv,
            RetrievalTool::RetrieveGuide => SourceType::CoverLetterGuide,
        }
    }

    fn section_label(self) -> &'static str {
        match self {
            RetrievalTool::RetrieveCv => "CV Section",
            RetrievalTool::RetrieveGuide => "Guide Section",
        }
    }

    fn empty_sentinel(self) -> &'static str {
        match self {
            RetrievalTool::RetrieveCv => NO_CV_CONTENT,
            RetrievalTool::RetrieveGuide => NO_GUIDE_CONTENT,
        }
    }
}

/// Arguments accepted by both retrieval tools.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RetrievalQuery {
    /// Free-text description of the information to look up
    pub query: String,
}

impl RetrievalQuery {
    /// Parse a model-produced argument string. An empty string is treated as `{}`.
    fn parse(tool: RetrievalTool, arguments: &str) -> Result<Self, AppError> {
        let raw = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        serde_json::from_str(raw).map_err(|e| AppError::InvalidToolArguments {
            tool: tool.name().to_string(),
            message: e.to_string(),
        })
    }
}

/// Retrieval tools bound to an index.
#[derive(Clone)]
pub struct RetrievalTools {
    index: Arc<dyn ChunkSearch>,
    catalog: Vec<ToolDefinition>,
}

impl RetrievalTools {
    pub fn new(index: Arc<dyn ChunkSearch>) -> Result<Self, AppError> {
        let catalog = RetrievalTool::ALL
            .into_iter()
            .map(|t| ToolDefinition::function::<RetrievalQuery>(t.name(), t.description()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Config(format!("failed to build tool schema: {e}")))?;
        Ok(Self { index, catalog })
    }

    /// Definitions sent to the model when tools are enabled.
    pub fn catalog(&self) -> &[ToolDefinition] {
        &self.catalog
    }

    /// Resolve one tool call by name and run it.
    pub async fn call(&self, name: &str, arguments: &str) -> Result<String, AppError> {
        let tool = RetrievalTool::from_name(name)?;
        let args = RetrievalQuery::parse(tool, arguments)?;
        self.run(tool, &args.query).await
    }

    /// Numbered sections of matching chunk text, or the tool's sentinel when nothing
    /// matched. The sentinel is ordinary content for the model, not an error.
    pub async fn run(&self, tool: RetrievalTool, query: &str) -> Result<String, AppError> {
        let results = self
            .index
            .search(query, tool.source_type(), RESULTS_PER_QUERY)
            .await?;
        info!(tool = tool.name(), query, hits = results.len(), "tool call resolved");

        if results.is_empty() {
            return Ok(tool.empty_sentinel().to_string());
        }
        Ok(results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{} {}:\n{}", tool.section_label(), i + 1, r.chunk.text))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
