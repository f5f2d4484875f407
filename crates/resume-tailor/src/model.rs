use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Which reference document a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Cv,
    CoverLetterGuide,
}

impl SourceType {
    pub const ALL: [SourceType; 2] = [SourceType::Cv, SourceType::CoverLetterGuide];

    /// Tag persisted in the `source_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Cv => "cv",
            SourceType::CoverLetterGuide => "cover_letter_guide",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A span of source-document text as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Stable content hash, identical across rebuilds of the same source.
    pub id: String,
    pub source_type: SourceType,
    /// Position of the chunk within its source document.
    pub ordinal: i32,
    pub text: String,
}

/// How the job description reached the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMethod {
    Pasted,
    UrlFetched,
}

impl fmt::Display for InputMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMethod::Pasted => f.write_str("pasted"),
            InputMethod::UrlFetched => f.write_str("url"),
        }
    }
}

/// Outcome of the one-page length check.
#[derive(Debug, Clone, PartialEq)]
pub struct LengthVerdict {
    /// The model flagged the résumé as too long. Earlier slots are left untouched.
    pub condense_recommended: bool,
    pub report: String,
}

/// Files produced by the output writer.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedOutputs {
    pub text_file: PathBuf,
    /// `None` when PDF rendering failed; the text file is still complete.
    pub pdf_file: Option<PathBuf>,
    pub position: String,
}

/// The ten pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    ExtractCompany,
    AnalyzeKeywords,
    TailorSummary,
    TailorSkills,
    TailorExperience,
    TailorTitle,
    CheckLength,
    CoverLetter,
    InterestAnswer,
    SaveOutputs,
}

impl Stage {
    pub const ORDER: [Stage; 11] = [
        Stage::Ingest,
        Stage::ExtractCompany,
        Stage::AnalyzeKeywords,
        Stage::TailorSummary,
        Stage::TailorSkills,
        Stage::TailorExperience,
        Stage::TailorTitle,
        Stage::CheckLength,
        Stage::CoverLetter,
        Stage::InterestAnswer,
        Stage::SaveOutputs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::ExtractCompany => "extract_company",
            Stage::AnalyzeKeywords => "analyze_keywords",
            Stage::TailorSummary => "tailor_summary",
            Stage::TailorSkills => "tailor_skills",
            Stage::TailorExperience => "tailor_experience",
            Stage::TailorTitle => "tailor_title",
            Stage::CheckLength => "check_length",
            Stage::CoverLetter => "cover_letter",
            Stage::InterestAnswer => "interest_answer",
            Stage::SaveOutputs => "save_outputs",
        }
    }

    /// Human-readable heading used in progress output.
    pub fn title(self) -> &'static str {
        match self {
            Stage::Ingest => "Getting job description",
            Stage::ExtractCompany => "Resolving company name",
            Stage::AnalyzeKeywords => "Analyzing keywords and key terms",
            Stage::TailorSummary => "Tailoring professional summary",
            Stage::TailorSkills => "Tailoring skills section",
            Stage::TailorExperience => "Tailoring experience bullets",
            Stage::TailorTitle => "Tailoring professional title and specialization",
            Stage::CheckLength => "Checking resume length (one page)",
            Stage::CoverLetter => "Generating cover letter",
            Stage::InterestAnswer => "Generating interest answer",
            Stage::SaveOutputs => "Saving outputs",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A partial update returned by a stage. Each variant names exactly one slot.
#[derive(Debug, Clone, PartialEq)]
pub enum StagePatch {
    CompanyName(String),
    KeywordsAnalysis(String),
    TailoredSummary(String),
    TailoredSkills(String),
    TailoredExperience(String),
    TailoredTitle(String),
    LengthCheck(LengthVerdict),
    CoverLetter(String),
    InterestAnswer(String),
    OutputFiles(SavedOutputs),
}

impl StagePatch {
    pub fn slot(&self) -> &'static str {
        match self {
            StagePatch::CompanyName(_) => "company_name",
            StagePatch::KeywordsAnalysis(_) => "keywords_analysis",
            StagePatch::TailoredSummary(_) => "tailored_summary",
            StagePatch::TailoredSkills(_) => "tailored_skills",
            StagePatch::TailoredExperience(_) => "tailored_experience",
            StagePatch::TailoredTitle(_) => "tailored_title",
            StagePatch::LengthCheck(_) => "length_check",
            StagePatch::CoverLetter(_) => "cover_letter",
            StagePatch::InterestAnswer(_) => "interest_answer",
            StagePatch::OutputFiles(_) => "output_files",
        }
    }
}

/// State threaded through the pipeline.
///
/// Generation slots start empty and are filled exactly once through `apply`; reads go
/// through `require`, which reports the missing slot instead of handing back an empty
/// string.
#[derive(Debug, Clone)]
pub struct PipelineState {
    job_description: String,
    input_method: InputMethod,
    source_url: Option<String>,
    company_name: Option<String>,
    keywords_analysis: Option<String>,
    tailored_summary: Option<String>,
    tailored_skills: Option<String>,
    tailored_experience: Option<String>,
    tailored_title: Option<String>,
    length_check: Option<LengthVerdict>,
    cover_letter: Option<String>,
    interest_answer: Option<String>,
    output_files: Option<SavedOutputs>,
}

impl PipelineState {
    pub fn new(
        job_description: impl Into<String>,
        input_method: InputMethod,
        source_url: Option<String>,
    ) -> Self {
        Self {
            job_description: job_description.into(),
            input_method,
            source_url,
            company_name: None,
            keywords_analysis: None,
            tailored_summary: None,
            tailored_skills: None,
            tailored_experience: None,
            tailored_title: None,
            length_check: None,
            cover_letter: None,
            interest_answer: None,
            output_files: None,
        }
    }

    pub fn job_description(&self) -> &str {
        &self.job_description
    }

    pub fn input_method(&self) -> InputMethod {
        self.input_method
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn company_name(&self) -> Option<&str> {
        self.company_name.as_deref()
    }

    pub fn keywords_analysis(&self) -> Option<&str> {
        self.keywords_analysis.as_deref()
    }

    pub fn tailored_summary(&self) -> Option<&str> {
        self.tailored_summary.as_deref()
    }

    pub fn tailored_skills(&self) -> Option<&str> {
        self.tailored_skills.as_deref()
    }

    pub fn tailored_experience(&self) -> Option<&str> {
        self.tailored_experience.as_deref()
    }

    pub fn tailored_title(&self) -> Option<&str> {
        self.tailored_title.as_deref()
    }

    pub fn length_check(&self) -> Option<&LengthVerdict> {
        self.length_check.as_ref()
    }

    pub fn cover_letter(&self) -> Option<&str> {
        self.cover_letter.as_deref()
    }

    pub fn interest_answer(&self) -> Option<&str> {
        self.interest_answer.as_deref()
    }

    pub fn output_files(&self) -> Option<&SavedOutputs> {
        self.output_files.as_ref()
    }

    /// Merge a stage's patch. A slot that already holds a value is never overwritten.
    pub fn apply(&mut self, patch: StagePatch) -> Result<(), AppError> {
        let slot = patch.slot();
        match patch {
            StagePatch::CompanyName(v) => set_once(&mut self.company_name, v, slot),
            StagePatch::KeywordsAnalysis(v) => set_once(&mut self.keywords_analysis, v, slot),
            StagePatch::TailoredSummary(v) => set_once(&mut self.tailored_summary, v, slot),
            StagePatch::TailoredSkills(v) => set_once(&mut self.tailored_skills, v, slot),
            StagePatch::TailoredExperience(v) => set_once(&mut self.tailored_experience, v, slot),
            StagePatch::TailoredTitle(v) => set_once(&mut self.tailored_title, v, slot),
            StagePatch::LengthCheck(v) => set_once(&mut self.length_check, v, slot),
            StagePatch::CoverLetter(v) => set_once(&mut self.cover_letter, v, slot),
            StagePatch::InterestAnswer(v) => set_once(&mut self.interest_answer, v, slot),
            StagePatch::OutputFiles(v) => set_once(&mut self.output_files, v, slot),
        }
    }
}

fn set_once<T>(field: &mut Option<T>, value: T, slot: &'static str) -> Result<(), AppError> {
    if field.is_some() {
        return Err(AppError::SlotAlreadyWritten { slot });
    }
    *field = Some(value);
    Ok(())
}

/// Unwrap an upstream slot for `stage`, or fail with `MissingUpstream`.
pub fn require<'a, T: ?Sized>(
    stage: Stage,
    slot: &'static str,
    value: Option<&'a T>,
) -> Result<&'a T, AppError> {
    value.ok_or(AppError::MissingUpstream {
        stage: stage.name(),
        slot,
    })
}
