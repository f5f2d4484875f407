/// Pipeline orchestrator.
///
/// Runs `Stage::ORDER` front to back over one `PipelineState`. Each stage reads the state
/// by reference and returns at most one patch, which the orchestrator merges before the
/// next stage starts. There are no branches, retries or skips.
use tracing::{info, warn};

use crate::company::CompanyResolver;
use crate::error::AppError;
use crate::model::{require, LengthVerdict, PipelineState, Stage, StagePatch};
use crate::output::{GeneratedSections, OutputWriter};
use crate::prompts;
use crate::stage::StageRunner;
use tailor_common::openai::Message;

/// Marker the length check emits when the résumé will not fit on one page.
const TOO_LONG_MARKER: &str = "TOO_LONG";

pub struct Orchestrator {
    runner: StageRunner,
    resolver: CompanyResolver,
    writer: OutputWriter,
    company_override: Option<String>,
}

impl Orchestrator {
    pub fn new(runner: StageRunner, resolver: CompanyResolver, writer: OutputWriter) -> Self {
        Self {
            runner,
            resolver,
            writer,
            company_override: None,
        }
    }

    /// Use `company` instead of running the resolver. Blank values are ignored.
    pub fn with_company_override(mut self, company: Option<String>) -> Self {
        self.company_override = company
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        self
    }

    pub fn output_dir(&self) -> &std::path::Path {
        self.writer.dir()
    }

    pub async fn run(&self, state: PipelineState) -> Result<PipelineState, AppError> {
        self.run_with_progress(state, |_, _| {}).await
    }

    /// Run every stage, calling `progress` with the 1-based position before each one.
    pub async fn run_with_progress(
        &self,
        mut state: PipelineState,
        mut progress: impl FnMut(usize, Stage),
    ) -> Result<PipelineState, AppError> {
        for (i, stage) in Stage::ORDER.into_iter().enumerate() {
            progress(i + 1, stage);
            info!(stage = %stage, "{}", stage.title());

            if let Some(patch) = self.step(stage, &state).await? {
                info!(stage = %stage, slot = patch.slot(), chars = patch_chars(&patch), "stage complete");
                state.apply(patch)?;
            }
        }
        Ok(state)
    }

    async fn step(&self, stage: Stage, state: &PipelineState) -> Result<Option<StagePatch>, AppError> {
        let jd = state.job_description();
        let patch = match stage {
            Stage::Ingest => {
                if jd.trim().is_empty() {
                    return Err(AppError::MissingInput);
                }
                info!(
                    method = %state.input_method(),
                    url = state.source_url().unwrap_or("-"),
                    chars = jd.chars().count(),
                    "job description accepted"
                );
                return Ok(None);
            }
            Stage::ExtractCompany => {
                let company = match &self.company_override {
                    Some(company) => {
                        info!(company = %company, "using provided company name");
                        company.clone()
                    }
                    None => self.resolver.resolve(jd, state.source_url()).await,
                };
                StagePatch::CompanyName(company)
            }
            Stage::AnalyzeKeywords => {
                let text = self.generate(stage, prompts::keywords_analysis(jd), true).await?;
                StagePatch::KeywordsAnalysis(text)
            }
            Stage::TailorSummary => {
                let keywords = require(stage, "keywords_analysis", state.keywords_analysis())?;
                let text = self.generate(stage, prompts::tailor_summary(jd, keywords), true).await?;
                StagePatch::TailoredSummary(text)
            }
            Stage::TailorSkills => {
                let keywords = require(stage, "keywords_analysis", state.keywords_analysis())?;
                let text = self.generate(stage, prompts::tailor_skills(jd, keywords), true).await?;
                StagePatch::TailoredSkills(text)
            }
            Stage::TailorExperience => {
                let keywords = require(stage, "keywords_analysis", state.keywords_analysis())?;
                let text = self
                    .generate(stage, prompts::tailor_experience(jd, keywords), true)
                    .await?;
                StagePatch::TailoredExperience(text)
            }
            Stage::TailorTitle => {
                let keywords = require(stage, "keywords_analysis", state.keywords_analysis())?;
                let text = self.generate(stage, prompts::tailor_title(jd, keywords), true).await?;
                StagePatch::TailoredTitle(text)
            }
            Stage::CheckLength => {
                let messages = prompts::check_length(
                    require(stage, "tailored_summary", state.tailored_summary())?,
                    require(stage, "tailored_skills", state.tailored_skills())?,
                    require(stage, "tailored_experience", state.tailored_experience())?,
                    require(stage, "tailored_title", state.tailored_title())?,
                );
                let report = self.generate(stage, messages, false).await?;
                let condense_recommended = report.to_uppercase().contains(TOO_LONG_MARKER);
                if condense_recommended {
                    // Informational only: earlier sections are kept as generated.
                    warn!("resume may exceed one page, see the length check section for condensed versions");
                }
                StagePatch::LengthCheck(LengthVerdict {
                    condense_recommended,
                    report,
                })
            }
            Stage::CoverLetter => {
                let messages = prompts::cover_letter(
                    jd,
                    require(stage, "company_name", state.company_name())?,
                    require(stage, "tailored_summary", state.tailored_summary())?,
                    require(stage, "tailored_skills", state.tailored_skills())?,
                    require(stage, "tailored_experience", state.tailored_experience())?,
                );
                StagePatch::CoverLetter(self.generate(stage, messages, true).await?)
            }
            Stage::InterestAnswer => {
                let company = require(stage, "company_name", state.company_name())?;
                let text = self
                    .generate(stage, prompts::interest_answer(jd, company), true)
                    .await?;
                StagePatch::InterestAnswer(text)
            }
            Stage::SaveOutputs => {
                let company = require(stage, "company_name", state.company_name())?;
                let sections = GeneratedSections {
                    keywords_analysis: require(stage, "keywords_analysis", state.keywords_analysis())?,
                    tailored_summary: require(stage, "tailored_summary", state.tailored_summary())?,
                    tailored_skills: require(stage, "tailored_skills", state.tailored_skills())?,
                    tailored_experience: require(stage, "tailored_experience", state.tailored_experience())?,
                    tailored_title: require(stage, "tailored_title", state.tailored_title())?,
                    length_check: &require(stage, "length_check", state.length_check())?.report,
                    cover_letter: require(stage, "cover_letter", state.cover_letter())?,
                    interest_answer: require(stage, "interest_answer", state.interest_answer())?,
                };
                StagePatch::OutputFiles(self.writer.save_all_outputs(company, jd, &sections)?)
            }
        };
        Ok(Some(patch))
    }

    async fn generate(
        &self,
        stage: Stage,
        messages: Vec<Message>,
        tools_enabled: bool,
    ) -> Result<String, AppError> {
        let text = self.runner.run_stage(messages, tools_enabled).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::EmptyCompletion { stage: stage.name() });
        }
        Ok(text.to_string())
    }
}

fn patch_chars(patch: &StagePatch) -> usize {
    match patch {
        StagePatch::CompanyName(s)
        | StagePatch::KeywordsAnalysis(s)
        | StagePatch::TailoredSummary(s)
        | StagePatch::TailoredSkills(s)
        | StagePatch::TailoredExperience(s)
        | StagePatch::TailoredTitle(s)
        | StagePatch::CoverLetter(s)
        | StagePatch::InterestAnswer(s) => s.chars().count(),
        StagePatch::LengthCheck(v) => v.report.chars().count(),
        StagePatch::OutputFiles(_) => 0,
    }
}
