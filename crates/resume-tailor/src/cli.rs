//! Interactive command-line front end.
//!
//! Prompts are blocking and run on a blocking thread; URL fetches inside the prompt
//! loop are driven through the runtime handle.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use tokio::runtime::Handle;

use crate::fetch::{validate_job_url, JobPostingFetcher, MIN_POSTING_CHARS};
use crate::model::{InputMethod, PipelineState, Stage};
use tailor_common::usage::UsageStats;

const PREVIEW_CHARS: usize = 500;
const END_SENTINEL: &str = "END";
const RULE: &str = "======================================================================";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "resume-tailor",
    version,
    about = "Tailor a CV and cover letter to a job posting"
)]
pub struct Args {
    /// Fetch the job description from this URL
    #[arg(long, conflicts_with = "job_file")]
    pub url: Option<String>,

    /// Read the job description from a text file
    #[arg(long)]
    pub job_file: Option<PathBuf>,

    /// Company name to use instead of automatic extraction
    #[arg(long)]
    pub company: Option<String>,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,

    /// Directory for generated files (overrides TAILOR_OUTPUT_DIR)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

/// A job description and where it came from.
#[derive(Debug, Clone)]
pub struct JobInput {
    pub text: String,
    pub method: InputMethod,
    pub url: Option<String>,
}

impl JobInput {
    pub fn into_state(self) -> PipelineState {
        PipelineState::new(self.text, self.method, self.url)
    }
}

/// What the user asked for, once every prompt is answered.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input: JobInput,
    pub company: Option<String>,
}

pub struct Prompter {
    args: Args,
    fetcher: Arc<JobPostingFetcher>,
    runtime: Handle,
    theme: ColorfulTheme,
}

impl Prompter {
    pub fn new(args: Args, fetcher: Arc<JobPostingFetcher>, runtime: Handle) -> Self {
        Self {
            args,
            fetcher,
            runtime,
            theme: ColorfulTheme::default(),
        }
    }

    /// Collect the job description, an optional company name and the go-ahead.
    /// Returns `None` when the user declines to start.
    pub fn gather(&self) -> anyhow::Result<Option<RunRequest>> {
        let input = self.job_input()?;
        let company = self.company()?;

        println!();
        println!("Job description: {} characters ({})", input.text.chars().count(), input.method);
        if let Some(company) = &company {
            println!("Company: {company}");
        }
        if !self.args.yes
            && !Confirm::with_theme(&self.theme)
                .with_prompt("Start tailoring?")
                .default(true)
                .interact()?
        {
            return Ok(None);
        }
        Ok(Some(RunRequest { input, company }))
    }

    fn job_input(&self) -> anyhow::Result<JobInput> {
        if let Some(path) = &self.args.job_file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read job file {}", path.display()))?;
            return Ok(JobInput {
                text,
                method: InputMethod::Pasted,
                url: None,
            });
        }
        if let Some(url) = &self.args.url {
            return self.fetch_with_retry(url.clone());
        }

        let choice = Select::with_theme(&self.theme)
            .with_prompt("How would you like to provide the job description?")
            .items(&["Paste the job description", "Fetch it from a URL"])
            .default(0)
            .interact()?;
        if choice == 0 {
            self.paste()
        } else {
            let url = self.ask_url()?;
            self.fetch_with_retry(url)
        }
    }

    fn paste(&self) -> anyhow::Result<JobInput> {
        loop {
            println!();
            println!("Paste the job description, then type {END_SENTINEL} on its own line:");
            let Some(text) = read_until_end(std::io::stdin().lock())? else {
                bail!("input closed before a job description was entered");
            };
            let text = text.trim().to_string();
            if text.is_empty() {
                println!("No job description entered, please try again.");
                continue;
            }

            let chars = text.chars().count();
            if chars < MIN_POSTING_CHARS
                && !Confirm::with_theme(&self.theme)
                    .with_prompt(format!(
                        "The job description is only {chars} characters. Continue anyway?"
                    ))
                    .default(false)
                    .interact()?
            {
                continue;
            }
            return Ok(JobInput {
                text,
                method: InputMethod::Pasted,
                url: None,
            });
        }
    }

    fn ask_url(&self) -> anyhow::Result<String> {
        let url: String = Input::with_theme(&self.theme)
            .with_prompt("Job posting URL")
            .validate_with(|input: &String| validate_job_url(input).map(|_| ()))
            .interact_text()?;
        Ok(url.trim().to_string())
    }

    fn fetch_with_retry(&self, mut url: String) -> anyhow::Result<JobInput> {
        loop {
            if let Err(e) = validate_job_url(&url) {
                if self.args.yes {
                    bail!(e);
                }
                println!("{e}");
                url = self.ask_url()?;
                continue;
            }

            println!();
            println!("Fetching {url} ...");
            match self.runtime.block_on(self.fetcher.fetch(&url)) {
                Ok(text) => {
                    println!("Fetched {} characters. Preview:", text.chars().count());
                    println!("{RULE}\n{}\n{RULE}", preview(&text, PREVIEW_CHARS));
                    let accepted = self.args.yes
                        || Confirm::with_theme(&self.theme)
                            .with_prompt("Use this job description?")
                            .default(true)
                            .interact()?;
                    if accepted {
                        return Ok(JobInput {
                            text,
                            method: InputMethod::UrlFetched,
                            url: Some(url),
                        });
                    }
                }
                Err(e) => {
                    if self.args.yes {
                        return Err(e.into());
                    }
                    println!("Could not fetch the job posting: {e}");
                }
            }

            let next = Select::with_theme(&self.theme)
                .with_prompt("What next?")
                .items(&["Try a different URL", "Paste the job description instead"])
                .default(0)
                .interact()?;
            if next == 0 {
                url = self.ask_url()?;
            } else {
                return self.paste();
            }
        }
    }

    fn company(&self) -> anyhow::Result<Option<String>> {
        if let Some(company) = &self.args.company {
            return Ok(non_blank(company));
        }
        if self.args.yes {
            return Ok(None);
        }
        let company: String = Input::with_theme(&self.theme)
            .with_prompt("Company name (leave blank to detect it automatically)")
            .allow_empty(true)
            .interact_text()?;
        Ok(non_blank(&company))
    }
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Read lines until one equal to `END` (any case). `None` if the input closed before
/// anything was read.
pub fn read_until_end(reader: impl BufRead) -> std::io::Result<Option<String>> {
    let mut lines = Vec::new();
    let mut saw_input = false;
    for line in reader.lines() {
        let line = line?;
        saw_input = true;
        if line.trim().eq_ignore_ascii_case(END_SENTINEL) {
            return Ok(Some(lines.join("\n")));
        }
        lines.push(line);
    }
    Ok(saw_input.then(|| lines.join("\n")))
}

pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

pub fn print_banner() {
    println!("{RULE}");
    println!("RESUME & COVER LETTER TAILOR");
    println!("{RULE}");
    println!("Steps:");
    for (i, stage) in Stage::ORDER.iter().enumerate() {
        println!("  {i:>2}. {}", stage.title());
    }
    println!("{RULE}");
}

pub fn print_progress(position: usize, stage: Stage) {
    println!("[{position}/{}] {}...", Stage::ORDER.len(), stage.title());
}

/// Final report of a completed run.
pub fn render_summary(state: &PipelineState, usage: &UsageStats) -> String {
    let mut out = format!("\n{RULE}\nDONE\n{RULE}\n");
    out.push_str(&format!(
        "Company:   {}\n",
        state.company_name().unwrap_or("-")
    ));
    if let Some(saved) = state.output_files() {
        out.push_str(&format!("Position:  {}\n", saved.position));
        out.push_str(&format!("Text file: {}\n", saved.text_file.display()));
        match &saved.pdf_file {
            Some(pdf) => out.push_str(&format!("PDF file:  {}\n", pdf.display())),
            None => out.push_str("PDF file:  not generated (see log)\n"),
        }
    }
    if let Some(verdict) = state.length_check() {
        let note = if verdict.condense_recommended {
            "condensing recommended, see the length check section"
        } else {
            "fits on one page"
        };
        out.push_str(&format!("Length:    {note}\n"));
    }

    out.push_str(&format!("\nModel requests: {}\n", usage.total_requests()));
    for model in &usage.models {
        let tokens = model
            .total_tokens
            .map(|t| format!("{t} tokens"))
            .unwrap_or_else(|| "tokens not reported".to_string());
        out.push_str(&format!("  {}: {} requests, {tokens}\n", model.model, model.requests));
    }
    out.push_str(RULE);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LengthVerdict, SavedOutputs, StagePatch};
    use tailor_common::openai::ChatCompletionUsage;
    use tailor_common::usage::UsageTracker;

    #[test]
    fn test_read_until_end() {
        let input = "Senior Python Developer\nTechCorp\n\nend\nignored\n";
        assert_eq!(
            read_until_end(input.as_bytes()).unwrap().as_deref(),
            Some("Senior Python Developer\nTechCorp\n")
        );
    }

    #[test]
    fn test_read_until_end_without_sentinel() {
        assert_eq!(read_until_end("a\nb\n".as_bytes()).unwrap().as_deref(), Some("a\nb"));
        assert_eq!(read_until_end("".as_bytes()).unwrap(), None);
        assert_eq!(read_until_end("  END  \n".as_bytes()).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 500), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "resume-tailor",
            "--url",
            "https://acme.com/jobs/1",
            "--company",
            "Acme",
            "-y",
        ])
        .unwrap();
        assert_eq!(args.url.as_deref(), Some("https://acme.com/jobs/1"));
        assert_eq!(args.company.as_deref(), Some("Acme"));
        assert!(args.yes);

        assert!(Args::try_parse_from([
            "resume-tailor",
            "--url",
            "https://acme.com",
            "--job-file",
            "jd.txt"
        ])
        .is_err());
    }

    #[test]
    fn test_render_summary() {
        let mut state = PipelineState::new("jd", InputMethod::Pasted, None);
        state.apply(StagePatch::CompanyName("Acme".to_string())).unwrap();
        state
            .apply(StagePatch::LengthCheck(LengthVerdict {
                condense_recommended: true,
                report: "TOO_LONG".to_string(),
            }))
            .unwrap();
        state
            .apply(StagePatch::OutputFiles(SavedOutputs {
                text_file: PathBuf::from("outputs/Acme_Dev_tailored.txt"),
                pdf_file: None,
                position: "Dev".to_string(),
            }))
            .unwrap();

        let usage = UsageTracker::new();
        usage.record(
            "gpt-4o",
            Some(&ChatCompletionUsage {
                prompt_tokens: Some(10),
                completion_tokens: Some(5),
                total_tokens: Some(15),
            }),
        );
        usage.record("gpt-4o-mini", None);

        let summary = render_summary(&state, &usage.get_usage_stats());
        assert!(summary.contains("Company:   Acme"));
        assert!(summary.contains("Text file: outputs/Acme_Dev_tailored.txt"));
        assert!(summary.contains("not generated"));
        assert!(summary.contains("condensing recommended"));
        assert!(summary.contains("Model requests: 2"));
        assert!(summary.contains("gpt-4o: 1 requests, 15 tokens"));
        assert!(summary.contains("gpt-4o-mini: 1 requests, tokens not reported"));
    }
}
