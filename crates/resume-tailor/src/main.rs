mod cascade;
mod chunker;
mod cli;
mod company;
mod config;
mod error;
mod fetch;
mod index;
mod model;
mod output;
mod pipeline;
mod prompts;
mod stage;
#[cfg(test)]
mod testing;
mod tools;

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tailor_common::chat::{ChatModel, OpenAiChatModel};
use tailor_common::embedding::Embedder;
use tailor_common::openai::{OpenAiClient, OpenAiClientConfig};
use tailor_common::usage::UsageTracker;

use cli::{Args, Prompter};
use company::CompanyResolver;
use config::Config;
use fetch::JobPostingFetcher;
use index::{RetrievalIndex, SourceDocuments};
use model::SourceType;
use output::OutputWriter;
use pipeline::Orchestrator;
use stage::StageRunner;
use tools::RetrievalTools;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }

    tokio::select! {
        result = run(args, config) => result,
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted. No files were saved.");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    cli::print_banner();

    let fetcher = Arc::new(JobPostingFetcher::from_config(&config)?);
    if config.brightdata_api_key.is_none() {
        info!("BRIGHTDATA_API_KEY not set, the scraping API fallback is disabled");
    }

    let prompter = Prompter::new(args, fetcher, tokio::runtime::Handle::current());
    let Some(request) = tokio::task::spawn_blocking(move || prompter.gather()).await?? else {
        println!("Cancelled. No files were saved.");
        std::process::exit(1);
    };

    let openai_config = OpenAiClientConfig::from_env()?;
    if openai_config.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set, requests are sent without credentials");
    }
    info!(
        base_url = %openai_config.base_url,
        timeout_secs = openai_config.timeout.as_secs(),
        max_retries = openai_config.retry.max_retries,
        model = %config.model,
        extraction_model = %config.extraction_model,
        "openai client configured"
    );
    let client = OpenAiClient::new(openai_config)?;
    let usage = UsageTracker::new();
    let generator: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::new(
        client.clone(),
        config.model.clone(),
        Some(config.temperature),
        usage.clone(),
    ));
    let extractor: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::new(
        client,
        config.extraction_model.clone(),
        Some(0.0),
        usage.clone(),
    ));

    info!("loading embedding model");
    let embedder = Arc::new(Embedder::new().await?);
    let sources = SourceDocuments {
        cv: config.cv_path.clone(),
        guide: config.guide_path.clone(),
    };
    let index = RetrievalIndex::build_or_load(&config.index_dir, &sources, embedder).await?;
    for source_type in SourceType::ALL {
        let chunks = index.count_for(source_type).await?;
        info!(source = %source_type, chunks, "indexed chunks");
    }
    info!(chunks = index.chunk_count(), "retrieval index ready");

    let tools = RetrievalTools::new(Arc::new(index))?;
    let orchestrator = Orchestrator::new(
        StageRunner::new(generator, tools),
        CompanyResolver::new(extractor),
        OutputWriter::new(&config.output_dir),
    )
    .with_company_override(request.company);

    println!();
    let state = orchestrator
        .run_with_progress(request.input.into_state(), cli::print_progress)
        .await?;

    println!("{}", cli::render_summary(&state, &usage.get_usage_stats()));
    info!(output_dir = %orchestrator.output_dir().display(), "run complete");
    Ok(())
}
