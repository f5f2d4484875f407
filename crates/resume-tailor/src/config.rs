use std::path::PathBuf;

use crate::error::AppError;

const DEFAULT_CV_PATH: &str = "literature/CV.pdf";
const DEFAULT_GUIDE_PATH: &str = "literature/How to write an excellent Cover Letter.pdf";

/// Application configuration loaded explicitly from environment variables.
///
/// A `.env` file in the working directory is honoured. Connection settings for the
/// chat endpoint live in `OpenAiClientConfig`; this struct holds everything else.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model used by the generation stages.
    pub model: String,
    pub temperature: f32,
    /// Lightweight model used only for company-name extraction.
    pub extraction_model: String,
    pub cv_path: PathBuf,
    pub guide_path: PathBuf,
    /// Directory holding the persisted LanceDB index.
    pub index_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Credential for the secondary scraping provider. `None` disables the fallback.
    pub brightdata_api_key: Option<String>,
    pub brightdata_zone: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (defaults in parentheses):
    /// - `TAILOR_MODEL` (gpt-4o), `TAILOR_TEMPERATURE` (0.4)
    /// - `TAILOR_EXTRACTION_MODEL` (gpt-4o-mini)
    /// - `TAILOR_CV_PATH`, `TAILOR_GUIDE_PATH`: source documents under `literature/`
    /// - `TAILOR_INDEX_DIR` (vector_index), `TAILOR_OUTPUT_DIR` (outputs)
    /// - `BRIGHTDATA_API_KEY`, `BRIGHTDATA_ZONE` (ai_agent2)
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let temperature = match std::env::var("TAILOR_TEMPERATURE") {
            Ok(raw) => raw.trim().parse::<f32>().map_err(|_| {
                AppError::Config(format!("TAILOR_TEMPERATURE must be a number, got {raw:?}"))
            })?,
            Err(_) => 0.4,
        };
        if !(0.0..=2.0).contains(&temperature) {
            return Err(AppError::Config(format!(
                "TAILOR_TEMPERATURE must be between 0 and 2, got {temperature}"
            )));
        }

        Ok(Self {
            model: env_or("TAILOR_MODEL", "gpt-4o"),
            temperature,
            extraction_model: env_or("TAILOR_EXTRACTION_MODEL", "gpt-4o-mini"),
            cv_path: env_or("TAILOR_CV_PATH", DEFAULT_CV_PATH).into(),
            guide_path: env_or("TAILOR_GUIDE_PATH", DEFAULT_GUIDE_PATH).into(),
            index_dir: env_or("TAILOR_INDEX_DIR", "vector_index").into(),
            output_dir: env_or("TAILOR_OUTPUT_DIR", "outputs").into(),
            brightdata_api_key: std::env::var("BRIGHTDATA_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            brightdata_zone: env_or("BRIGHTDATA_ZONE", "ai_agent2"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
