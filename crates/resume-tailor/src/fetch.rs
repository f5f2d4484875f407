/// Job-posting fetcher.
///
/// Sources are tried in order and the first one that yields a usable posting wins. The
/// default chain is a direct HTTP scrape followed by a scraping API. A result shorter
/// than `MIN_POSTING_CHARS` counts as a failed parse, not a short posting.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppError;

pub const MIN_POSTING_CHARS: usize = 100;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const DIRECT_TIMEOUT: Duration = Duration::from_secs(10);
const API_TIMEOUT: Duration = Duration::from_secs(30);
const SCRAPING_API_ENDPOINT: &str = "https://api.brightdata.com/request";

/// Elements whose text never belongs to the posting body.
const EXCLUDED_TAGS: &[&str] = &["script", "style", "nav", "header", "footer", "noscript", "template"];

#[async_trait]
pub trait PageSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, url: &str) -> Result<String, AppError>;
}

pub struct JobPostingFetcher {
    sources: Vec<Arc<dyn PageSource>>,
}

impl JobPostingFetcher {
    pub fn new(sources: Vec<Arc<dyn PageSource>>) -> Self {
        Self { sources }
    }

    /// Direct scrape, then the scraping API.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Ok(Self::new(vec![
            Arc::new(DirectPageSource::new()?),
            Arc::new(ScrapingApiSource::new(
                config.brightdata_api_key.clone(),
                config.brightdata_zone.clone(),
            )?),
        ]))
    }

    /// Fetch posting text, surfacing the last source's error if every source fails.
    pub async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let mut last_error = None;
        for source in &self.sources {
            match source.fetch(url).await {
                Ok(text) => {
                    info!(source = source.name(), chars = text.chars().count(), "job posting fetched");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "job posting source failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| AppError::FetchFailure("no fetch sources configured".to_string())))
    }
}

/// Check that `raw` is an absolute http(s) URL.
pub fn validate_job_url(raw: &str) -> Result<url::Url, String> {
    let parsed = url::Url::parse(raw.trim()).map_err(|e| format!("invalid URL: {e}"))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        "http" | "https" => Err("URL has no host".to_string()),
        other => Err(format!("unsupported URL scheme {other:?}, expected http or https")),
    }
}

/// Plain HTTP GET with a browser user agent, parsed locally.
pub struct DirectPageSource {
    http: reqwest::Client,
}

impl DirectPageSource {
    pub fn new() -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(DIRECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PageSource for DirectPageSource {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let fail = |e: reqwest::Error| AppError::FetchFailure(e.to_string());
        let html = self
            .http
            .get(url)
            .send()
            .await
            .map_err(fail)?
            .error_for_status()
            .map_err(fail)?
            .text()
            .await
            .map_err(fail)?;

        let text = extract_posting_text(&html);
        let chars = text.chars().count();
        if chars < MIN_POSTING_CHARS {
            return Err(AppError::FetchFailure(format!(
                "extracted text too short ({chars} characters), page likely needs rendering"
            )));
        }
        Ok(text)
    }
}

/// Scraping API fallback. Needs `BRIGHTDATA_API_KEY`.
pub struct ScrapingApiSource {
    http: reqwest::Client,
    api_key: Option<String>,
    zone: String,
    endpoint: String,
}

impl ScrapingApiSource {
    pub fn new(api_key: Option<String>, zone: String) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            api_key,
            zone,
            endpoint: SCRAPING_API_ENDPOINT.to_string(),
        })
    }

    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl PageSource for ScrapingApiSource {
    fn name(&self) -> &'static str {
        "scraping_api"
    }

    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let Some(api_key) = &self.api_key else {
            return Err(AppError::SecondaryFetchFailure(
                "BRIGHTDATA_API_KEY is not set; add it to the environment or .env to enable \
                 the scraping API fallback"
                    .to_string(),
            ));
        };

        let joiner = if url.contains('?') { '&' } else { '?' };
        let payload = json!({
            "zone": self.zone,
            "url": format!("{url}{joiner}brd_json=1"),
            "format": "raw",
        });

        let fail = |e: reqwest::Error| AppError::SecondaryFetchFailure(e.to_string());
        let body = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(fail)?
            .error_for_status()
            .map_err(fail)?
            .text()
            .await
            .map_err(fail)?;

        let text = text_from_api_body(&body);
        let chars = text.chars().count();
        if chars < MIN_POSTING_CHARS {
            return Err(AppError::SecondaryFetchFailure(format!(
                "scraping API returned insufficient text ({chars} characters)"
            )));
        }
        Ok(text)
    }
}

/// Text from a scraping API response: the `text` field when present, otherwise every
/// string-valued field joined by spaces. Non-object bodies are used as-is.
fn text_from_api_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => {
            if let Some(text) = map.get("text").and_then(Value::as_str).filter(|t| !t.is_empty()) {
                return text.to_string();
            }
            map.values()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ")
        }
        Ok(Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => body.to_string(),
    }
}

/// Visible text of the most specific posting container, one trimmed line per text run.
pub fn extract_posting_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = ContainerSelectors::new().pick(&document);

    let mut lines = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|e| EXCLUDED_TAGS.contains(&e.value().name()));
        if hidden {
            continue;
        }
        lines.extend(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        );
    }
    lines.join("\n")
}

struct ContainerSelectors {
    div: Selector,
    section: Selector,
    article: Selector,
    main: Selector,
    body: Selector,
}

impl ContainerSelectors {
    fn new() -> Self {
        Self {
            div: Selector::parse("div").expect("div selector"),
            section: Selector::parse("section").expect("section selector"),
            article: Selector::parse("article").expect("article selector"),
            main: Selector::parse("main").expect("main selector"),
            body: Selector::parse("body").expect("body selector"),
        }
    }

    /// Most likely posting container, falling back to the body or the whole document.
    fn pick<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        let visible = |e: &ElementRef<'a>| !inside_excluded(e);
        let attr_contains = |sel: &Selector, attr: &'static str, needle: &'static str| {
            document.select(sel).filter(visible).find(move |e| {
                e.value()
                    .attr(attr)
                    .is_some_and(|v| v.to_lowercase().contains(needle))
            })
        };

        attr_contains(&self.div, "class", "job-description")
            .or_else(|| attr_contains(&self.div, "id", "job-description"))
            .or_else(|| attr_contains(&self.div, "class", "description"))
            .or_else(|| attr_contains(&self.section, "class", "job"))
            .or_else(|| document.select(&self.article).find(visible))
            .or_else(|| document.select(&self.main).find(visible))
            .or_else(|| document.select(&self.body).next())
            .unwrap_or_else(|| document.root_element())
    }
}

fn inside_excluded(element: &ElementRef<'_>) -> bool {
    std::iter::once(**element)
        .chain(element.ancestors())
        .filter_map(ElementRef::wrap)
        .any(|e| EXCLUDED_TAGS.contains(&e.value().name()))
}
