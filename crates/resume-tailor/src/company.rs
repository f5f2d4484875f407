/// Company-name resolver.
///
/// A lightweight model gets the first shot; if it declines or fails, a cascade of text
/// heuristics runs over the URL and the posting. Every result is filename-safe because
/// the name ends up in output file names. When everything declines the resolver returns
/// `UNKNOWN_COMPANY` instead of an error.
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{info, warn};

use crate::cascade::Cascade;
use crate::output::sanitize_filename;
use tailor_common::chat::ChatModel;
use tailor_common::openai::Message;

pub const UNKNOWN_COMPANY: &str = "Unknown_Company";

/// Characters of posting text shown to the extraction model.
const LLM_SAMPLE_CHARS: usize = 1000;
const LABELED_SCAN_LINES: usize = 30;
const HEADER_SCAN_LINES: usize = 10;
const SAMPLE_LINES: usize = 50;

/// Hosts that say nothing about the employer.
const JOB_BOARDS: &[&str] = &[
    "linkedin.com",
    "indeed.com",
    "glassdoor.com",
    "monster.com",
    "ziprecruiter.com",
    "careerbuilder.com",
    "simplyhired.com",
    "lever.co",
    "greenhouse.io",
    "workday.com",
    "icims.com",
];

const HOST_PREFIXES: &[&str] = &["www.", "jobs.", "careers."];

const TITLE_WORDS: &[&str] = &[
    "engineer",
    "developer",
    "manager",
    "analyst",
    "specialist",
    "designer",
    "director",
    "scientist",
    "architect",
    "lead",
    "senior",
    "junior",
    "intern",
];

const NON_NAME_PREFIXES: &[&str] = &[
    "http", "www", "posted", "date", "location", "salary", "benefits", "apply",
];

const LOCATION_HINTS: &[&str] = &[
    "location:", "city", "remote", "hybrid", ", ca", ", ny", ", tx",
];

const STOPWORDS: &[&str] = &[
    "The",
    "This",
    "Our",
    "We",
    "Are",
    "You",
    "Your",
    "Will",
    "About",
    "Join",
    "Work",
    "Team",
    "Role",
    "Job",
    "Position",
    "Requirements",
    "Responsibilities",
];

static AT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:at\s+|@\s*)([A-Z].*)$").expect("valid regex"));

static SENTENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)join\s+([A-Z][A-Za-z\s&]{2,40}?)(?:\s+as|\s+to|\s+and)",
        r"(?i)work\s+(?:at|for)\s+([A-Z][A-Za-z\s&]{2,40}?)(?:\s+as|\s+to|\s+and|\s+is)",
        r"(?i)([A-Z][A-Za-z\s&]{2,40}?)\s+is\s+(?:looking|hiring|seeking)",
        r"(?i)welcome\s+to\s+([A-Z][A-Za-z\s&]{2,40}?)[.!]",
        r"(?i)about\s+([A-Z][A-Za-z\s&]{2,40}?)(?:\s+About|\s+Our|\s+The)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static CAPITALIZED_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][A-Za-z]{2,}\b").expect("valid regex"));

/// What the heuristics look at.
pub struct Posting<'a> {
    pub text: &'a str,
    pub url: Option<&'a str>,
}

pub struct CompanyResolver {
    model: Arc<dyn ChatModel>,
}

impl CompanyResolver {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Resolve a company name for the posting. Never fails.
    pub async fn resolve(&self, text: &str, url: Option<&str>) -> String {
        let from_model = self.extract_with_llm(text, url).await;
        let posting = Posting { text, url };

        let cascade = Cascade::<Posting<'_>, String>::new()
            .step("llm", |_| from_model.clone())
            .step("url_domain", |p| p.url.and_then(company_from_url))
            .step("labeled_lines", |p| company_from_lines(p.text))
            .step("sentence_pattern", |p| company_from_sentences(p.text))
            .step("frequency", |p| company_from_frequency(p.text));

        match cascade.resolve(&posting) {
            Some((step, name)) => {
                let name = sanitize_filename(&name);
                info!(step, company = %name, "company name resolved");
                name
            }
            None => {
                warn!("could not determine company name, using fallback");
                UNKNOWN_COMPANY.to_string()
            }
        }
    }

    async fn extract_with_llm(&self, text: &str, url: Option<&str>) -> Option<String> {
        let sample: String = text.chars().take(LLM_SAMPLE_CHARS).collect();
        let mut prompt = format!(
            "Extract the company name from this job posting. Return ONLY the company name, \
             nothing else.\nIf you cannot find a company name, return \"NONE\".\n\n\
             Job posting:\n{sample}"
        );
        if let Some(url) = url {
            prompt.push_str(&format!("\n\nURL: {url}"));
        }

        match self.model.invoke(&[Message::user(prompt)], None).await {
            Ok(reply) => accept_llm_answer(&reply.content),
            Err(e) => {
                warn!(error = %e, "model company extraction failed");
                None
            }
        }
    }
}

fn accept_llm_answer(raw: &str) -> Option<String> {
    let name = raw.trim();
    let upper = name.to_uppercase();
    let len = name.chars().count();
    let plausible = !name.is_empty()
        && upper != "NONE"
        && upper != "UNKNOWN"
        && len > 3
        && len < 100
        && !name.starts_with("I ")
        && !name.starts_with("The ");
    plausible.then(|| name.to_string())
}

/// Employer name from the posting URL's host, unless the host is a generic job board.
pub fn company_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw.trim()).ok()?;
    let mut host = parsed.host_str()?.to_lowercase();

    if JOB_BOARDS.iter().any(|board| host.contains(board)) {
        return None;
    }
    while let Some(rest) = HOST_PREFIXES.iter().find_map(|p| host.strip_prefix(p)) {
        host = rest.to_string();
    }

    let label = host.split('.').next()?;
    let name = title_case(&label.replace(['-', '_'], " "));
    (name.chars().count() > 3).then_some(name)
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Line-oriented checks over the head of the posting, applied line by line in order:
/// a `Company:` style label, an `at X` / `@X` lead-in, or a short capitalized line that
/// is followed by a location line.
pub fn company_from_lines(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();

    for (i, line) in lines.iter().take(LABELED_SCAN_LINES).enumerate() {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();

        if ["company:", "company name:", "organization:"]
            .iter()
            .any(|label| lower.contains(label))
        {
            if let Some((_, rest)) = trimmed.split_once(':') {
                let candidate = rest.trim();
                if within(candidate, 3, 50) {
                    return Some(candidate.to_string());
                }
            }
        }

        if let Some(caps) = AT_LINE.captures(trimmed) {
            let candidate = caps[1].trim();
            let generic = candidate
                .split_whitespace()
                .any(|w| matches!(w.to_lowercase().as_str(), "the" | "this" | "our"));
            if within(candidate, 3, 50) && !generic {
                return Some(candidate.to_string());
            }
        }

        if i < HEADER_SCAN_LINES && looks_like_header_name(trimmed, &lower) {
            let next = lines.get(i + 1).map(|l| l.trim().to_lowercase());
            if next.is_some_and(|n| LOCATION_HINTS.iter().any(|hint| n.contains(hint))) {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

fn looks_like_header_name(trimmed: &str, lower: &str) -> bool {
    !trimmed.is_empty()
        && !TITLE_WORDS.iter().any(|w| lower.contains(w))
        && trimmed.chars().next().is_some_and(char::is_uppercase)
        && within(trimmed, 3, 50)
        && !trimmed.ends_with(':')
        && !NON_NAME_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Phrases such as "join X as", "X is hiring" or "welcome to X." in the first lines.
pub fn company_from_sentences(text: &str) -> Option<String> {
    let sample = head_sample(text);
    SENTENCE_PATTERNS.iter().find_map(|re| {
        let caps = re.captures(&sample)?;
        let candidate = caps.get(1)?.as_str().trim();
        within(candidate, 3, 100).then(|| candidate.to_string())
    })
}

/// Most frequent capitalized non-stopword in the first lines, if it repeats.
pub fn company_from_frequency(text: &str) -> Option<String> {
    let sample = head_sample(text);
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (order, m) in CAPITALIZED_WORD.find_iter(&sample).enumerate() {
        let word = m.as_str();
        if STOPWORDS.contains(&word) {
            continue;
        }
        counts.entry(word).or_insert((0, order)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> =
        counts.into_iter().map(|(w, (n, first))| (w, n, first)).collect();
    // Highest count first, earliest occurrence breaks ties.
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(3)
        .find(|(word, count, _)| *count >= 2 && within(word, 3, 30))
        .map(|(word, _, _)| word.to_string())
}

fn head_sample(text: &str) -> String {
    text.lines().take(SAMPLE_LINES).collect::<Vec<_>>().join(" ")
}

/// Strictly between `min` and `max` characters.
fn within(s: &str, min: usize, max: usize) -> bool {
    let n = s.chars().count();
    n > min && n < max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingModel, ScriptedModel};
    use tailor_common::chat::AssistantReply;

    fn scripted(answer: &str) -> CompanyResolver {
        CompanyResolver::new(Arc::new(ScriptedModel::new(vec![AssistantReply::text(
            answer,
        )])))
    }

    fn offline() -> CompanyResolver {
        CompanyResolver::new(Arc::new(FailingModel))
    }

    fn is_filename_safe(name: &str) -> bool {
        !name.is_empty()
            && !name.contains(['<', '>', ':', '"', '/', '\\', '|', '?', '*'])
            && name.chars().count() <= 50
            && !name.starts_with(['.', ' '])
            && !name.ends_with(['.', ' '])
    }

    #[tokio::test]
    async fn test_model_answer_is_used() {
        let name = scripted("  Acme Robotics \n").resolve("whatever", None).await;
        assert_eq!(name, "Acme Robotics");
    }

    #[tokio::test]
    async fn test_model_answer_is_sanitized() {
        let name = scripted("Acme/Co:Ltd*").resolve("", None).await;
        assert_eq!(name, "Acme_Co_Ltd_");
    }

    #[tokio::test]
    async fn test_model_refusals_fall_through() {
        let text = "Company: Globex Corporation\nWe make things.";
        for answer in ["NONE", "unknown", "I could not find one", "The company", "Bo", ""] {
            assert_eq!(scripted(answer).resolve(text, None).await, "Globex Corporation");
        }
        assert_eq!(offline().resolve(text, None).await, "Globex Corporation");
    }

    #[tokio::test]
    async fn test_model_prompt_is_truncated_and_mentions_url() {
        let model = Arc::new(ScriptedModel::new(vec![AssistantReply::text("Acme Robotics")]));
        let resolver = CompanyResolver::new(Arc::clone(&model) as Arc<dyn ChatModel>);
        let text = "x".repeat(5000);
        resolver
            .resolve(&text, Some("https://acme.example/jobs/1"))
            .await;

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].tools_enabled);
        let prompt = &calls[0].messages[0].content;
        assert!(prompt.contains(&"x".repeat(1000)));
        assert!(!prompt.contains(&"x".repeat(1001)));
        assert!(prompt.ends_with("URL: https://acme.example/jobs/1"));
    }

    #[test]
    fn test_url_domain() {
        assert_eq!(
            company_from_url("https://careers.stripe.com/jobs/123").as_deref(),
            Some("Stripe")
        );
        assert_eq!(
            company_from_url("https://www.acme-robotics.io/careers").as_deref(),
            Some("Acme Robotics")
        );
        assert_eq!(company_from_url("https://ibm.com/jobs"), None);
        assert_eq!(company_from_url("not a url"), None);
    }

    #[test]
    fn test_job_board_urls_yield_nothing() {
        for url in [
            "https://www.linkedin.com/jobs/view/123",
            "https://boards.greenhouse.io/acme/jobs/1",
            "https://jobs.lever.co/acme/abc",
            "https://acme.wd5.myworkday.com/en-US/External/job/1",
            "https://www.indeed.com/viewjob?jk=1",
        ] {
            assert_eq!(company_from_url(url), None, "{url}");
        }
    }

    #[tokio::test]
    async fn test_job_board_url_falls_through_to_text() {
        let text = "Senior Engineer\nOrganization: Initech Systems\n";
        let name = offline()
            .resolve(text, Some("https://www.linkedin.com/jobs/view/1"))
            .await;
        assert_eq!(name, "Initech Systems");
    }

    #[test]
    fn test_at_lead_in() {
        assert_eq!(
            company_from_lines("Senior Engineer\nat Initech Systems\nRemote").as_deref(),
            Some("Initech Systems")
        );
        assert_eq!(
            company_from_lines("Backend Developer\n@Hooli").as_deref(),
            Some("Hooli")
        );
        // Lowercase continuations are prose, not names.
        assert_eq!(company_from_lines("attention to detail is key"), None);
        assert_eq!(company_from_lines("Data Analyst\nat The Office"), None);
    }

    #[test]
    fn test_header_line_followed_by_location() {
        assert_eq!(
            company_from_lines("Umbrella Labs\nRemote - US\nWe build things").as_deref(),
            Some("Umbrella Labs")
        );
        assert_eq!(
            company_from_lines("Vandelay Industries\nAustin, TX\n").as_deref(),
            Some("Vandelay Industries")
        );
        // Title lines are skipped even when a location follows.
        assert_eq!(company_from_lines("Senior Python Developer\nRemote"), None);
    }

    #[test]
    fn test_sentence_patterns() {
        assert_eq!(
            company_from_sentences("We build rockets.\nJoin Rocketdyne Labs as a staff engineer")
                .as_deref(),
            Some("Rocketdyne Labs")
        );
        assert_eq!(
            company_from_sentences("Welcome to Pied Piper! We compress.").as_deref(),
            Some("Pied Piper")
        );
        assert_eq!(company_from_sentences("nothing to see"), None);
    }

    #[test]
    fn test_frequency_heuristic() {
        let text = "Zorblax builds tools.\nZorblax values craft.\nThe Team is small.";
        assert_eq!(company_from_frequency(text).as_deref(), Some("Zorblax"));
        // Single mentions are not enough.
        assert_eq!(company_from_frequency("Zorblax builds tools."), None);
        assert_eq!(company_from_frequency("The The The Team Team"), None);
    }

    #[tokio::test]
    async fn test_adversarial_inputs_fall_back() {
        for text in ["", "   \n\n", "The This Our We\nAre You Your Will", "lowercase only text"] {
            let name = offline().resolve(text, None).await;
            assert_eq!(name, UNKNOWN_COMPANY, "{text:?}");
        }
    }

    #[tokio::test]
    async fn test_results_are_always_filename_safe() {
        let inputs = [
            ("Company: <Evil>/\"Corp\"|?*\n", None),
            ("", Some("https://www.a-b.c/")),
            ("...", None),
            ("Organization: ....Dots Inc....\n", None),
        ];
        for (text, url) in inputs {
            let name = offline().resolve(text, url).await;
            assert!(is_filename_safe(&name), "{name:?}");
        }
    }
}
