/// Output writer: one text file with every generated section, plus a flowed PDF of the
/// résumé sections. PDF problems never block the text file.
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use tracing::{info, warn};

use crate::error::AppError;
use crate::model::SavedOutputs;

const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const MAX_FILENAME_CHARS: usize = 50;
const DEFAULT_POSITION: &str = "Position";
const RULE: &str = "================================================================================";

/// Make `name` safe to use as a file-name component.
///
/// Invalid characters become `_`, the result is cut to 50 characters and stripped of
/// leading/trailing dots and spaces. An empty result becomes `"Unknown"`.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if INVALID_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .take(MAX_FILENAME_CHARS)
        .collect();
    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        "Unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// First plausible title line among the first ten, skipping URLs, dates and labels.
pub fn extract_position_title(job_description: &str) -> String {
    const SKIP: &[&str] = &["http", "www", "posted", "date", "company", "location"];

    job_description
        .lines()
        .take(10)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .find(|l| {
            let len = l.chars().count();
            let lower = l.to_lowercase();
            len > 5 && len < 100 && !SKIP.iter().any(|w| lower.contains(w))
        })
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_POSITION.to_string())
}

/// Everything the generation stages produced.
#[derive(Debug, Clone, Copy)]
pub struct GeneratedSections<'a> {
    pub keywords_analysis: &'a str,
    pub tailored_summary: &'a str,
    pub tailored_skills: &'a str,
    pub tailored_experience: &'a str,
    pub tailored_title: &'a str,
    pub length_check: &'a str,
    pub cover_letter: &'a str,
    pub interest_answer: &'a str,
}

pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_all_outputs(
        &self,
        company_name: &str,
        job_description: &str,
        sections: &GeneratedSections<'_>,
    ) -> Result<SavedOutputs, AppError> {
        self.save_at(Local::now(), company_name, job_description, sections)
    }

    fn save_at(
        &self,
        now: DateTime<Local>,
        company_name: &str,
        job_description: &str,
        sections: &GeneratedSections<'_>,
    ) -> Result<SavedOutputs, AppError> {
        std::fs::create_dir_all(&self.dir)?;

        let position = extract_position_title(job_description);
        let stem = format!(
            "{}_{}_{}",
            sanitize_filename(company_name),
            sanitize_filename(&position),
            now.format("%Y%m%d_%H%M%S")
        );

        let text_file = self.dir.join(format!("{stem}_tailored.txt"));
        let generated_at = now.format("%Y-%m-%d %H:%M:%S").to_string();
        std::fs::write(
            &text_file,
            render_text(company_name, &position, &generated_at, sections),
        )?;
        info!(path = %text_file.display(), "text output saved");

        let pdf_path = self.dir.join(format!("{stem}_CV.pdf"));
        let pdf_file = match write_cv_pdf(&pdf_path, sections) {
            Ok(()) => {
                info!(path = %pdf_path.display(), "pdf output saved");
                Some(pdf_path)
            }
            Err(e) => {
                warn!(error = %e, "pdf generation failed, text output is still complete");
                None
            }
        };

        Ok(SavedOutputs {
            text_file,
            pdf_file,
            position,
        })
    }
}

fn render_text(
    company_name: &str,
    position: &str,
    generated_at: &str,
    s: &GeneratedSections<'_>,
) -> String {
    let mut out = format!(
        "{RULE}\nTAILORED RESUME AND COVER LETTER\n{RULE}\n\
         Company: {company_name}\nPosition: {position}\nGenerated: {generated_at}\n{RULE}\n"
    );
    let sections = [
        ("KEYWORDS ANALYSIS", s.keywords_analysis),
        ("PROFESSIONAL TITLE & SPECIALIZATION", s.tailored_title),
        ("PROFESSIONAL SUMMARY", s.tailored_summary),
        ("SKILLS", s.tailored_skills),
        ("EXPERIENCE BULLETS", s.tailored_experience),
        ("ONE-PAGE LENGTH CHECK", s.length_check),
        ("COVER LETTER", s.cover_letter),
        ("WHY ARE YOU INTERESTED IN THIS POSITION?", s.interest_answer),
    ];
    for (heading, body) in sections {
        out.push_str(&format!("\n{RULE}\n{heading}\n{RULE}\n{}\n", body.trim_end()));
    }
    out.push_str(&format!("\n{RULE}\nEND OF DOCUMENT\n{RULE}\n"));
    out
}

// US letter, half-inch margins.
const PAGE_WIDTH: f32 = 215.9;
const PAGE_HEIGHT: f32 = 279.4;
const MARGIN: f32 = 12.7;
const PT_TO_MM: f32 = 0.3528;

const TITLE_SIZE: f32 = 14.0;
const HEADING_SIZE: f32 = 11.0;
const BODY_SIZE: f32 = 10.0;
/// Conservative Helvetica line capacity at body size across the printable width.
const BODY_WRAP_CHARS: usize = 95;
const TITLE_WRAP_CHARS: usize = 70;

fn pdf_error(e: impl std::fmt::Display) -> AppError {
    AppError::PdfGenerationFailure(e.to_string())
}

fn write_cv_pdf(path: &Path, s: &GeneratedSections<'_>) -> Result<(), AppError> {
    let (doc, page, layer) =
        PdfDocument::new("Tailored CV", Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?;
    let first_layer = doc.get_page(page).get_layer(layer);

    let mut cursor = PdfCursor {
        doc: &doc,
        layer: first_layer,
        y: PAGE_HEIGHT - MARGIN,
    };

    for line in s.tailored_title.lines().map(pdf_safe) {
        for wrapped in textwrap::wrap(line.trim(), TITLE_WRAP_CHARS) {
            cursor.centered(&wrapped, TITLE_SIZE, &bold);
        }
    }
    cursor.gap(2.5);

    for (heading, body) in [
        ("PROFESSIONAL SUMMARY", s.tailored_summary),
        ("SKILLS", s.tailored_skills),
        ("EXPERIENCE", s.tailored_experience),
    ] {
        cursor.gap(2.0);
        cursor.line(heading, HEADING_SIZE, &bold);
        cursor.gap(1.0);
        for line in body.lines().map(pdf_safe) {
            if line.trim().is_empty() {
                cursor.gap(1.5);
                continue;
            }
            for wrapped in textwrap::wrap(&line, BODY_WRAP_CHARS) {
                cursor.line(&wrapped, BODY_SIZE, &regular);
            }
        }
    }

    let file = File::create(path).map_err(pdf_error)?;
    doc.save(&mut BufWriter::new(file)).map_err(pdf_error)
}

struct PdfCursor<'d> {
    doc: &'d PdfDocumentReference,
    layer: PdfLayerReference,
    /// Baseline of the next line, in mm from the bottom edge.
    y: f32,
}

impl PdfCursor<'_> {
    fn advance(&mut self, size: f32) {
        let line_height = size * PT_TO_MM * 1.3;
        if self.y - line_height < MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }
        self.y -= line_height;
    }

    fn line(&mut self, text: &str, size: f32, font: &IndirectFontRef) {
        self.advance(size);
        self.layer.use_text(text, size, Mm(MARGIN), Mm(self.y), font);
    }

    fn centered(&mut self, text: &str, size: f32, font: &IndirectFontRef) {
        self.advance(size);
        // Helvetica averages roughly half an em per glyph.
        let width = text.chars().count() as f32 * size * 0.5 * PT_TO_MM;
        let x = ((PAGE_WIDTH - width) / 2.0).max(MARGIN);
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }
}

/// Reduce text to what the builtin PDF fonts can render: common typographic characters
/// map to ASCII, markdown emphasis markers are dropped, anything else non-ASCII is removed.
fn pdf_safe(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.replace("**", "").chars() {
        match c {
            '•' | '●' | '▪' | '◦' | '–' | '—' | '‑' => out.push('-'),
            '‘' | '’' | '′' => out.push('\''),
            '“' | '”' | '″' => out.push('"'),
            '…' => out.push_str("..."),
            '→' => out.push_str("->"),
            '\t' => out.push_str("    "),
            '\u{a0}' => out.push(' '),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TECHCORP_JD: &str = "\nSenior Python Developer\nTechCorp Solutions\n\nAbout the Role:\n\
        We're looking for a Senior Python Developer to join our growing team.\n";

    fn sections<'a>() -> GeneratedSections<'a> {
        GeneratedSections {
            keywords_analysis: "Python, Django",
            tailored_summary: "• Eight years of Python — mostly Django.",
            tailored_skills: "Programming: Python, SQL",
            tailored_experience: "- Cut query latency by 90%",
            tailored_title: "Senior Python Developer",
            length_check: "Length assessment: OK",
            cover_letter: "Dear hiring team,",
            interest_answer: "Because of the mission.",
        }
    }

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn test_sanitize_filename() {
        let s = sanitize_filename("Acme/Co:Ltd*");
        assert_eq!(s, "Acme_Co_Ltd_");
        assert!(!s.contains(INVALID_FILENAME_CHARS));

        assert_eq!(sanitize_filename(""), "Unknown");
        assert_eq!(sanitize_filename(" . "), "Unknown");
        assert_eq!(sanitize_filename(" .hidden. "), "hidden");
        assert_eq!(sanitize_filename(&"x".repeat(80)).chars().count(), 50);
        assert_eq!(sanitize_filename("<>:\"/\\|?*"), "_________");
    }

    #[test]
    fn test_sanitize_truncates_before_trimming() {
        let name = format!("{}.{}", "a".repeat(49), "bbbb");
        assert_eq!(sanitize_filename(&name), "a".repeat(49));
    }

    #[test]
    fn test_extract_position_title() {
        assert_eq!(extract_position_title(TECHCORP_JD), "Senior Python Developer");
        assert_eq!(
            extract_position_title("https://x.io/jobs/1\nPosted 3 days ago\nStaff Engineer\n"),
            "Staff Engineer"
        );
        assert_eq!(extract_position_title("Location: Remote\nCEO"), DEFAULT_POSITION);
        assert_eq!(extract_position_title(""), DEFAULT_POSITION);
    }

    #[test]
    fn test_pdf_safe() {
        assert_eq!(pdf_safe("• **Led** team — “fast”…"), "- Led team - \"fast\"...");
        assert_eq!(pdf_safe("naïve 日本"), "nave ");
    }

    #[test]
    fn test_save_writes_text_and_pdf() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(tmp.path().join("outputs"));
        let saved = writer
            .save_at(fixed_time(), "TechCorp Solutions", TECHCORP_JD, &sections())
            .unwrap();

        assert_eq!(saved.position, "Senior Python Developer");
        assert_eq!(
            saved.text_file.file_name().unwrap().to_str().unwrap(),
            "TechCorp Solutions_Senior Python Developer_20240305_140709_tailored.txt"
        );
        let text = std::fs::read_to_string(&saved.text_file).unwrap();
        assert!(text.contains("Company: TechCorp Solutions"));
        assert!(text.contains("Generated: 2024-03-05 14:07:09"));
        assert!(text.contains("COVER LETTER\n"));
        assert!(text.contains("Dear hiring team,"));
        assert!(text.contains("Length assessment: OK"));

        let pdf = saved.pdf_file.expect("pdf should be written");
        assert!(pdf.to_str().unwrap().ends_with("_20240305_140709_CV.pdf"));
        let bytes = std::fs::read(&pdf).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_long_content_paginates() {
        let long = "Built and shipped a thing that mattered. ".repeat(400);
        let mut s = sections();
        s.tailored_experience = &long;
        let tmp = tempfile::tempdir().unwrap();
        let saved = OutputWriter::new(tmp.path())
            .save_at(fixed_time(), "Acme", "Staff Engineer", &s)
            .unwrap();
        assert!(saved.pdf_file.is_some());
    }

    #[test]
    fn test_pdf_failure_keeps_text_output() {
        let tmp = tempfile::tempdir().unwrap();
        // Occupy the PDF path with a directory so the file cannot be created.
        std::fs::create_dir_all(
            tmp.path()
                .join("TechCorp Solutions_Senior Python Developer_20240305_140709_CV.pdf"),
        )
        .unwrap();

        let saved = OutputWriter::new(tmp.path())
            .save_at(fixed_time(), "TechCorp Solutions", TECHCORP_JD, &sections())
            .unwrap();
        assert!(saved.pdf_file.is_none());
        assert!(saved.text_file.is_file());
    }
}
