use log::{info, warn};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::errors::AppError;
use crate::services::docx::DocxDocument;
use crate::services::word_extraction::{analyze_tags, extract_content, ExtractedContent, TagAnalysis};

pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Stored form of an article: the extracted blocks plus provenance.
#[derive(Serialize, Debug, Clone)]
pub struct ArticleJson {
    #[serde(flatten)]
    pub extracted: ExtractedContent,
    pub tag_analysis: TagAnalysis,
    pub file_name: String,
    pub cloud_url: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct ProcessedArticle {
    pub title: String,
    pub url: String,
    pub json_content: ArticleJson,
    pub word_content: String,
    pub file_name: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct DocumentStatistics {
    pub file_name: String,
    pub file_size_bytes: usize,
    pub paragraphs_count: usize,
    pub text_length: usize,
    pub word_count: usize,
    pub tag_analysis: TagAnalysis,
}

fn chapter_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+\s+").expect("valid regex"))
}

/// "1.1 Installation und erste Schritte.docx" -> "Installation und erste Schritte"
pub fn title_from_file_name(file_name: &str) -> String {
    let stem = file_name.replace(".docx", "");
    let title = chapter_prefix_re().replace(&stem, "");
    if title.is_empty() {
        stem
    } else {
        title.into_owned()
    }
}

pub fn process_word_document(bytes: &[u8], file_name: &str, cloud_url: &str) -> Result<ProcessedArticle, AppError> {
    let doc = DocxDocument::from_bytes(bytes)?;
    let word_content = doc.text();

    let json_content = ArticleJson {
        extracted: extract_content(&word_content),
        tag_analysis: analyze_tags(&word_content),
        file_name: file_name.to_string(),
        cloud_url: cloud_url.to_string(),
    };

    info!(
        "Processed Word document {} ({} blocks)",
        file_name,
        json_content.extracted.content.len()
    );

    Ok(ProcessedArticle {
        title: title_from_file_name(file_name),
        url: cloud_url.to_string(),
        json_content,
        word_content,
        file_name: file_name.to_string(),
    })
}

/// A document is valid when it can be opened and has at least one non-empty paragraph.
pub fn validate_word_document(bytes: &[u8], file_name: &str) -> bool {
    match DocxDocument::from_bytes(bytes) {
        Ok(doc) if doc.has_content() => true,
        Ok(_) => {
            warn!("Word document {} has no content", file_name);
            false
        }
        Err(e) => {
            warn!("Word document {} is invalid: {}", file_name, e);
            false
        }
    }
}

pub fn document_statistics(bytes: &[u8], file_name: &str) -> Result<DocumentStatistics, AppError> {
    let doc = DocxDocument::from_bytes(bytes)?;
    let text = doc.text();

    Ok(DocumentStatistics {
        file_name: file_name.to_string(),
        file_size_bytes: bytes.len(),
        paragraphs_count: doc.paragraphs.len(),
        text_length: text.chars().count(),
        word_count: text.split_whitespace().count(),
        tag_analysis: analyze_tags(&text),
    })
}

/// Checks uploaded bytes with `infer`. A .docx is a zip archive, so both
/// the Word type and a plain zip with a .docx name are accepted.
pub fn is_word_upload(bytes: &[u8], file_name: &str) -> bool {
    match infer::get(bytes) {
        Some(kind) if kind.mime_type() == DOCX_MIME => true,
        Some(kind) if kind.mime_type() == "application/zip" => file_name.to_lowercase().ends_with(".docx"),
        _ => false,
    }
}
