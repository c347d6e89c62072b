use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};

use crate::errors::AppError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Body paragraphs of a Word (OOXML) document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocxDocument {
    pub paragraphs: Vec<String>,
}

impl DocxDocument {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AppError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| AppError::BadRequest(format!("Invalid Word document: {}", e)))?;
        let mut part = archive
            .by_name(DOCUMENT_PART)
            .map_err(|_| AppError::BadRequest(format!("Invalid Word document: missing {}", DOCUMENT_PART)))?;
        let mut xml = String::new();
        part.read_to_string(&mut xml)
            .map_err(|e| AppError::BadRequest(format!("Invalid Word document: {}", e)))?;
        Self::from_document_xml(&xml)
    }

    /// Parses `word/document.xml`. Paragraphs inside tables and text boxes
    /// are not part of the body text.
    pub fn from_document_xml(xml: &str) -> Result<Self, AppError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut paragraphs = Vec::new();
        let mut current: Option<String> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| AppError::BadRequest(format!("Malformed document.xml: {}", e)))?;
            match event {
                Event::Start(e) => {
                    let name = e.local_name().as_ref().to_vec();
                    if name == b"p" && is_body_level(&stack) {
                        current = Some(String::new());
                    }
                    stack.push(name);
                }
                Event::Empty(e) => {
                    let name = e.local_name();
                    if let Some(text) = current.as_mut() {
                        if in_body_run(&stack) {
                            match name.as_ref() {
                                b"tab" => text.push('\t'),
                                b"br" | b"cr" => text.push('\n'),
                                _ => {}
                            }
                        }
                    }
                    if name.as_ref() == b"p" && is_body_level(&stack) {
                        paragraphs.push(String::new());
                    }
                }
                Event::Text(e) => {
                    if let Some(text) = current.as_mut() {
                        if stack.last().map(Vec::as_slice) == Some(b"t".as_slice()) && in_body_run(&stack[..stack.len() - 1]) {
                            let value = e
                                .unescape()
                                .map_err(|e| AppError::BadRequest(format!("Malformed document.xml: {}", e)))?;
                            text.push_str(&value);
                        }
                    }
                }
                Event::End(_) => {
                    let name = stack.pop();
                    if name.as_deref() == Some(b"p".as_slice()) && is_body_level(&stack) {
                        if let Some(text) = current.take() {
                            paragraphs.push(text);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Self { paragraphs })
    }

    /// Non-empty paragraphs, trimmed and joined with newlines.
    pub fn text(&self) -> String {
        self.paragraphs
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_content(&self) -> bool {
        self.paragraphs.iter().any(|p| !p.trim().is_empty())
    }
}

fn is_nested(stack: &[Vec<u8>]) -> bool {
    stack
        .iter()
        .any(|n| n.as_slice() == b"tbl" || n.as_slice() == b"txbxContent" || n.as_slice() == b"p")
}

fn is_body_level(stack: &[Vec<u8>]) -> bool {
    !is_nested(stack)
}

/// The innermost element is a run that belongs to a body paragraph.
fn in_body_run(stack: &[Vec<u8>]) -> bool {
    if stack.last().map(Vec::as_slice) != Some(b"r".as_slice()) {
        return false;
    }
    let paragraphs = stack.iter().filter(|n| n.as_slice() == b"p").count();
    paragraphs == 1
        && !stack
            .iter()
            .any(|n| n.as_slice() == b"tbl" || n.as_slice() == b"txbxContent")
}
