//! Tag-driven extraction of structured learning content from the plain text
//! of a Word document.
//!
//! Authors mark up their documents with `Tag$` markers at the start of a
//! line (`Text$`, `Hinweis$`, `Tabelle$`, ...). A block runs until the next
//! marker; a repeated marker simply opens an empty block, which is dropped.
//! Titles may be written on one line (`Titel$ Intro Titel$`) or span several
//! lines between two bare `Titel$` markers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Block tags that open and close a section.
pub const BLOCK_TAGS: [&str; 13] = [
    "Titel$",
    "Titel2$",
    "Titel3$",
    "Text$",
    "Hinweis$",
    "Exkurs$",
    "Quellen$",
    "Lernziele$",
    "Inhaltsverzeichnis$",
    "Auflistung$",
    "Wichtig$",
    "Tipp$",
    "Tabelle$",
];

/// Tags with their own handling: `Bild$` stands alone, `Code$` keeps line breaks.
pub const SPECIAL_TAGS: [&str; 2] = ["Bild$", "Code$"];

const DEFAULT_CODE_LANGUAGE: &str = "sql";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Title { text: String },
    Title2 { text: String },
    Title3 { text: String },
    Text { paragraphs: Vec<String> },
    Image { src: String, alt: String },
    Code { language: String, code: String },
    Important { text: String },
    Hint { text: String },
    Tip { text: String },
    Note { text: String },
    Sources { items: Vec<String> },
    LearningObjectives { items: Vec<String> },
    TableOfContents { items: Vec<String> },
    List { items: Vec<String> },
    Table { headers: Vec<String>, rows: Vec<Vec<String>> },
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ExtractedContent {
    pub content: Vec<ContentBlock>,
}

impl ExtractedContent {
    /// Image names referenced by `image` blocks, in document order.
    pub fn image_sources(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Image { src, .. } => Some(src.as_str()),
                _ => None,
            })
            .collect()
    }
}

fn all_tags() -> impl Iterator<Item = &'static str> {
    BLOCK_TAGS.iter().chain(SPECIAL_TAGS.iter()).copied()
}

fn opening_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-zäöüßÄÖÜ]+)\$\s*(.*)$").expect("valid regex"))
}

fn complete_title_re() -> &'static [(Regex, TitleLevel); 3] {
    static RE: OnceLock<[(Regex, TitleLevel); 3]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            (Regex::new(r"^Titel\$\s*(.*?)\s*Titel\$$").expect("valid regex"), TitleLevel::One),
            (Regex::new(r"^Titel2\$\s*(.*?)\s*Titel2\$$").expect("valid regex"), TitleLevel::Two),
            (Regex::new(r"^Titel3\$\s*(.*?)\s*Titel3\$$").expect("valid regex"), TitleLevel::Three),
        ]
    })
}

fn code_language_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^([a-zA-Z]+)\$\s*(.*)").expect("valid regex"))
}

fn image_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Z]+\d+\.\d+\.png|[A-Z]+\d+\.png)").expect("valid regex"))
}

fn table_cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\t\s*|\s*;\s*|\s*\|\s*").expect("valid regex"))
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-•*]|\d+[\.\)])\s+").expect("valid regex"))
}

fn numbered_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+[\.\)]").expect("valid regex"))
}

fn known_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternatives: Vec<String> = all_tags().map(regex::escape).collect();
        Regex::new(&format!("^({})", alternatives.join("|"))).expect("valid regex")
    })
}

fn tag_like_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-zäöüßÄÖÜ]+[0-9]*\$)").expect("valid regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TitleLevel {
    One,
    Two,
    Three,
}

impl TitleLevel {
    fn from_marker(line: &str) -> Option<Self> {
        match line {
            "Titel$" => Some(TitleLevel::One),
            "Titel2$" => Some(TitleLevel::Two),
            "Titel3$" => Some(TitleLevel::Three),
            _ => None,
        }
    }

    fn block(self, text: String) -> ContentBlock {
        match self {
            TitleLevel::One => ContentBlock::Title { text },
            TitleLevel::Two => ContentBlock::Title2 { text },
            TitleLevel::Three => ContentBlock::Title3 { text },
        }
    }
}

fn complete_title(line: &str) -> Option<(TitleLevel, String)> {
    complete_title_re().iter().find_map(|(re, level)| {
        let caps = re.captures(line)?;
        let text = caps.get(1)?.as_str().trim();
        (!text.is_empty()).then(|| (*level, text.to_string()))
    })
}

struct OpenTitle {
    level: TitleLevel,
    lines: Vec<String>,
}

impl OpenTitle {
    fn into_block(self) -> Option<ContentBlock> {
        if self.lines.is_empty() {
            return None;
        }
        Some(self.level.block(self.lines.join(" ").trim().to_string()))
    }
}

struct OpenBlock {
    tag: String,
    lines: Vec<String>,
    code: Option<String>,
}

impl OpenBlock {
    fn new(tag: String, rest: String) -> Self {
        let code = (tag == "Code$").then(|| rest.clone());
        let lines = if rest.is_empty() { Vec::new() } else { vec![rest] };
        Self { tag, lines, code }
    }

    fn push(&mut self, line: &str) {
        self.lines.push(line.to_string());
        if let Some(code) = self.code.as_mut() {
            code.push('\n');
            code.push_str(line);
        }
    }

    fn has_content(&self) -> bool {
        !self.lines.is_empty()
    }

    fn joined(&self) -> String {
        self.lines.join(" ").trim().to_string()
    }

    fn into_block(self) -> Option<ContentBlock> {
        let block = match self.tag.as_str() {
            "Titel$" => ContentBlock::Title { text: self.joined() },
            "Titel2$" => ContentBlock::Title2 { text: self.joined() },
            "Titel3$" => ContentBlock::Title3 { text: self.joined() },
            "Text$" => {
                let text = self.joined().replace("/n", "\n");
                let paragraphs = text
                    .split('\n')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect();
                ContentBlock::Text { paragraphs }
            }
            "Bild$" => {
                let content = self.joined();
                let src = image_name_re()
                    .find(&content)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or(content);
                ContentBlock::Image { alt: format!("Bild: {}", src), src }
            }
            "Code$" => {
                let raw = self.code.clone().unwrap_or_else(|| self.joined());
                match code_language_re().captures(&raw) {
                    Some(caps) => ContentBlock::Code {
                        language: caps[1].to_lowercase(),
                        code: caps[2].trim().to_string(),
                    },
                    None => ContentBlock::Code {
                        language: DEFAULT_CODE_LANGUAGE.to_string(),
                        code: raw.trim().to_string(),
                    },
                }
            }
            "Wichtig$" => ContentBlock::Important { text: self.joined() },
            "Hinweis$" => ContentBlock::Hint { text: self.joined() },
            "Tipp$" => ContentBlock::Tip { text: self.joined() },
            "Exkurs$" => ContentBlock::Note { text: self.joined() },
            "Quellen$" => {
                let items = parse_list_content(&self.lines);
                if items.is_empty() {
                    return None;
                }
                ContentBlock::Sources { items }
            }
            "Lernziele$" => ContentBlock::LearningObjectives { items: parse_list_content(&self.lines) },
            "Inhaltsverzeichnis$" => ContentBlock::TableOfContents { items: parse_list_content(&self.lines) },
            "Auflistung$" => ContentBlock::List { items: parse_list_content(&self.lines) },
            "Tabelle$" => {
                let mut rows = self
                    .lines
                    .iter()
                    .map(|l| l.trim())
                    .filter(|l| !l.is_empty())
                    .map(|l| table_cell_re().split(l).map(String::from).collect::<Vec<_>>());
                let headers = rows.next()?;
                ContentBlock::Table { headers, rows: rows.collect() }
            }
            _ => ContentBlock::Text { paragraphs: vec![self.joined()] },
        };
        Some(block)
    }
}

fn emit(blocks: &mut Vec<ContentBlock>, open: Option<OpenBlock>) {
    if let Some(block) = open.filter(OpenBlock::has_content).and_then(OpenBlock::into_block) {
        blocks.push(block);
    }
}

/// Emits the open block when it has content. An empty open block stays open.
fn emit_filled(blocks: &mut Vec<ContentBlock>, open: &mut Option<OpenBlock>) {
    if open.as_ref().map_or(false, OpenBlock::has_content) {
        emit(blocks, open.take());
    }
}

/// Turns tagged document text into content blocks.
pub fn extract_content(text: &str) -> ExtractedContent {
    let mut blocks = Vec::new();
    let mut current: Option<OpenBlock> = None;
    let mut title: Option<OpenTitle> = None;

    for line in text.split('\n').map(str::trim) {
        if line.is_empty() {
            continue;
        }

        if let Some((level, text)) = complete_title(line) {
            emit_filled(&mut blocks, &mut current);
            blocks.push(level.block(text));
            continue;
        }

        if let Some(level) = TitleLevel::from_marker(line) {
            match title.take() {
                None => {
                    emit_filled(&mut blocks, &mut current);
                    title = Some(OpenTitle { level, lines: Vec::new() });
                    continue;
                }
                Some(open) if open.level == level => {
                    blocks.extend(open.into_block());
                    continue;
                }
                // a different level inside a title is plain title text
                Some(open) => title = Some(open),
            }
        }

        if let Some(open) = title.as_mut() {
            open.lines.push(line.to_string());
            continue;
        }

        if let Some(caps) = opening_tag_re().captures(line) {
            emit(&mut blocks, current.take());
            let tag = format!("{}$", &caps[1]);
            let rest = caps[2].trim().to_string();
            current = Some(OpenBlock::new(tag, rest));
        } else if let Some(open) = current.as_mut() {
            open.push(line);
        }
    }

    if let Some(open) = title {
        blocks.extend(open.into_block());
    }
    emit(&mut blocks, current);

    ExtractedContent { content: blocks }
}

/// Splits the lines of a list block into items.
///
/// Several lines without any bullet are one item each (tables of contents).
/// Otherwise a bullet or number starts an item and following lines continue it.
pub fn parse_list_content(lines: &[String]) -> Vec<String> {
    if lines.is_empty() {
        return Vec::new();
    }

    if lines.len() > 1 {
        let has_bullets = lines.iter().map(|l| l.trim()).any(|l| {
            !l.is_empty()
                && (l.starts_with('-')
                    || l.starts_with('•')
                    || l.starts_with('*')
                    || numbered_re().is_match(l))
        });
        if !has_bullets {
            return lines
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();
        }
    }

    let mut items = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        if bullet_re().is_match(line) {
            if !current.is_empty() {
                items.push(current.join(" ").trim().to_string());
                current.clear();
            }
            current.push(bullet_re().replace(line, "").into_owned());
        } else {
            current.push(line.to_string());
        }
    }
    if !current.is_empty() {
        items.push(current.join(" ").trim().to_string());
    }

    if items.is_empty() {
        items.push(lines.join(" ").trim().to_string());
    }
    items
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TagSummary {
    pub total_lines: usize,
    pub different_found_tags: usize,
    pub total_found_occurrences: usize,
    pub different_processed_tags: usize,
    pub total_processed_occurrences: usize,
    pub different_unknown_tags: usize,
    pub total_unknown_occurrences: usize,
    pub unused_tags_count: usize,
    pub unprocessed_tags_count: usize,
}

/// Report on which tags a document uses and which of them yield content.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TagAnalysis {
    pub total_lines: usize,
    pub found_tags: BTreeMap<String, usize>,
    pub processed_tags: BTreeMap<String, usize>,
    pub unknown_tags: BTreeMap<String, usize>,
    pub found_tags_set: Vec<String>,
    pub processed_tags_set: Vec<String>,
    pub unknown_tags_set: Vec<String>,
    pub unused_tags: Vec<String>,
    pub unprocessed_tags: Vec<String>,
    pub summary: TagSummary,
}

fn bump(counter: &mut BTreeMap<String, usize>, tag: &str) {
    *counter.entry(tag.to_string()).or_insert(0) += 1;
}

fn is_known(tag: &str) -> bool {
    all_tags().any(|t| t == tag)
}

pub fn analyze_tags(text: &str) -> TagAnalysis {
    let lines: Vec<&str> = text.split('\n').collect();
    let total_lines = lines.len();

    let mut found = BTreeMap::new();
    let mut processed = BTreeMap::new();
    let mut unknown = BTreeMap::new();

    let mut current_tag: Option<String> = None;
    let mut has_content = false;
    let mut first_tag = true;

    for line in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        let tag = known_tag_re()
            .captures(line)
            .or_else(|| tag_like_re().captures(line))
            .map(|caps| caps[1].to_string());

        let Some(tag) = tag else {
            if current_tag.is_some() {
                has_content = true;
            }
            continue;
        };

        if tag == "Bild$" {
            bump(&mut found, &tag);
            bump(&mut processed, &tag);
            continue;
        }

        if tag == "Code$" {
            if !first_tag && current_tag.as_deref() == Some("Code$") && has_content {
                bump(&mut processed, &tag);
            } else {
                bump(&mut found, &tag);
            }
            current_tag = Some(tag);
        } else if BLOCK_TAGS.contains(&tag.as_str()) {
            if current_tag.as_deref() == Some(tag.as_str()) {
                if has_content {
                    bump(&mut processed, &tag);
                }
                current_tag = None;
            } else {
                if let Some(previous) = current_tag.as_deref() {
                    if has_content && is_known(previous) {
                        bump(&mut processed, previous);
                    }
                }
                bump(&mut found, &tag);
                current_tag = Some(tag);
            }
        } else {
            bump(&mut unknown, &tag);
            current_tag = Some(tag);
        }

        has_content = false;
        first_tag = false;
    }

    if let Some(tag) = current_tag {
        if has_content {
            if is_known(&tag) {
                bump(&mut processed, &tag);
            } else {
                bump(&mut unknown, &tag);
            }
        }
    }

    let found_set: BTreeSet<String> = found.keys().cloned().collect();
    let processed_set: BTreeSet<String> = processed.keys().cloned().collect();
    let unknown_set: BTreeSet<String> = unknown.keys().cloned().collect();
    let unused: Vec<String> = all_tags()
        .filter(|t| !found_set.contains(*t))
        .map(String::from)
        .collect();
    let unprocessed: Vec<String> = found_set.difference(&processed_set).cloned().collect();

    let summary = TagSummary {
        total_lines,
        different_found_tags: found_set.len(),
        total_found_occurrences: found.values().sum(),
        different_processed_tags: processed_set.len(),
        total_processed_occurrences: processed.values().sum(),
        different_unknown_tags: unknown_set.len(),
        total_unknown_occurrences: unknown.values().sum(),
        unused_tags_count: unused.len(),
        unprocessed_tags_count: unprocessed.len(),
    };

    TagAnalysis {
        total_lines,
        found_tags: found,
        processed_tags: processed,
        unknown_tags: unknown,
        found_tags_set: found_set.into_iter().collect(),
        processed_tags_set: processed_set.into_iter().collect(),
        unknown_tags_set: unknown_set.into_iter().collect(),
        unused_tags: unused,
        unprocessed_tags: unprocessed,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_line_titles_of_each_level() {
        let out = extract_content("Titel$ Einführung Titel$\nTitel2$ Grundlagen Titel2$\nTitel3$ Details Titel3$");
        assert_eq!(
            out.content,
            vec![
                ContentBlock::Title { text: "Einführung".into() },
                ContentBlock::Title2 { text: "Grundlagen".into() },
                ContentBlock::Title3 { text: "Details".into() },
            ]
        );
    }

    #[test]
    fn multi_line_title_is_joined_with_spaces() {
        let out = extract_content("Titel2$\nRelationale\nDatenbanken\nTitel2$");
        assert_eq!(out.content, vec![ContentBlock::Title2 { text: "Relationale Datenbanken".into() }]);
    }

    #[test]
    fn other_title_marker_inside_title_is_text() {
        let out = extract_content("Titel$\nA\nTitel2$\nB\nTitel$");
        assert_eq!(out.content, vec![ContentBlock::Title { text: "A Titel2$ B".into() }]);
    }

    #[test]
    fn text_block_splits_on_slash_n() {
        let out = extract_content("Text$ Erster Absatz /n Zweiter\nAbsatz\nText$");
        assert_eq!(
            out.content,
            vec![ContentBlock::Text {
                paragraphs: vec!["Erster Absatz".into(), "Zweiter Absatz".into()]
            }]
        );
    }

    #[test]
    fn image_name_is_taken_from_pattern() {
        let out = extract_content("Bild$ Abbildung ABB1.2.png zeigt das Modell");
        assert_eq!(
            out.content,
            vec![ContentBlock::Image { src: "ABB1.2.png".into(), alt: "Bild: ABB1.2.png".into() }]
        );
    }

    #[test]
    fn image_without_pattern_uses_whole_content() {
        let out = extract_content("Bild$ diagramm.jpg");
        assert_eq!(
            out.content,
            vec![ContentBlock::Image { src: "diagramm.jpg".into(), alt: "Bild: diagramm.jpg".into() }]
        );
    }

    #[test]
    fn code_block_keeps_line_breaks_and_language() {
        let out = extract_content("Code$ python$ def f():\n    return 1\nCode$");
        assert_eq!(
            out.content,
            vec![ContentBlock::Code { language: "python".into(), code: "def f():\nreturn 1".into() }]
        );
    }

    #[test]
    fn code_block_defaults_to_sql() {
        let out = extract_content("Code$ SELECT *\nFROM kunden;");
        assert_eq!(
            out.content,
            vec![ContentBlock::Code { language: "sql".into(), code: "SELECT *\nFROM kunden;".into() }]
        );
    }

    #[test]
    fn code_without_language_is_trimmed() {
        let out = extract_content("Code$   SELECT id  \n    FROM kunden;   ");
        assert_eq!(
            out.content,
            vec![ContentBlock::Code { language: "sql".into(), code: "SELECT id\nFROM kunden;".into() }]
        );
    }

    #[test]
    fn callouts_map_to_their_block_types() {
        let out = extract_content("Wichtig$ a\nHinweis$ b\nTipp$ c\nExkurs$ d");
        assert_eq!(
            out.content,
            vec![
                ContentBlock::Important { text: "a".into() },
                ContentBlock::Hint { text: "b".into() },
                ContentBlock::Tip { text: "c".into() },
                ContentBlock::Note { text: "d".into() },
            ]
        );
    }

    #[test]
    fn table_splits_cells_on_separators() {
        let out = extract_content("Tabelle$\nName; Typ\nid | INTEGER\nname\tTEXT\nTabelle$");
        assert_eq!(
            out.content,
            vec![ContentBlock::Table {
                headers: vec!["Name".into(), "Typ".into()],
                rows: vec![vec!["id".into(), "INTEGER".into()], vec!["name".into(), "TEXT".into()]],
            }]
        );
    }

    #[test]
    fn empty_blocks_are_dropped() {
        let out = extract_content("Quellen$\nQuellen$\nText$\nText$");
        assert!(out.content.is_empty());
    }

    #[test]
    fn unknown_tag_becomes_text() {
        let out = extract_content("Zitat$ Wissen ist Macht");
        assert_eq!(out.content, vec![ContentBlock::Text { paragraphs: vec!["Wissen ist Macht".into()] }]);
    }

    #[test]
    fn lists_and_sources() {
        let out = extract_content(
            "Lernziele$\n- SQL lesen\n- Joins\nverstehen\nLernziele$\nQuellen$\nBuch A\nBuch B\nQuellen$",
        );
        assert_eq!(
            out.content,
            vec![
                ContentBlock::LearningObjectives { items: vec!["SQL lesen".into(), "Joins verstehen".into()] },
                ContentBlock::Sources { items: vec!["Buch A".into(), "Buch B".into()] },
            ]
        );
    }

    #[test]
    fn block_serializes_with_type_tag() {
        let json = serde_json::to_value(ContentBlock::Title2 { text: "x".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "title2", "text": "x"}));
        let json = serde_json::to_value(ContentBlock::TableOfContents { items: vec![] }).unwrap();
        assert_eq!(json["type"], "table_of_contents");
    }

    #[test]
    fn list_without_bullets_is_one_item_per_line() {
        assert_eq!(
            parse_list_content(&lines(&["Kapitel 1", "Kapitel 2"])),
            vec!["Kapitel 1".to_string(), "Kapitel 2".to_string()]
        );
    }

    #[test]
    fn numbered_list_joins_continuations() {
        assert_eq!(
            parse_list_content(&lines(&["1. Erstens", "weiter", "2) Zweitens"])),
            vec!["Erstens weiter".to_string(), "Zweitens".to_string()]
        );
    }

    #[test]
    fn single_line_list_is_one_item() {
        assert_eq!(parse_list_content(&lines(&["nur eins"])), vec!["nur eins".to_string()]);
        assert!(parse_list_content(&[]).is_empty());
    }

    #[test]
    fn analysis_counts_found_and_processed() {
        let text = "Titel$ Intro Titel$\nText$\nInhalt\nText$\nBild$ ABB1.png\nHinweis$\nHinweis$";
        let analysis = analyze_tags(text);
        assert_eq!(analysis.total_lines, 7);
        assert_eq!(analysis.found_tags.get("Text$"), Some(&1));
        assert_eq!(analysis.processed_tags.get("Text$"), Some(&1));
        assert_eq!(analysis.processed_tags.get("Bild$"), Some(&1));
        assert!(analysis.unprocessed_tags.contains(&"Hinweis$".to_string()));
        assert!(analysis.unused_tags.contains(&"Tabelle$".to_string()));
        assert!(!analysis.unused_tags.contains(&"Bild$".to_string()));
    }

    #[test]
    fn analysis_reports_unknown_tags() {
        let analysis = analyze_tags("Zitat$ hallo\nmehr");
        assert_eq!(analysis.unknown_tags.get("Zitat$"), Some(&2));
        assert_eq!(analysis.summary.different_unknown_tags, 1);
    }

    #[test]
    fn analysis_counts_closed_code_block() {
        let analysis = analyze_tags("Code$ sql$\nSELECT 1;\nCode$");
        assert_eq!(analysis.found_tags.get("Code$"), Some(&1));
        assert_eq!(analysis.processed_tags.get("Code$"), Some(&1));
    }
}
