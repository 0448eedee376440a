//! Lexical patterns shared by the segmenter and the structure builder.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::{ListKind, Role, Tag};

/// A list marker found at the start of a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMarker {
    /// Numbering kind
    pub kind: ListKind,
    /// Marker as written (e.g. "•", "3.", "(b)", "iv)")
    pub marker: String,
    /// Byte offset where the item text starts
    pub content_start: usize,
}

static LIST_MARKER_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static SECTION_START_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static PREAMBLE_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static MEDIA_KEYWORD_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static LEADER_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static PAGE_REFS_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static TOC_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static INDEX_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static GLOSSARY_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

const BULLETS: &[char] = &[
    '•', '●', '○', '■', '□', '◆', '◇', '▪', '▫', '►', '▻', '‣', '⁃', '∙', '◦', '–', '-', '*',
];

fn list_marker_regex() -> Option<&'static Regex> {
    LIST_MARKER_REGEX
        .get_or_init(|| {
            // 1. / 12) / (3) / a. / (b) / iv) / (xii)
            Regex::new(r"^\s*(\(?(?:\d{1,3}|[a-zA-Z]|[ivxlcdm]{1,6}|[IVXLCDM]{1,6})[.)])(?:\s+|$)")
                .ok()
        })
        .as_ref()
}

fn section_start_regex() -> Option<&'static Regex> {
    SECTION_START_REGEX
        .get_or_init(|| {
            Regex::new(
                r"(?i)^\s*(?:(?:chapter|part|section|appendix|lesson|unit)\s+(?:\d+|[ivxlcdm]+|[a-z])\b|\d+(?:\.\d+)+\.?(?:\s|$))",
            )
            .ok()
        })
        .as_ref()
}

fn preamble_regex() -> Option<&'static Regex> {
    PREAMBLE_REGEX
        .get_or_init(|| {
            Regex::new(
                r"^\s*(?:(?i:chapter|part|book)(?:\s+(?:\d+|[IVXLCDM]+|[ivxlcdm]+|(?i:one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)))?|\d+|[IVXLCDM]+)\s*[.:]?\s*$",
            )
            .ok()
        })
        .as_ref()
}

fn media_keyword_regex() -> Option<&'static Regex> {
    MEDIA_KEYWORD_REGEX
        .get_or_init(|| {
            Regex::new(
                r"(?i)^\s*(figure|fig\.|table|tab\.|plate|chart|diagram|exhibit|illustration|map|photo)(?:\s+(?-i:[\dA-Z])|\s*[.:]|\s*$)",
            )
            .ok()
        })
        .as_ref()
}

fn leader_regex() -> Option<&'static Regex> {
    LEADER_REGEX
        .get_or_init(|| Regex::new(r"(?:\s*[.·…_]\s*){3,}|\s*…+\s*").ok())
        .as_ref()
}

fn page_refs_regex() -> Option<&'static Regex> {
    PAGE_REFS_REGEX
        .get_or_init(|| {
            Regex::new(
                r"^(.*?\S)[\s,]+((?:\d+|[ivxlc]+)(?:\s*[-–,]\s*(?:\d+|[ivxlc]+))*)\s*$",
            )
            .ok()
        })
        .as_ref()
}

fn toc_regex() -> Option<&'static Regex> {
    TOC_REGEX
        .get_or_init(|| Regex::new(r"(?i)^\s*(?:table\s+of\s+)?contents\s*$").ok())
        .as_ref()
}

fn index_regex() -> Option<&'static Regex> {
    INDEX_REGEX
        .get_or_init(|| Regex::new(r"(?i)^\s*(?:general\s+|subject\s+|name\s+)?index\s*$").ok())
        .as_ref()
}

fn glossary_regex() -> Option<&'static Regex> {
    GLOSSARY_REGEX
        .get_or_init(|| Regex::new(r"(?i)^\s*glossary(?:\s+of\s+terms)?\s*$").ok())
        .as_ref()
}

/// Detect a list marker at the start of `text`.
pub fn list_marker(text: &str) -> Option<ListMarker> {
    let trimmed = text.trim_start();
    let offset = text.len() - trimmed.len();

    if let Some(first) = trimmed.chars().next() {
        if BULLETS.contains(&first) {
            let rest = &trimmed[first.len_utf8()..];
            // "-" and "*" need a following space; "–3" is a negative number
            let needs_space = matches!(first, '-' | '*' | '–');
            if rest.is_empty() || rest.starts_with(char::is_whitespace) || !needs_space {
                let content = rest.len() - rest.trim_start().len();
                return Some(ListMarker {
                    kind: ListKind::Bulleted,
                    marker: first.to_string(),
                    content_start: offset + first.len_utf8() + content,
                });
            }
            return None;
        }
    }

    let caps = list_marker_regex()?.captures(text)?;
    let marker = caps.get(1)?;
    let whole = caps.get(0)?;
    Some(ListMarker {
        kind: ListKind::Numbered,
        marker: marker.as_str().to_string(),
        content_start: whole.end(),
    })
}

/// Whether `text` starts with a list marker.
pub fn is_list_start(text: &str) -> bool {
    list_marker(text).is_some()
}

/// Whether `text` opens a new section ("Chapter 4", "2.3", a bullet).
pub fn is_section_start(text: &str) -> bool {
    section_start_regex().is_some_and(|re| re.is_match(text))
        || text
            .trim_start()
            .chars()
            .next()
            .is_some_and(|c| BULLETS[..BULLETS.len() - 3].contains(&c))
}

/// Whether `text` is a bare chapter keyword and/or number ("Chapter", "4", "IV", "Part 2").
pub fn is_chapter_preamble(text: &str) -> bool {
    preamble_regex().is_some_and(|re| re.is_match(text))
}

/// Media kind named by a caption prefix ("Figure 3", "Table 2.1").
pub fn media_keyword(text: &str) -> Option<Tag> {
    let caps = media_keyword_regex()?.captures(text)?;
    let keyword = caps.get(1)?.as_str().to_lowercase();
    if keyword.starts_with("tab") {
        Some(Tag::Table)
    } else {
        Some(Tag::Figure)
    }
}

/// Role named by a special-section heading.
pub fn special_role(text: &str) -> Option<Role> {
    if toc_regex().is_some_and(|re| re.is_match(text)) {
        Some(Role::TableOfContents)
    } else if index_regex().is_some_and(|re| re.is_match(text)) {
        Some(Role::Index)
    } else if glossary_regex().is_some_and(|re| re.is_match(text)) {
        Some(Role::Glossary)
    } else {
        None
    }
}

/// Remove leader runs (dots, middle dots, ellipses), collapsing them to a space.
pub fn strip_leaders(text: &str) -> String {
    match leader_regex() {
        Some(re) => re.replace_all(text, " ").trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Split trailing page references off an entry.
///
/// `"Layout engines 12, 45-47"` becomes `("Layout engines", ["12", "45-47"])`.
/// Text without trailing references is returned unchanged with no refs.
pub fn split_page_refs(text: &str) -> (String, Vec<String>) {
    let text = strip_leaders(text);
    let parsed = page_refs_regex()
        .and_then(|re| re.captures(&text))
        .and_then(|caps| {
            let head = caps.get(1)?.as_str().to_string();
            let refs = caps.get(2)?.as_str().to_string();
            Some((head, refs))
        });
    let Some((head, refs)) = parsed else {
        return (text, Vec::new());
    };

    let refs: Vec<String> = refs
        .split(',')
        .map(|r| r.split_whitespace().collect::<String>())
        .filter(|r| !r.is_empty())
        .collect();
    (head.trim_end_matches([',', ' ']).to_string(), refs)
}

/// Whether `text` is only a page reference ("12", "xiv", "45-47").
pub fn is_page_ref(text: &str) -> bool {
    let t = text.trim();
    t.chars().any(|c| c.is_ascii_alphanumeric())
        && (t.chars().all(|c| c.is_ascii_digit() || matches!(c, '-' | '–' | ','))
            || t.chars().all(|c| matches!(c, 'i' | 'v' | 'x' | 'l' | 'c')))
}
