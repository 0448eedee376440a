//! Input encoding detection.
//!
//! Fragment documents arrive in one of three JSON encodings: a document
//! object with a `pages` array, a bare array of page records, or JSON Lines
//! with one page record per line.

use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};
use crate::parser::{RawDocument, RawPage};

/// Encoding of a fragment document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// `{ "pages": [...] }`
    Document,
    /// `[ <page>, ... ]`
    PageArray,
    /// One page record per line
    JsonLines,
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InputFormat::Document => "document",
            InputFormat::PageArray => "page array",
            InputFormat::JsonLines => "JSON lines",
        };
        f.write_str(name)
    }
}

const UTF8_BOM: &str = "\u{feff}";

fn strip_bom(text: &str) -> &str {
    text.strip_prefix(UTF8_BOM).unwrap_or(text)
}

/// Detect the encoding of an input.
///
/// # Returns
/// * `Ok(InputFormat)` for a recognizable encoding
/// * `Err(Error::UnknownFormat)` if the data does not start like JSON
///
/// # Example
/// ```
/// use unlayout::detect::{detect_format_from_bytes, InputFormat};
///
/// let format = detect_format_from_bytes(br#"[{"number": 1, "fragments": []}]"#).unwrap();
/// assert_eq!(format, InputFormat::PageArray);
/// ```
pub fn detect_format_from_bytes(data: &[u8]) -> Result<InputFormat> {
    let text = std::str::from_utf8(data).map_err(|_| Error::UnknownFormat)?;
    detect_format(text)
}

fn detect_format(text: &str) -> Result<InputFormat> {
    let text = strip_bom(text).trim_start();
    match text.chars().next() {
        Some('[') => Ok(InputFormat::PageArray),
        Some('{') => {
            // A first line that is a complete object on its own is a JSON
            // Lines record, unless it is a one-line document object
            let first = text.lines().next().unwrap_or_default().trim();
            match serde_json::from_str::<serde_json::Value>(first) {
                Ok(value) if value.get("pages").is_some() => Ok(InputFormat::Document),
                Ok(_) => Ok(InputFormat::JsonLines),
                Err(_) => Ok(InputFormat::Document),
            }
        }
        _ => Err(Error::UnknownFormat),
    }
}

/// Detect the encoding of a file.
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<InputFormat> {
    let text = fs::read_to_string(path)?;
    detect_format(&text)
}

/// Parse a fragment document in any supported encoding.
pub fn parse_input(text: &str) -> Result<RawDocument> {
    let format = detect_format(text)?;
    let text = strip_bom(text);
    log::debug!("input format: {}", format);
    match format {
        InputFormat::Document => Ok(serde_json::from_str(text)?),
        InputFormat::PageArray => Ok(RawDocument::new(serde_json::from_str(text)?)),
        InputFormat::JsonLines => {
            let mut pages = Vec::new();
            for (index, line) in text.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let page: RawPage = serde_json::from_str(line)
                    .map_err(|e| Error::InvalidInput(format!("line {}: {}", index + 1, e)))?;
                pages.push(page);
            }
            Ok(RawDocument::new(pages))
        }
    }
}

/// Parse a fragment document from bytes.
pub fn parse_bytes(data: &[u8]) -> Result<RawDocument> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::InvalidInput(format!("input is not UTF-8: {}", e)))?;
    parse_input(text)
}

/// Parse a fragment document from a reader.
pub fn parse_reader<R: Read>(mut reader: R) -> Result<RawDocument> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    parse_input(&text)
}

/// Read and parse a fragment document file.
pub fn read_document<P: AsRef<Path>>(path: P) -> Result<RawDocument> {
    let text = fs::read_to_string(path)?;
    parse_input(&text)
}

/// Check if a file looks like a fragment document.
pub fn is_fragment_document<P: AsRef<Path>>(path: P) -> bool {
    detect_format_from_path(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{"number": 1, "width": 612, "height": 792, "fragments": [{"text": "Hi", "left": 72, "top": 72, "width": 20, "height": 12}]}"#;

    #[test]
    fn test_detect_document() {
        let pretty = "{\n  \"pages\": [\n    {\"number\": 1}\n  ]\n}";
        assert_eq!(detect_format(pretty).unwrap(), InputFormat::Document);
        let one_line = format!("{{\"pages\": [{}]}}", PAGE);
        assert_eq!(detect_format(&one_line).unwrap(), InputFormat::Document);
    }

    #[test]
    fn test_detect_array_and_lines() {
        assert_eq!(detect_format(&format!("  [{}]", PAGE)).unwrap(), InputFormat::PageArray);
        let lines = format!("{}\n{}\n", PAGE, PAGE.replace("\"number\": 1", "\"number\": 2"));
        assert_eq!(detect_format(&lines).unwrap(), InputFormat::JsonLines);
    }

    #[test]
    fn test_detect_unknown() {
        assert!(matches!(detect_format(""), Err(Error::UnknownFormat)));
        assert!(matches!(
            detect_format_from_bytes(b"%PDF-1.7"),
            Err(Error::UnknownFormat)
        ));
        assert!(matches!(
            detect_format_from_bytes(&[0xFF, 0xFE, 0x00]),
            Err(Error::UnknownFormat)
        ));
    }

    #[test]
    fn test_bom_is_ignored() {
        let text = format!("\u{feff}[{}]", PAGE);
        let doc = parse_input(&text).unwrap();
        assert_eq!(doc.pages.len(), 1);
    }

    #[test]
    fn test_parse_json_lines() {
        let lines = format!("{}\n\n{}\n", PAGE, PAGE.replace("\"number\": 1", "\"number\": 2"));
        let doc = parse_input(&lines).unwrap();
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[1].number, Some(2));
        assert_eq!(doc.pages[0].fragments[0].text, "Hi");
    }

    #[test]
    fn test_parse_json_lines_error_has_line() {
        let lines = format!("{}\n{{\"number\": \"x\"}}\n", PAGE);
        match parse_input(&lines) {
            Err(Error::InvalidInput(msg)) => assert!(msg.starts_with("line 2")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_reader() {
        let doc = parse_reader(format!("[{}]", PAGE).as_bytes()).unwrap();
        assert_eq!(doc.fragment_count(), 1);
    }
}
