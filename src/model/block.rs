//! Blocks produced by the paragraph segmenter.

use serde::{Deserialize, Serialize};

/// Semantic kind of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    /// Running text
    #[default]
    Paragraph,
    /// Starts with a list marker
    ListItem,
    /// Heading-tier font
    Heading,
    /// Media caption ("Figure 3", "Table 2")
    Caption,
    /// Highlighted region (background or border)
    Sidebar,
}

/// Vertical role of an inline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptRole {
    /// Baseline text
    #[default]
    Normal,
    /// Raised above the sibling
    Superscript,
    /// Lowered below the sibling
    Subscript,
}

/// A run of text with uniform inline attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineRun {
    /// Text content
    pub text: String,
    /// Script role
    #[serde(default)]
    pub role: ScriptRole,
    /// Bold weight
    #[serde(default)]
    pub bold: bool,
    /// Italic style
    #[serde(default)]
    pub italic: bool,
}

impl InlineRun {
    /// Create a plain run.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role: ScriptRole::Normal,
            bold: false,
            italic: false,
        }
    }

    /// Create a super- or subscript run.
    pub fn script(text: impl Into<String>, role: ScriptRole) -> Self {
        Self {
            role,
            ..Self::plain(text)
        }
    }
}

/// One physical line inside a block, kept for position-based re-merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockLine {
    /// Joined line text
    pub text: String,
    /// Page of the line
    pub page: u32,
    /// Left edge
    pub left: f32,
    /// Right edge
    pub right: f32,
    /// Top edge
    pub top: f32,
    /// Baseline of the first fragment
    pub baseline: f32,
}

/// The unit produced by the segmenter and consumed by the structure builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Block kind
    pub kind: BlockKind,
    /// Heading level (1 = chapter, 2 = section, 3 = subsection; 0 otherwise)
    pub heading_level: u8,
    /// Merged text
    pub text: String,
    /// Inline runs (with script roles)
    pub runs: Vec<InlineRun>,
    /// Physical lines
    pub lines: Vec<BlockLine>,
    /// Contributing fragment ids, in reading order
    pub fragments: Vec<usize>,
    /// Font family of the first fragment
    pub font_family: String,
    /// Effective font size (first fragment)
    pub font_size: f32,
    /// Majority of characters are bold
    pub bold: bool,
    /// Left edge of the first line
    pub left: f32,
    /// Left edge relative to the column's left edge
    pub indent: f32,
    /// First page
    pub page: u32,
    /// Last page (differs from `page` after cross-page merging)
    pub last_page: u32,
    /// Top of the first line
    pub top: f32,
    /// Reading-order index of the first fragment
    pub flow_index: usize,
    /// Reading-order index of the last fragment
    pub last_flow_index: usize,
    /// Column id (0 = full width)
    pub column: u16,
    /// Reading-order block
    pub ro_block: u32,
    /// Source-supplied highlight marker
    pub highlight: bool,
}

impl Block {
    /// Number of whitespace-separated words.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Whether the text ends with sentence-terminal punctuation.
    pub fn ends_with_terminal(&self) -> bool {
        ends_with_terminal(&self.text)
    }

    /// Whether this block is a heading.
    pub fn is_heading(&self) -> bool {
        self.kind == BlockKind::Heading
    }

    /// Append another block's content (used by cross-page continuation).
    pub fn absorb(&mut self, next: Block) {
        self.text = join_text(&self.text, &next.text);
        if let (Some(last), Some(first)) = (self.runs.last_mut(), next.runs.first()) {
            if last.role == first.role && last.bold == first.bold && last.italic == first.italic {
                last.text = join_text(&last.text, &first.text);
                self.runs.extend(next.runs.into_iter().skip(1));
            } else {
                self.runs.extend(next.runs);
            }
        } else {
            self.runs.extend(next.runs);
        }
        self.lines.extend(next.lines);
        self.fragments.extend(next.fragments);
        self.last_page = next.last_page;
        self.last_flow_index = next.last_flow_index;
    }
}

/// Whether text ends with `. ! ? ; :` (ignoring closing quotes and brackets).
pub fn ends_with_terminal(text: &str) -> bool {
    let trimmed = text
        .trim_end()
        .trim_end_matches(['"', '\'', ')', ']', '\u{201D}', '\u{2019}']);
    matches!(
        trimmed.chars().last(),
        Some('.' | '!' | '?' | ';' | ':' | '\u{3002}')
    )
}

/// Join two pieces of text the way lines are joined inside a paragraph.
///
/// A trailing hyphen before a lowercase continuation is removed; a space is
/// inserted unless either side already carries whitespace or both sides are
/// in a script written without word spaces.
pub fn join_text(prev: &str, next: &str) -> String {
    if prev.is_empty() {
        return next.to_string();
    }
    if next.is_empty() {
        return prev.to_string();
    }

    let mut out = String::with_capacity(prev.len() + next.len() + 1);
    let next_first = next.chars().next();

    if let Some(stem) = prev.strip_suffix('-') {
        if next_first.is_some_and(char::is_lowercase) && !stem.ends_with(' ') {
            out.push_str(stem);
            out.push_str(next);
            return out;
        }
        out.push_str(prev);
        out.push_str(next);
        return out;
    }

    out.push_str(prev);
    let prev_space = prev.ends_with([' ', '\u{00A0}', '\n']);
    let next_space = next.starts_with([' ', '\u{00A0}']);
    let spaceless = prev.chars().last().is_some_and(is_spaceless_script_char)
        && next_first.is_some_and(is_spaceless_script_char);
    if !prev_space && !next_space && !spaceless {
        out.push(' ');
    }
    out.push_str(next);
    out
}

/// Check if a character is from a script that doesn't use word spaces.
///
/// Chinese and Japanese don't use spaces between words, but Korean does.
pub fn is_spaceless_script_char(c: char) -> bool {
    let code = c as u32;

    // CJK Unified Ideographs and Extension A
    (0x4E00..=0x9FFF).contains(&code)
    || (0x3400..=0x4DBF).contains(&code)
    // Extensions B-F
    || (0x20000..=0x2EBEF).contains(&code)
    // Hiragana, Katakana
    || (0x3040..=0x30FF).contains(&code)
    // CJK Symbols and Punctuation
    || (0x3000..=0x303F).contains(&code)
}
