//! Quality-assurance report.
//!
//! The report is informational: it never blocks processing. It records input
//! anomalies that were normalised away and heuristic decisions that a human
//! reviewer may want to double-check.

use serde::{Deserialize, Serialize};

/// Kind of heuristic ambiguity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityKind {
    /// Indentation change too small to nest, too large to ignore
    ListNesting,
    /// A caption with no preceding content to attach to
    CaptionAnchor,
    /// A chapter-preamble token flushed without a following title
    ChapterPreamble,
    /// A reading-order collision that needed an overflow grid slot
    GridOverflow,
    /// Too few chapter-tier samples; the fallback threshold was used
    ThinFontTier,
    /// The same media reference id appeared more than once
    DuplicateMedia,
}

/// A heuristic decision recorded for review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ambiguity {
    /// Page the decision was made on (0 when document-wide)
    pub page: u32,
    /// Kind of ambiguity
    pub kind: AmbiguityKind,
    /// Human-readable detail
    pub detail: String,
}

/// A page whose rows carry unusually many characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensePage {
    /// Page number
    pub page: u32,
    /// Mean characters per row
    pub mean_row_chars: f32,
}

/// A chapter with many paragraphs but no sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionlessChapter {
    /// Chapter id
    pub id: String,
    /// Chapter title, if any
    pub title: Option<String>,
    /// Paragraph count
    pub paragraphs: usize,
}

/// A media binding that found no anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedMedia {
    /// Page of the media box
    pub page: u32,
    /// Approximate vertical position
    pub top: f32,
    /// Opaque reference id
    pub ref_id: Option<String>,
}

/// Node counts of the finished tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeSummary {
    /// Chapters, including the implicit front matter
    pub chapters: usize,
    /// Sections at any depth
    pub sections: usize,
    /// Paragraphs
    pub paragraphs: usize,
    /// Lists
    pub lists: usize,
    /// List items
    pub list_items: usize,
    /// Figures
    pub figures: usize,
    /// Tables
    pub tables: usize,
    /// Captions
    pub captions: usize,
    /// Sidebars
    pub sidebars: usize,
}

/// QA report of one reconstruction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaReport {
    /// Pages processed
    pub pages: usize,
    /// Fragments accepted into the pipeline
    pub fragments: usize,
    /// Blocks emitted by the segmenter
    pub blocks: usize,
    /// Text fragments dropped because they were empty after normalisation
    pub filtered_fragments: usize,
    /// Fragments with malformed geometry (kept without layout signal)
    pub degenerate_fragments: usize,
    /// Text fragments without font information
    pub missing_fonts: usize,
    /// Heuristic decisions recorded for review
    pub ambiguities: Vec<Ambiguity>,
    /// Pages with unusually dense rows
    pub dense_pages: Vec<DensePage>,
    /// Chapters with many paragraphs and no sections
    pub sectionless_chapters: Vec<SectionlessChapter>,
    /// Media bindings without an anchor
    pub unresolved_media: Vec<UnresolvedMedia>,
    /// Node counts
    pub summary: TreeSummary,
}

impl QaReport {
    /// Whether nothing in the report needs human attention.
    pub fn is_clean(&self) -> bool {
        self.ambiguities.is_empty()
            && self.dense_pages.is_empty()
            && self.sectionless_chapters.is_empty()
            && self.unresolved_media.is_empty()
    }

    /// Number of ambiguities of the given kind.
    pub fn ambiguity_count(&self, kind: AmbiguityKind) -> usize {
        self.ambiguities.iter().filter(|a| a.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_report() {
        let mut report = QaReport {
            filtered_fragments: 3,
            ..Default::default()
        };
        assert!(report.is_clean());

        report.ambiguities.push(Ambiguity {
            page: 2,
            kind: AmbiguityKind::ListNesting,
            detail: "indent +6.0".into(),
        });
        assert!(!report.is_clean());
        assert_eq!(report.ambiguity_count(AmbiguityKind::ListNesting), 1);
        assert_eq!(report.ambiguity_count(AmbiguityKind::GridOverflow), 0);
    }

    #[test]
    fn test_report_serialization() {
        let report = QaReport {
            unresolved_media: vec![UnresolvedMedia {
                page: 4,
                top: 120.0,
                ref_id: Some("img-7".into()),
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["unresolved_media"][0]["ref_id"], "img-7");
        assert_eq!(json["summary"]["chapters"], 0);
    }
}
