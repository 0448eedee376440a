//! Engine options and tuned thresholds.

use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Options for a reconstruction run.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Page selection (which pages enter the pipeline)
    pub pages: PageSelection,

    /// Tuned numeric thresholds
    pub thresholds: Thresholds,

    /// How narrow lines in the footnote zone are treated
    pub footnote_policy: FootnoteZonePolicy,

    /// Bind non-text fragments of the input as figure/table nodes
    pub bind_media: bool,

    /// Whether batch runs use the thread pool
    pub parallel: bool,
}

impl EngineOptions {
    /// Create new engine options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set page selection.
    pub fn with_pages(mut self, pages: PageSelection) -> Self {
        self.pages = pages;
        self
    }

    /// Replace the thresholds.
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Set the footnote-zone policy.
    pub fn with_footnote_policy(mut self, policy: FootnoteZonePolicy) -> Self {
        self.footnote_policy = policy;
        self
    }

    /// Enable or disable automatic media binding.
    pub fn with_media_binding(mut self, bind: bool) -> Self {
        self.bind_media = bind;
        self
    }

    /// Enable or disable parallel batch processing.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Disable parallel batch processing.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Check every threshold.
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            pages: PageSelection::All,
            thresholds: Thresholds::default(),
            footnote_policy: FootnoteZonePolicy::default(),
            bind_media: true,
            parallel: true,
        }
    }
}

/// Treatment of narrow lines below a full-width line in the footnote zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FootnoteZonePolicy {
    /// Propagate full width to narrow continuation lines in the footnote zone
    #[default]
    PropagateNarrow,
    /// Apply the width test everywhere on the page
    RequireWide,
}

/// Empirically tuned constants used by the engine.
///
/// Every field has a documented default. A JSON file may override any
/// subset; missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    // Column detection
    /// Cluster radius as a fraction of page width (0.25)
    pub column_cluster_ratio: f32,
    /// Minimum distinct baseline groups for a column cluster (12)
    pub column_min_baseline_groups: usize,
    /// Tolerance when counting baseline groups (2.0)
    pub column_baseline_tolerance: f32,
    /// Maximum number of columns (4)
    pub max_columns: usize,
    /// Absolute floor for a major cluster's size (15)
    pub minor_cluster_min: usize,
    /// Fraction of page fragments below which a cluster is minor (0.10)
    pub minor_cluster_ratio: f32,

    // Row grouping and column assignment
    /// Upper bound of the adaptive baseline tolerance (2.0)
    pub baseline_tolerance_cap: f32,
    /// Fraction of the median baseline gap used as tolerance (0.4)
    pub baseline_tolerance_ratio: f32,
    /// Width of each margin band as a fraction of page width (0.05)
    pub margin_band_ratio: f32,
    /// Width fraction above which a fragment is full width (0.45)
    pub full_width_ratio: f32,
    /// Reach of full-width run propagation in line heights (1.5)
    pub run_line_height_factor: f32,
    /// Minimum width fraction for run propagation (0.40)
    pub run_min_width_ratio: f32,
    /// Top of the footnote zone as a fraction of page height (0.75)
    pub footnote_zone_ratio: f32,

    // Reading order
    /// Maximum vertical gap for a column chain (50.0)
    pub chain_max_gap: f32,
    /// Size margin above body size that stops a column chain (1.0)
    pub chain_heading_margin: f32,

    // Font roles
    /// Level-1 ratio to body size (1.35)
    pub chapter_ratio: f32,
    /// Level-2 ratio to body size (1.18)
    pub section_ratio: f32,
    /// Level-1 percentile (0.95)
    pub chapter_percentile: f32,
    /// Level-2 percentile (0.80)
    pub section_percentile: f32,
    /// Distance from a tier threshold that still takes the tier (0.15)
    pub tier_tolerance: f32,
    /// Minimum samples in the chapter tier (5)
    pub min_tier_samples: usize,
    /// Size above body required for chapter tier when samples are thin (4.0)
    pub chapter_fallback_delta: f32,
    /// Size above body for a bold subsection (0.5)
    pub subsection_delta: f32,
    /// Size below body for small print (0.5)
    pub small_delta: f32,

    // Paragraph segmentation
    /// Font-size delta that always breaks (2.0)
    pub font_break_delta: f32,
    /// Gap above which a list marker starts a new item (2.0)
    pub list_marker_gap: f32,
    /// Paragraph break gap as a fraction of the next font size (0.7)
    pub gap_font_ratio: f32,
    /// Paragraph break gap in line heights (1.5)
    pub gap_line_height_factor: f32,
    /// Gap that always merges (3.0)
    pub tight_gap: f32,
    /// Maximum width of a script fragment (15.0)
    pub script_max_width: f32,
    /// Maximum height of a script fragment (14.0)
    pub script_max_height: f32,
    /// Maximum characters in a script fragment (3)
    pub script_max_chars: usize,
    /// Maximum horizontal distance to the script's sibling (5.0)
    pub script_max_distance: f32,
    /// Superscript top offset range is `-x..=x` (3.0)
    pub superscript_offset: f32,
    /// Subscript top offset range is `superscript_offset..=x` (10.0)
    pub subscript_offset: f32,
    /// Font-size tolerance for cross-page continuation (2.0)
    pub cross_page_font_tolerance: f32,

    // Structure building
    /// Font-size tolerance when merging consecutive headings (0.5)
    pub heading_merge_tolerance: f32,
    /// Indentation increase that nests a list (10.0)
    pub list_nest_threshold: f32,
    /// Indentation change below the nest threshold reported as ambiguous (4.0)
    pub list_ambiguity_band: f32,
    /// Indent difference still considered unchanged (2.0)
    pub indent_tolerance: f32,
    /// Maximum words in a highlighted heading (4)
    pub highlight_heading_words: usize,

    // QA
    /// Mean characters per row above which a page is dense (160.0)
    pub dense_row_chars: f32,
    /// Paragraph count that flags a chapter without sections (40)
    pub section_paragraph_limit: usize,
    /// Earlier pages searched for a media anchor (2)
    pub media_page_lookback: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            column_cluster_ratio: 0.25,
            column_min_baseline_groups: 12,
            column_baseline_tolerance: 2.0,
            max_columns: 4,
            minor_cluster_min: 15,
            minor_cluster_ratio: 0.10,

            baseline_tolerance_cap: 2.0,
            baseline_tolerance_ratio: 0.4,
            margin_band_ratio: 0.05,
            full_width_ratio: 0.45,
            run_line_height_factor: 1.5,
            run_min_width_ratio: 0.40,
            footnote_zone_ratio: 0.75,

            chain_max_gap: 50.0,
            chain_heading_margin: 1.0,

            chapter_ratio: 1.35,
            section_ratio: 1.18,
            chapter_percentile: 0.95,
            section_percentile: 0.80,
            tier_tolerance: 0.15,
            min_tier_samples: 5,
            chapter_fallback_delta: 4.0,
            subsection_delta: 0.5,
            small_delta: 0.5,

            font_break_delta: 2.0,
            list_marker_gap: 2.0,
            gap_font_ratio: 0.7,
            gap_line_height_factor: 1.5,
            tight_gap: 3.0,
            script_max_width: 15.0,
            script_max_height: 14.0,
            script_max_chars: 3,
            script_max_distance: 5.0,
            superscript_offset: 3.0,
            subscript_offset: 10.0,
            cross_page_font_tolerance: 2.0,

            heading_merge_tolerance: 0.5,
            list_nest_threshold: 10.0,
            list_ambiguity_band: 4.0,
            indent_tolerance: 2.0,
            highlight_heading_words: 4,

            dense_row_chars: 160.0,
            section_paragraph_limit: 40,
            media_page_lookback: 2,
        }
    }
}

impl Thresholds {
    /// Parse overrides from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let thresholds: Thresholds = serde_json::from_str(json)?;
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Load overrides from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Reject non-finite, negative or inconsistent values.
    pub fn validate(&self) -> Result<()> {
        let floats = [
            ("column_cluster_ratio", self.column_cluster_ratio),
            ("column_baseline_tolerance", self.column_baseline_tolerance),
            ("minor_cluster_ratio", self.minor_cluster_ratio),
            ("baseline_tolerance_cap", self.baseline_tolerance_cap),
            ("baseline_tolerance_ratio", self.baseline_tolerance_ratio),
            ("margin_band_ratio", self.margin_band_ratio),
            ("full_width_ratio", self.full_width_ratio),
            ("run_line_height_factor", self.run_line_height_factor),
            ("run_min_width_ratio", self.run_min_width_ratio),
            ("footnote_zone_ratio", self.footnote_zone_ratio),
            ("chain_max_gap", self.chain_max_gap),
            ("chain_heading_margin", self.chain_heading_margin),
            ("chapter_ratio", self.chapter_ratio),
            ("section_ratio", self.section_ratio),
            ("chapter_percentile", self.chapter_percentile),
            ("section_percentile", self.section_percentile),
            ("tier_tolerance", self.tier_tolerance),
            ("chapter_fallback_delta", self.chapter_fallback_delta),
            ("subsection_delta", self.subsection_delta),
            ("small_delta", self.small_delta),
            ("font_break_delta", self.font_break_delta),
            ("list_marker_gap", self.list_marker_gap),
            ("gap_font_ratio", self.gap_font_ratio),
            ("gap_line_height_factor", self.gap_line_height_factor),
            ("tight_gap", self.tight_gap),
            ("script_max_width", self.script_max_width),
            ("script_max_height", self.script_max_height),
            ("script_max_distance", self.script_max_distance),
            ("superscript_offset", self.superscript_offset),
            ("subscript_offset", self.subscript_offset),
            ("cross_page_font_tolerance", self.cross_page_font_tolerance),
            ("heading_merge_tolerance", self.heading_merge_tolerance),
            ("list_nest_threshold", self.list_nest_threshold),
            ("list_ambiguity_band", self.list_ambiguity_band),
            ("indent_tolerance", self.indent_tolerance),
            ("dense_row_chars", self.dense_row_chars),
        ];
        for (name, value) in floats {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "{name} must be a finite non-negative number (got {value})"
                )));
            }
        }

        let fractions = [
            ("column_cluster_ratio", self.column_cluster_ratio),
            ("minor_cluster_ratio", self.minor_cluster_ratio),
            ("margin_band_ratio", self.margin_band_ratio),
            ("full_width_ratio", self.full_width_ratio),
            ("run_min_width_ratio", self.run_min_width_ratio),
            ("footnote_zone_ratio", self.footnote_zone_ratio),
            ("chapter_percentile", self.chapter_percentile),
            ("section_percentile", self.section_percentile),
        ];
        for (name, value) in fractions {
            if value > 1.0 {
                return Err(Error::Config(format!(
                    "{name} is a fraction and must not exceed 1.0 (got {value})"
                )));
            }
        }

        if self.max_columns == 0 {
            return Err(Error::Config("max_columns must be at least 1".into()));
        }
        if self.chapter_ratio < self.section_ratio {
            return Err(Error::Config(format!(
                "chapter_ratio ({}) must not be below section_ratio ({})",
                self.chapter_ratio, self.section_ratio
            )));
        }
        if self.subscript_offset < self.superscript_offset {
            return Err(Error::Config(
                "subscript_offset must not be below superscript_offset".into(),
            ));
        }
        Ok(())
    }
}

/// Page selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PageSelection {
    /// All pages
    #[default]
    All,
    /// A range of pages (inclusive, 1-indexed)
    Range(RangeInclusive<u32>),
    /// Specific pages (1-indexed)
    Pages(Vec<u32>),
}

impl PageSelection {
    /// Check if a page number should be included.
    pub fn includes(&self, page: u32) -> bool {
        match self {
            PageSelection::All => true,
            PageSelection::Range(range) => range.contains(&page),
            PageSelection::Pages(pages) => pages.contains(&page),
        }
    }

    /// Lowest selected page, if the selection is bounded.
    pub fn first(&self) -> Option<u32> {
        match self {
            PageSelection::All => None,
            PageSelection::Range(range) => Some(*range.start()),
            PageSelection::Pages(pages) => pages.first().copied(),
        }
    }

    /// Parse a page selection string (e.g., "1-10", "1,3,5,7-10").
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() || s == "all" {
            return Ok(PageSelection::All);
        }

        let invalid = |part: &str| Error::Config(format!("Invalid page selection: {part}"));
        let number = |part: &str| part.trim().parse::<u32>().map_err(|_| invalid(part));

        if let Some((start, end)) = s.split_once('-') {
            if !start.contains(',') && !end.contains(',') {
                let (start, end) = (number(start)?, number(end)?);
                if start > end {
                    return Err(invalid(s));
                }
                return Ok(PageSelection::Range(start..=end));
            }
        }

        let mut pages = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if let Some((start, end)) = part.split_once('-') {
                for p in number(start)?..=number(end)? {
                    pages.push(p);
                }
            } else {
                pages.push(number(part)?);
            }
        }

        pages.sort_unstable();
        pages.dedup();
        Ok(PageSelection::Pages(pages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_options_builder() {
        let options = EngineOptions::new()
            .with_footnote_policy(FootnoteZonePolicy::RequireWide)
            .with_media_binding(false)
            .sequential();

        assert_eq!(options.footnote_policy, FootnoteZonePolicy::RequireWide);
        assert!(!options.bind_media);
        assert!(!options.parallel);
    }

    #[test]
    fn test_default_thresholds() {
        let t = Thresholds::default();
        assert_eq!(t.column_cluster_ratio, 0.25);
        assert_eq!(t.column_min_baseline_groups, 12);
        assert_eq!(t.max_columns, 4);
        assert_eq!(t.baseline_tolerance_cap, 2.0);
        assert_eq!(t.full_width_ratio, 0.45);
        assert_eq!(t.chain_max_gap, 50.0);
        assert_eq!(t.chapter_ratio, 1.35);
        assert_eq!(t.section_ratio, 1.18);
        assert_eq!(t.min_tier_samples, 5);
        assert_eq!(t.font_break_delta, 2.0);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_partial_override() {
        let t = Thresholds::from_json_str(r#"{ "max_columns": 2, "chain_max_gap": 30.0 }"#)
            .unwrap();
        assert_eq!(t.max_columns, 2);
        assert_eq!(t.chain_max_gap, 30.0);
        assert_eq!(t.column_cluster_ratio, 0.25);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let t = Thresholds {
            tight_gap: -1.0,
            ..Default::default()
        };
        assert!(matches!(t.validate(), Err(Error::Config(_))));

        let t = Thresholds {
            full_width_ratio: 1.5,
            ..Default::default()
        };
        assert!(t.validate().is_err());

        let t = Thresholds {
            max_columns: 0,
            ..Default::default()
        };
        assert!(t.validate().is_err());

        assert!(Thresholds::from_json_str(r#"{ "section_ratio": 2.0 }"#).is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.json");
        std::fs::write(&path, r#"{ "dense_row_chars": 200.0 }"#).unwrap();
        let t = Thresholds::from_path(&path).unwrap();
        assert_eq!(t.dense_row_chars, 200.0);
    }

    #[test]
    fn test_page_selection_includes() {
        let range = PageSelection::Range(5..=10);
        assert!(!range.includes(4));
        assert!(range.includes(5));
        assert!(range.includes(10));
        assert!(!range.includes(11));

        let pages = PageSelection::Pages(vec![1, 3, 5, 7]);
        assert!(pages.includes(1));
        assert!(!pages.includes(2));
    }

    #[test]
    fn test_page_selection_parse() {
        assert_eq!(PageSelection::parse("all").unwrap(), PageSelection::All);
        assert_eq!(
            PageSelection::parse("1-10").unwrap(),
            PageSelection::Range(1..=10)
        );
        assert_eq!(
            PageSelection::parse("1,3,5-7,3").unwrap(),
            PageSelection::Pages(vec![1, 3, 5, 6, 7])
        );
        assert!(PageSelection::parse("x-3").is_err());
        assert!(PageSelection::parse("9-3").is_err());
    }
}
