//! Page-level types.

use serde::{Deserialize, Serialize};

use super::Fragment;

/// A single page of positioned fragments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Page number (1-indexed)
    pub number: u32,

    /// Page width in page units
    pub width: f32,

    /// Page height in page units
    pub height: f32,

    /// Fragments in input order
    pub fragments: Vec<Fragment>,
}

impl Page {
    /// Create a new empty page with the given dimensions.
    pub fn new(number: u32, width: f32, height: f32) -> Self {
        Self {
            number,
            width,
            height,
            fragments: Vec::new(),
        }
    }

    /// Create a new page with standard Letter size (8.5 x 11 inches).
    pub fn letter(number: u32) -> Self {
        Self::new(number, 612.0, 792.0)
    }

    /// Add a fragment to the page.
    pub fn add_fragment(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    /// Fragments that take part in layout analysis.
    pub fn layout_fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter().filter(|f| f.contributes_layout())
    }

    /// Number of text fragments.
    pub fn text_count(&self) -> usize {
        self.fragments.iter().filter(|f| f.kind.is_text()).count()
    }

    /// Check if the page has no fragments.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Get page dimensions as (width, height) tuple.
    pub fn dimensions(&self) -> (f32, f32) {
        (self.width, self.height)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::letter(1)
    }
}

/// A baseline-aligned group of fragments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    /// Row index within the page (top to bottom)
    pub index: usize,
    /// Baseline of the first fragment in the row
    pub baseline: f32,
    /// Indices into [`Page::fragments`], sorted by left edge
    pub members: Vec<usize>,
}

/// Adaptive measurements of a page, computed by the row grouper.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PageMetrics {
    /// Tolerance used to group baselines into rows
    pub baseline_tolerance: f32,
    /// Median positive gap between sorted fragment baselines
    pub line_spacing: f32,
    /// Median baseline distance between consecutive rows
    pub line_height: f32,
    /// Dominant font size on the page
    pub body_size: f32,
}

/// Geometric analysis of one page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageLayout {
    /// Page number
    pub page: u32,
    /// Page width
    pub width: f32,
    /// Page height
    pub height: f32,
    /// Column centers, ascending (fewer than two means single column)
    pub columns: Vec<f32>,
    /// Rows, top to bottom
    pub rows: Vec<Row>,
    /// Adaptive metrics
    pub metrics: PageMetrics,
    /// Leftmost edge of each assigned column id, sorted by id
    pub column_lefts: Vec<(u16, f32)>,
}

impl PageLayout {
    /// Number of detected columns (at least one).
    pub fn column_count(&self) -> usize {
        self.columns.len().max(1)
    }

    /// Whether more than one column was detected.
    pub fn is_multi_column(&self) -> bool {
        self.columns.len() >= 2
    }

    /// Left edge of a column, if any fragment was assigned to it.
    pub fn column_left(&self, column: u16) -> Option<f32> {
        self.column_lefts
            .iter()
            .find(|(id, _)| *id == column)
            .map(|(_, left)| *left)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FontDescriptor, Rect};

    #[test]
    fn test_page_new() {
        let page = Page::new(1, 612.0, 792.0);
        assert_eq!(page.number, 1);
        assert_eq!(page.dimensions(), (612.0, 792.0));
        assert!(page.is_empty());
    }

    #[test]
    fn test_layout_fragments_skip_degenerate() {
        let mut page = Page::letter(1);
        let font = FontDescriptor::new("F", 10.0);
        page.add_fragment(Fragment::text(0, 1, "a", Rect::new(0.0, 0.0, 5.0, 5.0), font.clone()));
        page.add_fragment(Fragment::text(1, 1, "b", Rect::new(f32::NAN, 0.0, 5.0, 5.0), font));
        assert_eq!(page.layout_fragments().count(), 1);
        assert_eq!(page.text_count(), 2);
    }

    #[test]
    fn test_column_left_lookup() {
        let layout = PageLayout {
            columns: vec![100.0, 400.0],
            column_lefts: vec![(1, 72.0), (2, 320.0)],
            ..Default::default()
        };
        assert!(layout.is_multi_column());
        assert_eq!(layout.column_left(2), Some(320.0));
        assert_eq!(layout.column_left(0), None);
    }
}
