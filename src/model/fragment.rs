//! Positioned fragments as delivered by the upstream extractor.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of a positioned primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    /// Running text
    #[default]
    Text,
    /// Raster image
    Image,
    /// Table region
    Table,
    /// Vector figure
    Figure,
}

impl FragmentKind {
    /// Whether the fragment carries text.
    pub fn is_text(&self) -> bool {
        matches!(self, FragmentKind::Text)
    }
}

/// Axis-aligned box in page-local units, top-left origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub left: f32,
    /// Top edge (grows downwards)
    pub top: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle.
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Right edge.
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    /// Baseline (`top + height`).
    pub fn baseline(&self) -> f32 {
        self.top + self.height
    }

    /// Horizontal center.
    pub fn center_x(&self) -> f32 {
        self.left + self.width / 2.0
    }

    /// Whether every coordinate is finite and the extent is non-negative.
    pub fn is_well_formed(&self) -> bool {
        self.left.is_finite()
            && self.top.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }

    /// Whether the horizontal extents of two boxes overlap.
    pub fn overlaps_horizontally(&self, other: &Rect) -> bool {
        self.left < other.right() && other.left < self.right()
    }
}

/// Font attributes of a text fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontDescriptor {
    /// Font family identifier as reported by the extractor
    pub family: String,
    /// Font size in page units
    pub size: f32,
    /// Bold weight
    #[serde(default)]
    pub bold: bool,
    /// Italic style
    #[serde(default)]
    pub italic: bool,
}

impl FontDescriptor {
    /// Family used when the extractor reports no font.
    pub const DEFAULT_FAMILY: &'static str = "default";

    /// Create a regular-weight font descriptor.
    pub fn new(family: impl Into<String>, size: f32) -> Self {
        Self {
            family: family.into(),
            size,
            bold: false,
            italic: false,
        }
    }

    /// Mark the descriptor as bold.
    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    /// Mark the descriptor as italic.
    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }
}

impl Default for FontDescriptor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FAMILY, 0.0)
    }
}

/// A value that may be assigned exactly once.
///
/// Each layout component owns one slot on every fragment; a second write is
/// an engine defect and is reported as [`Error::SlotReassigned`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot<T>(Option<T>);

impl<T: Copy> Slot<T> {
    /// Read the slot.
    pub fn get(&self) -> Option<T> {
        self.0
    }

    /// Whether the slot has been written.
    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    fn set(&mut self, value: T, fragment: usize, slot: &'static str) -> Result<()> {
        if self.0.is_some() {
            return Err(Error::SlotReassigned { fragment, slot });
        }
        self.0 = Some(value);
        Ok(())
    }
}

/// One positioned primitive on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    /// Document-wide id (input order)
    pub id: usize,
    /// Page number (1-indexed)
    pub page: u32,
    /// Primitive kind
    pub kind: FragmentKind,
    /// Normalised text (empty for non-text kinds)
    pub text: String,
    /// Geometry
    pub rect: Rect,
    /// Font attributes
    pub font: FontDescriptor,
    /// Source-supplied background/border marker
    pub highlight: bool,
    /// Opaque media reference for non-text kinds
    pub ref_id: Option<String>,
    /// Geometry was malformed; the fragment carries no layout signal
    pub degenerate: bool,
    /// The extractor supplied no font; size is not a statistic sample
    pub font_missing: bool,
    column: Slot<u16>,
    row: Slot<usize>,
    order: Slot<usize>,
    block: Slot<u32>,
}

impl Fragment {
    /// Create a text fragment.
    pub fn text(
        id: usize,
        page: u32,
        text: impl Into<String>,
        rect: Rect,
        font: FontDescriptor,
    ) -> Self {
        Self {
            id,
            page,
            kind: FragmentKind::Text,
            text: text.into(),
            rect,
            font,
            highlight: false,
            ref_id: None,
            degenerate: !rect.is_well_formed(),
            font_missing: false,
            column: Slot::default(),
            row: Slot::default(),
            order: Slot::default(),
            block: Slot::default(),
        }
    }

    /// Create a media (image/table/figure) fragment.
    pub fn media(
        id: usize,
        page: u32,
        kind: FragmentKind,
        rect: Rect,
        ref_id: Option<String>,
    ) -> Self {
        Self {
            kind,
            ref_id,
            ..Self::text(id, page, String::new(), rect, FontDescriptor::default())
        }
    }

    /// Mark the fragment as highlighted (background or border).
    pub fn with_highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }

    /// Baseline (`top + height`).
    pub fn baseline(&self) -> f32 {
        self.rect.baseline()
    }

    /// Whether the fragment takes part in clustering, row grouping and ordering.
    pub fn contributes_layout(&self) -> bool {
        self.kind.is_text() && !self.degenerate
    }

    /// Assigned column (0 = full width).
    pub fn column(&self) -> Option<u16> {
        self.column.get()
    }

    /// Row index within the page.
    pub fn row(&self) -> Option<usize> {
        self.row.get()
    }

    /// Global reading-order index.
    pub fn order(&self) -> Option<usize> {
        self.order.get()
    }

    /// Reading-order block number.
    pub fn ro_block(&self) -> Option<u32> {
        self.block.get()
    }

    /// Write the column slot.
    pub fn assign_column(&mut self, column: u16) -> Result<()> {
        self.column.set(column, self.id, "column")
    }

    /// Write the row slot.
    pub fn assign_row(&mut self, row: usize) -> Result<()> {
        self.row.set(row, self.id, "row")
    }

    /// Write the reading-order index slot.
    pub fn assign_order(&mut self, order: usize) -> Result<()> {
        self.order.set(order, self.id, "order")
    }

    /// Write the reading-order block slot.
    pub fn assign_ro_block(&mut self, block: u32) -> Result<()> {
        self.block.set(block, self.id, "block")
    }

    /// Place a degenerate fragment at its neighbour's position so its text
    /// is read in place. The row slot stays unset.
    pub fn adopt_position(&mut self, rect: Rect, column: u16) -> Result<()> {
        self.rect = rect;
        self.assign_column(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_edges() {
        let r = Rect::new(10.0, 20.0, 100.0, 12.0);
        assert_eq!(r.right(), 110.0);
        assert_eq!(r.baseline(), 32.0);
        assert_eq!(r.center_x(), 60.0);
        assert!(r.is_well_formed());
        assert!(!Rect::new(f32::NAN, 0.0, 1.0, 1.0).is_well_formed());
        assert!(!Rect::new(0.0, 0.0, -1.0, 1.0).is_well_formed());
    }

    #[test]
    fn test_slot_write_once() {
        let rect = Rect::new(0.0, 0.0, 5.0, 5.0);
        let mut f = Fragment::text(3, 1, "x", rect, FontDescriptor::new("F1", 10.0));
        assert!(f.column().is_none());
        f.assign_column(2).unwrap();
        assert_eq!(f.column(), Some(2));

        let err = f.assign_column(1).unwrap_err();
        assert!(matches!(
            err,
            Error::SlotReassigned {
                fragment: 3,
                slot: "column"
            }
        ));
        assert_eq!(f.column(), Some(2));
    }

    #[test]
    fn test_degenerate_detection() {
        let rect = Rect::new(0.0, f32::INFINITY, 5.0, 5.0);
        let f = Fragment::text(0, 1, "x", rect, FontDescriptor::default());
        assert!(f.degenerate);
        assert!(!f.contributes_layout());

        let rect = Rect::new(0.0, 0.0, 50.0, 50.0);
        let img = Fragment::media(1, 1, FragmentKind::Image, rect, Some("img1".into()));
        assert!(!img.contributes_layout());
        assert_eq!(img.ref_id.as_deref(), Some("img1"));
    }

    #[test]
    fn test_adopt_position_keeps_degenerate_flag() {
        let rect = Rect::new(f32::NAN, 120.0, 5.0, 5.0);
        let mut f = Fragment::text(4, 1, "lost", rect, FontDescriptor::default());
        f.adopt_position(Rect::new(72.0, 100.0, 300.0, 10.0), 1).unwrap();
        assert!(f.rect.is_well_formed());
        assert!(f.degenerate);
        assert_eq!(f.column(), Some(1));
        assert_eq!(f.row(), None);
        assert!(f.adopt_position(Rect::default(), 2).is_err());
    }

    #[test]
    fn test_font_descriptor_builders() {
        let f = FontDescriptor::new("Times", 11.0).bold().italic();
        assert!(f.bold && f.italic);
        assert_eq!(FontDescriptor::default().family, "default");
    }
}
