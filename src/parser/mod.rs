//! Layout analysis: from raw fragments to classified blocks.

pub mod columns;
pub mod engine;
pub mod fonts;
mod options;
pub mod patterns;
pub mod reading_order;
pub mod rows;
pub mod segmenter;
pub mod stream;

pub use columns::ColumnDetector;
pub use engine::{LayoutEngine, Reconstruction};
pub use fonts::{FontRole, FontRoleClassifier, FontStatistics};
pub use options::{EngineOptions, FootnoteZonePolicy, PageSelection, Thresholds};
pub use reading_order::{OrderCursor, ReadingOrderGrid};
pub use rows::RowGrouper;
pub use segmenter::{BreakReason, Join, ParagraphSegmenter};
pub use stream::{FragmentStream, RawDocument, RawFont, RawFragment, RawPage};
