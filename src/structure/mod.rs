//! Structure building: from classified blocks to a document tree.

mod builder;
pub mod lists;
pub mod media;
pub mod special;

pub use builder::{StructureBuilder, StructuredDocument};
pub use lists::{ListStack, Placement, PlacedItem};
pub use media::{AnchorIndex, MediaBinding};
pub use special::{EntryCollector, SpecialEntry};
