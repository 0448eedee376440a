//! Document model types.
//!
//! This module defines the intermediate representation that flows through
//! the engine: positioned fragments grouped into pages, the blocks the
//! segmenter produces from them, and the structure tree the builder emits.

mod block;
mod fragment;
mod page;
mod tree;

pub use block::{
    ends_with_terminal, is_spaceless_script_char, join_text, Block, BlockKind, BlockLine,
    InlineRun, ScriptRole,
};
pub use fragment::{FontDescriptor, Fragment, FragmentKind, Rect, Slot};
pub use page::{Page, PageLayout, PageMetrics, Row};
pub use tree::{
    ListKind, NodeAttributes, NodeId, NodeView, Provenance, Role, StructureNode, StructureTree,
    Tag,
};
