//! Rendering of structure trees and QA reports.

mod json;
mod markdown;
mod options;
mod text;
pub mod visitor;

pub use json::{report_to_json, to_json, JsonFormat};
pub use markdown::{to_markdown, MarkdownRenderer};
pub use options::RenderOptions;
pub use text::to_outline;
pub use visitor::{summarize, walk, SummaryVisitor, TreeVisitor, VisitorAction};
